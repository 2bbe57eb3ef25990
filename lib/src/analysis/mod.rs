//! Intraprocedural resource leak analysis
//!
//! ### Overview
//!
//! Each method is handled on its own:
//!
//!   1. A [`Cfg`] is built from the method's code, with normal and exceptional edges
//!   2. One sweep over the instructions collects every resource the method creates, along with
//!      the resource parameters it receives
//!   3. For each resource, [`ResourceDataflow`] tracks a [`ResourceFrame`] (which stack slots and
//!      locals hold the instance, and the [`ResourceStatus`] of the instance) to a fixed point
//!   4. The [`ResourceTracker`] then folds wrappers together with the resources they wrap, so
//!      that closing the outermost wrapper counts as closing everything inside it
//!   5. Resources that are still open at the exit are reported to a [`BugReporter`]
//!
//! ### Statuses
//!
//! Statuses are ordered from worst to best and the merge at a join point keeps the worst one.
//! A resource is only reported when the merged status at the exit is [`ResourceStatus::Open`]
//! or [`ResourceStatus::OpenOnExceptionPath`].

pub mod bugs;
mod cfg;
mod dataflow;
mod detector;
mod equivalence;
mod errors;
mod frame;
mod location;
mod resource;
mod settings;
mod tracker;
mod visitor;

pub use bugs::{Bug, BugAccumulator, BugInstance, BugReporter, Priority, SourceLine};
pub use cfg::*;
pub use dataflow::*;
pub use detector::*;
pub use equivalence::*;
pub use errors::*;
pub use frame::*;
pub use location::*;
pub use resource::*;
pub use settings::*;
pub use tracker::*;
pub use visitor::*;
