//! Read JVM classes
//!
//! Only the parts of the class file format that matter for intraprocedural analysis are
//! modelled: the constant pool, method signatures and flags, the `Code` attribute (with its
//! exception table) and the line number and source file debug attributes.

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
