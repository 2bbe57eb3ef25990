//! Raw class file structures, as laid out on disk
//!
//! Nothing here resolves constant pool indices eagerly: see [`crate::jvm::model`] for classes
//! and methods with names, descriptors, and decoded bytecode.

mod attribute;
mod binary_format;
mod class;
mod constants;
mod field;
mod method;

pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
