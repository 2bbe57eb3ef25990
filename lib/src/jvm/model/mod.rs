//! Semantic representations of classes
//!
//! This is the representation to use while analyzing classes: names and descriptors are resolved
//! out of the constant pool and method bodies are decoded.
//!
//!   - __Class__ is represented using [`Class`]
//!   - __Method__ is represented using [`Method`]
//!
//! Classes can also be put together by hand (see [`Class::new`] and [`Method::new`]), which is
//! how tests describe small programs without going through `javac`.

mod class;
mod method;

pub use class::*;
pub use method::*;
