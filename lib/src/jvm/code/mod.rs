//! Method bodies
//!
//! ### Structure
//!
//! The bytecode lives in [just another method attribute](crate::jvm::class_file::CodeAttribute),
//! but it is by far the most important part of the class file. We split up the [list of bytecode
//! instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump, return, or throw
//!
//! Method [`Code`] is kept as a flat list of both, tagged with byte offsets. Turning that into
//! basic blocks is the job of the analysis.
//!
//! ### Building code by hand
//!
//! [`CodeBuilder`] assembles code from labels instead of offsets, which is handy for exercising
//! analyses on small snippets.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod code;
mod code_builder;
mod decode;
mod instructions;

pub use code::*;
pub use code_builder::*;
pub use decode::*;
pub use instructions::*;
