//! Find streams, readers, writers and JDBC handles that a method opens but does not close on
//! every path to its exit.
//!
//! The crate is split in two layers:
//!
//!   - [`jvm`] reads class files, decodes bytecode and keeps a class hierarchy around for
//!     subtype queries
//!   - [`analysis`] runs a per-resource dataflow analysis over each method, folds wrapper
//!     chains into equivalence classes and reports the resources left open
//!
//! ```no_run
//! use jvmleak::analysis::{BugAccumulator, ResourceLeakDetector, Settings};
//! use jvmleak::jvm::class_graph::{ClassGraph, ClassGraphArenas};
//! use jvmleak::jvm::model::Class;
//!
//! # fn run() -> Result<(), jvmleak::jvm::Error> {
//! let arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&arenas);
//! class_graph.insert_java_library_types();
//!
//! let class = Class::from_path("Example.class")?;
//! class_graph.add_model_class(&class);
//!
//! let settings = Settings::default();
//! let detector = ResourceLeakDetector::new(&settings, &class_graph);
//! let mut bugs = BugAccumulator::new();
//! detector.visit_class(&class, &mut bugs);
//! for bug in bugs.bugs() {
//!     println!("{}", bug);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod jvm;
pub mod util;
