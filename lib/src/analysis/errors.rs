use super::{Location, ResourceId};
use std::fmt;

/// Internal inconsistency in the analysis of a method
///
/// These abort the method they happen in, but not the rest of the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// An escape survived filtering, but there is no resource opened at its target
    MissingEscapeTarget { source: ResourceId, target: Location },

    /// Resource id that doesn't belong to the method's collection
    UnknownResource(ResourceId),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::MissingEscapeTarget { source, target } => write!(
                f,
                "escape of {:?} into {:?} does not target an open location",
                source, target
            ),
            AnalysisError::UnknownResource(id) => write!(f, "unknown resource {:?}", id),
        }
    }
}
