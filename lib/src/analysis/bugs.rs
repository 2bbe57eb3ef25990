use crate::jvm::class_graph::LookupFailure;
use crate::jvm::BinaryName;
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource left open on some normal path through the method
pub const RESOURCE_LEAK: &str = "RESOURCE_LEAK";

/// Resource left open only on paths where an exception is thrown
pub const RESOURCE_LEAK_EXCEPTION_PATH: &str = "RESOURCE_LEAK_EXCEPTION_PATH";

/// Each bug type along with the type used when the leak only happens on exception paths
const EXCEPTION_PATH_VARIANTS: [(&str, &str); 1] = [(RESOURCE_LEAK, RESOURCE_LEAK_EXCEPTION_PATH)];

/// Bug type to report for a leak that only happens on exception paths
pub fn exception_path_variant(bug_type: &str) -> Option<&'static str> {
    EXCEPTION_PATH_VARIANTS
        .iter()
        .find(|(normal, _)| *normal == bug_type)
        .map(|(_, exceptional)| *exceptional)
}

/// Sink for the findings of the analysis
pub trait BugReporter {
    fn accumulate(&mut self, bug: BugInstance, line: SourceLine);

    /// A class needed to answer a hierarchy query was not available
    fn report_missing_class(&mut self, failure: LookupFailure);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Normal => "NORMAL",
            Priority::Low => "LOW",
        })
    }
}

/// One finding, without the location in the source
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BugInstance {
    pub bug_type: &'static str,
    pub priority: Priority,
    pub class_name: BinaryName,
    pub method_name: String,

    /// Rendered method descriptor
    pub method_descriptor: String,
    pub source_file: Option<String>,

    /// Base category the leaked instance belongs to
    pub leaked_type: BinaryName,

    /// Actual type of the leaked instance
    pub declared_type: BinaryName,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLine {
    pub class_name: BinaryName,
    pub source_file: Option<String>,
    pub line: Option<u16>,

    /// Bytecode offset of the instruction
    pub offset: Offset,
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_file {
            Some(file) => f.write_str(file)?,
            None => write!(f, "{}", self.class_name)?,
        }
        match self.line {
            Some(line) => write!(f, ":{}", line),
            None => write!(f, " (offset {})", self.offset.0),
        }
    }
}

/// Finding along with all the places it was reported at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bug {
    pub instance: BugInstance,
    pub lines: Vec<SourceLine>,
}

impl fmt::Display for Bug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instance = &self.instance;
        write!(
            f,
            "{} {} {}.{}{} [leaks {}]",
            instance.priority,
            instance.bug_type,
            instance.class_name,
            instance.method_name,
            instance.method_descriptor,
            instance.declared_type,
        )?;
        for (idx, line) in self.lines.iter().enumerate() {
            let separator = if idx == 0 { " at " } else { ", " };
            write!(f, "{}{}", separator, line)?;
        }
        Ok(())
    }
}

/// Reporter that collects findings in memory
///
/// The same finding reported from several places is kept once, with all of its source lines.
#[derive(Debug, Default)]
pub struct BugAccumulator {
    bugs: BTreeMap<BugInstance, BTreeSet<SourceLine>>,
    missing_classes: BTreeSet<BinaryName>,
}

impl BugAccumulator {
    pub fn new() -> BugAccumulator {
        BugAccumulator::default()
    }

    /// Findings, sorted
    pub fn bugs(&self) -> Vec<Bug> {
        self.bugs
            .iter()
            .map(|(instance, lines)| Bug {
                instance: instance.clone(),
                lines: lines.iter().cloned().collect(),
            })
            .collect()
    }

    pub fn missing_classes(&self) -> impl Iterator<Item = &BinaryName> + '_ {
        self.missing_classes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.bugs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bugs.len()
    }
}

impl BugReporter for BugAccumulator {
    fn accumulate(&mut self, bug: BugInstance, line: SourceLine) {
        self.bugs.entry(bug).or_default().insert(line);
    }

    fn report_missing_class(&mut self, failure: LookupFailure) {
        if self.missing_classes.insert(failure.class_name.clone()) {
            log::debug!("Missing class: {}", failure);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leak(priority: Priority, method_name: &str) -> BugInstance {
        BugInstance {
            bug_type: match priority {
                Priority::Normal => RESOURCE_LEAK,
                Priority::Low => RESOURCE_LEAK_EXCEPTION_PATH,
            },
            priority,
            class_name: BinaryName::from_dotted("app.Example").unwrap(),
            method_name: method_name.to_owned(),
            method_descriptor: String::from("()V"),
            source_file: Some(String::from("Example.java")),
            leaked_type: BinaryName::INPUTSTREAM,
            declared_type: BinaryName::FILEINPUTSTREAM,
        }
    }

    fn line(line: u16, offset: usize) -> SourceLine {
        SourceLine {
            class_name: BinaryName::from_dotted("app.Example").unwrap(),
            source_file: Some(String::from("Example.java")),
            line: Some(line),
            offset: Offset(offset),
        }
    }

    #[test]
    fn duplicates_merge() {
        let mut bugs = BugAccumulator::new();
        bugs.accumulate(leak(Priority::Low, "b"), line(20, 9));
        bugs.accumulate(leak(Priority::Normal, "a"), line(12, 4));
        bugs.accumulate(leak(Priority::Normal, "a"), line(10, 0));
        bugs.accumulate(leak(Priority::Normal, "a"), line(12, 4));

        let found = bugs.bugs();
        assert_eq!(bugs.len(), 2);
        assert_eq!(found[0].instance.method_name, "a");
        assert_eq!(found[0].lines, vec![line(10, 0), line(12, 4)]);
        assert_eq!(
            found[0].to_string(),
            "NORMAL RESOURCE_LEAK app.Example.a()V [leaks java.io.FileInputStream] at \
             Example.java:10, Example.java:12"
        );
        assert_eq!(
            found[1].to_string(),
            "LOW RESOURCE_LEAK_EXCEPTION_PATH app.Example.b()V [leaks java.io.FileInputStream] \
             at Example.java:20"
        );
    }

    #[test]
    fn exception_path_variants() {
        assert_eq!(
            exception_path_variant(RESOURCE_LEAK),
            Some(RESOURCE_LEAK_EXCEPTION_PATH)
        );
        assert_eq!(exception_path_variant(RESOURCE_LEAK_EXCEPTION_PATH), None);
        assert_eq!(exception_path_variant("UNKNOWN"), None);
    }

    #[test]
    fn missing_classes_once() {
        let mut bugs = BugAccumulator::new();
        let missing = LookupFailure {
            class_name: BinaryName::from_dotted("lib.Gone").unwrap(),
        };
        bugs.report_missing_class(missing.clone());
        bugs.report_missing_class(missing);
        assert_eq!(bugs.missing_classes().count(), 1);
        assert!(bugs.is_empty());

        let unknown_line = SourceLine {
            source_file: None,
            line: None,
            ..line(1, 7)
        };
        assert_eq!(unknown_line.to_string(), "app.Example (offset 7)");
    }
}
