use crate::jvm::BinaryName;

/// Configuration of the leak detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Log the inner workings of the analysis (open locations, escapes, propagation)
    pub debug: bool,

    /// Report resources even when they wrap (transitively) a resource that isn't interesting,
    /// such as one passed in as a parameter
    pub allow_wrapped_uninteresting: bool,

    /// Base categories of tracked resources
    ///
    /// A type is tracked if it is a subtype of one of these. When several match, the first one
    /// is its category.
    pub resource_bases: Vec<BinaryName>,

    /// Classes whose method references contain none of these fragments are skipped outright
    pub prescreen_fragments: Vec<String>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            debug: false,
            allow_wrapped_uninteresting: false,
            resource_bases: vec![
                BinaryName::INPUTSTREAM,
                BinaryName::OUTPUTSTREAM,
                BinaryName::ZIPFILE,
                BinaryName::READER,
                BinaryName::WRITER,
                BinaryName::CONNECTION,
                BinaryName::STATEMENT,
                BinaryName::RESULTSET,
            ],
            prescreen_fragments: [
                "Stream",
                "Reader",
                "Writer",
                "ZipFile",
                "JarFile",
                "DriverManager",
                "Connection",
                "Statement",
            ]
            .iter()
            .map(|fragment| fragment.to_string())
            .collect(),
        }
    }
}

impl Settings {
    /// Track an extra base category (after the existing ones)
    pub fn add_resource_base(&mut self, base: BinaryName) {
        if !self.resource_bases.contains(&base) {
            let fragment = base.simple_name().to_owned();
            if !self
                .prescreen_fragments
                .iter()
                .any(|existing| fragment.contains(existing.as_str()))
            {
                self.prescreen_fragments.push(fragment);
            }
            self.resource_bases.push(base);
        }
    }
}
