/// First of `base`, `base2`, `base3`, ... that `is_taken` rejects
pub fn unique_name<F>(base: &str, mut is_taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !is_taken(base) {
        return base.to_string();
    }
    let mut counter = 2u32;
    loop {
        let candidate = format!("{base}{counter}");
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// A scheme file: sanitized base name plus extension (with its dot)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemeFile {
    pub base: String,
    pub extension: String,
}

impl SchemeFile {
    pub fn new(base: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
        }
    }

    /// Split `file_name` if it carries `preferred` or the default `.xml` extension
    pub fn parse(file_name: &str, preferred: &str) -> Option<Self> {
        [preferred, crate::kernel::constants::DEFAULT_SCHEME_EXTENSION]
            .into_iter()
            .find_map(|extension| {
                file_name
                    .strip_suffix(extension)
                    .filter(|base| !base.is_empty())
                    .map(|base| Self::new(base, extension))
            })
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.base, self.extension)
    }

    /// Case-insensitive identity, for file systems that fold case
    pub fn key(&self) -> String {
        self.file_name().to_lowercase()
    }
}
