use crate::common::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration of an extraction run.
///
/// Options can be built in code or loaded from YAML; every field is
/// optional in YAML and falls back to its default.
///
/// # Examples
///
/// ```rust
/// use embex::ExtractOptions;
///
/// // Create with defaults
/// let options = ExtractOptions::default();
///
/// // Or customize
/// let options = ExtractOptions::new()
///     .with_max_depth(2)
///     .with_file_stem("attachment")
///     .with_images(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// How many levels of nested documents are searched below the input
    pub max_depth: usize,
    /// Output files are named `<file_stem>_<seq>.<ext>`
    pub file_stem: String,
    /// Also extract images referenced through `image` relationships
    pub include_images: bool,
    /// Search native objects that turn out to be compound files
    pub descend_into_native_objects: bool,
    /// Directory for spill files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Additional compound stream names whose content is identified by
    /// signature
    pub extra_stream_names: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            file_stem: "embedded".to_string(),
            include_images: false,
            descend_into_native_objects: false,
            temp_dir: None,
            extra_stream_names: Vec::new(),
        }
    }
}

impl ExtractOptions {
    /// Create a new `ExtractOptions` with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a YAML document.
    ///
    /// ```rust
    /// use embex::ExtractOptions;
    ///
    /// let options = ExtractOptions::from_yaml_str("max_depth: 1\ninclude_images: true\n").unwrap();
    /// assert_eq!(options.max_depth, 1);
    /// assert_eq!(options.file_stem, "embedded");
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: Self =
            serde_saphyr::from_str(yaml).map_err(|e| Error::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Set the nesting limit.
    ///
    /// `0` extracts the objects of the input only, without searching them.
    #[inline]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[inline]
    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    #[inline]
    pub fn with_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    #[inline]
    pub fn with_native_descent(mut self, descend: bool) -> Self {
        self.descend_into_native_objects = descend;
        self
    }

    #[inline]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Add a compound stream name whose content is identified by signature.
    #[inline]
    pub fn with_extra_stream_name(mut self, name: impl Into<String>) -> Self {
        self.extra_stream_names.push(name.into());
        self
    }

    /// Check the options for values that cannot produce output names.
    pub fn validate(&self) -> Result<()> {
        let stem = self.file_stem.trim();
        if stem.is_empty() {
            return Err(Error::InvalidOptions("file_stem must not be empty".into()));
        }
        if stem == "." || stem == ".." || self.file_stem.contains(['/', '\\', '\0']) {
            return Err(Error::InvalidOptions(format!(
                "file_stem '{}' must be a plain file name",
                self.file_stem
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExtractOptions::new();
        assert_eq!(options.max_depth, 5);
        assert_eq!(options.file_stem, "embedded");
        assert!(!options.include_images);
        assert!(!options.descend_into_native_objects);
        assert!(options.temp_dir.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let options = ExtractOptions::new()
            .with_max_depth(1)
            .with_file_stem("obj")
            .with_native_descent(true)
            .with_temp_dir("/tmp/spill")
            .with_extra_stream_name("EPRINT");
        assert_eq!(options.max_depth, 1);
        assert_eq!(options.file_stem, "obj");
        assert!(options.descend_into_native_objects);
        assert_eq!(options.temp_dir, Some(PathBuf::from("/tmp/spill")));
        assert_eq!(options.extra_stream_names, ["EPRINT"]);
    }

    #[test]
    fn test_validate_rejects_bad_stems() {
        for stem in ["", "  ", "a/b", "..\\x", ".."] {
            let options = ExtractOptions::new().with_file_stem(stem);
            assert!(
                matches!(options.validate(), Err(Error::InvalidOptions(_))),
                "{stem:?}"
            );
        }
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "max_depth: 2\nfile_stem: part\nextra_stream_names:\n  - Ole\n  - EPRINT\n";
        let options = ExtractOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(options.max_depth, 2);
        assert_eq!(options.file_stem, "part");
        assert_eq!(options.extra_stream_names, ["Ole", "EPRINT"]);
        assert!(!options.include_images);
    }

    #[test]
    fn test_from_yaml_errors() {
        assert!(matches!(
            ExtractOptions::from_yaml_str("max_depth: [1, 2]"),
            Err(Error::InvalidOptions(_))
        ));
        assert!(matches!(
            ExtractOptions::from_yaml_str("file_stem: ''"),
            Err(Error::InvalidOptions(_))
        ));
    }
}
