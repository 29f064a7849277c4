//! Library and scan configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::{FileTypeGroup, LibraryType, MangaFormat};

/// Identifier of a library.
pub type LibraryId = u64;

/// Entries ignored in every library.
const BUILTIN_IGNORES: &[&str] = &["__MACOSX", "@eaDir", ".DS_Store", "#recycle", "Thumbs.db"];

/// Configuration for one library.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct LibraryConfig {
    /// Library identifier.
    #[builder(default = "1")]
    #[serde(default = "default_library_id")]
    pub id: LibraryId,

    /// Display name.
    #[builder(default = "String::from(\"Library\")")]
    #[serde(default = "default_library_name")]
    pub name: String,

    /// Rule groups to parse with.
    #[builder(default)]
    #[serde(default, rename = "type")]
    pub library_type: LibraryType,

    /// Root folders to scan, in order.
    pub roots: Vec<PathBuf>,

    /// Accepted file-type groups.
    #[builder(default = "FileTypeGroup::all()")]
    #[serde(default = "FileTypeGroup::all")]
    pub file_types: Vec<FileTypeGroup>,

    /// Glob patterns excluded from the scan, matched against the path
    /// relative to the root and against the file name.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Number of threads for traversal (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_library_id() -> LibraryId {
    1
}

fn default_library_name() -> String {
    "Library".to_string()
}

impl LibraryConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => Err("At least one root is required".to_string()),
            Some(ref roots) if roots.iter().any(|r| r.as_os_str().is_empty()) => {
                Err("Root path cannot be empty".to_string())
            }
            Some(_) => {
                if let Some(ref patterns) = self.exclude_patterns {
                    for pattern in patterns {
                        Glob::new(pattern).map_err(|e| format!("{pattern}: {e}"))?;
                    }
                }
                Ok(())
            }
            None => Err("Roots are required".to_string()),
        }
    }
}

impl LibraryConfig {
    /// Create a new config builder.
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::default()
    }

    /// Create a simple config for one root.
    pub fn new(root: impl Into<PathBuf>, library_type: LibraryType) -> Self {
        Self {
            id: default_library_id(),
            name: default_library_name(),
            library_type,
            roots: vec![root.into()],
            file_types: FileTypeGroup::all(),
            exclude_patterns: Vec::new(),
            follow_symlinks: false,
            include_hidden: false,
            threads: 0,
        }
    }

    /// Validate a config that did not come through the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roots.is_empty() || self.roots.iter().any(|r| r.as_os_str().is_empty()) {
            return Err(ConfigError::Library {
                library: self.name.clone(),
                message: "at least one non-empty root is required".to_string(),
            });
        }
        self.exclude_matcher().map(|_| ())
    }

    /// Compile exclude patterns into a matcher.
    pub fn exclude_matcher(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|source| ConfigError::Glob {
            pattern: self.exclude_patterns.join(", "),
            source,
        })
    }

    /// Whether a file of this format is accepted.
    pub fn accepts(&self, format: MangaFormat) -> bool {
        format
            .group()
            .is_some_and(|group| self.file_types.contains(&group))
    }

    /// Whether an entry name is always skipped.
    pub fn is_builtin_ignored(&self, name: &str) -> bool {
        BUILTIN_IGNORES.contains(&name) || (!self.include_hidden && name.starts_with('.'))
    }
}

/// Parser tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSettings {
    /// Backtracking budget per regex match.
    #[serde(default = "default_backtrack_limit")]
    pub backtrack_limit: usize,
    /// File names are truncated to this many characters before matching.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

fn default_backtrack_limit() -> usize {
    100_000
}

fn default_max_name_len() -> usize {
    255
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            backtrack_limit: default_backtrack_limit(),
            max_name_len: default_max_name_len(),
        }
    }
}

/// Scan job tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Workers for per-series reconciliation (0 = auto-detect).
    #[serde(default)]
    pub worker_threads: usize,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KuraConfig {
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryConfig>,
    #[serde(default)]
    pub parser: ParserSettings,
    #[serde(default)]
    pub scan: ScanSettings,
}

impl KuraConfig {
    /// Default location: `<config dir>/kura/kura.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kura")
            .join("kura.toml")
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        for library in &config.libraries {
            library.validate()?;
        }
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Find a library by name (case-insensitive).
    pub fn library(&self, name: &str) -> Option<&LibraryConfig> {
        self.libraries
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LibraryConfig::builder()
            .roots(vec![PathBuf::from("/manga")])
            .library_type(LibraryType::Comic)
            .threads(4usize)
            .exclude_patterns(vec!["**/Extras/**".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.roots, vec![PathBuf::from("/manga")]);
        assert_eq!(config.library_type, LibraryType::Comic);
        assert_eq!(config.threads, 4);
        assert_eq!(config.file_types.len(), 4);
    }

    #[test]
    fn test_builder_rejects_missing_roots() {
        assert!(LibraryConfig::builder().build().is_err());
        assert!(LibraryConfig::builder().roots(Vec::<PathBuf>::new()).build().is_err());
    }

    #[test]
    fn test_builder_rejects_bad_glob() {
        let result = LibraryConfig::builder()
            .roots(vec![PathBuf::from("/manga")])
            .exclude_patterns(vec!["[".to_string()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_exclude_matcher() {
        let mut config = LibraryConfig::new("/manga", LibraryType::Manga);
        config.exclude_patterns = vec!["**/Extras/**".to_string(), "*.txt".to_string()];
        let matcher = config.exclude_matcher().unwrap();
        assert!(matcher.is_match("Series/Extras/a.cbz"));
        assert!(matcher.is_match("notes.txt"));
        assert!(!matcher.is_match("Series/Series v01.cbz"));
    }

    #[test]
    fn test_accepts_file_types() {
        let mut config = LibraryConfig::new("/manga", LibraryType::Manga);
        config.file_types = vec![FileTypeGroup::Archive];
        assert!(config.accepts(MangaFormat::Archive));
        assert!(!config.accepts(MangaFormat::Epub));
        assert!(!config.accepts(MangaFormat::Unknown));
    }

    #[test]
    fn test_builtin_ignores() {
        let config = LibraryConfig::new("/manga", LibraryType::Manga);
        assert!(config.is_builtin_ignored("__MACOSX"));
        assert!(config.is_builtin_ignored(".hidden"));
        assert!(!config.is_builtin_ignored("Series v01.cbz"));
    }

    #[test]
    fn test_config_from_toml() {
        let text = r#"
            [parser]
            backtrack_limit = 5000

            [[library]]
            id = 3
            name = "Manga"
            type = "manga"
            roots = ["/data/manga"]
            exclude_patterns = ["**/Extras/**"]

            [[library]]
            name = "Comics"
            type = "comic"
            roots = ["/data/comics"]
            file_types = ["archive"]
        "#;
        let config = KuraConfig::from_toml(text, Path::new("kura.toml")).unwrap();
        assert_eq!(config.libraries.len(), 2);
        assert_eq!(config.parser.backtrack_limit, 5000);
        assert_eq!(config.parser.max_name_len, 255);
        assert_eq!(config.libraries[0].id, 3);
        let comics = config.library("comics").unwrap();
        assert_eq!(comics.library_type, LibraryType::Comic);
        assert_eq!(comics.file_types, vec![FileTypeGroup::Archive]);
    }

    #[test]
    fn test_config_from_toml_rejects_empty_roots() {
        let text = r#"
            [[library]]
            name = "Broken"
            roots = []
        "#;
        assert!(matches!(
            KuraConfig::from_toml(text, Path::new("kura.toml")),
            Err(ConfigError::Library { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = KuraConfig::load(temp.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
