//! Backend configuration.
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! cache_dir = "/var/cache/app"
//! file_locking = true
//! read_control = true
//! read_control_type = "crc32"
//! hashed_directory_level = 2
//! file_name_prefix = "cm"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tagfile_core::{CoreError, ReadControl, ShardResolver};
use tagfile_store::FileModes;

/// Errors that can occur when loading or validating options
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid option: {0}")]
    Invalid(#[from] CoreError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Options recognized by [`crate::FileBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Root directory for payloads, metadata and tag files
    pub cache_dir: PathBuf,

    /// Lock tag files around writes (disable on filesystems without flock)
    #[serde(default = "default_true")]
    pub file_locking: bool,

    /// Store a payload digest and verify it on load
    #[serde(default)]
    pub read_control: bool,

    /// Digest used when `read_control` is on
    #[serde(default)]
    pub read_control_type: ReadControl,

    /// Number of hash characters in shard directory names (0 = no sharding)
    #[serde(default = "default_level")]
    pub hashed_directory_level: usize,

    /// Prefix for every file and shard directory name
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,

    /// Permission bits for created files
    #[serde(default = "default_file_mode")]
    pub cache_file_mode: u32,

    /// Permission bits for created directories
    #[serde(default = "default_directory_mode")]
    pub directory_mode: u32,

    /// Maximum entries in the in-process metadata cache
    #[serde(default = "default_metadata_cache_size")]
    pub metadata_cache_size: usize,

    /// Lifetime in seconds for entries saved without an explicit one
    /// (0 = never expire)
    #[serde(default = "default_lifetime")]
    pub default_lifetime: u64,
}

fn default_true() -> bool {
    true
}

fn default_level() -> usize {
    2
}

fn default_prefix() -> String {
    "cm".to_string()
}

fn default_file_mode() -> u32 {
    0o660
}

fn default_directory_mode() -> u32 {
    0o770
}

fn default_metadata_cache_size() -> usize {
    100
}

fn default_lifetime() -> u64 {
    3600
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/tagfile-cache"),
            file_locking: default_true(),
            read_control: false,
            read_control_type: ReadControl::default(),
            hashed_directory_level: default_level(),
            file_name_prefix: default_prefix(),
            cache_file_mode: default_file_mode(),
            directory_mode: default_directory_mode(),
            metadata_cache_size: default_metadata_cache_size(),
            default_lifetime: default_lifetime(),
        }
    }
}

impl CacheOptions {
    /// Default options rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Load and validate options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate options from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let options: CacheOptions = toml::from_str(contents)?;
        options.validate()?;
        Ok(options)
    }

    /// Check the prefix and fan-out level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolver().map(|_| ())
    }

    /// Path resolver for these options.
    pub fn resolver(&self) -> Result<ShardResolver, ConfigError> {
        Ok(ShardResolver::new(
            &self.cache_dir,
            &self.file_name_prefix,
            self.hashed_directory_level,
        )?)
    }

    pub fn modes(&self) -> FileModes {
        FileModes {
            file: self.cache_file_mode,
            dir: self.directory_mode,
        }
    }

    /// The active read control, if enabled.
    pub fn read_control(&self) -> Option<ReadControl> {
        self.read_control.then_some(self.read_control_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = CacheOptions::new("/tmp/cache");
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/cache"));
        assert!(options.file_locking);
        assert!(options.read_control().is_none());
        assert_eq!(options.hashed_directory_level, 2);
        assert_eq!(options.file_name_prefix, "cm");
        assert_eq!(options.metadata_cache_size, 100);
        assert_eq!(options.default_lifetime, 3600);
        assert_eq!(options.modes(), FileModes { file: 0o660, dir: 0o770 });
    }

    #[test]
    fn test_parse_minimal() {
        let options = CacheOptions::parse(r#"cache_dir = "/srv/cache""#).unwrap();
        assert_eq!(options, CacheOptions::new("/srv/cache"));
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
            cache_dir = "/srv/cache"
            file_locking = false
            read_control = true
            read_control_type = "md5"
            hashed_directory_level = 0
            file_name_prefix = "app"
            cache_file_mode = 0o600
            directory_mode = 0o700
            metadata_cache_size = 5
            default_lifetime = 0
        "#;
        let options = CacheOptions::parse(toml).unwrap();
        assert!(!options.file_locking);
        assert_eq!(options.read_control(), Some(ReadControl::Md5));
        assert_eq!(options.hashed_directory_level, 0);
        assert_eq!(options.file_name_prefix, "app");
        assert_eq!(options.modes(), FileModes { file: 0o600, dir: 0o700 });
        assert_eq!(options.metadata_cache_size, 5);
        assert_eq!(options.default_lifetime, 0);
    }

    #[test]
    fn test_rejects_invalid_options() {
        let bad_level = CacheOptions::parse("cache_dir = \"/c\"\nhashed_directory_level = 12");
        assert!(matches!(bad_level, Err(ConfigError::Invalid(_))));

        let bad_prefix = CacheOptions::parse("cache_dir = \"/c\"\nfile_name_prefix = \"a/b\"");
        assert!(matches!(bad_prefix, Err(ConfigError::Invalid(_))));

        let bad_control = CacheOptions::parse("cache_dir = \"/c\"\nread_control_type = \"sha1\"");
        assert!(matches!(bad_control, Err(ConfigError::Parse(_))));

        assert!(matches!(
            CacheOptions::parse("file_locking = true"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.toml");
        fs::write(&path, "cache_dir = \"/srv/cache\"\nread_control = true\n").unwrap();

        let options = CacheOptions::load(&path).unwrap();
        assert_eq!(options.read_control(), Some(ReadControl::Crc32));

        let missing = CacheOptions::load(&temp_dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }
}
