//! Hashed directory sharding and file naming.
//!
//! Entries are spread over single-level shard directories named
//! `<prefix>--<suffix>`, where `suffix` is the last `level` hex digits of the
//! adler32 hash of the id. One level of multi-character names gives a better
//! spread than nested one-character directories and costs at most one
//! directory creation per shard.
//!
//! Layout under the cache root:
//! - `<prefix>--<suffix>/<prefix>---<id>`: payload
//! - `<prefix>--<suffix>/<prefix>---internal-metadatas---<id>`: metadata
//! - `tags/<prefix>---<tag>`: tag index (never sharded)

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::key::is_word;

/// Characters a shard suffix is drawn from.
pub const SHARD_ALPHABET: &str = "0123456789abcdef";

/// Largest usable fan-out level (adler32 renders as 8 hex digits).
pub const MAX_SHARD_LEVEL: usize = 8;

/// Name of the flat directory holding tag index files.
pub const TAG_DIR: &str = "tags";

const NAME_SEPARATOR: &str = "---";
const SHARD_SEPARATOR: &str = "--";
const METADATA_MARKER: &str = "internal-metadatas---";

/// Hash `key` to the 8-digit lowercase hex adler32 string.
pub fn hash_key(key: &str) -> String {
    format!("{:08x}", adler::adler32_slice(key.as_bytes()))
}

/// Resolves ids and tags to paths under a cache root.
#[derive(Debug, Clone)]
pub struct ShardResolver {
    root: PathBuf,
    prefix: String,
    level: usize,
}

impl ShardResolver {
    /// Create a resolver for `root`.
    ///
    /// `prefix` must be a non-empty `[a-zA-Z0-9_]` word and `level` at most
    /// [`MAX_SHARD_LEVEL`]. A level of 0 keeps every entry directly in `root`.
    pub fn new(root: impl Into<PathBuf>, prefix: &str, level: usize) -> CoreResult<Self> {
        if !is_word(prefix) {
            return Err(CoreError::InvalidPrefix(prefix.to_string()));
        }
        if level > MAX_SHARD_LEVEL {
            return Err(CoreError::InvalidLevel(level));
        }
        Ok(Self {
            root: root.into(),
            prefix: prefix.to_string(),
            level,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// The shard suffix for `key`, or `None` when sharding is disabled.
    pub fn shard_suffix(&self, key: &str) -> Option<String> {
        if self.level == 0 {
            return None;
        }
        let hash = hash_key(key);
        Some(hash[hash.len() - self.level..].to_string())
    }

    /// Directory holding the payload and metadata of `id`.
    pub fn entry_dir(&self, id: &str) -> PathBuf {
        match self.shard_suffix(id) {
            Some(suffix) => self
                .root
                .join(format!("{}{}{}", self.prefix, SHARD_SEPARATOR, suffix)),
            None => self.root.clone(),
        }
    }

    /// `<prefix>---<key>`
    pub fn file_name(&self, key: &str) -> String {
        format!("{}{}{}", self.prefix, NAME_SEPARATOR, key)
    }

    pub fn payload_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(self.file_name(id))
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id)
            .join(self.file_name(&format!("{METADATA_MARKER}{id}")))
    }

    pub fn tag_dir(&self) -> PathBuf {
        self.root.join(TAG_DIR)
    }

    pub fn tag_path(&self, tag: &str) -> PathBuf {
        self.tag_dir().join(self.file_name(tag))
    }

    /// Whether a directory directly under the root is one of our shards.
    pub fn is_shard_dir(&self, name: &str) -> bool {
        let Some(suffix) = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(SHARD_SEPARATOR))
        else {
            return false;
        };
        // "---" also starts with "--"; payload files are not shards.
        !suffix.starts_with('-')
            && !suffix.is_empty()
            && suffix.chars().all(|c| SHARD_ALPHABET.contains(c))
    }

    /// Recover the id from a payload file name.
    ///
    /// Returns `None` for metadata files, temp files and foreign files.
    pub fn id_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let key = self.key_from_file_name(name)?;
        if key.starts_with(METADATA_MARKER) {
            return None;
        }
        Some(key)
    }

    /// Recover the tag from a tag file name.
    pub fn tag_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.key_from_file_name(name)
    }

    fn key_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let key = name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(NAME_SEPARATOR)?;
        (!key.is_empty()).then_some(key)
    }
}
