//! Payload and metadata storage.
//!
//! [`EntryStore`] is the capability the tag engine and sweeps are built on:
//! durable put/get/delete of one payload blob per id plus its metadata
//! record. [`FileEntryStore`] keeps both as files in hashed shard
//! directories, written with temp-file + rename so a reader never sees a
//! partial blob.

use tagfile_core::{Metadata, ShardResolver};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::fs_util::{self, FileModes};
use crate::metadata_cache::MetadataCache;

/// An entry removed by an expiry sweep, with the tags it was recorded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredEntry {
    pub id: String,
    /// `None` when the metadata could not be decoded.
    pub tags: Option<Vec<String>>,
}

/// Storage for payloads and their metadata, one record per id.
pub trait EntryStore: Send + Sync {
    /// Durably store `payload` for `id`, replacing any previous payload.
    fn put(&self, id: &str, payload: &[u8]) -> StoreResult<()>;

    /// Read the payload for `id`, if present.
    fn get(&self, id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Whether a payload exists for `id`.
    fn contains(&self, id: &str) -> bool;

    /// Delete the payload for `id`. A missing payload is success.
    fn delete(&self, id: &str) -> StoreResult<()>;

    fn read_metadata(&self, id: &str) -> StoreResult<Option<Metadata>>;

    fn write_metadata(&self, id: &str, metadata: &Metadata) -> StoreResult<()>;

    /// Delete the metadata for `id`. Missing metadata is success.
    fn delete_metadata(&self, id: &str) -> StoreResult<()>;

    /// Snapshot of every stored id. Not linearizable with concurrent writers.
    fn list_ids(&self) -> StoreResult<Vec<String>>;

    /// Remove every entry whose expiry is before `now`.
    fn sweep_expired(&self, now: i64) -> StoreResult<Vec<ExpiredEntry>>;
}

/// File-backed [`EntryStore`].
#[derive(Debug)]
pub struct FileEntryStore {
    resolver: ShardResolver,
    modes: FileModes,
    metadata_cache: MetadataCache,
}

impl FileEntryStore {
    /// Create a store rooted at the resolver's root.
    ///
    /// Directories are created lazily on first write.
    pub fn new(resolver: ShardResolver, modes: FileModes, metadata_cache_size: usize) -> Self {
        Self {
            resolver,
            modes,
            metadata_cache: MetadataCache::new(metadata_cache_size),
        }
    }

    pub fn resolver(&self) -> &ShardResolver {
        &self.resolver
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata_cache
    }

    fn ensure_entry_dir(&self, id: &str) -> StoreResult<()> {
        fs_util::ensure_dir(&self.resolver.entry_dir(id), self.modes.dir)?;
        Ok(())
    }

    fn read_metadata_file(&self, id: &str) -> StoreResult<Option<Metadata>> {
        let Some(bytes) = fs_util::read_if_exists(&self.resolver.metadata_path(id))? else {
            return Ok(None);
        };
        Ok(Some(Metadata::decode(&bytes)?))
    }
}

impl EntryStore for FileEntryStore {
    fn put(&self, id: &str, payload: &[u8]) -> StoreResult<()> {
        self.ensure_entry_dir(id)?;
        fs_util::write_atomic(&self.resolver.payload_path(id), payload, self.modes.file)?;
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(fs_util::read_if_exists(&self.resolver.payload_path(id))?)
    }

    fn contains(&self, id: &str) -> bool {
        self.resolver.payload_path(id).is_file()
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        fs_util::remove_if_exists(&self.resolver.payload_path(id))?;
        Ok(())
    }

    fn read_metadata(&self, id: &str) -> StoreResult<Option<Metadata>> {
        if let Some(cached) = self.metadata_cache.get(id) {
            return Ok(Some(cached));
        }
        let metadata = self.read_metadata_file(id)?;
        if let Some(md) = &metadata {
            self.metadata_cache.insert(id, md.clone());
        }
        Ok(metadata)
    }

    fn write_metadata(&self, id: &str, metadata: &Metadata) -> StoreResult<()> {
        self.ensure_entry_dir(id)?;
        let bytes = metadata.encode()?;
        // Drop the cached copy first so a failed write cannot leave it ahead of disk.
        self.metadata_cache.invalidate(id);
        fs_util::write_atomic(&self.resolver.metadata_path(id), &bytes, self.modes.file)?;
        self.metadata_cache.insert(id, metadata.clone());
        Ok(())
    }

    fn delete_metadata(&self, id: &str) -> StoreResult<()> {
        self.metadata_cache.invalidate(id);
        fs_util::remove_if_exists(&self.resolver.metadata_path(id))?;
        Ok(())
    }

    fn list_ids(&self) -> StoreResult<Vec<String>> {
        let root = self.resolver.root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                // Only descend into our shard directories; skips tags/.
                entry.depth() != 1
                    || !entry.file_type().is_dir()
                    || entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| self.resolver.is_shard_dir(name))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                // A shard removed mid-walk is not an error.
                Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => {
                    continue
                }
                Err(e) => return Err(StoreError::Walk(e)),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.resolver.id_from_file_name(name))
            {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn sweep_expired(&self, now: i64) -> StoreResult<Vec<ExpiredEntry>> {
        let mut expired = Vec::new();

        for id in self.list_ids()? {
            // Bypass the in-process cache: another process may have touched it.
            let tags = match self.read_metadata_file(&id) {
                Ok(Some(md)) if !md.is_expired(now) => continue,
                Ok(Some(md)) => Some(md.tags),
                // Orphaned or undecodable metadata can never be served again.
                Ok(None) => Some(Vec::new()),
                Err(StoreError::Core(_)) => None,
                Err(e) => return Err(e),
            };

            self.delete(&id)?;
            self.delete_metadata(&id)?;
            debug!(id = %id, "removed expired entry");
            expired.push(ExpiredEntry { id, tags });
        }

        Ok(expired)
    }
}
