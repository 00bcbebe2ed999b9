//! The cache backend.
//!
//! [`FileBackend`] ties the entry store, the tag index, the query engine and
//! the sweeper together behind the usual cache operations. Internally every
//! operation is a `StoreResult`; at this boundary failures are logged and
//! collapsed to `false`/`None`, since callers treat a failed cache call as
//! "not cached, recompute".

use std::collections::BTreeSet;

use serde::Serialize;
use tagfile_core::{validate_key, KeyKind, Metadata, ReadControl};
use tagfile_store::{
    CompactionPolicy, EntryStore, FileEntryStore, StoreError, StoreResult, TagIndex,
};
use tracing::{debug, warn};

use crate::config::{CacheOptions, ConfigError};
use crate::query::TagQuery;
use crate::sweep::{recorded_tags, CleanMode, SweepReport, Sweeper};

/// How long a saved entry stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// The configured `default_lifetime`
    #[default]
    Default,
    /// Never expires
    Never,
    /// Expires this many seconds after the save
    Seconds(u64),
}

/// What this backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub automatic_cleaning: bool,
    pub tags: bool,
    pub expired_read: bool,
    pub priority: bool,
    pub infinite_lifetime: bool,
    pub get_list: bool,
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// File-system cache backend with per-tag index files.
pub struct FileBackend {
    options: CacheOptions,
    store: Box<dyn EntryStore>,
    index: TagIndex,
    clock: fn() -> i64,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("options", &self.options)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl FileBackend {
    /// Create a backend for `options`. Nothing is created on disk until the
    /// first save.
    pub fn new(options: CacheOptions) -> Result<Self, ConfigError> {
        let resolver = options.resolver()?;
        let modes = options.modes();
        let store = FileEntryStore::new(resolver.clone(), modes, options.metadata_cache_size);
        let index = TagIndex::new(resolver, modes, options.file_locking);

        Ok(Self {
            options,
            store: Box::new(store),
            index,
            clock: system_clock,
        })
    }

    /// Replace the entry store.
    pub fn with_store(mut self, store: impl EntryStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Replace the tag file compaction policy.
    pub fn with_compaction(mut self, policy: impl CompactionPolicy + 'static) -> Self {
        self.index = self.index.with_policy(policy);
        self
    }

    /// Replace the clock (unix seconds) used for expiry.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn store(&self) -> &dyn EntryStore {
        self.store.as_ref()
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.index
    }

    fn read_control(&self) -> Option<ReadControl> {
        self.options.read_control()
    }

    fn query(&self) -> TagQuery<'_> {
        TagQuery::new(&self.index, self.store.as_ref())
    }

    /// Store `payload` under `id`, tagged with exactly `tags`.
    ///
    /// Tags the id carried from an earlier save but not in `tags` are
    /// dropped from their index files.
    pub fn save(&self, id: &str, payload: &[u8], tags: &[&str], lifetime: Lifetime) -> bool {
        outcome("save", id, self.try_save(id, payload, tags, lifetime)).is_some()
    }

    /// Read the payload for `id`.
    ///
    /// Expired entries read as absent unless `skip_validity` is set. With
    /// read control on, a payload whose digest no longer matches is removed
    /// and reads as absent.
    pub fn load(&self, id: &str, skip_validity: bool) -> Option<Vec<u8>> {
        outcome("load", id, self.try_load(id, skip_validity)).flatten()
    }

    /// Remove `id` and its tag references. Removing a missing id succeeds.
    pub fn remove(&self, id: &str) -> bool {
        outcome("remove", id, self.try_remove(id)).is_some()
    }

    /// Remove the entries selected by `mode`. Returns `false` if any step failed.
    pub fn clean(&self, mode: CleanMode, tags: &[&str]) -> bool {
        self.sweep(mode, tags).is_success()
    }

    /// Like [`FileBackend::clean`], returning the full report.
    pub fn sweep(&self, mode: CleanMode, tags: &[&str]) -> SweepReport {
        if let Err(e) = validate_tags(tags) {
            warn!(mode = %mode, error = %e, "sweep rejected");
            return SweepReport {
                errors: vec![e.to_string()],
                ..SweepReport::default()
            };
        }
        Sweeper::new(&self.index, self.store.as_ref()).run(mode, tags, (self.clock)())
    }

    /// Every tag with an index file.
    pub fn tags(&self) -> BTreeSet<String> {
        outcome("tags", "", self.index.list_tags())
            .map(|tags| tags.into_iter().collect())
            .unwrap_or_default()
    }

    /// Every stored id, expired or not.
    pub fn ids(&self) -> BTreeSet<String> {
        outcome("ids", "", self.store.list_ids())
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default()
    }

    /// Ids tagged with all of `tags`.
    pub fn ids_matching_tags(&self, tags: &[&str]) -> BTreeSet<String> {
        self.run_query(tags, |q| q.ids_matching_all(tags))
    }

    /// Live ids tagged with none of `tags`.
    pub fn ids_not_matching_tags(&self, tags: &[&str]) -> BTreeSet<String> {
        self.run_query(tags, |q| q.ids_not_matching_any(tags))
    }

    /// Ids tagged with at least one of `tags`.
    pub fn ids_matching_any_tags(&self, tags: &[&str]) -> BTreeSet<String> {
        self.run_query(tags, |q| q.ids_matching_any(tags))
    }

    /// Metadata for `id`, expired or not.
    pub fn metadata(&self, id: &str) -> Option<Metadata> {
        outcome("metadata", id, self.try_metadata(id)).flatten()
    }

    /// The last write time of `id` if it exists and is fresh.
    pub fn test(&self, id: &str) -> Option<i64> {
        let now = (self.clock)();
        self.metadata(id)
            .filter(|md| !md.is_expired(now))
            .map(|md| md.mtime)
    }

    /// Push the expiry of a fresh entry `extra_lifetime` seconds further out.
    pub fn touch(&self, id: &str, extra_lifetime: u64) -> bool {
        outcome("touch", id, self.try_touch(id, extra_lifetime)).unwrap_or(false)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            automatic_cleaning: true,
            tags: true,
            expired_read: true,
            priority: false,
            infinite_lifetime: true,
            get_list: true,
        }
    }

    fn try_save(
        &self,
        id: &str,
        payload: &[u8],
        tags: &[&str],
        lifetime: Lifetime,
    ) -> StoreResult<()> {
        validate_key(KeyKind::Id, id)?;
        validate_tags(tags)?;

        let now = (self.clock)();
        let expire = match lifetime {
            Lifetime::Default if self.options.default_lifetime == 0 => None,
            Lifetime::Default => Some(now.saturating_add(seconds(self.options.default_lifetime))),
            Lifetime::Never => None,
            Lifetime::Seconds(n) => Some(now.saturating_add(seconds(n))),
        };

        let mut new_tags: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !new_tags.iter().any(|t| t == tag) {
                new_tags.push(tag.to_string());
            }
        }

        let previous = self.readable_metadata(id)?;

        self.store.put(id, payload)?;
        let metadata = Metadata {
            expire,
            tags: new_tags,
            mtime: now,
            hash: self.read_control().map(|rc| rc.digest(payload)),
        };
        self.store.write_metadata(id, &metadata)?;

        let key = [id.to_string()];
        let added = metadata.tags.iter().map(|tag| self.index.add_ids(tag, &key));
        let stale = previous
            .iter()
            .flat_map(|md| md.tags.iter())
            .filter(|tag| !metadata.tags.contains(tag))
            .map(|tag| self.index.remove_ids(tag, &key));

        debug!(id = %id, tags = metadata.tags.len(), "saved entry");
        all_ok(added.chain(stale))
    }

    fn try_load(&self, id: &str, skip_validity: bool) -> StoreResult<Option<Vec<u8>>> {
        validate_key(KeyKind::Id, id)?;

        let Some(metadata) = self.readable_metadata(id)? else {
            return Ok(None);
        };
        if !skip_validity && metadata.is_expired((self.clock)()) {
            return Ok(None);
        }
        let Some(payload) = self.store.get(id)? else {
            return Ok(None);
        };

        if let (Some(control), Some(expected)) = (self.read_control(), &metadata.hash) {
            if !control.verify(&payload, expected) {
                warn!(id = %id, read_control = %control, "stored and computed digests differ, removing entry");
                self.try_remove(id)?;
                return Ok(None);
            }
        }
        Ok(Some(payload))
    }

    fn try_remove(&self, id: &str) -> StoreResult<()> {
        validate_key(KeyKind::Id, id)?;

        let recorded = recorded_tags(self.store.as_ref(), &self.index, id)?;
        let deleted = [self.store.delete(id), self.store.delete_metadata(id)];

        let key = [id.to_string()];
        let pruned = recorded.iter().map(|tag| self.index.remove_ids(tag, &key));

        all_ok(deleted.into_iter().chain(pruned))
    }

    fn try_metadata(&self, id: &str) -> StoreResult<Option<Metadata>> {
        validate_key(KeyKind::Id, id)?;
        self.readable_metadata(id)
    }

    fn try_touch(&self, id: &str, extra_lifetime: u64) -> StoreResult<bool> {
        validate_key(KeyKind::Id, id)?;

        let now = (self.clock)();
        let Some(mut metadata) = self.readable_metadata(id)? else {
            return Ok(false);
        };
        if metadata.is_expired(now) {
            return Ok(false);
        }

        metadata.expire = metadata
            .expire
            .map(|expire| expire.saturating_add(seconds(extra_lifetime)));
        metadata.mtime = now;
        self.store.write_metadata(id, &metadata)?;
        Ok(true)
    }

    /// Read metadata, removing the entry if the record cannot be decoded.
    fn readable_metadata(&self, id: &str) -> StoreResult<Option<Metadata>> {
        match self.store.read_metadata(id) {
            Err(StoreError::Core(e)) => {
                warn!(id = %id, error = %e, "undecodable metadata, removing entry");
                self.try_remove(id)?;
                Ok(None)
            }
            other => other,
        }
    }

    fn run_query<F>(&self, tags: &[&str], query: F) -> BTreeSet<String>
    where
        F: FnOnce(&TagQuery<'_>) -> StoreResult<BTreeSet<String>>,
    {
        let result = validate_tags(tags)
            .map_err(StoreError::from)
            .and_then(|()| query(&self.query()));
        outcome("query", "", result).unwrap_or_default()
    }
}

fn validate_tags(tags: &[&str]) -> tagfile_core::CoreResult<()> {
    tags.iter().try_for_each(|tag| validate_key(KeyKind::Tag, tag))
}

fn seconds(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Run every step and keep the first error.
fn all_ok(results: impl Iterator<Item = StoreResult<()>>) -> StoreResult<()> {
    results.fold(Ok(()), |acc, result| acc.and(result))
}

fn outcome<T>(op: &'static str, id: &str, result: StoreResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(op, id = %id, error = %e, "cache operation failed");
            None
        }
    }
}
