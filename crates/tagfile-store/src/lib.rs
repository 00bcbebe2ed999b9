//! tagfile-store
//!
//! Storage layer for tagfile-cache:
//! - [`EntryStore`] / [`FileEntryStore`]: payload and metadata files in
//!   hashed shard directories
//! - [`TagIndex`]: one append-mostly index file per tag, compacted
//!   opportunistically and rewritten under an exclusive lock on removal
//! - [`MetadataCache`]: bounded in-process metadata cache
//!
//! ## Locking
//!
//! Tag files are locked with advisory `flock(2)` around every write when
//! locking is enabled. Reads never lock. Payload and metadata files need no
//! lock: they are replaced atomically by rename.

pub mod entry_store;
pub mod error;
pub mod fs_util;
pub mod lock;
pub mod metadata_cache;
pub mod tag_index;

pub use entry_store::{EntryStore, ExpiredEntry, FileEntryStore};
pub use error::{StoreError, StoreResult};
pub use fs_util::FileModes;
pub use lock::FileLock;
pub use metadata_cache::MetadataCache;
pub use tag_index::{CompactionPolicy, RandomCompaction, TagIndex};
