//! tagfile-cache - file-system cache backend with per-tag index files
//!
//! Entries live as payload + metadata files in hashed shard directories.
//! Every tag keeps its own index file listing the ids tagged with it, so
//! invalidating by tag touches only the entries carrying that tag instead of
//! scanning the whole cache.

pub mod backend;
pub mod config;
pub mod logging;
pub mod query;
pub mod sweep;

pub use backend::{Capabilities, FileBackend, Lifetime};
pub use config::{CacheOptions, ConfigError};
pub use query::TagQuery;
pub use sweep::{CleanMode, SweepReport, Sweeper, UnknownCleanMode};

pub use tagfile_core::{Metadata, ReadControl};
pub use tagfile_store::{CompactionPolicy, EntryStore, RandomCompaction};
