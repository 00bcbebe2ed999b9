//! tagfile-core
//!
//! Leaf types shared by the store and the backend:
//! - Hashed directory sharding and file naming for entries and tags
//! - The per-entry metadata record and its on-disk codec
//! - Read-control digests used to detect corrupted payloads
//! - Id/tag validation

pub mod error;
pub mod key;
pub mod metadata;
pub mod read_control;
pub mod shard;

pub use error::{CoreError, CoreResult};
pub use key::{validate_key, KeyKind, RESERVED_PREFIX};
pub use metadata::Metadata;
pub use read_control::ReadControl;
pub use shard::{ShardResolver, MAX_SHARD_LEVEL, SHARD_ALPHABET};
