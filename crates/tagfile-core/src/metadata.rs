//! Per-entry metadata record and its on-disk codec.
//!
//! On disk the tag list is joined with `'\n'` into a single string field.
//! Most metadata reads never look at the tags, and tag counts are small, so a
//! join/split is cheaper than decoding a nested list on every read. Records
//! written with a list-shaped `tags` field are still accepted.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

const TAG_DELIMITER: &str = "\n";

/// Metadata stored alongside every cached payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unix timestamp after which the entry is stale (`None` = never)
    pub expire: Option<i64>,
    /// Tags the entry was saved with
    pub tags: Vec<String>,
    /// Unix timestamp of the last write or touch
    pub mtime: i64,
    /// Read-control digest of the payload, when read control is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Tags field as it appears on disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredTags {
    Joined(String),
    List(Vec<String>),
}

impl StoredTags {
    fn into_tags(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split(TAG_DELIMITER)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Self::List(list) => list,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    #[serde(default)]
    expire: Option<i64>,
    tags: StoredTags,
    mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

impl Metadata {
    /// Whether the entry is stale at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expire, Some(expire) if now > expire)
    }

    /// Encode to the on-disk record.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let stored = StoredMetadata {
            expire: self.expire,
            tags: StoredTags::Joined(self.tags.join(TAG_DELIMITER)),
            mtime: self.mtime,
            hash: self.hash.clone(),
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    /// Decode an on-disk record.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let stored: StoredMetadata = serde_json::from_slice(bytes)?;
        Ok(Self {
            expire: stored.expire,
            tags: stored.tags.into_tags(),
            mtime: stored.mtime,
            hash: stored.hash,
        })
    }
}
