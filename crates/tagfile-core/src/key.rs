//! Id and tag validation.
//!
//! Ids and tags end up verbatim in file names, so they are restricted to
//! `[a-zA-Z0-9_]+`. Keys starting with `internal-` are reserved for the
//! store's own bookkeeping files.

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{CoreError, CoreResult};

/// Prefix reserved for bookkeeping file names.
pub const RESERVED_PREFIX: &str = "internal-";

/// What a validated key names, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Id,
    Tag,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "cache id"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("static key pattern"))
}

pub(crate) fn is_word(s: &str) -> bool {
    key_pattern().is_match(s)
}

/// Check that `key` is usable as an id or tag.
pub fn validate_key(kind: KeyKind, key: &str) -> CoreResult<()> {
    let invalid = |reason| CoreError::InvalidKey {
        kind,
        key: key.to_string(),
        reason,
    };

    if key.starts_with(RESERVED_PREFIX) {
        return Err(invalid("'internal-' prefix is reserved"));
    }
    if !is_word(key) {
        return Err(invalid("only [a-zA-Z0-9_] characters are allowed"));
    }
    Ok(())
}
