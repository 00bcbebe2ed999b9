//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tagfile_cache::{CacheOptions, FileBackend};
use tempfile::TempDir;

/// Options rooted at `dir` with everything else at its default.
pub fn options(dir: &TempDir) -> CacheOptions {
    CacheOptions::new(dir.path())
}

/// A backend on `dir` whose clock reads `now`.
pub fn backend_at(dir: &TempDir, now: fn() -> i64) -> FileBackend {
    FileBackend::new(options(dir)).unwrap().with_clock(now)
}

pub fn backend(dir: &TempDir) -> FileBackend {
    FileBackend::new(options(dir)).unwrap()
}

/// Raw lines of a tag file, duplicates included. Missing file reads as empty.
pub fn tag_file_lines(root: &Path, tag: &str) -> Vec<String> {
    match fs::read_to_string(root.join("tags").join(format!("cm---{}", tag))) {
        Ok(content) => content
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Build a sorted id set from literals.
pub fn set(ids: &[&str]) -> std::collections::BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}
