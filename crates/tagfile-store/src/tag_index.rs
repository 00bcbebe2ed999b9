//! Per-tag index files.
//!
//! Every tag owns one file under `<root>/tags/` listing the ids tagged with
//! it, one per line. Writers keep it cheap:
//!
//! - **Append** (the common path): open in append mode and write the new
//!   ids. Duplicates and ids of since-replaced entries may accumulate.
//! - **Compacting merge**: occasionally, and only for files past a size
//!   threshold, read the whole set, union it with the new ids and rewrite
//!   the file deduplicated. This keeps file size near the live id count.
//! - **Removal**: always a locked read-modify-write; an empty result deletes
//!   the file, so "no file" and "no ids" mean the same thing.
//!
//! Rewrites truncate and then write the new content with a single write, so
//! lock-free readers see either the old or the new list. With
//! `file_locking` disabled a compaction can lose an append made concurrently
//! on the same tag; appends themselves stay intact.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use rand::Rng;
use tagfile_core::ShardResolver;
use tracing::debug;

use crate::error::StoreResult;
use crate::fs_util::{self, FileModes};
use crate::lock::FileLock;

/// Decides, per append, whether to compact the tag file instead.
pub trait CompactionPolicy: Send + Sync {
    /// `current_size` is the tag file's size in bytes before the write.
    fn should_compact(&self, current_size: u64) -> bool;
}

impl<F> CompactionPolicy for F
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn should_compact(&self, current_size: u64) -> bool {
        self(current_size)
    }
}

/// Compact with probability `1 / one_in` once a file is larger than
/// `min_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomCompaction {
    pub one_in: u32,
    pub min_size: u64,
}

impl Default for RandomCompaction {
    fn default() -> Self {
        Self {
            one_in: 100,
            min_size: 4096,
        }
    }
}

impl RandomCompaction {
    /// Compact on every write to a non-empty file.
    pub fn always() -> Self {
        Self {
            one_in: 1,
            min_size: 0,
        }
    }
}

impl CompactionPolicy for RandomCompaction {
    fn should_compact(&self, current_size: u64) -> bool {
        current_size > self.min_size
            && (self.one_in <= 1 || rand::thread_rng().gen_range(0..self.one_in) == 0)
    }
}

/// Tag index engine.
pub struct TagIndex {
    resolver: ShardResolver,
    modes: FileModes,
    locking: bool,
    policy: Box<dyn CompactionPolicy>,
}

impl std::fmt::Debug for TagIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagIndex")
            .field("tag_dir", &self.resolver.tag_dir())
            .field("locking", &self.locking)
            .finish_non_exhaustive()
    }
}

impl TagIndex {
    /// Create an engine using [`RandomCompaction::default`].
    pub fn new(resolver: ShardResolver, modes: FileModes, locking: bool) -> Self {
        Self {
            resolver,
            modes,
            locking,
            policy: Box::new(RandomCompaction::default()),
        }
    }

    /// Replace the compaction policy.
    pub fn with_policy(mut self, policy: impl CompactionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn locking(&self) -> bool {
        self.locking
    }

    /// Record `ids` under `tag`, creating the tag file if needed.
    pub fn add_ids(&self, tag: &str, ids: &[String]) -> StoreResult<()> {
        let unique = dedup(ids.iter().map(String::as_str));
        if unique.is_empty() {
            return Ok(());
        }
        fs_util::ensure_dir(&self.resolver.tag_dir(), self.modes.dir)?;
        let path = self.resolver.tag_path(tag);

        // Append mode even on create: a racing appender may get in between
        // our create and our lock.
        match fs_util::open_options(self.modes.file)
            .append(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                let lock = self.lock(&file)?;
                if !self.still_linked(&file, &path)? {
                    // A remover saw the empty file and unlinked it.
                    drop(lock);
                    return self.add_ids(tag, ids);
                }
                (&file).write_all(render(&unique).as_bytes())?;
                debug!(tag, ids = unique.len(), "created tag index");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if self.policy.should_compact(size) && self.compact_merge(&path, &unique)? {
            debug!(tag, ids = unique.len(), size, "compacted tag index");
        } else {
            self.append(&path, &unique)?;
            debug!(tag, ids = unique.len(), "appended to tag index");
        }
        Ok(())
    }

    /// Remove `ids` from `tag`, deleting the tag file once it is empty.
    pub fn remove_ids(&self, tag: &str, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = self.resolver.tag_path(tag);
        let Some(file) = self.open_existing(&path)? else {
            return Ok(());
        };
        let _lock = self.lock(&file)?;
        if !self.still_linked(&file, &path)? {
            // Replaced or deleted while we waited; retry on the current file.
            drop(_lock);
            return self.remove_ids(tag, ids);
        }

        let removed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let content = read_all(&file)?;
        let remaining = dedup(parse(&content).filter(|id| !removed.contains(id)));

        if remaining.is_empty() {
            fs_util::remove_if_exists(&path)?;
            debug!(tag, "deleted emptied tag index");
        } else {
            rewrite(&file, &render(&remaining))?;
            debug!(tag, remaining = remaining.len(), "rewrote tag index");
        }
        Ok(())
    }

    /// Ids currently recorded under `tag`, deduplicated, in first-seen order.
    ///
    /// Reads without locking; the result may already be stale.
    pub fn read_ids(&self, tag: &str) -> StoreResult<Vec<String>> {
        let content = match fs::read_to_string(self.resolver.tag_path(tag)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(dedup(parse(&content))
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Delete the tag file outright.
    pub fn delete_tag(&self, tag: &str) -> StoreResult<()> {
        fs_util::remove_if_exists(&self.resolver.tag_path(tag))?;
        Ok(())
    }

    /// Every tag that currently has an index file, sorted.
    pub fn list_tags(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(self.resolver.tag_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tags = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(tag) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.resolver.tag_from_file_name(name))
            {
                tags.push(tag.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn append(&self, path: &Path, ids: &[&str]) -> StoreResult<()> {
        let file = fs_util::open_options(self.modes.file)
            .append(true)
            .create(true)
            .open(path)?;
        let _lock = self.lock(&file)?;
        if !self.still_linked(&file, path)? {
            drop(_lock);
            return self.append(path, ids);
        }
        (&file).write_all(render(ids).as_bytes())?;
        Ok(())
    }

    /// Union `ids` into the file under one lock. Returns `false` if the file
    /// vanished, leaving the caller to append.
    fn compact_merge(&self, path: &Path, ids: &[&str]) -> StoreResult<bool> {
        let Some(file) = self.open_existing(path)? else {
            return Ok(false);
        };
        let _lock = self.lock(&file)?;
        if !self.still_linked(&file, path)? {
            return Ok(false);
        }

        let content = read_all(&file)?;
        let merged = dedup(parse(&content).chain(ids.iter().copied()));
        rewrite(&file, &render(&merged))?;
        Ok(true)
    }

    fn open_existing(&self, path: &Path) -> io::Result<Option<File>> {
        match fs::OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn lock<'f>(&self, file: &'f File) -> io::Result<Option<FileLock<'f>>> {
        if self.locking {
            FileLock::exclusive(file).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Whether `file` is still the one at `path`. A remover may unlink the
    /// file while we wait for its lock; writing then would be lost.
    #[cfg(unix)]
    fn still_linked(&self, file: &File, path: &Path) -> io::Result<bool> {
        use std::os::unix::fs::MetadataExt;

        if !self.locking {
            return Ok(true);
        }
        let held = file.metadata()?;
        match fs::metadata(path) {
            Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[cfg(not(unix))]
    fn still_linked(&self, _file: &File, _path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

fn parse(content: &str) -> impl Iterator<Item = &str> {
    content.split('\n').filter(|id| !id.is_empty())
}

fn dedup<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn render(ids: &[&str]) -> String {
    let mut out = ids.join("\n");
    out.push('\n');
    out
}

fn read_all(mut file: &File) -> io::Result<String> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Truncate and write `content` in one call.
fn rewrite(mut file: &File, content: &str) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(content.as_bytes())
}
