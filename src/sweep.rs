//! Bulk invalidation.
//!
//! [`Sweeper`] removes every entry selected by a [`CleanMode`] and then brings
//! the tag indices back in line: tag files that can no longer hold any live
//! id are deleted, the rest have the removed ids pruned. Failures are
//! collected in the [`SweepReport`] rather than aborting the sweep, so a
//! partial failure still leaves no tag pointing at an entry this sweep
//! deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tagfile_store::{EntryStore, StoreError, StoreResult, TagIndex};
use tracing::{debug, info, warn};

use crate::query::TagQuery;

/// Which entries a sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CleanMode {
    /// Every entry and every tag
    All,
    /// Entries whose lifetime has passed
    Old,
    /// Entries carrying all of the given tags
    MatchingTag,
    /// Entries carrying none of the given tags
    NotMatchingTag,
    /// Entries carrying at least one of the given tags
    MatchingAnyTag,
}

impl CleanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanMode::All => "all",
            CleanMode::Old => "old",
            CleanMode::MatchingTag => "matchingTag",
            CleanMode::NotMatchingTag => "notMatchingTag",
            CleanMode::MatchingAnyTag => "matchingAnyTag",
        }
    }
}

impl fmt::Display for CleanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown clean mode: {0}")]
pub struct UnknownCleanMode(pub String);

impl FromStr for CleanMode {
    type Err = UnknownCleanMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CleanMode::All),
            "old" => Ok(CleanMode::Old),
            "matchingTag" | "matching_tag" => Ok(CleanMode::MatchingTag),
            "notMatchingTag" | "not_matching_tag" => Ok(CleanMode::NotMatchingTag),
            "matchingAnyTag" | "matching_any_tag" => Ok(CleanMode::MatchingAnyTag),
            other => Err(UnknownCleanMode(other.to_string())),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Ids whose entries were removed
    pub removed: Vec<String>,
    /// Tag files deleted outright
    pub tags_deleted: usize,
    /// Tag files rewritten to drop removed ids
    pub tags_pruned: usize,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record<T>(&mut self, context: &str, result: StoreResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "{}", context);
                self.errors.push(format!("{}: {}", context, e));
                None
            }
        }
    }
}

/// Drives [`CleanMode`] sweeps over an index and a store.
pub struct Sweeper<'a> {
    index: &'a TagIndex,
    store: &'a dyn EntryStore,
}

impl<'a> Sweeper<'a> {
    pub fn new(index: &'a TagIndex, store: &'a dyn EntryStore) -> Self {
        Self { index, store }
    }

    /// Run one sweep. `now` is the expiry reference for [`CleanMode::Old`];
    /// `tags` is ignored by `All` and `Old`.
    pub fn run(&self, mode: CleanMode, tags: &[&str], now: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let query = TagQuery::new(self.index, self.store);

        let targets = match mode {
            CleanMode::Old => {
                self.sweep_old(now, &mut report);
                None
            }
            CleanMode::All => Some(
                self.store
                    .list_ids()
                    .map(|ids| ids.into_iter().collect::<BTreeSet<_>>()),
            ),
            CleanMode::MatchingTag => Some(query.ids_matching_all(tags)),
            CleanMode::NotMatchingTag => Some(query.ids_not_matching_any(tags)),
            CleanMode::MatchingAnyTag => Some(query.ids_matching_any(tags)),
        };
        if let Some(targets) = targets {
            if let Some(targets) = report.record("resolving sweep targets failed", targets) {
                self.sweep_targets(mode, tags, targets, &mut report);
            }
        }

        info!(
            mode = %mode,
            removed = report.removed.len(),
            tags_deleted = report.tags_deleted,
            tags_pruned = report.tags_pruned,
            errors = report.errors.len(),
            "sweep finished"
        );
        report
    }

    fn sweep_old(&self, now: i64, report: &mut SweepReport) {
        let Some(expired) = report.record("expiry scan failed", self.store.sweep_expired(now))
        else {
            return;
        };

        let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in expired {
            let tags = match entry.tags {
                Some(tags) => tags,
                None => report
                    .record("listing tags failed", self.index.list_tags())
                    .unwrap_or_default(),
            };
            for tag in tags {
                by_tag.entry(tag).or_default().push(entry.id.clone());
            }
            report.removed.push(entry.id);
        }
        self.prune(by_tag, report);
    }

    fn sweep_targets(
        &self,
        mode: CleanMode,
        tags: &[&str],
        targets: BTreeSet<String>,
        report: &mut SweepReport,
    ) {
        // Every target whose files are gone, including stale references
        // whose payload had already disappeared.
        let mut gone: Vec<String> = Vec::new();
        let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for id in targets {
            let existed = self.store.contains(&id);
            let recorded = recorded_tags(self.store, self.index, &id);
            let Some(recorded) = report.record("reading metadata failed", recorded) else {
                continue;
            };

            if report.record("deleting payload failed", self.store.delete(&id)).is_none() {
                continue;
            }
            report.record("deleting metadata failed", self.store.delete_metadata(&id));

            for tag in recorded {
                by_tag.entry(tag).or_default().push(id.clone());
            }
            if existed {
                debug!(id = %id, "removed entry");
                report.removed.push(id.clone());
            }
            gone.push(id);
        }

        let covered: BTreeSet<String> = match mode {
            CleanMode::All => {
                let all = report
                    .record("listing tags failed", self.index.list_tags())
                    .unwrap_or_default();
                for tag in &all {
                    self.delete_tag(tag, report);
                }
                all.into_iter().collect()
            }
            CleanMode::MatchingAnyTag => {
                for tag in tags {
                    self.delete_tag(tag, report);
                }
                tags.iter().map(|t| t.to_string()).collect()
            }
            _ => {
                if !gone.is_empty() {
                    for tag in tags {
                        let pruned = self.index.remove_ids(tag, &gone);
                        if report.record("pruning tag failed", pruned).is_some() {
                            report.tags_pruned += 1;
                        }
                    }
                }
                tags.iter().map(|t| t.to_string()).collect()
            }
        };

        by_tag.retain(|tag, _| !covered.contains(tag));
        self.prune(by_tag, report);
    }

    fn delete_tag(&self, tag: &str, report: &mut SweepReport) {
        if report
            .record("deleting tag failed", self.index.delete_tag(tag))
            .is_some()
        {
            report.tags_deleted += 1;
        }
    }

    fn prune(&self, by_tag: BTreeMap<String, Vec<String>>, report: &mut SweepReport) {
        for (tag, ids) in by_tag {
            let pruned = self.index.remove_ids(&tag, &ids);
            if report.record("pruning tag failed", pruned).is_some() {
                report.tags_pruned += 1;
            }
        }
    }
}

/// Tags `id` is recorded under. When its metadata cannot be decoded any tag
/// may still reference it, so every tag is returned.
pub(crate) fn recorded_tags(
    store: &dyn EntryStore,
    index: &TagIndex,
    id: &str,
) -> StoreResult<Vec<String>> {
    match store.read_metadata(id) {
        Ok(metadata) => Ok(metadata.map(|md| md.tags).unwrap_or_default()),
        Err(StoreError::Core(e)) => {
            warn!(id = %id, error = %e, "undecodable metadata, pruning id from every tag");
            index.list_tags()
        }
        Err(e) => Err(e),
    }
}
