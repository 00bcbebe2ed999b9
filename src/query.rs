//! Set algebra over tag indices.
//!
//! Every query is a point-in-time snapshot: tags are read one after another
//! without a lock, so a writer racing the query may or may not be seen.

use std::collections::BTreeSet;

use tagfile_store::{EntryStore, StoreResult, TagIndex};

/// AND/OR/NOT queries over a [`TagIndex`] and the live ids of an [`EntryStore`].
pub struct TagQuery<'a> {
    index: &'a TagIndex,
    store: &'a dyn EntryStore,
}

impl<'a> TagQuery<'a> {
    pub fn new(index: &'a TagIndex, store: &'a dyn EntryStore) -> Self {
        Self { index, store }
    }

    pub fn ids_by_tag(&self, tag: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self.index.read_ids(tag)?.into_iter().collect())
    }

    /// Ids carrying every one of `tags`. Empty input yields an empty set.
    pub fn ids_matching_all(&self, tags: &[&str]) -> StoreResult<BTreeSet<String>> {
        let Some((first, rest)) = tags.split_first() else {
            return Ok(BTreeSet::new());
        };

        let mut result = self.ids_by_tag(first)?;
        for tag in rest {
            if result.is_empty() {
                break;
            }
            let ids = self.ids_by_tag(tag)?;
            result.retain(|id| ids.contains(id));
        }
        Ok(result)
    }

    /// Ids carrying at least one of `tags`.
    pub fn ids_matching_any(&self, tags: &[&str]) -> StoreResult<BTreeSet<String>> {
        let mut result = BTreeSet::new();
        for tag in tags {
            result.extend(self.index.read_ids(tag)?);
        }
        Ok(result)
    }

    /// Live ids carrying none of `tags`. Empty input yields every live id.
    pub fn ids_not_matching_any(&self, tags: &[&str]) -> StoreResult<BTreeSet<String>> {
        let mut result: BTreeSet<String> = self.store.list_ids()?.into_iter().collect();
        for tag in tags {
            if result.is_empty() {
                break;
            }
            for id in self.index.read_ids(tag)? {
                result.remove(&id);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagfile_core::ShardResolver;
    use tagfile_store::{FileEntryStore, FileModes};
    use tempfile::TempDir;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    struct Fixture {
        _temp_dir: TempDir,
        index: TagIndex,
        store: FileEntryStore,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let resolver = ShardResolver::new(temp_dir.path(), "cm", 2).unwrap();
        let store = FileEntryStore::new(resolver.clone(), FileModes::default(), 10);
        let index = TagIndex::new(resolver, FileModes::default(), true);

        for id in ["1", "2", "3", "4", "5", "6"] {
            store.put(id, b"x").unwrap();
        }
        index.add_ids("x", &owned(&["1", "2", "3"])).unwrap();
        index.add_ids("y", &owned(&["3", "4", "5"])).unwrap();

        Fixture { _temp_dir: temp_dir, index, store }
    }

    #[test]
    fn test_matching_all() {
        let f = fixture();
        let query = TagQuery::new(&f.index, &f.store);

        assert_eq!(query.ids_matching_all(&["x", "y"]).unwrap(), ids(&["3"]));
        assert_eq!(query.ids_matching_all(&["x"]).unwrap(), ids(&["1", "2", "3"]));
        assert!(query.ids_matching_all(&["x", "missing", "y"]).unwrap().is_empty());
        assert!(query.ids_matching_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_matching_any() {
        let f = fixture();
        let query = TagQuery::new(&f.index, &f.store);

        assert_eq!(
            query.ids_matching_any(&["x", "y"]).unwrap(),
            ids(&["1", "2", "3", "4", "5"])
        );
        assert_eq!(query.ids_matching_any(&["missing", "y"]).unwrap(), ids(&["3", "4", "5"]));
        assert!(query.ids_matching_any(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_not_matching_any() {
        let f = fixture();
        let query = TagQuery::new(&f.index, &f.store);

        assert_eq!(query.ids_not_matching_any(&["x"]).unwrap(), ids(&["4", "5", "6"]));
        assert_eq!(query.ids_not_matching_any(&["x", "y"]).unwrap(), ids(&["6"]));
        assert_eq!(
            query.ids_not_matching_any(&[]).unwrap(),
            ids(&["1", "2", "3", "4", "5", "6"])
        );
    }
}
