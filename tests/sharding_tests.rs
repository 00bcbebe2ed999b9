//! Integration tests: hashed directory sharding
//!
//! Shard names carry exactly `level` characters from the hex alphabet, and
//! random ids spread across shards close to uniformly.

mod fixtures;

use std::collections::HashMap;
use std::fs;

use fixtures::options;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tagfile_cache::{FileBackend, Lifetime};
use tagfile_core::{ShardResolver, SHARD_ALPHABET};
use tempfile::TempDir;

fn random_ids(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect()
        })
        .collect()
}

#[test]
fn test_shard_names_have_level_characters() {
    for level in 1..=4 {
        let resolver = ShardResolver::new("/cache", "cm", level).unwrap();
        for id in random_ids(200, level as u64) {
            let suffix = resolver.shard_suffix(&id).unwrap();
            assert_eq!(suffix.len(), level, "suffix {:?} for {}", suffix, id);
            assert!(
                suffix.chars().all(|c| SHARD_ALPHABET.contains(c)),
                "suffix {:?} outside the hash alphabet",
                suffix
            );
        }
    }
}

#[test]
fn test_saved_entries_land_in_shard_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let cache = FileBackend::new(options(&temp_dir)).unwrap();

    let ids = random_ids(50, 7);
    for id in &ids {
        assert!(cache.save(id, b"x", &["t"], Lifetime::Default));
    }

    for entry in fs::read_dir(temp_dir.path()).unwrap() {
        let name = entry.unwrap().file_name().into_string().unwrap();
        if name == "tags" {
            continue;
        }
        let suffix = name.strip_prefix("cm--").expect("shard dir prefix");
        assert_eq!(suffix.len(), 2, "unexpected entry {}", name);
        assert!(suffix.chars().all(|c| SHARD_ALPHABET.contains(c)));
    }
    assert_eq!(cache.ids().len(), ids.len());
}

#[test]
fn test_collision_rate_matches_bucket_count() {
    let level = 2;
    let buckets = SHARD_ALPHABET.len().pow(level as u32) as f64;
    let resolver = ShardResolver::new("/cache", "cm", level).unwrap();
    let ids = random_ids(4096, 42);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in &ids {
        *counts.entry(resolver.shard_suffix(id).unwrap()).or_default() += 1;
    }

    let n = ids.len() as f64;
    let colliding_pairs: f64 = counts
        .values()
        .map(|&c| (c as f64) * (c as f64 - 1.0) / 2.0)
        .sum();
    let rate = colliding_pairs / (n * (n - 1.0) / 2.0);

    assert!(
        rate > 0.5 / buckets && rate < 2.0 / buckets,
        "collision rate {} far from 1/{}",
        rate,
        buckets
    );
    assert!(counts.len() as f64 >= buckets * 0.95, "only {} shards used", counts.len());
}
