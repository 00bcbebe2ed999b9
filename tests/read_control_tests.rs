//! Integration tests: read control
//!
//! A payload corrupted behind the cache's back must never be served when
//! read control is on; the entry is removed and its tags pruned instead.

mod fixtures;

use std::fs;
use std::path::PathBuf;

use fixtures::{backend, options, set};
use tagfile_cache::{FileBackend, Lifetime, ReadControl};
use tempfile::TempDir;

fn checked_backend(temp_dir: &TempDir, control: ReadControl) -> FileBackend {
    let mut options = options(temp_dir);
    options.read_control = true;
    options.read_control_type = control;
    FileBackend::new(options).unwrap()
}

fn payload_path(temp_dir: &TempDir, id: &str) -> PathBuf {
    options(temp_dir).resolver().unwrap().payload_path(id)
}

#[test]
fn test_corrupted_payload_is_dropped_for_every_digest() {
    for control in [
        ReadControl::Md5,
        ReadControl::Crc32,
        ReadControl::Adler32,
        ReadControl::Strlen,
    ] {
        let temp_dir = TempDir::new().unwrap();
        let cache = checked_backend(&temp_dir, control);

        assert!(cache.save("foo", b"original payload", &["t"], Lifetime::Default));
        assert_eq!(cache.load("foo", false).unwrap(), b"original payload");

        fs::write(payload_path(&temp_dir, "foo"), b"tampered").unwrap();

        assert!(cache.load("foo", false).is_none(), "{} missed corruption", control);
        assert!(cache.metadata("foo").is_none(), "{} kept metadata", control);
        assert!(cache.tags().is_empty(), "{} kept tag file", control);
        assert!(!payload_path(&temp_dir, "foo").exists());
    }
}

#[test]
fn test_strlen_only_sees_length_changes() {
    let temp_dir = TempDir::new().unwrap();
    let cache = checked_backend(&temp_dir, ReadControl::Strlen);

    cache.save("foo", b"abcd", &[], Lifetime::Default);
    fs::write(payload_path(&temp_dir, "foo"), b"wxyz").unwrap();
    assert_eq!(cache.load("foo", false).unwrap(), b"wxyz");
}

#[test]
fn test_digest_stored_in_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let cache = checked_backend(&temp_dir, ReadControl::Crc32);

    cache.save("foo", b"hello", &[], Lifetime::Default);
    assert_eq!(
        cache.metadata("foo").unwrap().hash.as_deref(),
        Some(ReadControl::Crc32.digest(b"hello").as_str())
    );
}

#[test]
fn test_corruption_served_without_read_control() {
    let temp_dir = TempDir::new().unwrap();
    let cache = backend(&temp_dir);

    cache.save("foo", b"original", &["t"], Lifetime::Default);
    assert!(cache.metadata("foo").unwrap().hash.is_none());

    fs::write(payload_path(&temp_dir, "foo"), b"tampered").unwrap();
    assert_eq!(cache.load("foo", false).unwrap(), b"tampered");
}

#[test]
fn test_corruption_removes_only_the_bad_entry() {
    let temp_dir = TempDir::new().unwrap();
    let cache = checked_backend(&temp_dir, ReadControl::Md5);

    cache.save("good", b"fine", &["t"], Lifetime::Default);
    cache.save("bad", b"fine", &["t"], Lifetime::Default);
    fs::write(payload_path(&temp_dir, "bad"), b"broken").unwrap();

    assert!(cache.load("bad", false).is_none());
    assert_eq!(cache.load("good", false).unwrap(), b"fine");
    assert_eq!(cache.ids_matching_tags(&["t"]), set(&["good"]));
}
