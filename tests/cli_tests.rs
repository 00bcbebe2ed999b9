//! Integration tests: tagfile-cache CLI

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn run(cache_dir: &Path, args: &[&str], stdin: Option<&[u8]>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tagfile-cache"))
        .arg("--cache-dir")
        .arg(cache_dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn tagfile-cache");

    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(data) = stdin {
            // The process may exit on bad arguments before reading stdin
            let _ = pipe.write_all(data);
        }
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_put_get_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let put = run(dir, &["put", "foo", "--tag", "a", "--tag", "b"], Some(b"hello"));
    assert!(put.status.success(), "put failed: {:?}", put);

    let get = run(dir, &["get", "foo"], None);
    assert!(get.status.success());
    assert_eq!(get.stdout, b"hello");

    let tags = run(dir, &["tags", "--json"], None);
    let tags: Vec<String> = serde_json::from_str(&stdout(&tags)).unwrap();
    assert_eq!(tags, vec!["a", "b"]);

    let ids = run(dir, &["ids", "--all-of", "a", "b"], None);
    assert_eq!(stdout(&ids).lines().collect::<Vec<_>>(), vec!["foo"]);
}

#[test]
fn test_meta_and_never_expiring_put() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    run(dir, &["put", "foo", "--never"], Some(b"x"));
    let meta = run(dir, &["meta", "foo", "--json"], None);
    assert!(meta.status.success());

    let value: serde_json::Value = serde_json::from_str(&stdout(&meta)).unwrap();
    assert!(value["expire"].is_null());
    assert_eq!(value["tags"], serde_json::json!([]));
}

#[test]
fn test_clean_and_missing_entry() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    run(dir, &["put", "foo", "-t", "x"], Some(b"x"));
    run(dir, &["put", "bar", "-t", "y"], Some(b"y"));

    let clean = run(dir, &["clean", "matchingTag", "--tag", "x", "--json"], None);
    assert!(clean.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&clean)).unwrap();
    assert_eq!(report["removed"], serde_json::json!(["foo"]));

    let get = run(dir, &["get", "foo"], None);
    assert!(!get.status.success());

    let ids = run(dir, &["ids"], None);
    assert_eq!(stdout(&ids).trim(), "bar");
}

#[test]
fn test_invalid_arguments_fail() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    assert!(!run(dir, &["clean", "sometimes"], None).status.success());
    assert!(!run(dir, &["put", "bad id"], Some(b"x")).status.success());
    assert!(!run(dir, &["put", "foo", "--ttl", "5", "--never"], Some(b"x")).status.success());
}
