//! Integration tests for linemark-lsp

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linemark_lsp::fs::OsFileSystem;
use linemark_lsp::store::{BookmarkStore, StoreError};
use linemark_lsp::tracker::ChangeTracker;
use linemark_lsp::{find_bookmark_file_line, parse_file};

/// Test parsing a realistic bookmark file
#[test]
fn test_parse_realistic_bookmark_file() {
    let lines: Vec<&str> = r#"# Project bookmarks
# Everything below is kept in sync by the editor integration.

entry point: src/main.rs:12
config loading: src/config.rs:87
src/parser/grammar.rs:310

<!--
Parked while the allocator rework is in flight:
old arena: src/alloc/arena.rs:45
-->

@core::panic_handler: src/runtime/panic.rs:9
/opt/vendor/libfoo/include/foo.h:1203
"#
    .lines()
    .collect();

    let bookmarks = parse_file(&lines, Path::new("/home/dev/project"));
    assert_eq!(bookmarks.len(), 5);

    let entry = &bookmarks[0];
    assert_eq!(entry.name.as_deref(), Some("entry point"));
    assert_eq!(entry.file_path, Path::new("/home/dev/project/src/main.rs"));
    assert_eq!(entry.line, 12);

    // Anonymous entry keeps the whole head as path.
    assert_eq!(bookmarks[2].name, None);
    assert_eq!(
        bookmarks[2].file_path,
        Path::new("/home/dev/project/src/parser/grammar.rs")
    );

    // The block-commented bookmark is invisible.
    assert!(
        bookmarks
            .iter()
            .all(|b| !b.file_path.ends_with("alloc/arena.rs"))
    );

    // Scoped name survives its bare colons; absolute path passes through.
    assert_eq!(bookmarks[3].name.as_deref(), Some("@core::panic_handler"));
    assert_eq!(
        bookmarks[4].file_path,
        Path::new("/opt/vendor/libfoo/include/foo.h")
    );

    // Index-to-source-line agreement across the whole file.
    for bookmark in &bookmarks {
        let src = find_bookmark_file_line(&lines, bookmark.index).unwrap();
        assert!(lines[src as usize - 1].contains(&format!(":{}", bookmark.line)));
    }
}

/// Store operations against the real filesystem
#[test]
fn test_store_add_remove_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::write(root.join(".bookmarks"), "# bookmarks\n").unwrap();

    let store = BookmarkStore::new(Box::new(OsFileSystem::new()), root.clone(), ".bookmarks");

    let first = store
        .add_bookmark(Some("first"), &root.join("src/a.rs"), 10)
        .unwrap();
    assert_eq!(first.line, 10);

    let second = store
        .add_bookmark(None, &root.join("src/b.rs"), 20)
        .unwrap();
    assert_eq!(second.file_path, root.join("src/b.rs"));

    assert_eq!(store.read_bookmarks().len(), 2);
    assert!(store.has_bookmark_at(&root.join("src/a.rs"), 10));

    // Duplicates are rejected without touching the file.
    let err = store
        .add_bookmark(None, &root.join("src/a.rs"), 10)
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));

    // Remove by index and confirm the file shrank accordingly.
    let removed = store.remove_bookmark(0).unwrap();
    assert!(removed.file_path.ends_with("src/b.rs") || removed.file_path.ends_with("src/a.rs"));
    assert_eq!(store.read_bookmarks().len(), 1);

    let raw = std::fs::read_to_string(root.join(".bookmarks")).unwrap();
    assert!(raw.starts_with("# bookmarks\n"));
}

/// Cache invalidation when another process rewrites the file
#[test]
fn test_store_sees_external_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let file = root.join(".bookmarks");
    std::fs::write(&file, "a: src/a.rs:1\n").unwrap();

    let store = BookmarkStore::new(Box::new(OsFileSystem::new()), root, ".bookmarks");
    assert_eq!(store.read_bookmarks().len(), 1);

    // Give the mtime a chance to differ even on coarse filesystems.
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&file, "a: src/a.rs:1\nb: src/b.rs:2\n").unwrap();

    assert_eq!(store.read_bookmarks().len(), 2);
}

/// End-to-end: edit burst, debounce, consolidated rewrite on disk
#[tokio::test]
async fn test_tracker_flushes_consolidated_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let file = root.join(".bookmarks");
    std::fs::write(
        &file,
        "# bookmarks\nmain: src/main.rs:10\nhelper: src/util.rs:3\n",
    )
    .unwrap();

    let store = Arc::new(BookmarkStore::new(
        Box::new(OsFileSystem::new()),
        root.clone(),
        ".bookmarks",
    ));
    let tracker = ChangeTracker::new(Arc::clone(&store), Duration::from_millis(40));

    let edited = root.join("src/main.rs");
    assert!(tracker.maybe_attach(&edited));

    // Burst: insert three lines at the top, then delete one again.
    tracker.on_edit(&edited, 0, 0, 2);
    tracker.on_edit(&edited, 0, 0, 1);
    tracker.on_edit(&edited, 0, 1, 0);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let raw = std::fs::read_to_string(&file).unwrap();
    assert_eq!(
        raw,
        "# bookmarks\nmain: src/main.rs:12\nhelper: src/util.rs:3\n"
    );

    // The store reflects the rewrite after its self-write invalidation.
    let bookmarks = store.read_bookmarks();
    assert_eq!(bookmarks[0].line, 12);
    assert_eq!(bookmarks[1].line, 3);
}

/// A flush with nothing pending leaves the file byte-identical
#[tokio::test]
async fn test_noop_edits_never_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let file = root.join(".bookmarks");
    let content = "main: src/main.rs:10\n";
    std::fs::write(&file, content).unwrap();

    let store = Arc::new(BookmarkStore::new(
        Box::new(OsFileSystem::new()),
        root.clone(),
        ".bookmarks",
    ));
    let tracker = ChangeTracker::new(Arc::clone(&store), Duration::from_millis(20));

    let edited = root.join("src/main.rs");
    // Same-length replacement below the bookmark: no line moves.
    tracker.on_edit(&edited, 20, 25, 25);
    tracker.flush(&edited);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(std::fs::read_to_string(&file).unwrap(), content);
}
