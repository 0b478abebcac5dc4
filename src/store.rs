//! Bookmark store
//!
//! `BookmarkStore` owns the authoritative in-memory bookmark list, the
//! mtime-based cache over it, and every read and write of the bookmark
//! file. Other components never touch the file directly; the tracker asks
//! the store to persist its consolidated rewrites, and the LSP watcher asks
//! the store whether a change notification was caused by the store itself.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::format::{self, Bookmark, NameError};
use crate::fs::{FileSystem, Mtime};

/// Errors from store operations that mutate the bookmark file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A bookmark index could not be located back in the file, e.g. because
    /// the file was edited externally between read and write. The file is
    /// left untouched.
    #[error("bookmark {index} not found in {file}")]
    Lookup { index: usize, file: PathBuf },

    /// A bookmark with the same path and line already exists.
    #[error("bookmark for {path}:{line} already exists")]
    Duplicate { path: PathBuf, line: u32 },

    /// The supplied name failed validation.
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("bookmark file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed-list cache, valid only while the file mtime is unchanged.
#[derive(Debug, Default)]
struct Cache {
    bookmarks: Option<Vec<Bookmark>>,
    file_mtime: Option<Mtime>,
}

impl Cache {
    fn reset(&mut self) {
        self.bookmarks = None;
        self.file_mtime = None;
    }
}

pub struct BookmarkStore {
    fs: Box<dyn FileSystem>,
    workspace_root: PathBuf,
    file_path: PathBuf,
    cache: RwLock<Cache>,
    /// Advisory flag distinguishing the store's own writes from external
    /// ones in watcher notifications. Single flag, non-reentrant;
    /// concurrent self-writes are unsupported.
    self_write: AtomicBool,
}

impl BookmarkStore {
    pub fn new(fs: Box<dyn FileSystem>, workspace_root: PathBuf, file_name: &str) -> Self {
        let file_path = workspace_root.join(file_name);
        Self {
            fs,
            workspace_root,
            file_path,
            cache: RwLock::new(Cache::default()),
            self_write: AtomicBool::new(false),
        }
    }

    /// Absolute path of the bookmark file this store manages.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Read the bookmark list, reusing the cached parse while the file
    /// mtime is unchanged.
    ///
    /// A missing file is zero bookmarks, not an error. Any mtime mismatch
    /// (including deletion and re-creation) forces a re-parse.
    pub fn read_bookmarks(&self) -> Vec<Bookmark> {
        let Some(mtime) = self.fs.stat_mtime(&self.file_path) else {
            self.cache.write().unwrap().reset();
            return Vec::new();
        };

        {
            let cache = self.cache.read().unwrap();
            if cache.file_mtime == Some(mtime)
                && let Some(bookmarks) = &cache.bookmarks
            {
                return bookmarks.clone();
            }
        }

        let lines = match self.fs.read_lines(&self.file_path) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::warn!("failed to read {}: {err}", self.file_path.display());
                self.cache.write().unwrap().reset();
                return Vec::new();
            }
        };

        let bookmarks = format::parse_file(&lines, &self.workspace_root);
        tracing::debug!(
            "parsed {} bookmarks from {}",
            bookmarks.len(),
            self.file_path.display()
        );

        let mut cache = self.cache.write().unwrap();
        cache.bookmarks = Some(bookmarks.clone());
        cache.file_mtime = Some(mtime);
        bookmarks
    }

    /// Drop the cached parse unconditionally; the next read re-parses.
    pub fn invalidate_cache(&self) {
        self.cache.write().unwrap().reset();
    }

    /// Raw file lines, bypassing the cache. Used by the tracker's flush,
    /// which must see the file exactly as it is on disk right now.
    pub fn read_file_lines(&self) -> std::io::Result<Vec<String>> {
        self.fs.read_lines(&self.file_path)
    }

    /// Persist the given lines. This is the only path that writes the
    /// bookmark file; it raises the self-write flag for the watcher and
    /// invalidates the cache afterwards.
    pub fn write_lines(&self, lines: &[String]) -> Result<(), StoreError> {
        self.self_write.store(true, Ordering::SeqCst);
        let result = self.fs.write_lines(&self.file_path, lines);
        if result.is_err() {
            // Nothing hit the disk, so no watcher event is coming.
            self.self_write.store(false, Ordering::SeqCst);
        }
        result?;
        self.invalidate_cache();
        Ok(())
    }

    /// Consume the self-write flag: returns true exactly once after a
    /// store-initiated write, letting the file watcher ignore the
    /// notification that write produced.
    pub fn consume_self_write(&self) -> bool {
        self.self_write.swap(false, Ordering::SeqCst)
    }

    /// True iff some bookmark has this exact absolute path and line.
    pub fn has_bookmark_at(&self, path: &Path, line: u32) -> bool {
        self.read_bookmarks()
            .iter()
            .any(|b| b.file_path == path && b.line == line)
    }

    /// Add a bookmark, inserting its line right after the header block.
    ///
    /// Paths under the workspace root are stored relative, everything else
    /// absolute. Returns the freshly parsed bookmark.
    pub fn add_bookmark(
        &self,
        name: Option<&str>,
        path: &Path,
        line: u32,
    ) -> Result<Bookmark, StoreError> {
        if let Some(name) = name {
            format::validate_name(name)?;
        }
        if self.has_bookmark_at(path, line) {
            return Err(StoreError::Duplicate {
                path: path.to_path_buf(),
                line,
            });
        }

        let stored_path = path
            .strip_prefix(&self.workspace_root)
            .unwrap_or(path)
            .to_path_buf();
        let entry = format::format_entry(name, &stored_path, line);

        let mut lines = match self.fs.read_lines(&self.file_path) {
            Ok(lines) => lines,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let insert_at = format::find_header_end(&lines) as usize - 1;
        let insert_at = insert_at.min(lines.len());
        lines.insert(insert_at, entry);

        self.write_lines(&lines)?;

        self.read_bookmarks()
            .into_iter()
            .find(|b| b.file_path == path && b.line == line)
            .ok_or_else(|| StoreError::Lookup {
                index: insert_at,
                file: self.file_path.clone(),
            })
    }

    /// Remove the bookmark with the given parse index.
    ///
    /// When the index cannot be located back in the file the operation
    /// fails with no partial mutation.
    pub fn remove_bookmark(&self, index: usize) -> Result<Bookmark, StoreError> {
        let lines = self.fs.read_lines(&self.file_path).map_err(|_| {
            StoreError::Lookup {
                index,
                file: self.file_path.clone(),
            }
        })?;

        let bookmarks = format::parse_file(&lines, &self.workspace_root);
        let removed = bookmarks.get(index).cloned().ok_or_else(|| StoreError::Lookup {
            index,
            file: self.file_path.clone(),
        })?;

        let source_line = format::find_bookmark_file_line(&lines, index).ok_or_else(|| {
            StoreError::Lookup {
                index,
                file: self.file_path.clone(),
            }
        })?;

        let mut lines = lines;
        lines.remove(source_line as usize - 1);
        self.write_lines(&lines)?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::sync::Arc;

    fn store_with(lines: &[&str]) -> (Arc<MemoryFileSystem>, BookmarkStore) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.put("/ws/.bookmarks", lines);
        let store = BookmarkStore::new(
            Box::new(fs.clone()),
            PathBuf::from("/ws"),
            ".bookmarks",
        );
        (fs, store)
    }

    #[test]
    fn test_read_bookmarks_missing_file_is_empty() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = BookmarkStore::new(Box::new(fs), PathBuf::from("/ws"), ".bookmarks");
        assert!(store.read_bookmarks().is_empty());
    }

    #[test]
    fn test_read_bookmarks_parses_and_indexes() {
        let (_fs, store) = store_with(&["# header", "a: one.rs:1", "two.rs:2"]);
        let bookmarks = store.read_bookmarks();
        assert_eq!(bookmarks.len(), 2);
        assert_eq!(bookmarks[0].index, 0);
        assert_eq!(bookmarks[1].index, 1);
        assert_eq!(bookmarks[1].file_path, Path::new("/ws/two.rs"));
    }

    #[test]
    fn test_cache_hit_until_mtime_changes() {
        let (fs, store) = store_with(&["a.rs:1"]);
        let first = store.read_bookmarks();
        let second = store.read_bookmarks();
        assert_eq!(first, second);

        // External writer changes the file; the mtime mismatch forces a
        // re-parse.
        fs.put("/ws/.bookmarks", &["a.rs:1", "b.rs:2"]);
        assert_eq!(store.read_bookmarks().len(), 2);
    }

    #[test]
    fn test_mtime_only_touch_reparses() {
        let (fs, store) = store_with(&["a.rs:1"]);
        store.read_bookmarks();
        fs.touch(Path::new("/ws/.bookmarks"));
        // Same content, new mtime: still one bookmark, no stale panic.
        assert_eq!(store.read_bookmarks().len(), 1);
    }

    #[test]
    fn test_file_deletion_resets_cache() {
        let (fs, store) = store_with(&["a.rs:1"]);
        assert_eq!(store.read_bookmarks().len(), 1);
        fs.remove(Path::new("/ws/.bookmarks"));
        assert!(store.read_bookmarks().is_empty());

        // Re-created file is picked up again.
        fs.put("/ws/.bookmarks", &["b.rs:2"]);
        assert_eq!(store.read_bookmarks().len(), 1);
    }

    #[test]
    fn test_invalidate_cache_forces_reparse() {
        let (_fs, store) = store_with(&["a.rs:1"]);
        store.read_bookmarks();
        store.invalidate_cache();
        assert_eq!(store.read_bookmarks().len(), 1);
    }

    #[test]
    fn test_write_lines_sets_self_write_flag_once() {
        let (_fs, store) = store_with(&[]);
        assert!(!store.consume_self_write());

        store.write_lines(&["x.rs:1".to_string()]).unwrap();
        assert!(store.consume_self_write());
        assert!(!store.consume_self_write());
    }

    #[test]
    fn test_has_bookmark_at() {
        let (_fs, store) = store_with(&["a: one.rs:5"]);
        assert!(store.has_bookmark_at(Path::new("/ws/one.rs"), 5));
        assert!(!store.has_bookmark_at(Path::new("/ws/one.rs"), 6));
        assert!(!store.has_bookmark_at(Path::new("/ws/other.rs"), 5));
    }

    #[test]
    fn test_add_bookmark_inserts_after_header() {
        let (fs, store) = store_with(&["# my bookmarks", "", "old.rs:1"]);
        let added = store
            .add_bookmark(Some("fresh"), Path::new("/ws/new.rs"), 7)
            .unwrap();
        assert_eq!(added.name.as_deref(), Some("fresh"));
        assert_eq!(added.line, 7);
        // New entry lands between the header and the existing entries, so
        // it parses first.
        assert_eq!(added.index, 0);

        let lines = fs.read_lines(Path::new("/ws/.bookmarks")).unwrap();
        assert_eq!(lines, vec!["# my bookmarks", "", "fresh: new.rs:7", "old.rs:1"]);
    }

    #[test]
    fn test_add_bookmark_creates_missing_file() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = BookmarkStore::new(Box::new(fs.clone()), PathBuf::from("/ws"), ".bookmarks");
        store.add_bookmark(None, Path::new("/ws/a.rs"), 1).unwrap();
        assert_eq!(
            fs.read_lines(Path::new("/ws/.bookmarks")).unwrap(),
            vec!["a.rs:1"]
        );
    }

    #[test]
    fn test_add_bookmark_rejects_invalid_name() {
        let (_fs, store) = store_with(&[]);
        let err = store
            .add_bookmark(Some("bad: name"), Path::new("/ws/a.rs"), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::Name(NameError::ReservedSeparator)));

        let err = store
            .add_bookmark(Some(""), Path::new("/ws/a.rs"), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::Name(NameError::Empty)));
    }

    #[test]
    fn test_add_bookmark_rejects_duplicate() {
        let (_fs, store) = store_with(&["a.rs:1"]);
        let err = store
            .add_bookmark(None, Path::new("/ws/a.rs"), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn test_remove_bookmark_deletes_only_its_line() {
        let (fs, store) = store_with(&["# header", "a: one.rs:1", "b: two.rs:2"]);
        let removed = store.remove_bookmark(1).unwrap();
        assert_eq!(removed.name.as_deref(), Some("b"));

        let lines = fs.read_lines(Path::new("/ws/.bookmarks")).unwrap();
        assert_eq!(lines, vec!["# header", "a: one.rs:1"]);
    }

    #[test]
    fn test_remove_bookmark_out_of_range_leaves_file_untouched() {
        let (fs, store) = store_with(&["a.rs:1"]);
        let writes_before = fs.write_count();
        let err = store.remove_bookmark(5).unwrap_err();
        assert!(matches!(err, StoreError::Lookup { index: 5, .. }));
        assert_eq!(fs.write_count(), writes_before);
    }

    #[test]
    fn test_remove_bookmark_missing_file_is_lookup_failure() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = BookmarkStore::new(Box::new(fs), PathBuf::from("/ws"), ".bookmarks");
        assert!(matches!(
            store.remove_bookmark(0).unwrap_err(),
            StoreError::Lookup { .. }
        ));
    }
}
