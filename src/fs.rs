//! File-system seam for the bookmark store
//!
//! The store reads and writes the bookmark file only through this trait, so
//! tests run against an in-memory double and the mtime cache can be
//! exercised without sleeping on real filesystem timestamps.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

/// Modification time as (seconds, nanoseconds) since the epoch.
///
/// Cache validity is exact equality on this pair; there is no tolerance
/// window.
pub type Mtime = (u64, u32);

/// Minimal file operations the store needs.
pub trait FileSystem: Send + Sync {
    /// Modification time of the file, or `None` when it does not exist.
    fn stat_mtime(&self, path: &Path) -> Option<Mtime>;

    /// Read the file as lines, without trailing newlines.
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Write the lines back, one per line with a trailing newline.
    fn write_lines(&self, path: &Path, lines: &[String]) -> io::Result<()>;
}

impl<T: FileSystem> FileSystem for Arc<T> {
    fn stat_mtime(&self, path: &Path) -> Option<Mtime> {
        (**self).stat_mtime(path)
    }

    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        (**self).read_lines(path)
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> io::Result<()> {
        (**self).write_lines(path, lines)
    }
}

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn stat_mtime(&self, path: &Path) -> Option<Mtime> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some((since_epoch.as_secs(), since_epoch.subsec_nanos()))
    }

    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> io::Result<()> {
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(path, content)
    }
}

/// In-memory filesystem for tests.
///
/// Every write bumps a monotonic counter that doubles as the mtime, so
/// cache-invalidation paths can be driven deterministically. `touch`
/// simulates an external writer changing the mtime without changing
/// content.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, MemoryFile>,
    clock: u64,
    writes: u64,
}

#[derive(Debug)]
struct MemoryFile {
    lines: Vec<String>,
    mtime: Mtime,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file, advancing the clock.
    pub fn put(&self, path: impl Into<PathBuf>, lines: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let mtime = (state.clock, 0);
        state.files.insert(
            path.into(),
            MemoryFile {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                mtime,
            },
        );
    }

    /// Advance the file's mtime without changing its content.
    pub fn touch(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let mtime = (state.clock, 0);
        if let Some(file) = state.files.get_mut(path) {
            file.mtime = mtime;
        }
    }

    /// Remove a file, simulating external deletion.
    pub fn remove(&self, path: &Path) {
        self.state.lock().unwrap().files.remove(path);
    }

    /// Number of writes performed through the trait.
    pub fn write_count(&self) -> u64 {
        self.state.lock().unwrap().writes
    }
}

impl FileSystem for MemoryFileSystem {
    fn stat_mtime(&self, path: &Path) -> Option<Mtime> {
        self.state.lock().unwrap().files.get(path).map(|f| f.mtime)
    }

    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| f.lines.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        state.writes += 1;
        let mtime = (state.clock, 0);
        state.files.insert(
            path.to_path_buf(),
            MemoryFile {
                lines: lines.to_vec(),
                mtime,
            },
        );
        Ok(())
    }
}
