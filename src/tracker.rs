//! Change tracking and debounced flush
//!
//! One `ChangeTracker` watches every file that currently has bookmarks.
//! Buffer edits arrive as `(first_line, last_line, new_last_line)` events;
//! each event folds into the file's pending adjustment table and restarts a
//! single-shot debounce timer, so a burst of keystrokes collapses into one
//! consolidated rewrite of the bookmark file.
//!
//! The timer is the only suspension point: restarting it aborts the
//! previous sleep task, and a flush, once started, runs to completion
//! before the next cycle begins. Flush always re-reads the bookmark file
//! fresh from disk; if the file vanished or an external edit won the race,
//! the pending state is discarded rather than escalated.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use crate::adjust::{PendingMap, compute_adjustments, merge_adjustments};
use crate::format;
use crate::store::BookmarkStore;

/// Default debounce delay between the last edit and the flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub struct ChangeTracker {
    store: Arc<BookmarkStore>,
    debounce: Duration,
    /// Pending line adjustments per watched file, keyed by original
    /// on-disk line.
    pending: DashMap<PathBuf, PendingMap>,
    /// Active debounce timer per watched file.
    timers: DashMap<PathBuf, AbortHandle>,
    /// Self-reference handed to the spawned debounce tasks.
    weak: Weak<ChangeTracker>,
}

impl ChangeTracker {
    pub fn new(store: Arc<BookmarkStore>, debounce: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            debounce,
            pending: DashMap::new(),
            timers: DashMap::new(),
            weak: weak.clone(),
        })
    }

    /// Re-evaluate whether `path` is tracked.
    ///
    /// A file is tracked while at least one bookmark resolves to it. When
    /// the last bookmark goes away, any pending state and timer for the
    /// path are dropped.
    pub fn maybe_attach(&self, path: &Path) -> bool {
        let tracked = self
            .store
            .read_bookmarks()
            .iter()
            .any(|b| b.file_path == path);
        if !tracked {
            self.detach(path);
        }
        tracked
    }

    /// Drop all state for a path.
    pub fn detach(&self, path: &Path) {
        self.pending.remove(path);
        if let Some((_, handle)) = self.timers.remove(path) {
            handle.abort();
        }
    }

    /// Fold one buffer edit into the pending state and restart the
    /// debounce timer.
    ///
    /// The edit replaces the half-open 0-based line range
    /// `[first_line, last_line)` with `[first_line, new_last_line)`.
    pub fn on_edit(&self, path: &Path, first_line: u32, last_line: u32, new_last_line: u32) {
        if !self.maybe_attach(path) {
            return;
        }

        let disk_lines: Vec<u32> = self
            .store
            .read_bookmarks()
            .iter()
            .filter(|b| b.file_path == path)
            .map(|b| b.line)
            .collect();

        let mut entry = self.pending.entry(path.to_path_buf()).or_default();

        // Snapshot of where each bookmark currently is, pending shifts
        // applied.
        let current_lines: Vec<u32> = disk_lines
            .iter()
            .map(|line| entry.get(line).map_or(*line, |p| p.current))
            .collect();

        let adjustments =
            compute_adjustments(&current_lines, first_line, last_line, new_last_line);
        if adjustments.is_empty() {
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.pending.remove(path);
            }
            return;
        }

        merge_adjustments(&mut entry, &current_lines, &adjustments);
        drop(entry);

        tracing::debug!(
            "merged {} adjustment(s) for {}",
            adjustments.len(),
            path.display()
        );
        self.restart_timer(path);
    }

    /// Discard pending state for a path without flushing, e.g. after a
    /// full-document replacement where line shifts cannot be derived.
    pub fn discard_pending(&self, path: &Path) {
        if self.pending.remove(path).is_some() {
            tracing::warn!(
                "discarded pending adjustments for {}",
                path.display()
            );
        }
        if let Some((_, handle)) = self.timers.remove(path) {
            handle.abort();
        }
    }

    /// Consolidate the pending adjustments for one path into a single
    /// rewrite of the bookmark file.
    ///
    /// Pending state for the cycle is cleared regardless of outcome; I/O
    /// failures mean an external change won the race and are only logged.
    pub fn flush(&self, path: &Path) {
        if let Some((_, handle)) = self.timers.remove(path) {
            handle.abort();
        }
        let Some((_, pending)) = self.pending.remove(path) else {
            return;
        };

        let mut lines = match self.store.read_file_lines() {
            Ok(lines) => lines,
            Err(err) => {
                tracing::warn!(
                    "bookmark file unreadable during flush, discarding pending state: {err}"
                );
                return;
            }
        };

        let bookmarks = format::parse_file(&lines, self.store.workspace_root());
        let mut changed = false;

        for bookmark in bookmarks.iter().filter(|b| b.file_path == path) {
            let Some(entry) = pending.get(&bookmark.line) else {
                continue;
            };
            if entry.current == bookmark.line {
                continue;
            }
            let Some(source_line) = format::find_bookmark_file_line(&lines, bookmark.index)
            else {
                continue;
            };
            let idx = source_line as usize - 1;
            lines[idx] = format::rewrite_trailing_line_number(&lines[idx], entry.current);
            changed = true;
        }

        if !changed {
            return;
        }

        match self.store.write_lines(&lines) {
            Ok(()) => tracing::debug!("flushed bookmark updates for {}", path.display()),
            Err(err) => tracing::warn!("failed to flush bookmark updates: {err}"),
        }
    }

    /// Flush every path that still has pending adjustments.
    pub fn flush_all(&self) {
        let paths: Vec<PathBuf> = self.pending.iter().map(|e| e.key().clone()).collect();
        for path in paths {
            self.flush(&path);
        }
    }

    /// Abort all debounce timers. Called on shutdown.
    pub fn cancel_all(&self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
        self.timers.clear();
    }

    fn restart_timer(&self, path: &Path) {
        if let Some((_, prev)) = self.timers.remove(path) {
            prev.abort();
            tracing::trace!("restarted debounce timer for {}", path.display());
        }

        let Some(tracker) = self.weak.upgrade() else {
            return;
        };
        let owned_path = path.to_path_buf();
        let delay = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracker.flush(&owned_path);
        });
        self.timers.insert(path.to_path_buf(), task.abort_handle());
    }

    #[cfg(test)]
    fn pending_current(&self, path: &Path, original: u32) -> Option<u32> {
        self.pending
            .get(path)
            .and_then(|m| m.get(&original).map(|p| p.current))
    }

    #[cfg(test)]
    fn has_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    #[cfg(test)]
    fn active_timer_count(&self) -> usize {
        self.timers.len()
    }
}
