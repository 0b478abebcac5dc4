//! Line-number adjustment for buffer edits
//!
//! An edit event describes a half-open, 0-based line range `[first, last)`
//! of the old buffer being replaced by `[first, new_last)` in the new
//! buffer. Bookmark line numbers are 1-based. `compute_adjustments` maps the
//! bookmark lines that move; `merge_adjustments` folds such a map into the
//! pending table so that any number of successive edits stay expressed
//! relative to the on-disk state from the last load or flush.

use std::collections::{BTreeMap, HashMap};

/// Latest in-memory line of a bookmark whose shift has not been flushed yet.
///
/// Pending tables are keyed by the *original* on-disk line; a bookmark with
/// no entry is at its original line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLine {
    pub current: u32,
}

/// Pending adjustments for one watched file.
pub type PendingMap = HashMap<u32, PendingLine>;

/// Compute which bookmark lines move for one edit event.
///
/// Returns a map of old line → new line containing only lines that actually
/// change. With `delta == 0` (pure in-place replacement) the result is
/// always empty. A bookmark strictly below the region shifts by `delta`; a
/// bookmark inside a shrinking region collapses to the first surviving line;
/// everything at or above `first_line` stays put.
pub fn compute_adjustments(
    bookmark_lines: &[u32],
    first_line: u32,
    last_line: u32,
    new_last_line: u32,
) -> BTreeMap<u32, u32> {
    let mut adjustments = BTreeMap::new();

    let delta = i64::from(new_last_line) - i64::from(last_line);
    if delta == 0 {
        return adjustments;
    }

    for &line in bookmark_lines {
        // 1-based bookmark line against the 0-based region end: a bookmark
        // with line == last_line sits on the first row after the region and
        // does not shift.
        let new_line = if i64::from(line) > i64::from(last_line) {
            (i64::from(line) + delta) as u32
        } else if delta < 0 && line > first_line && i64::from(line) <= i64::from(last_line) {
            // Inside a deleted/shrunk region: collapse to the first
            // surviving line.
            first_line + 1
        } else {
            continue;
        };

        if new_line != line {
            adjustments.insert(line, new_line);
        }
    }

    adjustments
}

/// Fold a fresh adjustment map into the pending table for a file.
///
/// `adjustments` is keyed by lines as they were *before this edit*; pending
/// entries are keyed by lines as they are *on disk*. The two are bridged by
/// a reverse lookup from current line to original line, built from the
/// inverted pending table plus an identity mapping for every bookmark line
/// without a pending entry. After the merge each entry still denotes the
/// cumulative displacement relative to the on-disk state, never an
/// intermediate one.
pub fn merge_adjustments(
    pending: &mut PendingMap,
    bookmark_lines: &[u32],
    adjustments: &BTreeMap<u32, u32>,
) {
    let mut reverse: HashMap<u32, u32> = pending
        .iter()
        .map(|(&original, entry)| (entry.current, original))
        .collect();
    for &line in bookmark_lines {
        reverse.entry(line).or_insert(line);
    }

    for (&old_current, &new_current) in adjustments {
        if let Some(&original) = reverse.get(&old_current) {
            pending.insert(
                original,
                PendingLine {
                    current: new_current,
                },
            );
        }
    }
}
