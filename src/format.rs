//! Parser for the plain-text bookmark file
//!
//! The format is deliberately forgiving: one bookmark per line as
//! `[<name>: ]<path>:<line>`, with `#` comments, blank lines, and
//! `<!-- ... -->` block comments (single- or multi-line) interleaved freely.
//! Anything that does not parse as a bookmark is silently skipped, so the
//! file tolerates free-form prose between entries.
//!
//! `parse_file` and `find_bookmark_file_line` must agree on which lines are
//! bookmarks: callers pair the index of a parsed bookmark with the source
//! line returned for that index. Both therefore run the same `accept_line`
//! logic over the same scan state.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Opening token of a block comment.
const BLOCK_OPEN: &str = "<!--";
/// Closing token of a block comment.
const BLOCK_CLOSE: &str = "-->";

/// The name/path delimiter inside an entry. A bare `:` is not enough to end
/// a name, so scoped identifiers like `a::b::c` survive unsplit.
const NAME_SEPARATOR: &str = ": ";

/// A single bookmark parsed from the bookmark file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    /// Optional display name; anonymous bookmarks have none.
    pub name: Option<String>,
    /// Absolute path of the referenced source file.
    pub file_path: PathBuf,
    /// 1-based line number in the referenced file.
    pub line: u32,
    /// 0-based position in parse order. Derived on every parse, never
    /// persisted.
    pub index: usize,
}

/// Why a bookmark name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name is absent or empty.
    #[error("bookmark name must not be empty")]
    Empty,
    /// The name contains the literal `": "` sequence, which delimits the
    /// name from the path and would make the entry ambiguous.
    #[error("bookmark name must not contain \": \"")]
    ReservedSeparator,
}

/// Comment state carried across the line scan.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState {
    Normal,
    InBlockComment,
}

/// Raw fields of an accepted bookmark line, borrowed from the line text.
struct RawEntry<'a> {
    name: Option<&'a str>,
    path: &'a str,
    line: u32,
}

/// Decide whether a single line is a bookmark entry, updating the comment
/// state as a side effect.
///
/// This is the single source of truth for line acceptance. Both `parse_file`
/// and `find_bookmark_file_line` go through it; any divergence between the
/// two would break index-to-line-number agreement.
fn accept_line<'a>(line: &'a str, state: &mut ScanState) -> Option<RawEntry<'a>> {
    let trimmed = line.trim();

    if *state == ScanState::InBlockComment {
        if trimmed.contains(BLOCK_CLOSE) {
            *state = ScanState::Normal;
        }
        // The closing line itself is never parsed as a bookmark.
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix(BLOCK_OPEN) {
        if !rest.contains(BLOCK_CLOSE) {
            *state = ScanState::InBlockComment;
        }
        return None;
    }

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    // The line number is whatever follows the last colon.
    let colon = trimmed.rfind(':')?;
    let number_field = trimmed[colon + 1..].trim();
    let line_number: u32 = number_field.parse().ok()?;
    if line_number < 1 {
        return None;
    }

    // Split the head on the first ": " into name and path. A head without
    // the separator, or with an invalid name part, is all path.
    let head = &trimmed[..colon];
    let (name, path) = match head.find(NAME_SEPARATOR) {
        Some(sep) => {
            let name_part = head[..sep].trim();
            let path_part = head[sep + NAME_SEPARATOR.len()..].trim();
            let valid_name = !name_part.is_empty()
                && !name_part.contains('/')
                && !name_part.contains('\\')
                && !path_part.is_empty();
            if valid_name {
                (Some(name_part), path_part)
            } else {
                (None, head.trim())
            }
        }
        None => (None, head.trim()),
    };

    if path.is_empty() {
        return None;
    }

    Some(RawEntry {
        name,
        path,
        line: line_number,
    })
}

/// Resolve an entry path against the workspace root. Absolute paths pass
/// through unchanged.
fn resolve_path(path: &str, workspace_root: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workspace_root.join(p)
    }
}

/// Parse the bookmark file into bookmarks, in encounter order.
///
/// Indices are assigned 0..n-1 in file order. Lines that are comments,
/// blank, or otherwise unparseable are skipped without error.
pub fn parse_file<S: AsRef<str>>(lines: &[S], workspace_root: &Path) -> Vec<Bookmark> {
    let mut state = ScanState::Normal;
    let mut bookmarks = Vec::new();

    for line in lines {
        let Some(entry) = accept_line(line.as_ref(), &mut state) else {
            continue;
        };
        bookmarks.push(Bookmark {
            name: entry.name.map(str::to_string),
            file_path: resolve_path(entry.path, workspace_root),
            line: entry.line,
            index: bookmarks.len(),
        });
    }

    bookmarks
}

/// Locate the 1-based source line of the bookmark with the given parse
/// index, or `None` if the file holds fewer bookmarks.
pub fn find_bookmark_file_line<S: AsRef<str>>(lines: &[S], target_index: usize) -> Option<u32> {
    let mut state = ScanState::Normal;
    let mut count = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        if accept_line(line.as_ref(), &mut state).is_some() {
            if count == target_index {
                return Some(idx as u32 + 1);
            }
            count += 1;
        }
    }

    None
}

/// Find the 1-based insertion point after the leading header block.
///
/// The header is the run of blank and `#` lines at the top of the file.
/// Returns `len + 1` when the whole file is header.
pub fn find_header_end<S: AsRef<str>>(lines: &[S]) -> u32 {
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.as_ref().trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            return idx as u32 + 1;
        }
    }
    lines.len() as u32 + 1
}

/// Validate a user-supplied bookmark name.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if name.contains(NAME_SEPARATOR) {
        return Err(NameError::ReservedSeparator);
    }
    Ok(())
}

/// Replace the trailing `:<digits>` of a bookmark line with `:<new_line>`,
/// preserving everything before it verbatim.
///
/// Returns the input unchanged when no trailing `:<digits>` pattern exists;
/// callers only invoke this on lines already known to be bookmark entries.
pub fn rewrite_trailing_line_number(raw_line: &str, new_line: u32) -> String {
    let stripped = raw_line.trim_end();
    let bytes = stripped.as_bytes();

    let mut digits_start = bytes.len();
    while digits_start > 0 && bytes[digits_start - 1].is_ascii_digit() {
        digits_start -= 1;
    }

    let has_digits = digits_start < bytes.len();
    let has_colon = digits_start > 0 && bytes[digits_start - 1] == b':';
    if !has_digits || !has_colon {
        return raw_line.to_string();
    }

    format!("{}{}", &stripped[..digits_start], new_line)
}

/// Serialize one bookmark entry as a file line.
pub fn format_entry(name: Option<&str>, path: &Path, line: u32) -> String {
    match name {
        Some(name) => format!("{}: {}:{}", name, path.display(), line),
        None => format!("{}:{}", path.display(), line),
    }
}
