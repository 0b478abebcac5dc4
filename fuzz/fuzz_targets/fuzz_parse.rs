#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use linemark_lsp::{find_bookmark_file_line, parse_file};

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let lines: Vec<&str> = content.lines().collect();
        let bookmarks = parse_file(&lines, Path::new("/ws"));

        for (i, bookmark) in bookmarks.iter().enumerate() {
            assert_eq!(bookmark.index, i, "indices must be contiguous");
            assert!(bookmark.line >= 1, "line numbers are 1-based");

            // Index-to-line agreement: every parsed bookmark can be located
            // back in the file, and the located line re-parses to the same
            // bookmark on its own.
            let src = find_bookmark_file_line(&lines, i).expect("bookmark must be locatable");
            assert!((src as usize) <= lines.len(), "source line in range");

            let alone = parse_file(&[lines[src as usize - 1]], Path::new("/ws"));
            assert_eq!(alone.len(), 1, "located line must parse as one bookmark");
            assert_eq!(alone[0].name, bookmark.name);
            assert_eq!(alone[0].file_path, bookmark.file_path);
            assert_eq!(alone[0].line, bookmark.line);
        }

        // One past the end is never locatable.
        assert!(find_bookmark_file_line(&lines, bookmarks.len()).is_none());
    }
});
