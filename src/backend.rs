//! LSP backend: the edit-event feed and command surface
//!
//! The backend owns the session objects (store and tracker) and translates
//! editor traffic into core calls: incremental `didChange` ranges become
//! `(first_line, last_line, new_last_line)` line events, watched-file
//! notifications for the bookmark file are filtered through the store's
//! self-write flag, and `workspace/executeCommand` exposes add, remove and
//! list operations on the bookmark file.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::config::Config;
use crate::fs::OsFileSystem;
use crate::store::BookmarkStore;
use crate::tracker::ChangeTracker;
use crate::workspace;

/// Command: add a bookmark (`{name?, path, line}`).
pub const COMMAND_ADD: &str = "linemark/addBookmark";
/// Command: remove a bookmark by parse index (`{index}`).
pub const COMMAND_REMOVE: &str = "linemark/removeBookmark";
/// Command: list all bookmarks.
pub const COMMAND_LIST: &str = "linemark/listBookmarks";

/// Session state built once the client has sent its initialization options.
struct Session {
    store: Arc<BookmarkStore>,
    tracker: Arc<ChangeTracker>,
}

pub struct LinemarkBackend {
    client: Client,
    /// Configuration
    config: RwLock<Config>,
    /// Store and tracker, created during `initialize`
    session: OnceLock<Session>,
}

/// Arguments of the add command.
#[derive(Debug, Deserialize)]
struct AddBookmarkArgs {
    name: Option<String>,
    path: PathBuf,
    line: u32,
}

/// Arguments of the remove command.
#[derive(Debug, Deserialize)]
struct RemoveBookmarkArgs {
    index: usize,
}

/// Translate an incremental content change into the line event shape the
/// tracker consumes: the half-open 0-based old line range and its new end.
///
/// A change with both endpoints at column 0 whose text is empty or ends in
/// a newline replaces whole lines `[start.line, end.line)`; anything else
/// touches the rows `[start.line, end.line]` and merges the tail of the
/// last one, so the old range extends one past `end.line`.
fn line_event(range: &Range, text: &str) -> (u32, u32, u32) {
    let newlines = text.matches('\n').count() as u32;
    let whole_lines = range.start.character == 0
        && range.end.character == 0
        && (text.is_empty() || text.ends_with('\n'));

    if whole_lines {
        (range.start.line, range.end.line, range.start.line + newlines)
    } else {
        (
            range.start.line,
            range.end.line + 1,
            range.start.line + newlines + 1,
        )
    }
}

fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}

impl LinemarkBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: RwLock::new(Config::default()),
            session: OnceLock::new(),
        }
    }

    fn session(&self) -> Option<&Session> {
        self.session.get()
    }

    /// Resolve a command path argument to an absolute path.
    fn resolve_argument_path(&self, store: &BookmarkStore, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            store.workspace_root().join(path)
        }
    }

    fn run_command(&self, command: &str, arguments: &[serde_json::Value]) -> serde_json::Value {
        let Some(session) = self.session() else {
            return json!({ "error": "server not initialized" });
        };

        match command {
            COMMAND_LIST => {
                let bookmarks = session.store.read_bookmarks();
                json!({ "bookmarks": bookmarks })
            }
            COMMAND_ADD => {
                let args: AddBookmarkArgs = match arguments
                    .first()
                    .cloned()
                    .map(serde_json::from_value)
                {
                    Some(Ok(args)) => args,
                    _ => return json!({ "error": "expected {name?, path, line} argument" }),
                };
                let path = self.resolve_argument_path(&session.store, args.path);
                match session
                    .store
                    .add_bookmark(args.name.as_deref(), &path, args.line)
                {
                    Ok(bookmark) => {
                        session.tracker.maybe_attach(&bookmark.file_path);
                        json!({ "bookmark": bookmark })
                    }
                    Err(err) => json!({ "error": err.to_string() }),
                }
            }
            COMMAND_REMOVE => {
                let args: RemoveBookmarkArgs = match arguments
                    .first()
                    .cloned()
                    .map(serde_json::from_value)
                {
                    Some(Ok(args)) => args,
                    _ => return json!({ "error": "expected {index} argument" }),
                };
                match session.store.remove_bookmark(args.index) {
                    Ok(removed) => {
                        // The removed target may have been its file's last
                        // bookmark; re-check tracking.
                        session.tracker.maybe_attach(&removed.file_path);
                        json!({ "removed": removed })
                    }
                    Err(err) => json!({ "error": err.to_string() }),
                }
            }
            other => {
                tracing::warn!("Unknown command: {other}");
                serde_json::Value::Null
            }
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for LinemarkBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let config = Config::from_init_options(params.initialization_options);
        tracing::info!("Configuration: {config:?}");

        let workspace_root = match config.workspace.root.clone() {
            Some(root) => root,
            None => {
                let start = params.root_uri.as_ref().and_then(uri_to_path);
                match start {
                    Some(dir) => workspace::discover_root(&dir, &config.file.name),
                    None => workspace::discover_root_from_cwd(&config.file.name),
                }
            }
        };
        tracing::info!("Workspace root: {}", workspace_root.display());

        let store = Arc::new(BookmarkStore::new(
            Box::new(OsFileSystem::new()),
            workspace_root,
            &config.file.name,
        ));
        let tracker = ChangeTracker::new(
            Arc::clone(&store),
            Duration::from_millis(config.tracker.debounce_ms),
        );
        let _ = self.session.set(Session { store, tracker });

        if let Ok(mut cfg) = self.config.write() {
            *cfg = config;
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "linemark-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        COMMAND_ADD.to_string(),
                        COMMAND_REMOVE.to_string(),
                        COMMAND_LIST.to_string(),
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Linemark LSP initialized")
            .await;

        let (file_name, debounce_ms) = self
            .config
            .read()
            .map(|c| (c.file.name.clone(), c.tracker.debounce_ms))
            .unwrap_or_default();
        tracing::info!(
            "Linemark LSP initialized (file: {file_name}, debounce: {debounce_ms} ms)"
        );
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(session) = self.session() {
            session.tracker.flush_all();
            session.tracker.cancel_all();
        }
        tracing::info!("Linemark LSP shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(session) = self.session() else { return };
        let Some(path) = uri_to_path(&params.text_document.uri) else {
            return;
        };

        if session.tracker.maybe_attach(&path) {
            tracing::debug!("tracking {}", path.display());
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(session) = self.session() else { return };
        let Some(path) = uri_to_path(&params.text_document.uri) else {
            return;
        };

        for change in &params.content_changes {
            match change.range {
                Some(range) => {
                    let (first, last, new_last) = line_event(&range, &change.text);
                    session.tracker.on_edit(&path, first, last, new_last);
                }
                None => {
                    // Full-document sync: line shifts cannot be derived, so
                    // the pending state for this file is no longer valid.
                    tracing::warn!(
                        "full sync for {}, dropping pending adjustments",
                        path.display()
                    );
                    session.tracker.discard_pending(&path);
                }
            }
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(session) = self.session() else { return };
        let Some(path) = uri_to_path(&params.text_document.uri) else {
            return;
        };

        // Saving a tracked file is a natural consolidation point; flush
        // ahead of the debounce timer.
        session.tracker.flush(&path);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(session) = self.session() else { return };
        let Some(path) = uri_to_path(&params.text_document.uri) else {
            return;
        };

        session.tracker.flush(&path);
        session.tracker.detach(&path);
        tracing::debug!("stopped tracking {}", path.display());
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let Some(session) = self.session() else { return };

        for event in &params.changes {
            let Some(path) = uri_to_path(&event.uri) else {
                continue;
            };
            if path != session.store.file_path() {
                continue;
            }

            if session.store.consume_self_write() {
                tracing::debug!("ignoring watcher event for our own write");
            } else {
                tracing::debug!("bookmark file changed externally, invalidating cache");
                session.store.invalidate_cache();
            }
        }
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        let result = self.run_command(&params.command, &params.arguments);
        if result.is_null() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}
