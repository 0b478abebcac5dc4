use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use linemark_lsp::backend::LinemarkBackend;
use linemark_lsp::fs::OsFileSystem;
use linemark_lsp::store::BookmarkStore;
use linemark_lsp::workspace;

#[derive(Parser)]
#[command(name = "linemark-lsp")]
#[command(about = "Language server for plain-text line bookmarks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the LSP server (default behavior)
    Lsp,
    /// List the bookmarks of the current workspace
    List {
        /// Bookmark file name to look for
        #[arg(short, long, default_value = ".bookmarks")]
        file: String,
    },
    /// Add a bookmark to the workspace bookmark file
    Add {
        /// Optional bookmark name
        #[arg(short, long)]
        name: Option<String>,

        /// Source file the bookmark points at
        path: PathBuf,

        /// 1-based line number in the source file
        line: u32,

        /// Bookmark file name to look for
        #[arg(short, long, default_value = ".bookmarks")]
        file: String,
    },
    /// Parse the bookmark file and report what it contains
    Check {
        /// Bookmark file name to look for
        #[arg(short, long, default_value = ".bookmarks")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Some(Commands::List { file }) => run_list(&file),
        Some(Commands::Add {
            name,
            path,
            line,
            file,
        }) => run_add(name, path, line, &file),
        Some(Commands::Check { file }) => run_check(&file),
        Some(Commands::Lsp) | None => {
            run_lsp().await;
            ExitCode::SUCCESS
        }
    }
}

async fn run_lsp() {
    tracing::info!("Starting Linemark LSP server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(LinemarkBackend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

/// Build a store for the workspace containing the working directory.
fn open_store(file_name: &str) -> BookmarkStore {
    let root = workspace::discover_root_from_cwd(file_name);
    BookmarkStore::new(Box::new(OsFileSystem::new()), root, file_name)
}

fn run_list(file_name: &str) -> ExitCode {
    let store = open_store(file_name);
    let bookmarks = store.read_bookmarks();

    if bookmarks.is_empty() {
        println!("No bookmarks in {}", store.file_path().display());
        return ExitCode::SUCCESS;
    }

    println!("Bookmarks in {}:", store.file_path().display());
    for bookmark in &bookmarks {
        match &bookmark.name {
            Some(name) => println!(
                "  [{}] {}  {}:{}",
                bookmark.index,
                name,
                bookmark.file_path.display(),
                bookmark.line
            ),
            None => println!(
                "  [{}] {}:{}",
                bookmark.index,
                bookmark.file_path.display(),
                bookmark.line
            ),
        }
    }
    ExitCode::SUCCESS
}

fn run_add(name: Option<String>, path: PathBuf, line: u32, file_name: &str) -> ExitCode {
    let store = open_store(file_name);

    let absolute = if path.is_absolute() {
        path
    } else {
        store.workspace_root().join(path)
    };

    match store.add_bookmark(name.as_deref(), &absolute, line) {
        Ok(bookmark) => {
            println!(
                "Added {}:{} to {}",
                bookmark.file_path.display(),
                bookmark.line,
                store.file_path().display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error adding bookmark: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_check(file_name: &str) -> ExitCode {
    let store = open_store(file_name);
    let path = store.file_path().to_path_buf();

    match store.read_file_lines() {
        Ok(lines) => {
            let bookmarks = store.read_bookmarks();
            println!(
                "{}: {} line(s), {} bookmark(s)",
                path.display(),
                lines.len(),
                bookmarks.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            println!("No bookmark file at {}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error reading {}: {err}", path.display());
            ExitCode::FAILURE
        }
    }
}
