//! wikiledger CLI: manage webs and pages in a wiki database.
//!
//! Usage:
//!   wikiledger web create <name> <address> [--markup markdown] [--brackets-only]
//!   wikiledger page write <web> <name> --author <who> [--file path] [--rename new]
//!   wikiledger list <web> [--category c]
//!   wikiledger search <web> <query>

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wikiledger::{
    Author, MarkupMode, NewWeb, OpenStore, PageEdit, PageSnapshot, SqliteStore, WikiConfig,
    WikiEngine, WikiError,
};

#[derive(Parser)]
#[command(
    name = "wikiledger",
    version,
    about = "Wiki page ledger with revision history and a reference graph"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, env = "WIKILEDGER_DB", global = true)]
    db: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage webs
    Web {
        #[command(subcommand)]
        action: WebAction,
    },
    /// Work with a single page
    Page {
        #[command(subcommand)]
        action: PageAction,
    },
    /// Register a file name so links to it resolve
    File {
        web: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Orphaned and wanted pages
    List {
        web: String,
        /// Restrict to pages in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Categories used in a web
    Categories { web: String },
    /// Search page names and content
    Search { web: String, query: String },
    /// Most recently revised pages
    Recent {
        web: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WebAction {
    /// Create a new web
    Create {
        name: String,
        address: String,
        #[arg(long, default_value = "markdown", value_parser = parse_markup)]
        markup: MarkupMode,
        #[arg(long)]
        password: Option<String>,
        /// Only [[bracketed]] links count
        #[arg(long)]
        brackets_only: bool,
    },
    /// List all webs
    List,
}

#[derive(Subcommand)]
enum PageAction {
    /// Create or update a page; content comes from --file or stdin
    Write {
        web: String,
        name: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        origin: Option<String>,
        /// New name for the page
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a page (current revision, or --revision N counting from 1)
    Show {
        web: String,
        name: String,
        #[arg(long)]
        revision: Option<usize>,
    },
    /// List a page's revisions
    History { web: String, name: String },
    /// Re-save an earlier revision (index counts from 0)
    Rollback {
        web: String,
        name: String,
        index: usize,
        #[arg(long)]
        origin: Option<String>,
    },
    /// Delete a page and its history
    Delete { web: String, name: String },
    /// Mark a page as being edited
    Lock {
        web: String,
        name: String,
        #[arg(long)]
        by: String,
    },
    /// Clear a page's edit lock
    Unlock { web: String, name: String },
}

fn parse_markup(value: &str) -> Result<MarkupMode, String> {
    value
        .parse::<MarkupMode>()
        .map_err(|bad| format!("unknown markup '{}' (textile, markdown, mixed)", bad))
}

/// Get the default database path (~/.local/share/wikiledger/wiki.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let wiki_dir = data_dir.join("wikiledger");
    std::fs::create_dir_all(&wiki_dir).ok();
    wiki_dir.join("wiki.db")
}

fn open_engine(config: Option<&Path>, db: Option<PathBuf>) -> Result<WikiEngine, String> {
    let config = match config {
        Some(path) => WikiConfig::load(path).map_err(|e| e.to_string())?,
        None => WikiConfig::default(),
    };
    let db_path = db
        .or_else(|| config.database.clone())
        .unwrap_or_else(default_db_path);
    tracing::debug!("Opening database {:?}", db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(WikiEngine::new(Arc::new(store), config))
}

fn print_json(value: &impl Serialize) -> Result<(), WikiError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| WikiError::Validation(format!("Cannot encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn print_names(names: &[String], empty: &str) {
    if names.is_empty() {
        println!("{}", empty);
    }
    for name in names {
        println!("{}", name);
    }
}

fn print_snapshot(snapshot: &PageSnapshot) {
    println!(
        "{} (revision {} of {}, by {} at {})",
        snapshot.name(),
        snapshot.current.id,
        snapshot.revision_count,
        snapshot.current.author,
        snapshot.revised_at().to_rfc3339()
    );
}

fn read_content(file: Option<&Path>) -> Result<String, WikiError> {
    let mut content = String::new();
    let read = match file {
        Some(path) => std::fs::File::open(path).and_then(|mut f| f.read_to_string(&mut content)),
        None => std::io::stdin().read_to_string(&mut content),
    };
    read.map_err(|e| WikiError::Validation(format!("Cannot read content: {}", e)))?;
    Ok(content)
}

fn cmd_web(engine: &WikiEngine, action: WebAction, json: bool) -> Result<(), WikiError> {
    match action {
        WebAction::Create {
            name,
            address,
            markup,
            password,
            brackets_only,
        } => {
            let mut new_web = NewWeb::new(name, address)
                .with_markup(markup)
                .brackets_only(brackets_only);
            if let Some(password) = password {
                new_web = new_web.with_password(password);
            }
            let web = engine.create_web(&new_web)?;
            if json {
                return print_json(&web);
            }
            println!("Created web '{}' at '{}' ({})", web.name, web.address, web.markup);
        }
        WebAction::List => {
            let webs = engine.webs()?;
            if json {
                return print_json(&webs);
            }
            if webs.is_empty() {
                println!("No webs defined.");
                return Ok(());
            }
            println!("{:<24}  {:<24}  {:<8}", "ADDRESS", "NAME", "MARKUP");
            println!("{}", "-".repeat(60));
            for web in webs {
                println!("{:<24}  {:<24}  {:<8}", web.address, web.name, web.markup);
            }
        }
    }
    Ok(())
}

fn cmd_page(engine: &WikiEngine, action: PageAction, json: bool) -> Result<(), WikiError> {
    match action {
        PageAction::Write {
            web,
            name,
            author,
            origin,
            rename,
            file,
        } => {
            let content = read_content(file.as_deref())?;
            let mut author = Author::new(author);
            if let Some(origin) = origin {
                author = author.with_origin(origin);
            }
            let mut edit = PageEdit::new(name, content, author, Utc::now());
            if let Some(new_name) = rename {
                edit = edit.renamed_to(new_name);
            }
            let snapshot = engine.revise(&web, &edit)?;
            if json {
                return print_json(&snapshot);
            }
            print_snapshot(&snapshot);
        }
        PageAction::Show { web, name, revision } => match revision {
            Some(number) => {
                let revision = engine.revision(&web, &name, number)?;
                if json {
                    return print_json(&revision);
                }
                println!("{}", revision.content);
            }
            None => {
                let snapshot = engine.page(&web, &name)?;
                if json {
                    return print_json(&snapshot);
                }
                print_snapshot(&snapshot);
                if let Some(by) = snapshot.page.locked_by() {
                    if snapshot.page.is_locked(Utc::now(), engine.config().lock_period()) {
                        println!("Locked by {}", by);
                    }
                }
                println!();
                println!("{}", snapshot.content());
            }
        },
        PageAction::History { web, name } => {
            let revisions = engine.revisions(&web, &name)?;
            if json {
                return print_json(&revisions);
            }
            println!("{:>5}  {:<25}  {:<20}  {}", "INDEX", "REVISED AT", "AUTHOR", "ORIGIN");
            for (index, revision) in revisions.iter().enumerate() {
                println!(
                    "{:>5}  {:<25}  {:<20}  {}",
                    index,
                    revision.revised_at.to_rfc3339(),
                    revision.author.name,
                    revision.author.origin.as_deref().unwrap_or("-")
                );
            }
        }
        PageAction::Rollback {
            web,
            name,
            index,
            origin,
        } => {
            let snapshot = engine.rollback(&web, &name, index, origin.as_deref(), Utc::now())?;
            if json {
                return print_json(&snapshot);
            }
            print_snapshot(&snapshot);
        }
        PageAction::Delete { web, name } => {
            engine.delete_page(&web, &name)?;
            println!("Deleted page '{}'", name);
        }
        PageAction::Lock { web, name, by } => {
            engine.lock(&web, &name, Utc::now(), &by)?;
            println!("Locked page '{}' for {}", name, by);
        }
        PageAction::Unlock { web, name } => {
            engine.unlock(&web, &name)?;
            println!("Unlocked page '{}'", name);
        }
    }
    Ok(())
}

fn run(engine: &WikiEngine, command: Commands, json: bool) -> Result<(), WikiError> {
    match command {
        Commands::Web { action } => cmd_web(engine, action, json),
        Commands::Page { action } => cmd_page(engine, action, json),
        Commands::File {
            web,
            name,
            description,
        } => {
            engine.register_file(&web, &name, &description)?;
            println!("Registered file '{}'", name);
            Ok(())
        }
        Commands::List { web, category } => {
            let listing = engine.listing(&web, category.as_deref())?;
            if json {
                return print_json(&listing);
            }
            println!("Orphaned pages:");
            print_names(&listing.orphans, "  (none)");
            println!();
            println!("Wanted pages:");
            print_names(&listing.wanted, "  (none)");
            Ok(())
        }
        Commands::Categories { web } => {
            let categories = engine.categories(&web)?;
            if json {
                return print_json(&categories);
            }
            print_names(&categories, "No categories.");
            Ok(())
        }
        Commands::Search { web, query } => {
            let results = engine.search(&web, &query)?;
            if json {
                return print_json(&results);
            }
            print_names(&results.results, "No matches.");
            Ok(())
        }
        Commands::Recent { web, offset, limit } => {
            let recent = engine.recent(&web, offset, limit)?;
            if json {
                return print_json(&recent);
            }
            for snapshot in &recent {
                print_snapshot(snapshot);
            }
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let engine = match open_engine(cli.config.as_deref(), cli.db) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = match run(&engine, cli.command, cli.json) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}
