use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::File;
use std::path::{Path, PathBuf};

use pagemark::library::{ContentSource, DirectoryLibrary, DocumentId, detect_format};
use pagemark::panic_handler::initialize_panic_handler;
use pagemark::persistence::{JsonFileStore, STORE_FILENAME, last_read, load_progress};
use pagemark::settings::Settings;
use pagemark::{Document, build_document};

/// Inspect chapter structure and saved progress of EPUB, PDF and text books
#[derive(Parser, Debug)]
#[command(name = "pagemark", version, about)]
struct Cli {
    #[arg(long, global = true, default_value = "pagemark.log")]
    log_file: PathBuf,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the chapter list of a document
    Toc { path: PathBuf },
    /// Print format, size and saved progress of a document
    Info { path: PathBuf },
    /// List readable documents under a directory
    Library {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level: LevelFilter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {:?}", cli.log_file))?,
    )?;
    initialize_panic_handler();

    info!("Starting pagemark");
    let settings = Settings::load(cli.config.as_deref());

    match cli.command {
        Command::Toc { path } => {
            let (_, document) = open(&path, &settings)?;
            println!("{} [{}]", document.title, document.format.as_str());
            for (idx, chapter) in document.chapters().iter().enumerate() {
                let indent = "  ".repeat(usize::from(chapter.level.saturating_sub(1)));
                println!("{idx:>4}  {indent}{}", chapter.label);
            }
        }
        Command::Info { path } => {
            let (id, document) = open(&path, &settings)?;
            let store_path = settings.data_dir().map(|dir| dir.join(STORE_FILENAME));
            let store = JsonFileStore::load_or_ephemeral(store_path.as_deref());
            let key = id.storage_key();

            println!("Title:    {}", document.title);
            println!("Format:   {}", document.format.as_str());
            println!("Units:    {}", document.total_units);
            println!("Chapters: {}", document.len());
            println!("Key:      {key}");
            match load_progress(&store, &key) {
                Some(progress) => println!(
                    "Progress: {:.1}% at {:?} ({})",
                    progress.percentage,
                    progress.format_locator,
                    progress.timestamp.format("%Y-%m-%d %H:%M")
                ),
                None => println!("Progress: none"),
            }
            if let Some(last) = last_read(&store) {
                println!("Last read: {}", last.path);
            }
        }
        Command::Library { dir } => {
            let library = DirectoryLibrary::new(dir);
            for book in library.list()? {
                println!("{:<8} {}", book.format.as_str(), book.display_name);
            }
        }
    }

    info!("Shutting down pagemark");
    Ok(())
}

/// Documents named on the command line are keyed by their absolute path.
fn open(path: &Path, settings: &Settings) -> Result<(DocumentId, Document)> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("No such document {}", path.display()))?;
    let id = DocumentId::new(absolute);
    let raw = DirectoryLibrary::new(".").fetch(&id)?;
    let format = detect_format(id.path(), &raw);
    let loaded = build_document(format, raw, &id.file_name(), settings)
        .with_context(|| format!("Could not open {}", path.display()))?;
    Ok((id, loaded.document))
}
