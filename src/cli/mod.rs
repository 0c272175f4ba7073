//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::config::{path_display, Config, ConfigKey};
use crate::import::process::ProcessedData;
use crate::import::{
    CardFormat, ImportOptions, ImportReport, ImportService, ImportSource, ImportStatus,
};
use crate::storage::directory::DirectoryStorage;
use crate::storage::memory::MemoryStorage;
use crate::storage::StorageAdapter;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "cardvault")]
#[command(about = "Import character cards, lorebooks, and packages into a local library")]
#[command(
    long_about = "cardvault reads character card files and writes them to a card library.\n\n\
Supported inputs:\n\
  PNG               Cards embedded in tEXt/iTXt chunks (chara, ccv3)\n\
  JSON              Character cards (v2, v3, wrapped) and lorebooks\n\
  CHARX             ZIP packages with card.json and embedded assets\n\
  Voxta             .voxpkg packages with one or more characters\n\n\
Environment Variables:\n\
  CARDVAULT_CONFIG  Path to the configuration file\n\
  RUST_LOG          Log filter, overrides the configured log-filter"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import one or more files into the library
    Import {
        /// Files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Library directory (overrides the configured storage-dir)
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
        /// Run the whole pipeline against an in-memory store
        #[arg(long)]
        dry_run: bool,
        /// Do not keep the original package bytes for multi-character packages
        #[arg(long)]
        no_original: bool,
    },
    /// Parse a file without storing it and print what would be imported
    Inspect {
        /// File to inspect
        file: PathBuf,
    },
    /// Print the detected format of a file
    Detect {
        /// File to examine
        file: PathBuf,
    },
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// storage-dir, keep-original-package, or log-filter
        key: String,
        value: String,
    },
    /// Reset a configuration value to its default
    Unset {
        /// storage-dir, keep-original-package, or log-filter
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let (config, config_path) = Config::load()?;
    init_tracing(config.log_filter(), args.verbose);
    debug!(path = %config_path.display(), "loaded configuration");

    match args.command {
        Commands::Import {
            files,
            store,
            dry_run,
            no_original,
        } => {
            let options = ImportOptions {
                keep_original_package: config.keep_original_package() && !no_original,
            };
            let storage: Arc<dyn StorageAdapter> = if dry_run {
                println!("🧪 Dry run: nothing will be written");
                Arc::new(MemoryStorage::new())
            } else {
                let root = match store {
                    Some(dir) => dir,
                    None => config.storage_dir_or(&Config::default_storage_dir()?),
                };
                println!("📚 Library: {}", path_display(&root));
                Arc::new(DirectoryStorage::open(root).await?)
            };
            let service = ImportService::new(storage, options);

            let mut failed = 0;
            for path in &files {
                let line = match import_file(&service, path).await {
                    Ok(report) => {
                        if report.status() != ImportStatus::Complete {
                            failed += 1;
                        }
                        render_report(&report)
                    }
                    Err(err) => {
                        failed += 1;
                        format!("❌ {err}")
                    }
                };
                println!("{line}");
            }

            if failed > 0 {
                eprintln!("❌ {failed} of {} files did not import cleanly", files.len());
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Inspect { file } => {
            let service = offline_service();
            let source = read_source(&file).await?;
            let format = service.detect(&source)?;
            let processed = service.process(service.parse(&source)?)?;
            let summary = inspect_summary(format, &processed);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Detect { file } => {
            let source = read_source(&file).await?;
            match offline_service().detect(&source) {
                Ok(format) => {
                    println!("{}: {format}", source.display_name());
                    Ok(())
                }
                Err(err) => {
                    eprintln!("❌ {}: {err}", source.display_name());
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { command } => handle_config_command(config, &config_path, command),
    }
}

fn offline_service() -> ImportService {
    ImportService::new(Arc::new(MemoryStorage::new()), ImportOptions::default())
}

async fn read_source(path: &Path) -> Result<ImportSource, Box<dyn Error>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
    let mut source = ImportSource::new(bytes);
    if let Some(name) = path.file_name() {
        source = source.with_filename(name.to_string_lossy());
    }
    Ok(source)
}

async fn import_file(
    service: &ImportService,
    path: &Path,
) -> Result<ImportReport, Box<dyn Error>> {
    let source = read_source(path).await?;
    Ok(service.import(source).await?)
}

/// One status line per file, followed by an indented line per failed entity.
pub fn render_report(report: &ImportReport) -> String {
    let symbol = match report.status() {
        ImportStatus::Complete => "✅",
        ImportStatus::Partial { .. } => "⚠️",
        ImportStatus::Failed => "❌",
    };
    let mut out = format!(
        "{symbol} {} ({}): {} of {} saved",
        report.file,
        report.format,
        report.saved(),
        report.total()
    );
    if let Some(collection) = &report.collection {
        if let Ok(persisted) = &collection.result {
            out.push_str(&format!(
                ", collection \"{}\" with {} members",
                collection.name,
                persisted.member_ids.len()
            ));
        }
    }
    for (name, err) in report.failures() {
        out.push_str(&format!("\n    {name}: {err}"));
    }
    out
}

/// JSON summary of what an import would write.
pub fn inspect_summary(format: CardFormat, processed: &ProcessedData) -> Value {
    let characters: Vec<Value> = processed
        .characters
        .iter()
        .map(|character| {
            let assets: Vec<Value> = character
                .assets
                .iter()
                .map(|asset| {
                    json!({
                        "filename": asset.filename,
                        "mimetype": asset.mimetype,
                        "size": asset.size,
                        "width": asset.width,
                        "height": asset.height,
                        "link": asset.link,
                    })
                })
                .collect();
            json!({
                "meta": character.card.meta,
                "thumbnailBytes": character.thumbnail.as_ref().map(Vec::len),
                "assets": assets,
            })
        })
        .collect();

    let collection = processed.collection.as_ref().map(|collection| {
        json!({
            "meta": collection.card.meta,
            "thumbnailBytes": collection.thumbnail.as_ref().map(Vec::len),
            "members": collection.members,
            "scenarios": collection.scenarios,
            "originalPackageBytes": collection.original_package.as_ref().map(Vec::len),
        })
    });

    json!({
        "format": format.as_str(),
        "characters": characters,
        "collection": collection,
    })
}

fn handle_config_command(
    mut config: Config,
    config_path: &Path,
    command: Option<ConfigCommands>,
) -> Result<(), Box<dyn Error>> {
    match command {
        None => {
            println!("Config file: {}", path_display(config_path));
            config.print_all(&Config::default_storage_dir()?);
            Ok(())
        }
        Some(ConfigCommands::Set { key, value }) => {
            let key: ConfigKey = key.parse()?;
            config.set(key, &value)?;
            config.save_to_path(config_path)?;
            println!("✅ Set {key} to {value}");
            Ok(())
        }
        Some(ConfigCommands::Unset { key }) => {
            let key: ConfigKey = key.parse()?;
            config.unset(key);
            config.save_to_path(config_path)?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}
