//! meshvault CLI
//!
//! Command-line interface for publishing, downloading and installing
//! versioned model packages.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use meshvault_core::MeshvaultConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// meshvault - versioned repository for 3D model packages
#[derive(Parser, Debug)]
#[command(name = "meshvault")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Version derivation for `update-metadata`
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BumpArg {
    Patch,
    Minor,
    Major,
}

/// Answer to asset identifier conflicts during `install`
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ConflictArg {
    Abort,
    Keep,
    Regenerate,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a new version from a local folder
    Submit {
        /// Folder holding the payload files
        path: PathBuf,

        /// Model id (a new one is generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long)]
        name: String,

        /// Version to publish (e.g., 1.0.0)
        #[arg(long)]
        version: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Asset identifier of a payload file (repeatable)
        #[arg(long = "asset-id")]
        asset_ids: Vec<String>,

        /// Catalog tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Changelog summary
        #[arg(long)]
        summary: Option<String>,

        /// Changelog author
        #[arg(long)]
        author: Option<String>,
    },

    /// Publish a metadata-only revision of an existing version
    UpdateMetadata {
        /// Model id
        model_id: String,

        /// Version to derive from (defaults to the latest in the index)
        #[arg(long)]
        base: Option<String>,

        /// How to derive the new version
        #[arg(long, value_enum, default_value_t = BumpArg::Patch)]
        bump: BumpArg,

        /// Exact new version, overrides --bump
        #[arg(long)]
        version: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// Replacement catalog tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Changelog summary
        #[arg(long)]
        summary: Option<String>,

        /// Changelog author
        #[arg(long)]
        author: Option<String>,
    },

    /// Download a version into the local cache
    Download {
        /// Model id
        model_id: String,

        /// Version (defaults to the latest in the index)
        version: Option<String>,
    },

    /// Download and install a version into the workspace
    Install {
        /// Model id
        model_id: String,

        /// Version (defaults to the latest in the index)
        version: Option<String>,

        /// What to do when asset identifiers belong to other models
        #[arg(long, value_enum, default_value_t = ConflictArg::Abort)]
        on_conflict: ConflictArg,
    },

    /// List the catalog
    Index {
        /// Visibility label held by the caller (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Reload the index from the repository
        #[arg(long)]
        refresh: bool,
    },

    /// List the versions of a model, newest first
    Versions {
        /// Model id
        model_id: String,
    },

    /// Show installed models with newer versions available
    Updates,
}

fn log_level(cli: &Cli, config: &MeshvaultConfig) -> Level {
    if cli.verbose {
        return Level::DEBUG;
    }
    match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MeshvaultConfig::from_file(path)?,
        None => MeshvaultConfig::default(),
    };

    // Initialize logging
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level(&cli, &config))
        .with_target(false);
    let _ = if config.logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    let repo = commands::Repo::open(config).await?;

    match cli.command {
        Commands::Submit {
            path,
            id,
            name,
            version,
            description,
            asset_ids,
            tags,
            summary,
            author,
        } => {
            let request = commands::SubmitRequest {
                id,
                name,
                version,
                description,
                asset_ids,
                tags,
            };
            commands::submit(&repo, &path, request, summary, author).await?;
        }
        Commands::UpdateMetadata {
            model_id,
            base,
            bump,
            version,
            description,
            tags,
            summary,
            author,
        } => {
            let request = commands::MetadataEdit {
                base,
                bump,
                version,
                description,
                tags,
            };
            commands::update_metadata(&repo, &model_id, request, summary, author).await?;
        }
        Commands::Download { model_id, version } => {
            commands::download(&repo, &model_id, version).await?;
        }
        Commands::Install {
            model_id,
            version,
            on_conflict,
        } => {
            commands::install(&repo, &model_id, version, on_conflict).await?;
        }
        Commands::Index { labels, refresh } => {
            commands::index(&repo, &labels, refresh).await?;
        }
        Commands::Versions { model_id } => {
            commands::versions(&repo, &model_id).await?;
        }
        Commands::Updates => {
            commands::updates(&repo).await?;
        }
    }

    Ok(())
}
