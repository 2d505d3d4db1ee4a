//! gymvision-ident - Gym equipment photo identification
//!
//! Command-line front end for the identification engine. Results are printed
//! to stdout as pretty JSON; logs go to stderr (or the configured log file).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gymvision_ident::{IdentConfig, IdentificationEngine};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

/// Command-line arguments for gymvision-ident
#[derive(Parser, Debug)]
#[command(name = "gymvision-ident")]
#[command(about = "Identify gym equipment in photos using an ensemble of models")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/gymvision/gymvision.toml)
    #[arg(short, long, env = "GYMVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding model artifacts, tables and images
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the equipment in one or more images
    Identify {
        /// Image files (jpg, png, webp...)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Show catalog metadata for a label or exercise key
    Lookup {
        text: String,
    },
    /// List every exercise in the catalog
    Exercises,
    /// Compare model vocabularies with the catalog
    Vocabulary,
    /// Check that the inference runtime and model artifacts are present
    Check,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = IdentConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    gymvision_common::logging::init("gymvision_ident", &config.logging)
        .context("Failed to initialize logging")?;

    info!("Starting gymvision-ident {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config.root_folder(args.root_folder.as_deref());
    info!("Root folder: {}", root_folder.display());

    let engine = IdentificationEngine::from_config(&config, &root_folder)
        .context("Failed to initialize identification engine")?;

    match args.command {
        Command::Identify { images } => {
            let mut failures = 0usize;
            for path in images {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read image {}", path.display()))?;

                let output = match engine.identify(&bytes).await {
                    Ok(result) => json!({
                        "success": true,
                        "image": path.display().to_string(),
                        "result": result,
                    }),
                    Err(e) => {
                        if !e.is_recoverable() {
                            failures += 1;
                        }
                        warn!("{}: {}", path.display(), e);
                        json!({
                            "success": false,
                            "image": path.display().to_string(),
                            "error": e.code(),
                            "message": e.to_string(),
                        })
                    }
                };
                print_json(&output)?;
            }

            let released = engine.cache().unload_all();
            info!("Released {} resident models", released);

            if failures > 0 {
                anyhow::bail!("{} images could not be processed", failures);
            }
        }
        Command::Lookup { text } => print_json(&engine.lookup(&text))?,
        Command::Exercises => print_json(&engine.exercises())?,
        Command::Vocabulary => print_json(&engine.vocabulary_report())?,
        Command::Check => {
            let report = engine.health();
            print_json(&report)?;
            if !report.is_ready() {
                anyhow::bail!("Engine is not ready to identify images");
            }
        }
    }

    Ok(())
}
