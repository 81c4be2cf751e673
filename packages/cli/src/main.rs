#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the field parcel panel pipeline.
//!
//! `build` runs the whole pipeline, `resolve` stops after identity
//! resolution and reshape, and `inspect-raster` summarizes one crop raster.

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::PanelConfig;

#[derive(Parser)]
#[command(name = "field_panel", about = "Longitudinal field parcel panel builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the full panel: resolve, harmonize, gap-fill, write
    Build(RunArgs),
    /// Resolve identities and reshape only, without harmonization or gap-fill
    Resolve(RunArgs),
    /// Print metadata and a class histogram for one raster
    InspectRaster {
        /// `GeoTIFF` to inspect
        path: PathBuf,
        /// Crop code CSV used to label classes
        #[arg(long)]
        codes: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file; defaults apply when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Long-format `GeoJSON` output
    #[arg(long)]
    output: Option<PathBuf>,
    /// Long-format CSV output
    #[arg(long)]
    csv_output: Option<PathBuf>,
    /// Wide CSV output with year-suffixed columns
    #[arg(long)]
    wide_output: Option<PathBuf>,
}

impl RunArgs {
    fn load_config(&self) -> Result<PanelConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => PanelConfig::load(path)?,
            None => {
                log::info!("No config file given, using defaults");
                PanelConfig::default()
            }
        };

        if let Some(path) = &self.output {
            config.output.geojson = Some(path.clone());
        }
        if let Some(path) = &self.csv_output {
            config.output.csv = Some(path.clone());
        }
        if let Some(path) = &self.wide_output {
            config.output.wide_csv = Some(path.clone());
        }

        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = field_panel_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            let config = args.load_config()?;
            pipeline::run_build(&config, &multi)?.print();
        }
        Commands::Resolve(args) => {
            let config = args.load_config()?;
            pipeline::run_resolve(&config, &multi)?.print();
        }
        Commands::InspectRaster { path, codes } => {
            pipeline::inspect_raster(&path, codes.as_deref())?;
        }
    }

    Ok(())
}
