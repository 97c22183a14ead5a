// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! tolbrep - command line tools for tolerant B-rep models.
//!
//! # Commands
//!
//! - `tolbrep info MODEL` - Entity counts and tolerant entities
//! - `tolbrep check MODEL` - Run the topology checker
//! - `tolbrep mesh MODEL -o MESH` - Triangulate planar faces to JSON
//! - `tolbrep demo -o MODEL` - Build a sample model and print its undo log
//!
//! # Logging
//!
//! `RUST_LOG` controls log output (default `info,tolbrep_topology=info`);
//! `-v` raises it to debug for the tolbrep crates.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

/// tolbrep - inspect, check and mesh tolerant B-rep models.
#[derive(Parser)]
#[command(name = "tolbrep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log at debug level for the tolbrep crates
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entity counts and tolerances of a model
    Info {
        /// Model file
        input: PathBuf,
    },

    /// Check a model for topology defects
    Check {
        /// Model file
        input: PathBuf,
    },

    /// Triangulate the faces of a model
    Mesh {
        /// Model file
        input: PathBuf,

        /// Output mesh file (JSON)
        #[arg(short, long)]
        output: String,

        /// Session parameter as name=value, repeatable
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },

    /// Build a sample model, print its undo log and save it
    Demo {
        /// Output model file
        #[arg(short, long, default_value = "demo.sat")]
        output: String,
    },
}

fn init_tracing(config: &Config, verbose: bool) {
    let directives = if verbose {
        format!("{},tolbrep_topology=debug,tolbrep_mesh=debug", config.log_filter)
    } else {
        config.log_filter.clone()
    };
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config, cli.verbose);

    tracing::debug!(
        resabs = config.modeling.resabs,
        output_dir = %config.output_dir.display(),
        "starting"
    );

    match &cli.command {
        Commands::Info { input } => commands::info::run(input, &config, &cli),
        Commands::Check { input } => commands::check::run(input, &config, &cli),
        Commands::Mesh {
            input,
            output,
            params,
        } => commands::mesh::run(input, output, params, &config, &cli),
        Commands::Demo { output } => commands::demo::run(output, &config, &cli),
    }
}
