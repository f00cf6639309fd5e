mod cli;
mod registry;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use modelprobe_core::ModelArtifact;
use registry::InspectOptions;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    let (artifact, options) = match cli.command {
        Command::Features { model_path, params } => (
            ModelArtifact::JoblibPath(model_path),
            InspectOptions { params },
        ),
        Command::Graph { model_path } => {
            (ModelArtifact::OnnxPath(model_path), InspectOptions::default())
        }
        Command::Inspect { path, params } => {
            (ModelArtifact::from_path(path)?, InspectOptions { params })
        }
    };

    let report = registry::inspect(&artifact, options)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report.render(&mut out).context("failed to write report")?;
    out.flush().context("failed to write report")?;
    Ok(())
}

fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .with_context(|| format!("invalid log filter {filter:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}
