mod annotations;
mod cancel;
mod convert;
mod decl;
mod descriptor;
mod engine;
mod equations;
mod keys;
mod load;
mod solver;
mod telemetry;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::engine::{AnalysisStats, AnalysisStatus, DeclarationFacts, analyze};
use crate::load::load_bundle;
use crate::telemetry::{Telemetry, init_logging};

/// CLI arguments for contrafer execution.
#[derive(Parser, Debug)]
#[command(
    name = "contrafer",
    about = "Deterministic nullness, purity, and contract facts from JVM method equations.",
    version
)]
struct Cli {
    /// Equation bundle to analyze (JSON).
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Report destination; `-` or absent writes to stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// OTLP HTTP endpoint for trace export.
    #[arg(long, value_name = "URL")]
    otlp_endpoint: Option<String>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    init_logging();
    let telemetry = match &cli.otlp_endpoint {
        Some(endpoint) => Some(Telemetry::new(endpoint.clone())?),
        None => None,
    };

    let started_at = Instant::now();
    let bundle = load_bundle(&cli.input)?;
    let cancel = CancelToken::new();
    let output = match analyze(&bundle, &cancel, telemetry.as_ref()) {
        AnalysisStatus::Completed(output) => output,
        AnalysisStatus::Cancelled => {
            if !cli.quiet {
                eprintln!("analysis cancelled; no report written");
            }
            if let Some(telemetry) = &telemetry {
                telemetry.shutdown()?;
            }
            return Ok(());
        }
    };

    let report = build_report(output.facts, output.stats);
    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report)
        .context("failed to serialize report")?;
    writer
        .write_all(b"\n")
        .context("failed to write report")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} convert_ms={} solve_ms={} synthesize_ms={} equations={} declarations={}",
            started_at.elapsed().as_millis(),
            output.timings.convert_duration_ms,
            output.timings.solve_duration_ms,
            output.timings.synthesize_duration_ms,
            report.stats.equations,
            report.stats.declarations
        );
    }

    if let Some(telemetry) = &telemetry {
        telemetry.shutdown()?;
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// Top-level report payload.
#[derive(Serialize)]
struct Report {
    tool: ToolInfo,
    declarations: Vec<DeclarationFacts>,
    stats: AnalysisStats,
}

#[derive(Serialize)]
struct ToolInfo {
    name: &'static str,
    version: &'static str,
}

fn build_report(facts: Vec<DeclarationFacts>, stats: AnalysisStats) -> Report {
    Report {
        tool: ToolInfo {
            name: "contrafer",
            version: env!("CARGO_PKG_VERSION"),
        },
        declarations: facts,
        stats,
    }
}
