//! CLI entry point for pet-histogrammer
//!
//! Provides a command-line interface for:
//! - Replaying a recorded list-mode file into sinogram files
//! - Planning the accumulator layout of a configuration (dry run)
//!
//! # Usage
//!
//! Replay a list-mode file:
//! ```bash
//! pet-histogrammer replay scan.l32 --output scan.s --net-trues 5000000
//! ```
//!
//! Check whether a configuration fits:
//! ```bash
//! pet-histogrammer plan --output scan.s --em-mode prompts-and-randoms
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pet_histogrammer::acquisition::{AcquisitionMode, SinogramMode};
use pet_histogrammer::config::HistogrammerConfig;
use pet_histogrammer::frames::FrameCriterion;
use pet_histogrammer::geometry::GeometryProvider;
use pet_histogrammer::logging;
use pet_histogrammer::notify::TracingSink;
use pet_histogrammer::pipeline::Histogrammer;
use pet_histogrammer::session::Session;
use pet_histogrammer::source::FileSource;
use pet_histogrammer::writer::FrameWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pet-histogrammer")]
#[command(about = "List-mode histogramming engine for PET acquisition", long_about = None)]
struct Cli {
    /// Engine settings file
    #[arg(long, global = true, default_value = "config/histogrammer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded list-mode file into sinogram files
    Replay {
        /// List-mode input file (little-endian 32-bit words)
        input: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        /// Frame duration in seconds
        #[arg(long, conflicts_with = "net_trues")]
        duration: Option<u64>,

        /// Net-trues threshold ending the frame
        #[arg(long)]
        net_trues: Option<u64>,

        /// Print the final statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan the accumulator layout and print it as JSON
    Plan {
        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Output sinogram file (relative paths resolve against the storage directory)
    #[arg(long, default_value = "sinogram.s")]
    output: PathBuf,

    /// Radial bins per view
    #[arg(long, default_value_t = 256)]
    projections: u32,

    /// Angular views
    #[arg(long, default_value_t = 288)]
    views: u32,

    /// Emission sinograms (defaults to the scanner's segment table total)
    #[arg(long)]
    em_sinograms: Option<u32>,

    /// Transmission sinograms
    #[arg(long, default_value_t = 0)]
    tx_sinograms: u32,

    /// Emission sinogram mode (net-trues, prompts-and-randoms)
    #[arg(long, default_value = "net-trues")]
    em_mode: SinogramMode,

    /// Transmission sinogram mode
    #[arg(long, default_value = "net-trues")]
    tx_mode: SinogramMode,

    /// Acquisition mode (emission, transmission, simultaneous)
    #[arg(long, default_value = "emission")]
    acquisition: AcquisitionMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = HistogrammerConfig::load_validated(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    logging::init_from_config(&settings).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Replay {
            input,
            scan,
            duration,
            net_trues,
            json,
        } => {
            let criterion = match (duration, net_trues) {
                (Some(secs), _) => FrameCriterion::Duration(Duration::from_secs(secs)),
                (None, Some(threshold)) => FrameCriterion::NetTrues(threshold),
                (None, None) => FrameCriterion::External,
            };
            replay(&settings, input, scan, criterion, json).await
        }
        Commands::Plan { scan } => plan(&settings, scan),
    }
}

fn prepare_session(settings: &HistogrammerConfig, scan: &ScanArgs) -> Result<Session> {
    let mut session = Session::from_settings(settings, Arc::new(TracingSink));
    let em_sinograms = scan
        .em_sinograms
        .unwrap_or_else(|| settings.engine.scanner.geometry().total_sinograms());
    session.set_attributes(scan.projections, scan.views, em_sinograms, scan.tx_sinograms)?;
    session.set_sinogram_mode(scan.em_mode, scan.tx_mode, scan.acquisition)?;
    Ok(session)
}

fn resolve_output(settings: &HistogrammerConfig, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        settings.storage.output_dir.join(output)
    }
}

async fn replay(
    settings: &HistogrammerConfig,
    input: PathBuf,
    scan: ScanArgs,
    criterion: FrameCriterion,
    json: bool,
) -> Result<()> {
    let mut session = prepare_session(settings, &scan)?;
    session.define_frames(1, criterion)?;
    session.configure(resolve_output(settings, &scan.output), Some(input.clone()))?;

    let source = FileSource::open(&input, settings.engine.buffer_words)
        .with_context(|| format!("opening list-mode file {}", input.display()))?;
    let histogrammer = Histogrammer::new(session, FrameWriter::new());

    let control = histogrammer.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current buffer");
            control.stop();
        }
    });

    info!(input = %input.display(), "Starting replay");
    let summary = histogrammer
        .run(source, settings.statistics.interval())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary.statistics)?);
    } else {
        let stats = &summary.statistics;
        println!("State:        {}", stats.state);
        println!(
            "End reason:   {}",
            summary
                .replay
                .end
                .map(|r| r.to_string())
                .unwrap_or_else(|| "none".into())
        );
        println!("Scan time:    {:.3} s", stats.elapsed_secs);
        println!("Prompts:      {}", stats.total_prompts());
        println!("Randoms:      {}", stats.total_randoms());
        println!("Net trues:    {}", stats.net_trues);
        for report in &summary.stores {
            match &report.result {
                Ok(outcome) => {
                    for file in &outcome.files {
                        println!("Wrote:        {}", file.display());
                    }
                }
                Err(e) => eprintln!("Store failed: {}", e),
            }
        }
    }

    if summary.stores.iter().any(|r| !r.is_success()) {
        anyhow::bail!("frame store failed");
    }
    Ok(())
}

fn plan(settings: &HistogrammerConfig, scan: ScanArgs) -> Result<()> {
    let mut session = prepare_session(settings, &scan)?;
    let layout = session.configure(resolve_output(settings, &scan.output), None)?;
    println!("{}", serde_json::to_string_pretty(layout)?);
    Ok(())
}
