use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use ioprobe::bench::{DeviceRunner, Phase, ProgressUpdate};
use ioprobe::config::BenchmarkConfig;
use ioprobe::io::{install_interrupt_handler, CleanupRegistry};
use ioprobe::models::DeviceClassification;
use ioprobe::util::units::format_throughput;
use ioprobe::{error, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "Usage: ioprobe [TARGET_DIR]\n\n\
Benchmarks sequential throughput and random-access IOPS in TARGET_DIR\n\
(default: current directory). Settings are read from the ioprobe.toml\n\
file in the user config directory.";

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {}", error::user_friendly_message(&err));
        if let Some(hint) = error::create_fallback_strategy(&err) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let target = match std::env::args_os().nth(1) {
        Some(arg) if arg == "-h" || arg == "--help" => {
            println!("{}", USAGE);
            return Ok(());
        }
        Some(arg) => PathBuf::from(arg),
        None => std::env::current_dir()?,
    };

    let config = BenchmarkConfig::load()?;
    let registry = CleanupRegistry::new();
    install_interrupt_handler(registry.clone())?;

    let device = DeviceClassification::detect(target);
    info!(
        target = %device.mount_path.display(),
        device = %device.device,
        device_type = %device.device_type,
        "starting ioprobe"
    );

    let runner = DeviceRunner::new(config.clone(), registry)?;
    let (tx, rx) = mpsc::channel(64);
    let display = tokio::spawn(show_progress(rx));

    let report = runner.run_device(&device, Some(tx)).await;
    if let Err(err) = display.await {
        warn!(error = %err, "progress display task failed");
    }
    let report = report?;

    println!("\n{}", report.summary());
    let buffered = report.throughput.as_ref().is_some_and(|t| !t.bypass_achieved())
        || report.iops.iter().any(|r| !r.bypass_achieved());
    if buffered {
        println!(
            "Note: the OS cache could not be bypassed for every test; figures may be inflated."
        );
    }

    if config.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// Draw one progress bar per sequential phase until the sender is dropped
async fn show_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    let style = ProgressStyle::with_template("{prefix:17} [{bar:30}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    let mut current: Option<(Phase, ProgressBar)> = None;
    while let Some(update) = rx.recv().await {
        let switch = current.as_ref().map_or(true, |(phase, _)| *phase != update.phase);
        if switch {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            let bar = ProgressBar::new(update.total_bytes).with_style(style.clone());
            bar.set_prefix(update.phase.to_string());
            current = Some((update.phase, bar));
        }
        if let Some((_, bar)) = &current {
            bar.set_position(update.bytes_processed);
            bar.set_message(format_throughput(update.throughput_mbps));
        }
    }

    if let Some((_, bar)) = current {
        bar.finish();
    }
}
