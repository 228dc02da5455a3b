mod progress;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use starterpack::cache::ReleaseCache;
use starterpack::cli::Args;
use starterpack::config::{Config, RunConfig};
use starterpack::error::StarterPackError;
use starterpack::events::{CancelFlag, Reporter};
use starterpack::merge::{MergeOutcome, MergePlan};
use starterpack::pipeline::{Pipeline, RunReport, RunStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_directive())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config_path();
    let mut config = Config::load(&config_path).context("Failed to load configuration")?;
    if args.remember {
        args.remember_into(&mut config);
        config
            .save(&config_path)
            .with_context(|| format!("Failed to save configuration to {}", config_path.display()))?;
        println!("Saved settings to {}", config_path.display());
    }

    let mut run_config = RunConfig::from_config(&config, args.profile);
    run_config.merge_with_args(&args);

    if args.clear_cache {
        ReleaseCache::load(&run_config.cache_path)
            .invalidate(None)
            .context("Failed to clear the release cache")?;
        println!("Cleared release cache {}", run_config.cache_path.display());
    }

    let (reporter, events) = Reporter::channel();
    let cancel = CancelFlag::new();
    let pipeline = Arc::new(Pipeline::new(run_config, reporter, cancel.clone()));

    let ui = tokio::spawn(progress::render(events));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
            eprintln!("Cancelling... press Ctrl-C again to quit immediately.");
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let worker = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run().await })
    };
    let report = match worker.await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Workflow task aborted: {}", e);
            RunReport {
                status: RunStatus::Failed(format!("internal error: {e}")),
                ..Default::default()
            }
        }
    };

    let yes = args.yes;
    let merged = pipeline
        .merge_output(&report, move |plan| yes || confirm_merge(plan))
        .await;

    // Dropping the last reporter lets the renderer finish.
    drop(pipeline);
    let _ = ui.await;

    print_summary(&report);
    finish(&report, merged)
}

/// Only a failed run is an error exit; a failed merge is reported and the
/// staged files stay where they are.
fn finish(
    report: &RunReport,
    merged: Result<Option<MergeOutcome>, StarterPackError>,
) -> Result<()> {
    if let Err(e) = merged.context("Failed to merge into the output directory") {
        eprintln!("error: {e:#}");
    }

    if let RunStatus::Failed(reason) = &report.status {
        bail!("Run failed: {reason}");
    }
    Ok(())
}

fn confirm_merge(plan: &MergePlan) -> bool {
    let question = format!(
        "Copy {} files from {} into {}?",
        plan.file_count(),
        plan.staging.display(),
        plan.destination.display()
    );
    inquire::Confirm::new(&question)
        .with_default(false)
        .with_help_message("Existing files with the same name are overwritten; nothing is deleted")
        .prompt()
        .unwrap_or(false)
}

fn print_summary(report: &RunReport) {
    println!();
    for result in &report.verification {
        let mark = if result.found { "OK" } else { "MISSING" };
        println!("  [{mark}] {}", result.label);
    }
    if !report.warnings.is_empty() {
        println!("{} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    println!("{}", report.status);
}
