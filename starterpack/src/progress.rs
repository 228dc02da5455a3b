//! Terminal rendering of the workflow's event stream

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use starterpack::events::{LogLevel, RunEvent};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;

/// Drain `rx` until every sender is gone, drawing one bar per download.
pub async fn render(mut rx: UnboundedReceiver<RunEvent>) {
    let bars = MultiProgress::new();
    let mut active: HashMap<String, ProgressBar> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Log { level, message } => {
                let line = match level {
                    LogLevel::Info => message,
                    LogLevel::Warn => format!("warning: {message}"),
                    LogLevel::Error => format!("error: {message}"),
                };
                let _ = bars.println(line);
            }
            RunEvent::Progress {
                filename,
                downloaded,
                total,
            } => {
                let bar = active
                    .entry(filename.clone())
                    .or_insert_with(|| bars.add(download_bar(&filename, total)));
                bar.set_position(downloaded);

                if total.is_some_and(|total| downloaded >= total) {
                    if let Some(bar) = active.remove(&filename) {
                        bar.finish_and_clear();
                    }
                }
            }
            RunEvent::Status(status) => {
                let _ = bars.println(format!("==> {status}"));
            }
        }
    }

    for bar in active.into_values() {
        bar.abandon();
    }
}

fn download_bar(filename: &str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner} {bytes} {msg}") {
                bar.set_style(style);
            }
            bar
        }
    };
    bar.set_message(filename.to_string());
    bar
}
