//! Messages from the workflow task to whatever presents it.
//!
//! The workflow never touches a UI directly. It pushes [`RunEvent`]s into an
//! unbounded channel and the presentation layer drains them on its own loop.

use crate::error::{Result, StarterPackError};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    /// Transfer progress for one download. `total` is `None` when the server
    /// did not send a content length.
    Progress {
        filename: String,
        downloaded: u64,
        total: Option<u64>,
    },
    Status(String),
}

impl RunEvent {
    /// Completed fraction in `0.0..=1.0`, or `None` when indeterminate.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            RunEvent::Progress {
                downloaded,
                total: Some(total),
                ..
            } if *total > 0 => Some((*downloaded as f64 / *total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Sends operator-facing lines to the channel. Without a channel the lines go
/// to `tracing` instead, so each line has exactly one sink.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Reporter {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Logs through `tracing` only.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into());
    }

    pub fn status(&self, status: impl Into<String>) {
        self.send(RunEvent::Status(status.into()));
    }

    pub fn progress(&self, filename: &str, downloaded: u64, total: Option<u64>) {
        self.send(RunEvent::Progress {
            filename: filename.to_string(),
            downloaded,
            total,
        });
    }

    fn log(&self, level: LogLevel, message: String) {
        if self.tx.is_some() {
            self.send(RunEvent::Log { level, message });
            return;
        }
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
    }

    fn send(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

/// Run-wide cancellation. Checked between steps, and raced against every
/// await that can block for long (network reads, rate-limit waits, pauses).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(CancellationToken);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Drive `future` to completion unless the run is cancelled first, in
    /// which case the future is dropped and [`StarterPackError::Cancelled`]
    /// is returned.
    pub async fn guard<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.0.cancelled() => Err(StarterPackError::Cancelled),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_forwards_events_in_order() {
        let (reporter, mut rx) = Reporter::channel();
        reporter.info("first");
        reporter.progress("a.cia", 5, Some(10));
        reporter.status("Complete!");
        drop(reporter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            RunEvent::Log {
                level: LogLevel::Info,
                message: "first".to_string()
            }
        );
        assert_eq!(events[1].fraction(), Some(0.5));
        assert_eq!(events[2], RunEvent::Status("Complete!".to_string()));
    }

    #[test]
    fn test_indeterminate_progress_has_no_fraction() {
        let event = RunEvent::Progress {
            filename: "a.zip".to_string(),
            downloaded: 1024,
            total: None,
        };
        assert_eq!(event.fraction(), None);
    }

    #[test]
    fn test_silent_reporter_and_closed_channel_do_not_panic() {
        Reporter::silent().warn("nobody listens");

        let (reporter, rx) = Reporter::channel();
        drop(rx);
        reporter.error("receiver gone");
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_channel_is_the_only_sink_when_present() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("starterpack=info"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let (reporter, mut rx) = Reporter::channel();
        tracing::subscriber::with_default(subscriber, || {
            reporter.warn("shown once by the renderer");
            Reporter::silent().warn("no renderer attached");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("shown once by the renderer"));
        assert!(output.contains("no renderer attached"));
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::Log {
                level: LogLevel::Warn,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_drops_pending_future_on_cancel() {
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result: Result<()> = flag
            .guard(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(StarterPackError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_passes_through_result() {
        let value = CancelFlag::new().guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
