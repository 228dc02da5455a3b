use crate::cache::ReleaseCache;
use crate::config::RunConfig;
use crate::descriptors::RepositoryDescriptor;
use crate::error::{Result, StarterPackError};
use crate::events::{CancelFlag, Reporter};
use crate::fetcher::{distinct_local_names, fetch};
use crate::github::GitHubClient;
use crate::merge::{self, MergeOutcome, MergePlan};
use crate::resolver::{resolve, ResolveOptions};
use crate::router::{route, RouteOutcome, StagedItem};
use crate::verify::{verify, VerificationResult};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    DoneWithWarnings,
    Failed(String),
}

impl RunStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed(_))
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Done => write!(f, "Complete!"),
            RunStatus::DoneWithWarnings => write!(f, "Complete with warnings"),
            RunStatus::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub warnings: Vec<String>,
    /// Files written into the staging root.
    pub staged: Vec<PathBuf>,
    pub verification: Vec<VerificationResult>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            status: RunStatus::Done,
            warnings: Vec::new(),
            staged: Vec::new(),
            verification: Vec::new(),
        }
    }
}

/// One staging run: resolve, fetch, route and verify every descriptor of the
/// configured profile, strictly in table order.
pub struct Pipeline {
    config: RunConfig,
    reporter: Reporter,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: RunConfig, reporter: Reporter, cancel: CancelFlag) -> Self {
        Self {
            config,
            reporter,
            cancel,
        }
    }

    /// Run to completion. Only an error escaping the workflow yields
    /// [`RunStatus::Failed`]; per-item problems end up in `warnings`.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();

        match self.execute(&mut report).await {
            Ok(()) if report.warnings.is_empty() => report.status = RunStatus::Done,
            Ok(()) => report.status = RunStatus::DoneWithWarnings,
            Err(StarterPackError::Cancelled) => {
                self.reporter.error("Run cancelled; files staged so far were kept.");
                report.status = RunStatus::Failed("cancelled".to_string());
            }
            Err(e) => {
                self.reporter.error(format!("An unexpected error occurred: {e}"));
                report.status = RunStatus::Failed(e.to_string());
            }
        }

        self.reporter.status(report.status.to_string());
        report
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        let root = self.config.staging_root.clone();
        let profile = self.config.profile;

        self.reporter.info(format!("Staging into {}", root.display()));
        for dir in profile.directories() {
            std::fs::create_dir_all(root.join(dir))?;
        }

        let client = GitHubClient::new(&self.config)?;
        let mut cache = ReleaseCache::load(&self.config.cache_path);
        let options = ResolveOptions::from_config(&self.config);
        let downloads = tempfile::tempdir()?;
        if self.config.token.is_none() {
            self.reporter
                .info("No GitHub token configured; anonymous API limits apply.");
        }

        for (index, descriptor) in profile.descriptors().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(StarterPackError::Cancelled);
            }
            if index > 0 && !self.config.request_pause.is_zero() {
                let pause = self.config.request_pause;
                self.cancel
                    .guard(async {
                        tokio::time::sleep(pause).await;
                        Ok(())
                    })
                    .await?;
            }

            self.reporter.status(format!("Processing {}", descriptor.label));
            self.process(descriptor, &client, &mut cache, &options, downloads.path(), report)
                .await?;
        }

        self.reporter.status("Verifying");
        let targets = profile.verification();
        let results = verify(&targets, &root);
        for result in &results {
            if result.found {
                self.reporter
                    .info(format!("Verification: {} found. OK.", result.label));
            } else {
                let message = format!("{} NOT FOUND at {}", result.label, result.path.display());
                self.reporter.warn(message.clone());
                report.warnings.push(message);
            }
        }
        report.verification = results;

        Ok(())
    }

    async fn process(
        &self,
        descriptor: &RepositoryDescriptor,
        client: &GitHubClient,
        cache: &mut ReleaseCache,
        options: &ResolveOptions,
        download_dir: &Path,
        report: &mut RunReport,
    ) -> Result<()> {
        let resolved = self
            .cancel
            .guard(async {
                Ok(resolve(
                    client,
                    cache,
                    descriptor,
                    options,
                    chrono::Utc::now(),
                    &self.reporter,
                )
                .await)
            })
            .await?;

        if resolved.is_empty() {
            self.give_up(descriptor, format!("No assets resolved for {}", descriptor.label), report);
            return Ok(());
        }

        let mut staged = Vec::new();
        for asset in distinct_local_names(resolved.assets(&descriptor.label)) {
            match fetch(
                client,
                &asset,
                download_dir,
                &self.config.retry,
                &self.reporter,
                &self.cancel,
            )
            .await
            {
                Ok(item) => staged.push(item),
                Err(StarterPackError::Cancelled) => return Err(StarterPackError::Cancelled),
                Err(e) => self.give_up(
                    descriptor,
                    format!("Failed to download {}: {e}", asset.filename),
                    report,
                ),
            }
        }

        for item in staged {
            self.route_item(descriptor, item, report).await?;
        }
        Ok(())
    }

    async fn route_item(
        &self,
        descriptor: &RepositoryDescriptor,
        item: StagedItem,
        report: &mut RunReport,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StarterPackError::Cancelled);
        }

        let rule = descriptor.rule.clone();
        let root = self.config.staging_root.clone();
        let filename = item.filename.clone();
        let outcome = tokio::task::spawn_blocking(move || route(&item, &rule, &root)).await?;

        match outcome {
            Ok(RouteOutcome::Moved(path)) => {
                self.reporter
                    .info(format!("Moved {filename} to {}", path.display()));
                report.staged.push(path);
            }
            Ok(RouteOutcome::Extracted {
                files,
                missing_payload,
            }) => {
                self.reporter
                    .info(format!("Extracted {} files from {filename}", files.len()));
                report.staged.extend(files);
                if let Some(name) = missing_payload {
                    let message = format!("WARNING: {name} not found in {filename}");
                    self.reporter.warn(message.clone());
                    report.warnings.push(message);
                }
            }
            Ok(RouteOutcome::Skipped) => {
                let message = format!("{filename} disappeared before it could be staged");
                self.reporter.warn(message.clone());
                report.warnings.push(message);
            }
            Err(e) => self.give_up(descriptor, format!("Error processing {filename}: {e}"), report),
        }
        Ok(())
    }

    /// Record a per-item failure and point the operator at the manual download.
    fn give_up(&self, descriptor: &RepositoryDescriptor, message: String, report: &mut RunReport) {
        self.reporter.error(message.clone());
        self.reporter.warn(format!(
            "Download {} manually from {}",
            descriptor.label,
            descriptor.releases_page()
        ));
        report.warnings.push(message);
    }

    /// Copy the staging tree into the configured output directory.
    ///
    /// Returns `None` when there is nothing to do: no output directory, a
    /// failed run, or a destination that does not exist.
    pub async fn merge_output<F>(&self, report: &RunReport, approve: F) -> Result<Option<MergeOutcome>>
    where
        F: FnOnce(&MergePlan) -> bool + Send + 'static,
    {
        let Some(destination) = self.config.output_dir.clone() else {
            return Ok(None);
        };
        if report.status.is_failed() {
            self.reporter.warn("Run failed; skipping merge into the output directory.");
            return Ok(None);
        }
        if !destination.is_dir() {
            self.reporter.warn(format!(
                "Output directory {} does not exist; skipping merge.",
                destination.display()
            ));
            return Ok(None);
        }

        let staging = self.config.staging_root.clone();
        let outcome =
            tokio::task::spawn_blocking(move || merge::merge(&staging, &destination, approve))
                .await??;

        match &outcome {
            MergeOutcome::Merged(summary) => self.reporter.info(format!(
                "Copied {} files into the output directory.",
                summary.copied
            )),
            MergeOutcome::Declined => self.reporter.info("Merge skipped."),
        }
        Ok(Some(outcome))
    }
}
