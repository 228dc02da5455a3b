//! Turns a repository descriptor into download URLs, cache first.

use crate::cache::{CacheEntry, ReleaseCache};
use crate::config::RunConfig;
use crate::descriptors::RepositoryDescriptor;
use crate::error::StarterPackError;
use crate::events::Reporter;
use crate::github::{LatestRelease, RateLimit, Release, ReleaseApi, ReleaseAsset};
use crate::retry::{with_retry, RetryConfig};
use chrono::{DateTime, Utc};

/// Wait applied to a 429 that carries no rate-limit headers.
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub force_refresh: bool,
    pub ttl: chrono::Duration,
    pub retry: RetryConfig,
}

impl ResolveOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            force_refresh: config.force_refresh,
            ttl: config.cache_ttl,
            retry: config.retry.clone(),
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            ttl: chrono::Duration::hours(24),
            retry: RetryConfig::default(),
        }
    }
}

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    /// Fresh cache entry, no request made.
    Cache,
    /// Stale entry confirmed by a 304.
    NotModified,
    Remote,
    /// The release exists but nothing matched the patterns.
    NoMatch,
    /// Every attempt failed.
    Failed,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub urls: Vec<String>,
    pub filenames: Vec<String>,
    pub source: ResolveSource,
}

impl Resolved {
    fn empty(source: ResolveSource) -> Self {
        Self {
            urls: Vec::new(),
            filenames: Vec::new(),
            source,
        }
    }

    fn from_entry(entry: &CacheEntry, source: ResolveSource) -> Self {
        Self {
            urls: entry.urls.clone(),
            filenames: entry.filenames.clone(),
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn assets(&self, label: &str) -> Vec<ResolvedAsset> {
        self.urls
            .iter()
            .zip(&self.filenames)
            .map(|(url, filename)| ResolvedAsset {
                url: url.clone(),
                filename: filename.clone(),
                source_label: label.to_string(),
            })
            .collect()
    }
}

/// One matched remote file, handed straight to the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub url: String,
    pub filename: String,
    pub source_label: String,
}

/// Case-insensitive suffix match, pattern-major.
///
/// Output order follows `patterns`, not the release's asset order, and an
/// asset matched by two patterns appears twice.
pub fn match_assets(assets: &[ReleaseAsset], patterns: &[String]) -> (Vec<String>, Vec<String>) {
    let mut urls = Vec::new();
    let mut filenames = Vec::new();
    for pattern in patterns {
        let pattern = pattern.to_lowercase();
        for asset in assets {
            if asset.name.to_lowercase().ends_with(&pattern) {
                urls.push(asset.browser_download_url.clone());
                filenames.push(asset.name.clone());
            }
        }
    }
    (urls, filenames)
}

enum Answer {
    Modified { release: Release, etag: Option<String> },
    NotModified,
}

/// Resolve the latest matching assets for `descriptor`.
///
/// Never fails: network trouble and empty matches both come back as empty
/// arrays, distinguished by [`Resolved::source`].
pub async fn resolve<A>(
    api: &A,
    cache: &mut ReleaseCache,
    descriptor: &RepositoryDescriptor,
    options: &ResolveOptions,
    now: DateTime<Utc>,
    reporter: &Reporter,
) -> Resolved
where
    A: ReleaseApi + Sync,
{
    let key = descriptor.key();

    if !options.force_refresh {
        if let Some(entry) = cache.get(&key) {
            if entry.is_fresh(now, options.ttl) {
                reporter.info(format!("Using cached data for {key}"));
                return Resolved::from_entry(entry, ResolveSource::Cache);
            }
        }
    }

    let validator = if options.force_refresh {
        None
    } else {
        cache.get(&key).map(|entry| entry.validator.clone())
    };

    let started = tokio::time::Instant::now();
    let key_ref = key.as_str();
    let answer = with_retry(
        &format!("Fetching latest release for {key}"),
        &options.retry,
        || {
            let validator = validator.as_deref();
            async move {
                match api
                    .latest_release(&descriptor.owner, &descriptor.repo, validator)
                    .await?
                {
                    LatestRelease::Modified { release, etag } => Ok(Answer::Modified { release, etag }),
                    LatestRelease::NotModified => Ok(Answer::NotModified),
                    LatestRelease::Limited { status, limit } => {
                        let elapsed = chrono::Duration::from_std(started.elapsed()).unwrap_or_default();
                        Err(rate_limit_error(
                            key_ref,
                            status,
                            &limit,
                            now + elapsed,
                            api.has_credential(),
                            reporter,
                        ))
                    }
                }
            }
        },
    )
    .await;

    match answer {
        Ok(Answer::NotModified) => match cache.get(&key) {
            Some(entry) => {
                reporter.info(format!("No changes for {key} (ETag match), using cached data."));
                Resolved::from_entry(entry, ResolveSource::NotModified)
            }
            None => {
                reporter.warn(format!("{key} answered 304 but nothing is cached"));
                Resolved::empty(ResolveSource::Failed)
            }
        },
        Ok(Answer::Modified { release, etag }) => {
            let (urls, filenames) = match_assets(&release.assets, &descriptor.patterns);
            if urls.is_empty() {
                reporter.warn(format!(
                    "No asset found matching patterns {:?} for {key}.",
                    descriptor.patterns
                ));
                return Resolved::empty(ResolveSource::NoMatch);
            }

            let tag = release.tag_name.as_deref().unwrap_or("untagged");
            for filename in &filenames {
                reporter.info(format!("Found asset for {key} ({tag}): {filename}"));
            }
            let entry = CacheEntry::new(urls.clone(), filenames.clone(), etag.unwrap_or_default(), now);
            if let Err(e) = cache.put(&key, entry) {
                reporter.warn(format!("Could not update cache {}: {e}", cache.path().display()));
            }

            Resolved {
                urls,
                filenames,
                source: ResolveSource::Remote,
            }
        }
        Err(e) => {
            reporter.error(format!("ERROR fetching release for {key}: {e}"));
            Resolved::empty(ResolveSource::Failed)
        }
    }
}

/// Turn a 403/429 into a wait, telling the operator how to avoid it next time.
fn rate_limit_error(
    key: &str,
    status: u16,
    limit: &RateLimit,
    now: DateTime<Utc>,
    has_credential: bool,
    reporter: &Reporter,
) -> StarterPackError {
    let wait_secs = match limit.wait_secs(now) {
        Some(wait) => wait,
        None if status == 429 => DEFAULT_RATE_LIMIT_WAIT_SECS,
        None => {
            return StarterPackError::ApiStatus {
                repo: key.to_string(),
                status,
            }
        }
    };

    if limit.is_exhausted() {
        let until = limit
            .reset_at()
            .map(|reset| reset.with_timezone(&chrono::Local).format(" (until %H:%M:%S)").to_string())
            .unwrap_or_default();
        reporter.warn(format!(
            "GitHub API rate limit exceeded for {key}. No remaining API calls; waiting {wait_secs} seconds{until}."
        ));
    } else {
        reporter.warn(format!(
            "GitHub API secondary rate limit for {key}. Waiting {wait_secs} seconds."
        ));
    }

    if has_credential {
        reporter.warn(
            "A GitHub token is configured but the limit was still hit (likely a secondary rate limit or heavy usage).",
        );
    } else {
        reporter.warn(
            "For higher API limits (5000/hour), create a classic personal access token with the \
             'public_repo' scope at https://github.com/settings/tokens and set GITHUB_TOKEN \
             (or pass --token).",
        );
    }

    StarterPackError::RateLimited {
        repo: key.to_string(),
        wait_secs,
    }
}
