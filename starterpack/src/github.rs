use crate::config::RunConfig;
use crate::error::{Result, StarterPackError};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

const API_ACCEPT: &str = "application/vnd.github+json";
const DOWNLOAD_ACCEPT: &str = "application/octet-stream";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Rate-limit signals carried by a 403/429 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// `x-ratelimit-remaining`
    pub remaining: Option<u64>,
    /// `x-ratelimit-reset`, unix seconds
    pub reset: Option<i64>,
    /// `retry-after`, seconds
    pub retry_after: Option<u64>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        }

        Self {
            remaining: number(headers, "x-ratelimit-remaining"),
            reset: number(headers, "x-ratelimit-reset"),
            retry_after: number(headers, RETRY_AFTER.as_str()),
        }
    }

    /// Seconds to wait, floored at one. `None` when the response carries no
    /// usable signal.
    pub fn wait_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.remaining == Some(0) {
            if let Some(reset) = self.reset {
                let wait = (reset - now.timestamp()).max(1);
                return Some(u64::try_from(wait).unwrap_or(1));
            }
        }
        self.retry_after.map(|secs| secs.max(1))
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset.and_then(|reset| DateTime::from_timestamp(reset, 0))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0) && self.reset.is_some()
    }
}

/// Outcome of one "latest release" request.
#[derive(Debug, Clone)]
pub enum LatestRelease {
    Modified {
        release: Release,
        etag: Option<String>,
    },
    NotModified,
    /// HTTP 403 or 429. Whether it is really a rate limit is decided from `limit`.
    Limited { status: u16, limit: RateLimit },
}

/// Source of release metadata.
pub trait ReleaseApi {
    fn latest_release(
        &self,
        owner: &str,
        repo: &str,
        validator: Option<&str>,
    ) -> impl Future<Output = Result<LatestRelease>> + Send;

    fn has_credential(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("starterpack/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            timeout: config.timeout,
        })
    }

    pub fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.api_url, owner, repo)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Start a streamed asset download. The body is left unread.
    pub async fn download(&self, url: &str, filename: &str) -> Result<reqwest::Response> {
        let response = self
            .authorize(self.http.get(url).header(ACCEPT, DOWNLOAD_ACCEPT))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            if let Some(wait_secs) = RateLimit::from_headers(response.headers()).wait_secs(Utc::now()) {
                return Err(StarterPackError::RateLimited {
                    repo: url.to_string(),
                    wait_secs,
                });
            }
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(StarterPackError::DownloadFailed {
            asset: filename.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }
}

impl ReleaseApi for GitHubClient {
    async fn latest_release(
        &self,
        owner: &str,
        repo: &str,
        validator: Option<&str>,
    ) -> Result<LatestRelease> {
        let mut request = self
            .authorize(self.http.get(self.latest_release_url(owner, repo)))
            .header(ACCEPT, API_ACCEPT)
            .timeout(self.timeout);
        if let Some(validator) = validator.filter(|v| !v.is_empty()) {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(LatestRelease::NotModified);
        }
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            return Ok(LatestRelease::Limited {
                status: status.as_u16(),
                limit: RateLimit::from_headers(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(StarterPackError::ApiStatus {
                repo: format!("{owner}/{repo}"),
                status: status.as_u16(),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let release: Release = response.json().await?;

        Ok(LatestRelease::Modified { release, etag })
    }

    fn has_credential(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_wait_from_reset_header() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let reset = now.timestamp() + 30;
        let mut map = headers(&[("x-ratelimit-remaining", "0")]);
        map.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );

        let limit = RateLimit::from_headers(&map);
        assert!(limit.is_exhausted());
        assert_eq!(limit.wait_secs(now), Some(30));
        assert_eq!(limit.reset_at().map(|t| t.timestamp()), Some(reset));
    }

    #[test]
    fn test_reset_in_the_past_waits_one_second() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let limit = RateLimit {
            remaining: Some(0),
            reset: Some(now.timestamp() - 100),
            retry_after: None,
        };
        assert_eq!(limit.wait_secs(now), Some(1));
    }

    #[test]
    fn test_retry_after_header() {
        let limit = RateLimit::from_headers(&headers(&[
            ("x-ratelimit-remaining", "12"),
            ("retry-after", "45"),
        ]));
        assert!(!limit.is_exhausted());
        assert_eq!(limit.wait_secs(Utc::now()), Some(45));

        let zero = RateLimit::from_headers(&headers(&[("retry-after", "0")]));
        assert_eq!(zero.wait_secs(Utc::now()), Some(1));
    }

    #[test]
    fn test_no_signal() {
        let limit = RateLimit::from_headers(&headers(&[("x-ratelimit-remaining", "59")]));
        assert_eq!(limit.wait_secs(Utc::now()), None);
        assert_eq!(RateLimit::default().wait_secs(Utc::now()), None);
    }

    #[test]
    fn test_release_json_parsing() {
        let release: Release = serde_json::from_str(
            r#"{
                "tag_name": "v13.1",
                "assets": [
                    {"name": "Luma3DSv13.1.zip", "browser_download_url": "https://example.com/l.zip", "size": 12}
                ],
                "body": "notes"
            }"#,
        )
        .unwrap();
        assert_eq!(release.tag_name.as_deref(), Some("v13.1"));
        assert_eq!(release.assets[0].name, "Luma3DSv13.1.zip");

        let empty: Release = serde_json::from_str("{}").unwrap();
        assert!(empty.assets.is_empty());
    }
}
