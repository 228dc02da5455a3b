use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarterPackError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Configuration error at {path}: {message}")]
    Config { path: String, message: String },

    #[error("GitHub API returned HTTP {status} for {repo}")]
    ApiStatus { repo: String, status: u16 },

    #[error("GitHub API rate limit hit for {repo}; waiting {wait_secs}s")]
    RateLimited { repo: String, wait_secs: u64 },

    #[error("Failed to download {asset} from {url}: HTTP {status} - {message}")]
    DownloadFailed {
        asset: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("Archive extraction failed for {file}: {reason}")]
    ArchiveExtraction { file: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Merge into {destination} failed: {message}")]
    Merge {
        destination: String,
        message: String,
    },
}

impl StarterPackError {
    /// Whether the failure is network-class and worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StarterPackError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_body()
                    || err
                        .status()
                        .map(|s| s.is_server_error())
                        .unwrap_or(!err.is_decode() && !err.is_builder())
            }
            StarterPackError::Io(err) => {
                use std::io::ErrorKind;
                matches!(
                    err.kind(),
                    ErrorKind::ConnectionAborted
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionRefused
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                        | ErrorKind::UnexpectedEof
                )
            }
            StarterPackError::ApiStatus { status, .. } => *status >= 500,
            StarterPackError::DownloadFailed { status, .. } => *status >= 500 || *status == 0,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StarterPackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let reset = StarterPackError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "Connection reset",
        ));
        assert!(reset.is_transient());

        let missing = StarterPackError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(!missing.is_transient());

        let server = StarterPackError::ApiStatus {
            repo: "owner/repo".to_string(),
            status: 502,
        };
        assert!(server.is_transient());

        let not_found = StarterPackError::ApiStatus {
            repo: "owner/repo".to_string(),
            status: 404,
        };
        assert!(!not_found.is_transient());

        let rate_limited = StarterPackError::RateLimited {
            repo: "owner/repo".to_string(),
            wait_secs: 10,
        };
        assert!(!rate_limited.is_transient());
        assert!(!StarterPackError::Cancelled.is_transient());
    }
}
