use crate::descriptors::Profile;
use crate::error::{Result, StarterPackError};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_STAGING_DIR: &str = "3DS Starter Pack";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Merge destination, typically the SD card root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<String>,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            output_dir: None,
            cache_file: None,
            cache_ttl_hours: default_cache_ttl_hours(),
            request_pause_ms: default_request_pause_ms(),
            max_attempts: default_max_attempts(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GitHubConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

fn default_staging_dir() -> String {
    DEFAULT_STAGING_DIR.to_string()
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_request_pause_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StarterPackError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Write configuration back to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| StarterPackError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("starterpack.toml"))
            .unwrap_or_else(|| PathBuf::from("starterpack.toml"))
    }

    /// Default location of the durable release cache document.
    pub fn default_cache_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.cache_dir().join("starterpack").join("release-cache.json"))
            .unwrap_or_else(|| PathBuf::from("3ds_starter_pack_cache.json"))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.default
            .cache_file
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(Self::default_cache_path)
    }
}

/// Everything one run needs, resolved once and passed by reference.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub profile: Profile,
    pub staging_root: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub cache_path: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub force_refresh: bool,
    pub token: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
    pub request_pause: Duration,
    pub retry: RetryConfig,
}

impl RunConfig {
    pub fn from_config(config: &Config, profile: Profile) -> Self {
        let ttl_hours = i64::try_from(config.default.cache_ttl_hours).unwrap_or(i64::MAX / 3600);
        Self {
            profile,
            staging_root: expand_home(&config.default.staging_dir),
            output_dir: config.default.output_dir.as_deref().map(expand_home),
            cache_path: config.cache_path(),
            cache_ttl: chrono::Duration::hours(ttl_hours),
            force_refresh: false,
            token: config.github.token.clone().filter(|t| !t.is_empty()),
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.default.timeout),
            request_pause: Duration::from_millis(config.default.request_pause_ms),
            retry: RetryConfig {
                max_attempts: config.default.max_attempts,
                ..Default::default()
            },
        }
    }

    /// Apply command line arguments on top of the file configuration.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.staging_dir {
            self.staging_root = expand_home(dir);
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = Some(expand_home(dir));
        }
        if let Some(token) = args.token.as_ref().filter(|t| !t.is_empty()) {
            self.token = Some(token.clone());
        }
        self.force_refresh = args.refresh;
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
        {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
