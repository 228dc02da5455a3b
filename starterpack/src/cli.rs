use crate::config::Config;
use crate::descriptors::Profile;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "starterpack",
    version,
    about = "Download the latest 3DS homebrew releases and stage them in SD card layout",
    long_about = None
)]
pub struct Args {
    /// Which set of projects to stage
    #[clap(long, value_enum, default_value_t = Profile::Starter)]
    pub profile: Profile,

    /// Ignore cached release data and ask GitHub again
    #[clap(long)]
    pub refresh: bool,

    /// Delete the release cache before running
    #[clap(long)]
    pub clear_cache: bool,

    /// Staging directory (default from config: "3DS Starter Pack")
    #[clap(long)]
    pub staging_dir: Option<String>,

    /// Existing directory (e.g. the SD card root) to merge the staged files into
    #[clap(short = 'o', long)]
    pub output_dir: Option<String>,

    /// Merge into the output directory without asking
    #[clap(short = 'y', long)]
    pub yes: bool,

    /// GitHub personal access token
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Configuration file path
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Save --output-dir and --token to the configuration file
    #[clap(long)]
    pub remember: bool,

    /// Enable verbose output
    #[clap(long)]
    pub verbose: bool,
}

impl Args {
    /// `--config`, or the per-user default location.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Default `tracing` directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "starterpack=debug"
        } else {
            "starterpack=warn"
        }
    }

    /// Copy the values `--remember` persists into `config`.
    pub fn remember_into(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.default.output_dir = Some(dir.clone());
        }
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            config.github.token = Some(token.clone());
        }
    }
}
