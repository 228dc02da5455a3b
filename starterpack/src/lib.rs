//! # starterpack
//!
//! Fetches the latest releases of the usual 3DS homebrew projects from GitHub
//! and stages them in the directory layout an SD card expects.
//!
//! ## Overview
//!
//! A run walks a fixed table of repository descriptors, one at a time:
//!
//! 1. the resolver turns `owner/repo` into download URLs, answering from the
//!    release cache while it is fresh and sending conditional requests when it
//!    is not
//! 2. the fetcher streams each asset into a temporary directory
//! 3. the router extracts archives member by member or moves plain files by
//!    extension into the staging tree
//! 4. the verifier checks that the critical payloads made it
//!
//! The staged tree can then be merge-copied onto an existing SD card root.
//!
//! ## Usage
//!
//! ```bash
//! # Stage Luma3DS, GodMode9 and the homebrew apps into "./3DS Starter Pack"
//! starterpack
//!
//! # Stage the finalize payloads and copy them onto a mounted SD card
//! starterpack --profile finalize --output-dir /media/SD
//!
//! # Ignore the cache for this run
//! starterpack --refresh
//! ```
//!
//! ## Configuration
//!
//! Settings are read from `starterpack.toml` in the user configuration
//! directory. `GITHUB_TOKEN` raises the API rate limit.

/// Command-line interface definitions
pub mod cli;

/// Configuration file handling and the per-run settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Worker-to-presentation events and cancellation
pub mod events;

/// GitHub API client for release metadata and asset downloads
pub mod github;

/// Durable release cache keyed by `owner/repo`
pub mod cache;

/// Release resolution with caching, conditional requests and rate limits
pub mod resolver;

/// Streaming asset downloads
pub mod fetcher;

/// Placement of downloaded artifacts into the staging tree
pub mod router;

/// Existence checks for critical outputs
pub mod verify;

/// Merge-copy of the staging tree into a final destination
pub mod merge;

/// Built-in repository tables and SD card layout
pub mod descriptors;

/// Orchestration of a full staging run
pub mod pipeline;

/// Archive extraction and file moves
pub mod utils;

/// Network retry logic with exponential backoff
pub mod retry;
