//! Places fetched artifacts into the staging tree.
//!
//! Each descriptor carries one [`RoutingRule`]. Archives are opened for
//! random access and filtered member by member; plain files are moved whole
//! into a directory picked by extension.

use crate::error::{Result, StarterPackError};
use crate::utils::{extract_zip, is_zip, move_file, write_member};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum RoutingRule {
    Archive(ArchiveRule),
    Extension(ExtensionRule),
}

/// A member extracted by base name to a fixed location.
#[derive(Debug, Clone)]
pub struct PayloadMember {
    /// Matched case-insensitively against the member's base name.
    pub name: String,
    /// Relative to the staging root.
    pub destination: PathBuf,
}

impl PayloadMember {
    pub fn new(name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }
}

/// Member filters, applied in order: payload, subtree, everything.
#[derive(Debug, Clone, Default)]
pub struct ArchiveRule {
    pub payload: Option<PayloadMember>,
    /// Members whose path contains this prefix keep their archive path under the root.
    pub subtree: Option<String>,
    pub extract_all: bool,
}

impl ArchiveRule {
    pub fn extract_all() -> Self {
        Self {
            extract_all: true,
            ..Default::default()
        }
    }
}

/// Extension → directory map. Unmatched files land in the staging root.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRule {
    map: Vec<(String, PathBuf)>,
}

impl ExtensionRule {
    pub fn new(map: &[(&str, &str)]) -> Self {
        Self {
            map: map
                .iter()
                .map(|(ext, dir)| (ext.to_lowercase(), PathBuf::from(dir)))
                .collect(),
        }
    }

    /// Directory for `filename`, relative to the staging root.
    pub fn directory_for(&self, filename: &str) -> PathBuf {
        let lower = filename.to_lowercase();
        self.map
            .iter()
            .find(|(ext, _)| lower.ends_with(ext.as_str()))
            .map(|(_, dir)| dir.clone())
            .unwrap_or_default()
    }
}

/// A downloaded file awaiting routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedItem {
    pub source_label: String,
    pub filename: String,
    pub local_path: PathBuf,
    pub is_archive: bool,
}

impl StagedItem {
    pub fn new(source_label: impl Into<String>, filename: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        Self {
            source_label: source_label.into(),
            is_archive: is_zip(&filename),
            filename,
            local_path: local_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Plain file moved to this path.
    Moved(PathBuf),
    Extracted {
        files: Vec<PathBuf>,
        /// Name of the expected payload member when the archive lacked it.
        missing_payload: Option<String>,
    },
    /// The local file was gone before routing.
    Skipped,
}

/// Route one staged item under `root`.
///
/// An unreadable archive is an error for this item only. The caller logs it
/// and moves on.
pub fn route(item: &StagedItem, rule: &RoutingRule, root: &Path) -> Result<RouteOutcome> {
    if !item.local_path.is_file() {
        debug!(
            "{}: {} vanished before routing, skipping",
            item.source_label,
            item.local_path.display()
        );
        return Ok(RouteOutcome::Skipped);
    }

    match rule {
        RoutingRule::Extension(rule) => {
            let target = root.join(rule.directory_for(&item.filename)).join(&item.filename);
            move_file(&item.local_path, &target)?;
            debug!("Moved {} to {}", item.filename, target.display());
            Ok(RouteOutcome::Moved(target))
        }
        RoutingRule::Archive(_) if !item.is_archive => {
            warn!(
                "{}: {} is not an archive, moving it to the staging root",
                item.source_label, item.filename
            );
            let target = root.join(&item.filename);
            move_file(&item.local_path, &target)?;
            Ok(RouteOutcome::Moved(target))
        }
        RoutingRule::Archive(rule) => route_archive(item, rule, root),
    }
}

fn route_archive(item: &StagedItem, rule: &ArchiveRule, root: &Path) -> Result<RouteOutcome> {
    let corrupt = |e: zip::result::ZipError| StarterPackError::ArchiveExtraction {
        file: item.filename.clone(),
        reason: e.to_string(),
    };

    let file = fs::File::open(&item.local_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(corrupt)?;

    if rule.extract_all {
        let files = extract_zip(&mut archive, root)?;
        debug!("Extracted {} files from {}", files.len(), item.filename);
        fs::remove_file(&item.local_path)?;
        return Ok(RouteOutcome::Extracted {
            files,
            missing_payload: None,
        });
    }

    let mut files = Vec::new();
    let mut payload_found = false;

    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(corrupt)?;
        if member.is_dir() {
            continue;
        }
        let Some(relative) = member.enclosed_name() else {
            warn!("Skipping unsafe archive member {}", member.name());
            continue;
        };
        let mode = member.unix_mode();

        let base_name = relative.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Some(payload) = rule
            .payload
            .as_ref()
            .filter(|payload| base_name.eq_ignore_ascii_case(&payload.name))
        {
            let target = root.join(&payload.destination);
            write_member(&mut member, &target, mode)?;
            debug!("Extracted {} to {}", payload.name, target.display());
            payload_found = true;
            files.push(target);
            continue;
        }

        let in_subtree = rule
            .subtree
            .as_deref()
            .is_some_and(|prefix| member.name().contains(prefix));
        if in_subtree {
            let target = root.join(&relative);
            write_member(&mut member, &target, mode)?;
            files.push(target);
        } else {
            debug!("Ignoring archive member {}", member.name());
        }
    }

    drop(archive);
    fs::remove_file(&item.local_path)?;

    let missing_payload = match &rule.payload {
        Some(payload) if !payload_found => {
            debug!("{} not found in {}", payload.name, item.filename);
            Some(payload.name.clone())
        }
        _ => None,
    };

    debug!("Extracted {} files from {}", files.len(), item.filename);
    Ok(RouteOutcome::Extracted {
        files,
        missing_payload,
    })
}
