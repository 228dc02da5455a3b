//! Merge-copy of the finished staging tree into an operator-chosen location.

use crate::error::{Result, StarterPackError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// What a merge would write, shown to the operator before anything happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub staging: PathBuf,
    pub destination: PathBuf,
    /// Files to copy, relative to `staging`.
    pub files: Vec<PathBuf>,
}

impl MergePlan {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub copied: usize,
    /// Destination files that existed before and were replaced.
    pub overwritten: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(MergeSummary),
    Declined,
}

/// List every file under `staging` as a relative path, sorted.
pub fn plan(staging: &Path, destination: &Path) -> Result<MergePlan> {
    let mut files = Vec::new();
    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry.map_err(|e| merge_error(destination, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| merge_error(destination, e))?;
        files.push(relative.to_path_buf());
    }

    Ok(MergePlan {
        staging: staging.to_path_buf(),
        destination: destination.to_path_buf(),
        files,
    })
}

/// Copy `staging` into `destination` once `approve` accepts the plan.
///
/// Same-named destination files are overwritten; destination-only files are
/// never touched. Nothing is written when `approve` returns `false`.
pub fn merge(
    staging: &Path,
    destination: &Path,
    approve: impl FnOnce(&MergePlan) -> bool,
) -> Result<MergeOutcome> {
    if !destination.is_dir() {
        return Err(StarterPackError::Merge {
            destination: destination.display().to_string(),
            message: "destination is not an existing directory".to_string(),
        });
    }

    let plan = plan(staging, destination)?;
    if !approve(&plan) {
        info!("Merge into {} declined", destination.display());
        return Ok(MergeOutcome::Declined);
    }

    let mut summary = MergeSummary {
        copied: 0,
        overwritten: 0,
    };
    for relative in &plan.files {
        let from = staging.join(relative);
        let to = destination.join(relative);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| merge_error(destination, e))?;
        }
        if to.exists() {
            summary.overwritten += 1;
        }
        fs::copy(&from, &to).map_err(|e| merge_error(destination, e))?;
        debug!("Copied {} -> {}", from.display(), to.display());
        summary.copied += 1;
    }

    info!(
        "Merged {} files into {} ({} overwritten)",
        summary.copied,
        destination.display(),
        summary.overwritten
    );
    Ok(MergeOutcome::Merged(summary))
}

fn merge_error(destination: &Path, err: impl std::fmt::Display) -> StarterPackError {
    StarterPackError::Merge {
        destination: destination.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    fn staging_tree() -> tempfile::TempDir {
        let staging = tempdir().unwrap();
        fs::create_dir_all(staging.path().join("luma/payloads")).unwrap();
        fs::create_dir_all(staging.path().join("cias")).unwrap();
        fs::write(staging.path().join("boot.firm"), b"boot").unwrap();
        fs::write(staging.path().join("luma/payloads/GodMode9.firm"), b"gm9").unwrap();
        fs::write(staging.path().join("cias/FBI.cia"), b"fbi").unwrap();
        staging
    }

    #[test]
    fn test_merge_is_idempotent() {
        let staging = staging_tree();
        let dest = tempdir().unwrap();

        merge(staging.path(), dest.path(), |_| true).unwrap();
        let first = snapshot(dest.path());
        let outcome = merge(staging.path(), dest.path(), |_| true).unwrap();
        let second = snapshot(dest.path());

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(
            outcome,
            MergeOutcome::Merged(MergeSummary {
                copied: 3,
                overwritten: 3
            })
        );
    }

    #[test]
    fn test_merge_keeps_destination_only_files() {
        let staging = staging_tree();
        let dest = tempdir().unwrap();
        fs::write(dest.path().join("boot.firm"), b"older boot").unwrap();
        fs::create_dir_all(dest.path().join("Nintendo 3DS")).unwrap();
        fs::write(dest.path().join("Nintendo 3DS/save.bin"), b"save").unwrap();

        merge(staging.path(), dest.path(), |_| true).unwrap();

        assert_eq!(fs::read(dest.path().join("boot.firm")).unwrap(), b"boot");
        assert_eq!(
            fs::read(dest.path().join("Nintendo 3DS/save.bin")).unwrap(),
            b"save"
        );
    }

    #[test]
    fn test_declined_plan_writes_nothing() {
        let staging = staging_tree();
        let dest = tempdir().unwrap();
        let mut seen = 0;

        let outcome = merge(staging.path(), dest.path(), |plan| {
            seen = plan.file_count();
            false
        })
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Declined);
        assert_eq!(seen, 3);
        assert!(snapshot(dest.path()).is_empty());
    }

    #[test]
    fn test_missing_destination_fails() {
        let staging = staging_tree();
        let dest = tempdir().unwrap();
        let err = merge(staging.path(), &dest.path().join("absent"), |_| true).unwrap_err();
        assert!(matches!(err, StarterPackError::Merge { .. }));
    }

    #[test]
    fn test_plan_lists_relative_paths_sorted() {
        let staging = staging_tree();
        let plan = plan(staging.path(), Path::new("/mnt/sd")).unwrap();
        assert_eq!(
            plan.files,
            vec![
                PathBuf::from("boot.firm"),
                PathBuf::from("cias/FBI.cia"),
                PathBuf::from("luma/payloads/GodMode9.firm"),
            ]
        );
    }
}
