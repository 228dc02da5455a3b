use std::path::{Path, PathBuf};

/// A file that must exist under the staging root once routing finishes.
#[derive(Debug, Clone)]
pub struct VerificationTarget {
    pub label: String,
    /// Relative to the staging root.
    pub expected_path: PathBuf,
}

impl VerificationTarget {
    pub fn new(label: impl Into<String>, expected_path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            expected_path: expected_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub label: String,
    pub path: PathBuf,
    pub found: bool,
}

/// Existence check only; never fails.
pub fn verify(targets: &[VerificationTarget], root: &Path) -> Vec<VerificationResult> {
    targets
        .iter()
        .map(|target| {
            let path = root.join(&target.expected_path);
            let found = path.is_file();
            if found {
                tracing::debug!("{} found at {}", target.label, path.display());
            } else {
                tracing::debug!("{} missing at {}", target.label, path.display());
            }
            VerificationResult {
                label: target.label.clone(),
                path,
                found,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_reports_each_target_in_order() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("luma/payloads")).unwrap();
        fs::write(root.path().join("luma/payloads/GodMode9.firm"), b"firm").unwrap();

        let targets = vec![
            VerificationTarget::new("GodMode9.firm", "luma/payloads/GodMode9.firm"),
            VerificationTarget::new("Luma's boot.firm", "boot.firm"),
        ];
        let report = verify(&targets, root.path());

        assert_eq!(report.len(), 2);
        assert!(report[0].found);
        assert_eq!(report[1].label, "Luma's boot.firm");
        assert!(!report[1].found);
        assert_eq!(report[1].path, root.path().join("boot.firm"));
    }

    #[test]
    fn test_directory_does_not_count_as_found() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("boot.firm")).unwrap();

        let report = verify(
            &[VerificationTarget::new("boot", "boot.firm")],
            root.path(),
        );
        assert!(!report[0].found);
    }

    #[test]
    fn test_missing_root_is_not_an_error() {
        let root = tempdir().unwrap();
        let report = verify(
            &[VerificationTarget::new("boot", "boot.firm")],
            &root.path().join("never-created"),
        );
        assert!(!report[0].found);
    }
}
