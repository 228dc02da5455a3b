use crate::error::Result;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Whether `filename` names a zip container.
pub fn is_zip(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".zip")
}

/// Extract every member of `archive` under `dest_dir`.
///
/// Members whose names would escape `dest_dir` are skipped. Returns the files
/// written, in archive order.
pub fn extract_zip<R>(archive: &mut zip::ZipArchive<R>, dest_dir: &Path) -> Result<Vec<PathBuf>>
where
    R: Read + io::Seek,
{
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative) = file.enclosed_name() else {
            warn!("Skipping unsafe archive member {}", file.name());
            continue;
        };
        let outpath = dest_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        let mode = file.unix_mode();
        write_member(&mut file, &outpath, mode)?;
        written.push(outpath);
    }

    Ok(written)
}

/// Write one archive member to `outpath`, creating parents and replacing any
/// existing file.
pub fn write_member(member: &mut impl Read, outpath: &Path, unix_mode: Option<u32>) -> Result<()> {
    if let Some(parent) = outpath.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut outfile = fs::File::create(outpath)?;
    io::copy(member, &mut outfile)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = unix_mode {
            // Keep the owner able to overwrite it on the next run.
            fs::set_permissions(outpath, fs::Permissions::from_mode(mode | 0o600))?;
        }
    }
    #[cfg(not(unix))]
    let _ = unix_mode;

    debug!("Extracted {}", outpath.display());
    Ok(())
}

/// Move `from` to `to`, overwriting. Falls back to copy + remove when a
/// rename is impossible (different filesystems).
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.is_file() {
        fs::remove_file(to)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                e
            );
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, data) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_is_zip() {
        assert!(is_zip("Luma3DSv13.zip"));
        assert!(is_zip("GODMODE9.ZIP"));
        assert!(!is_zip("FBI.cia"));
        assert!(!is_zip("zip.3dsx"));
    }

    #[test]
    fn test_extract_zip_preserves_tree() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("luma.zip");
        build_zip(
            &archive_path,
            &[("boot.firm", b"boot"), ("config/readme.txt", b"hi")],
        );

        let out = dir.path().join("out");
        let mut archive = zip::ZipArchive::new(fs::File::open(&archive_path).unwrap()).unwrap();
        let written = extract_zip(&mut archive, &out).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(out.join("boot.firm")).unwrap(), b"boot");
        assert_eq!(fs::read(out.join("config/readme.txt")).unwrap(), b"hi");
    }

    #[test]
    fn test_extract_zip_skips_escaping_members() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("evil.zip");
        build_zip(&archive_path, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

        let out = dir.path().join("out");
        let mut archive = zip::ZipArchive::new(fs::File::open(&archive_path).unwrap()).unwrap();
        let written = extract_zip(&mut archive, &out).unwrap();

        assert_eq!(written, vec![out.join("ok.txt")]);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_move_file_overwrites_destination() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("FBI.cia");
        let to = dir.path().join("cias").join("FBI.cia");
        fs::create_dir_all(to.parent().unwrap()).unwrap();
        fs::write(&to, b"old").unwrap();
        fs::write(&from, b"new").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }
}
