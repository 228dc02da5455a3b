use crate::error::Result;
use crate::events::{CancelFlag, Reporter};
use crate::github::GitHubClient;
use crate::resolver::ResolvedAsset;
use crate::retry::{with_retry, RetryConfig};
use crate::router::StagedItem;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Stream `asset` into `dest_dir` and hand it over for routing.
///
/// Transient failures are retried; a partially written file from a failed
/// attempt is overwritten by the next one. Cancellation interrupts the
/// transfer mid-stream, including a stalled read or a rate-limit wait.
pub async fn fetch(
    client: &GitHubClient,
    asset: &ResolvedAsset,
    dest_dir: &Path,
    retry: &RetryConfig,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<StagedItem> {
    let local_path = dest_dir.join(local_name(&asset.filename));

    reporter.info(format!("Downloading {}...", asset.filename));
    cancel
        .guard(with_retry(
            &format!("Downloading {}", asset.filename),
            retry,
            || download_once(client, asset, &local_path, reporter),
        ))
        .await?;

    Ok(StagedItem::new(
        asset.source_label.clone(),
        asset.filename.clone(),
        local_path,
    ))
}

async fn download_once(
    client: &GitHubClient,
    asset: &ResolvedAsset,
    local_path: &Path,
    reporter: &Reporter,
) -> Result<()> {
    let response = client.download(&asset.url, &asset.filename).await?;
    let total = response.content_length().filter(|len| *len > 0);
    let mut file = tokio::fs::File::create(local_path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    reporter.progress(&asset.filename, 0, total);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        reporter.progress(&asset.filename, downloaded, total);
    }
    file.flush().await?;

    tracing::debug!(
        "Downloaded {} bytes to {}",
        downloaded,
        local_path.display()
    );
    Ok(())
}

/// Drop assets that would land on a local path already claimed by an
/// earlier one. The first occurrence wins.
pub fn distinct_local_names(assets: Vec<ResolvedAsset>) -> Vec<ResolvedAsset> {
    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| {
            let fresh = seen.insert(local_name(&asset.filename));
            if !fresh {
                tracing::debug!("Skipping duplicate match {}", asset.filename);
            }
            fresh
        })
        .collect()
}

/// The asset name reduced to a single path component.
fn local_name(filename: &str) -> PathBuf {
    Path::new(filename)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_strips_directories() {
        assert_eq!(local_name("FBI.cia"), PathBuf::from("FBI.cia"));
        assert_eq!(local_name("../../etc/passwd"), PathBuf::from("passwd"));
        assert_eq!(local_name(".."), PathBuf::from("download"));
    }

    fn asset(url: &str, filename: &str) -> ResolvedAsset {
        ResolvedAsset {
            url: url.to_string(),
            filename: filename.to_string(),
            source_label: "FBI".to_string(),
        }
    }

    #[test]
    fn test_duplicate_local_names_are_fetched_once() {
        let assets = vec![
            asset("https://example.com/1/FBI.cia", "FBI.cia"),
            asset("https://example.com/FBI.3dsx", "FBI.3dsx"),
            asset("https://example.com/1/FBI.cia", "FBI.cia"),
            asset("https://example.com/2/FBI.cia", "nested/FBI.cia"),
        ];

        let distinct = distinct_local_names(assets);

        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].url, "https://example.com/1/FBI.cia");
        assert_eq!(distinct[1].filename, "FBI.3dsx");
    }
}
