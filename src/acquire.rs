//! Remote source acquisition.
//!
//! `http(s)://` sources are fetched to a local temporary file before
//! playback, because the probe and decode tools are handed a path.

use std::path::Path;

use fp_core::{Error, Result};
use reqwest::{Client, Url};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Stream `url` into a new temporary file and return its path.
///
/// The file keeps the URL's extension (ffprobe relies on it for some
/// image formats) and is deleted when the returned [`TempPath`] is
/// dropped.
///
/// # Errors
///
/// [`Error::Acquisition`] for an unparseable URL, a transport failure or a
/// non-success status; [`Error::Io`] if the temporary file cannot be
/// written.
pub async fn download(client: &Client, url: &str) -> Result<TempPath> {
    let parsed =
        Url::parse(url).map_err(|e| Error::acquisition(url, format!("invalid URL: {e}")))?;
    let suffix = extension_suffix(&parsed);

    let mut response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| Error::acquisition(url, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::acquisition(url, format!("HTTP {status}")));
    }

    let (file, path) = tempfile::Builder::new()
        .prefix("framepump-")
        .suffix(&suffix)
        .tempfile()?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::acquisition(url, format!("body read failed: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::info!(
        "Downloaded {written} bytes from {url} to {}",
        path.display()
    );
    Ok(path)
}

/// `.ext` from the URL path, or empty when there is no usable extension.
fn extension_suffix(url: &Url) -> String {
    Path::new(url.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(url: &str) -> String {
        extension_suffix(&Url::parse(url).unwrap())
    }

    #[test]
    fn suffix_follows_url_path() {
        assert_eq!(suffix("https://example.com/media/clip.mp4"), ".mp4");
        assert_eq!(suffix("https://example.com/a/b/photo.JPG?size=large#top"), ".JPG");
        assert_eq!(suffix("http://example.com/stream"), "");
        assert_eq!(suffix("http://example.com/"), "");
        assert_eq!(suffix("http://example.com/weird.ext%20x"), "");
    }

    #[tokio::test]
    async fn invalid_url_is_acquisition_error() {
        let err = download(&Client::new(), "http://").await.unwrap_err();
        assert!(matches!(err, Error::Acquisition { .. }), "{err}");
    }
}
