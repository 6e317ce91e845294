// src/fetcher.rs

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::build_client;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HASH_CHUNK: usize = 64 * 1024;

/// Result of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(u64),
    /// The destination already existed.
    Skipped,
}

/// Streams remote files to disk: chapter page images and completed items.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_concurrent: usize,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?, config.max_concurrent_fetches))
    }

    pub fn with_client(client: Client, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Download `url` into `destination` through a `.part` file.
    ///
    /// On failure or cancellation the partial file is removed, including when
    /// the returned future is dropped before it finishes.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if tokio::fs::try_exists(destination).await? {
            debug!(path = %destination.display(), "already fetched");
            return Ok(FetchOutcome::Skipped);
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = PartFile::new(part_path(destination));
        let written = self.stream_to(url, part.path(), cancel).await?;
        tokio::fs::rename(part.path(), destination).await?;
        part.keep();
        debug!(url, bytes = written, "fetched");
        Ok(FetchOutcome::Downloaded(written))
    }

    async fn stream_to(&self, url: &str, part: &Path, cancel: &CancellationToken) -> Result<u64> {
        let resp = self.client.get(url).send().await?.error_for_status()?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(part)
            .await?;

        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Download every page of a chapter into `dir`, at most `max_concurrent` at once.
    /// Returns the page files in reading order.
    pub async fn fetch_chapter(
        &self,
        pages: &[String],
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;

        let files: Vec<PathBuf> = stream::iter(pages.iter().enumerate())
            .map(|(index, url)| {
                let destination = dir.join(page_file_name(index, url));
                async move {
                    self.fetch(url, &destination, cancel).await?;
                    Ok::<_, Error>(destination)
                }
            })
            .buffered(self.max_concurrent)
            .try_collect::<Vec<PathBuf>>()
            .await
            .inspect_err(|e| warn!(dir = %dir.display(), error = %e, "chapter fetch failed"))?;

        info!(dir = %dir.display(), pages = files.len(), "chapter fetched");
        Ok(files)
    }
}

/// An in-flight `.part` file, removed on drop unless kept.
struct PartFile {
    path: PathBuf,
    kept: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.kept {
            // drop cannot await
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// `<index>-<sha256(url) prefix>.<ext>`, so order survives a directory listing.
pub fn page_file_name(index: usize, url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("{index:04}-{}.{}", &digest[..12], url_extension(url))
}

fn url_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "img",
    }
}

/// Temporary path used while a transfer is in flight.
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Make a service-provided file name safe to use as a single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Hex SHA-256 of a file's content, read in chunks.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut chunk = Vec::with_capacity(HASH_CHUNK);
    while file.read_buf(&mut chunk).await? > 0 {
        hasher.update(&chunk);
        chunk.clear();
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn page_names_keep_order_and_extension() {
        let a = page_file_name(0, "https://n.test/data/h/1-abc.png");
        let b = page_file_name(12, "https://n.test/data/h/2-def.jpg?token=1");
        assert!(a.starts_with("0000-") && a.ends_with(".png"), "{a}");
        assert!(b.starts_with("0012-") && b.ends_with(".jpg"), "{b}");
        assert_eq!(a.len(), "0000-".len() + 12 + ".png".len());
        assert_eq!(page_file_name(0, "https://n.test/page"), page_file_name(0, "https://n.test/page"));
        assert!(page_file_name(0, "https://n.test/page").ends_with(".img"));
    }

    #[test]
    fn part_and_sanitized_names() {
        assert_eq!(part_path(Path::new("/tmp/a.cbz")), PathBuf::from("/tmp/a.cbz.part"));
        assert_eq!(sanitize_file_name("One Piece/v01: Romance?.cbz"), "One Piece_v01_ Romance_.cbz");
        assert_eq!(sanitize_file_name(" .. "), "download");
    }

    #[tokio::test]
    async fn hashes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn existing_destination_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        tokio::fs::write(&path, b"cached").await.unwrap();

        let fetcher = Fetcher::with_client(Client::new(), 2);
        let outcome = fetcher
            .fetch("http://127.0.0.1:9/page.png", &path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Skipped);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let fetcher = Fetcher::with_client(Client::new(), 2);
        let result = fetcher
            .fetch("http://127.0.0.1:9/x", &dir.path().join("x"), &token)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!dir.path().join("x.part").exists());
    }

    #[tokio::test]
    async fn connection_failure_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.png");
        let fetcher = Fetcher::with_client(Client::new(), 1);
        let result = fetcher
            .fetch("http://127.0.0.1:9/x.png", &dest, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    /// Serves every request with a large body that stalls after the first chunk.
    async fn stalling_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = stream.read(&mut request).await;
                    let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 1048576\r\n\r\n";
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&[0u8; 1024]).await;
                    let _ = stream.flush().await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });
        base_url
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn slow_pages(base_url: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{base_url}/data/h/{i}.png")).collect()
    }

    #[tokio::test]
    async fn cancelled_chapter_leaves_no_partial_files() {
        let base_url = stalling_server().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::with_client(Client::new(), 3);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });
        let result = fetcher
            .fetch_chapter(&slow_pages(&base_url, 3), dir.path(), &token)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");
        assert_eq!(leftovers(dir.path()), Vec::<String>::new());
    }

    #[tokio::test]
    async fn dropped_chapter_fetch_leaves_no_partial_files() {
        let base_url = stalling_server().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::with_client(Client::new(), 3);
        let token = CancellationToken::new();

        let pages = slow_pages(&base_url, 3);
        let fetch = fetcher.fetch_chapter(&pages, dir.path(), &token);
        let timed_out = tokio::time::timeout(Duration::from_millis(300), fetch).await;

        assert!(timed_out.is_err());
        assert_eq!(leftovers(dir.path()), Vec::<String>::new());
    }

    #[tokio::test]
    async fn part_file_is_kept_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("a.part");
        let kept = dir.path().join("b.part");
        tokio::fs::write(&dropped, b"x").await.unwrap();
        tokio::fs::write(&kept, b"x").await.unwrap();

        drop(PartFile::new(dropped.clone()));
        PartFile::new(kept.clone()).keep();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }
}
