// src/session.rs

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::debrid::DebridClient;
use crate::error::Result;
use crate::fetcher::{sanitize_file_name, sha256_file, Fetcher};
use crate::matcher::TitleMatcher;
use crate::models::{Chapter, DownloadItem, Manga, Service};
use crate::reader::ChapterReader;
use crate::state_store::StateStore;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A download item that plausibly contains a catalog work.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub item: DownloadItem,
    /// Best fraction of title words found in the item name.
    pub coverage: f32,
}

/// Every service the application needs, built once and shared by handle.
pub struct Session {
    config: Config,
    store: StateStore,
    credentials: Credentials,
    catalog: CatalogClient,
    debrid: DebridClient,
    fetcher: Fetcher,
}

impl Session {
    pub async fn open(config: Config) -> Result<Self> {
        let store = StateStore::open(&config.database_path).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: StateStore) -> Result<Self> {
        let credentials = Credentials::new(store.clone())
            .with_override(Service::Catalog, config.token_override(Service::Catalog))
            .with_override(Service::Debrid, config.token_override(Service::Debrid));
        let catalog = CatalogClient::new(&config, credentials.clone())?;
        let debrid = DebridClient::new(&config, credentials.clone())?;
        let fetcher = Fetcher::new(&config)?;

        Ok(Self {
            config,
            store,
            credentials,
            catalog,
            debrid,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    pub fn debrid(&self) -> &DebridClient {
        &self.debrid
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Manga>> {
        self.catalog.search(query, limit).await
    }

    /// A work together with its chapter list, fetched concurrently.
    pub async fn manga_details(&self, manga_id: &str) -> Result<(Manga, Vec<Chapter>)> {
        tokio::try_join!(
            self.catalog.manga(manga_id),
            self.catalog.chapters(manga_id, None)
        )
    }

    /// Tracked download items whose names match `manga`'s title or one of its alternates.
    pub async fn suggest_downloads(&self, manga: &Manga) -> Result<Vec<Suggestion>> {
        let items = self.debrid.items().await?;
        let mut titles = vec![manga.title.as_str()];
        titles.extend(manga.alt_titles.iter().map(String::as_str));

        let suggestions = suggest(&titles, items);
        info!(title = %manga.title, found = suggestions.len(), "download suggestions");
        Ok(suggestions)
    }

    /// Resolve a chapter's pages and open a reader on them.
    ///
    /// With the auto-download preference set, pages are fetched to the cache
    /// first and the reader points at the local files.
    pub async fn open_chapter(
        &self,
        manga_id: &str,
        chapter_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ChapterReader> {
        let preferences = self.store.preferences().await?;
        let mut pages = self.catalog.pages(chapter_id, preferences.quality).await?;

        if preferences.auto_download {
            let dir = self.chapter_dir(manga_id, chapter_id);
            let files = self.fetcher.fetch_chapter(&pages, &dir, cancel).await?;
            pages = files
                .iter()
                .map(|f| f.to_string_lossy().into_owned())
                .collect();
        }

        ChapterReader::open(self.store.clone(), manga_id, chapter_id, pages).await
    }

    pub async fn track_magnet(&self, magnet: &str) -> Result<String> {
        self.debrid.add_magnet(magnet).await
    }

    /// Download a completed item's content into `dir`. Returns the file path.
    ///
    /// The content's SHA-256 is logged so a retrieval can be checked later.
    pub async fn retrieve(
        &self,
        item_id: &str,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let item = self.debrid.item(item_id).await?;
        let link = self.debrid.retrieval_link(&item).await?;
        let name = if link.filename.is_empty() {
            &item.name
        } else {
            &link.filename
        };
        let destination = dir.join(sanitize_file_name(name));

        let outcome = match self.fetcher.fetch(&link.download_url, &destination, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(item_id, error = %e, "retrieval failed");
                return Err(e);
            }
        };
        let sha256 = sha256_file(&destination).await?;
        info!(item_id, path = %destination.display(), ?outcome, %sha256, "retrieved item");
        Ok(destination)
    }

    fn chapter_dir(&self, manga_id: &str, chapter_id: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(sanitize_file_name(manga_id))
            .join(sanitize_file_name(chapter_id))
    }
}

/// Items matching any of `titles`, best coverage first.
pub fn suggest(titles: &[&str], items: Vec<DownloadItem>) -> Vec<Suggestion> {
    let matchers: Vec<TitleMatcher> = titles.iter().map(|t| TitleMatcher::new(t)).collect();

    let mut suggestions: Vec<Suggestion> = items
        .into_iter()
        .filter_map(|item| {
            let coverage = matchers
                .iter()
                .filter(|m| m.is_match(&item.name))
                .map(|m| m.coverage(&item.name))
                .reduce(f32::max)?;
            Some(Suggestion { item, coverage })
        })
        .collect();
    suggestions.sort_by(|a, b| b.coverage.total_cmp(&a.coverage));
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::canned::serve;
    use crate::models::DownloadStatus;

    fn item(id: &str, name: &str) -> DownloadItem {
        DownloadItem {
            id: id.into(),
            name: name.into(),
            size_bytes: 0,
            progress: 1.0,
            status: DownloadStatus::Downloaded,
            links: Vec::new(),
            files: Vec::new(),
        }
    }

    #[test]
    fn suggests_using_alternate_titles() {
        let items = vec![
            item("1", "Shingeki no Kyojin v01-34 [Digital]"),
            item("2", "Some Unrelated Manga Vol 1"),
            item("3", "[Group] Attack on Titan - Vol 05 (2013).cbz"),
            item("4", "titan attack extras"),
        ];
        let found = suggest(&["Attack on Titan", "Shingeki no Kyojin"], items);
        let ids: Vec<&str> = found.iter().map(|s| s.item.id.as_str()).collect();
        // "titan attack extras" has two of three words
        assert_eq!(ids, vec!["1", "3", "4"]);
        assert_eq!(found[0].coverage, 1.0);
        assert_eq!(found[1].coverage, 1.0);
        assert!(found[2].coverage < 1.0);
    }

    #[test]
    fn partial_matches_rank_below_full() {
        let items = vec![
            item("a", "quick fox brown extra"),
            item("b", "The Quick Brown Fox"),
        ];
        let found = suggest(&["The Quick Brown Fox"], items);
        assert_eq!(found[0].item.id, "b");
        assert!((found[1].coverage - 0.75).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn session_wires_config_tokens() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut config = Config::default();
        config.debrid_token = Some("from-config".into());
        let session = Session::with_store(config, store).unwrap();

        assert_eq!(
            session.credentials().token(Service::Debrid).await.as_deref(),
            Some("from-config")
        );
        assert_eq!(session.credentials().token(Service::Catalog).await, None);
    }

    #[tokio::test]
    async fn suggestions_need_debrid_token() {
        let store = StateStore::open_in_memory().await.unwrap();
        let session = Session::with_store(Config::default(), store).unwrap();
        let manga = Manga {
            id: "m1".into(),
            title: "Berserk".into(),
            alt_titles: Vec::new(),
            description: String::new(),
            cover_url: None,
            authors: Vec::new(),
            tags: Vec::new(),
            status: Default::default(),
            year: None,
        };
        let err = session.suggest_downloads(&manga).await.unwrap_err();
        assert!(matches!(err, Error::MissingCredential(Service::Debrid)));
    }

    #[tokio::test]
    async fn chapter_dir_is_sanitized() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut config = Config::default();
        config.cache_dir = PathBuf::from("/cache");
        let session = Session::with_store(config, store).unwrap();
        assert_eq!(session.chapter_dir("m/1", "c:2"), PathBuf::from("/cache/m_1/c_2"));
    }

    #[tokio::test]
    async fn retrieves_completed_item_content() {
        let (base_url, server) = serve(vec![
            (
                200,
                r#"{"id": "AB12", "filename": "Berserk v01.cbz", "progress": 100,
                    "status": "downloaded", "links": ["https://host.test/d/AAA"]}"#,
            ),
            (
                200,
                r#"{"download": "{base}/dl/AAA/Berserk%20v01.cbz", "filename": "Berserk: v01.cbz", "filesize": 3}"#,
            ),
            (200, "abc"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().await.unwrap();
        let config = Config {
            debrid_base_url: base_url,
            debrid_token: Some("rd-token".into()),
            ..Config::default()
        };
        let session = Session::with_store(config, store).unwrap();

        let path = session
            .retrieve("AB12", dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("Berserk_ v01.cbz"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abc");
        assert!(!crate::fetcher::part_path(&path).exists());

        let requests = server.await.unwrap();
        assert_eq!(requests[0].line, "GET /torrents/info/AB12 HTTP/1.1");
        assert_eq!(requests[1].line, "POST /unrestrict/link HTTP/1.1");
        assert_eq!(requests[2].line, "GET /dl/AAA/Berserk%20v01.cbz HTTP/1.1");
    }

    #[tokio::test]
    async fn unfinished_item_is_not_retrieved() {
        let (base_url, _server) = serve(vec![(
            200,
            r#"{"id": "CD34", "filename": "Berserk", "progress": 40, "status": "downloading"}"#,
        )])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().await.unwrap();
        let config = Config {
            debrid_base_url: base_url,
            debrid_token: Some("rd-token".into()),
            ..Config::default()
        };
        let session = Session::with_store(config, store).unwrap();

        let err = session
            .retrieve("CD34", dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotReady(ref id) if id == "CD34"));
    }
}
