// src/debrid.rs

//! Client for the download ("debrid") service that tracks torrents for the user.

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::{build_client, check_status, decode_json, join_url};
use crate::models::{DownloadFile, DownloadItem, DownloadStatus, Service, UnrestrictedLink};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TorrentDto {
    id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    original_filename: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    original_bytes: Option<u64>,
    /// Percent, 0 to 100.
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    files: Vec<TorrentFileDto>,
}

#[derive(Debug, Deserialize)]
struct TorrentFileDto {
    id: u64,
    path: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    selected: u8,
}

#[derive(Debug, Deserialize)]
struct AddedTorrent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UnrestrictDto {
    download: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    filesize: u64,
}

/// Lists, adds and retrieves items tracked by the download service.
///
/// Every call needs the stored access token.
#[derive(Clone)]
pub struct DebridClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl DebridClient {
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?, config, credentials))
    }

    pub fn with_client(client: Client, config: &Config, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: config.debrid_base_url.clone(),
            credentials,
        }
    }

    /// The user's tracked items, without per-file listings.
    pub async fn items(&self) -> Result<Vec<DownloadItem>> {
        let req = self.request(Method::GET, "torrents").await?;
        let torrents: Vec<TorrentDto> = decode_json(Service::Debrid, req.send().await?).await?;
        debug!(count = torrents.len(), "listed download items");
        Ok(torrents.into_iter().map(to_item).collect())
    }

    /// One item including its file listing.
    pub async fn item(&self, id: &str) -> Result<DownloadItem> {
        let req = self.request(Method::GET, &format!("torrents/info/{id}")).await?;
        let torrent: TorrentDto = decode_json(Service::Debrid, req.send().await?).await?;
        Ok(to_item(torrent))
    }

    /// Start tracking a magnet link and select all of its files. Returns the new item id.
    pub async fn add_magnet(&self, magnet: &str) -> Result<String> {
        let magnet = magnet.trim();
        if !magnet.starts_with("magnet:?") {
            return Err(Error::InvalidInput(format!("not a magnet link: {magnet}")));
        }

        let req = self
            .request(Method::POST, "torrents/addMagnet")
            .await?
            .form(&[("magnet", magnet)]);
        let added: AddedTorrent = decode_json(Service::Debrid, req.send().await?).await?;

        let req = self
            .request(Method::POST, &format!("torrents/selectFiles/{}", added.id))
            .await?
            .form(&[("files", "all")]);
        check_status(Service::Debrid, req.send().await?).await?;

        info!(id = %added.id, "tracking new download item");
        Ok(added.id)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &format!("torrents/delete/{id}")).await?;
        check_status(Service::Debrid, req.send().await?).await?;
        info!(id, "deleted download item");
        Ok(())
    }

    /// Exchange a hoster link for a direct download link.
    pub async fn unrestrict(&self, link: &str) -> Result<UnrestrictedLink> {
        let req = self
            .request(Method::POST, "unrestrict/link")
            .await?
            .form(&[("link", link)]);
        let dto: UnrestrictDto = decode_json(Service::Debrid, req.send().await?).await?;
        Ok(UnrestrictedLink {
            download_url: dto.download,
            filename: dto.filename,
            size_bytes: dto.filesize,
        })
    }

    /// Direct link for a completed item's content.
    pub async fn retrieval_link(&self, item: &DownloadItem) -> Result<UnrestrictedLink> {
        let link = retrievable(item)?;
        self.unrestrict(link).await
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.credentials.require(Service::Debrid).await?;
        Ok(self
            .client
            .request(method, join_url(&self.base_url, path))
            .bearer_auth(token))
    }
}

fn retrievable(item: &DownloadItem) -> Result<&str> {
    if !item.is_complete() {
        return Err(Error::NotReady(item.id.clone()));
    }
    item.links
        .first()
        .map(String::as_str)
        .ok_or_else(|| Error::NotReady(item.id.clone()))
}

fn to_item(dto: TorrentDto) -> DownloadItem {
    let name = dto
        .original_filename
        .filter(|n| !n.is_empty())
        .unwrap_or(dto.filename);
    DownloadItem {
        id: dto.id,
        name,
        size_bytes: dto.original_bytes.unwrap_or(dto.bytes),
        progress: (dto.progress / 100.0).clamp(0.0, 1.0) as f32,
        status: DownloadStatus::parse(&dto.status),
        links: dto.links,
        files: dto
            .files
            .into_iter()
            .map(|f| DownloadFile {
                id: f.id,
                path: f.path,
                size_bytes: f.bytes,
                selected: f.selected != 0,
            })
            .collect(),
    }
}
