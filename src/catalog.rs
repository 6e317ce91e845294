// src/catalog.rs

//! Read-only client for the manga catalog service.

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::{build_client, decode_json, join_url};
use crate::models::{Chapter, ImageQuality, Manga, MangaStatus, Service};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Page size used when walking a chapter feed.
const FEED_PAGE_SIZE: usize = 100;
const FALLBACK_LANGUAGE: &str = "en";
const INCLUDES: [(&str, &str); 2] = [("includes[]", "cover_art"), ("includes[]", "author")];

type Localized = BTreeMap<String, String>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    result: Option<String>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default)]
    result: Option<String>,
    data: Vec<T>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct MangaDto {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: Localized,
    #[serde(default)]
    alt_titles: Vec<Localized>,
    #[serde(default)]
    description: Option<Localized>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tags: Vec<TagDto>,
}

#[derive(Debug, Deserialize)]
struct TagDto {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: Localized,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipAttributes {
    name: Option<String>,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterDto {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    volume: Option<String>,
    chapter: Option<String>,
    title: Option<String>,
    translated_language: Option<String>,
    #[serde(default)]
    pages: u32,
    publish_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHome {
    #[serde(default)]
    result: Option<String>,
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeChapter {
    hash: String,
    #[serde(default)]
    data: Vec<String>,
    #[serde(default)]
    data_saver: Vec<String>,
}

/// Client for searching works, listing chapters and resolving page images.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    covers_base_url: String,
    language: String,
    credentials: Credentials,
}

impl CatalogClient {
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?, config, credentials))
    }

    pub fn with_client(client: Client, config: &Config, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: config.catalog_base_url.clone(),
            covers_base_url: config.covers_base_url.clone(),
            language: config.language.clone(),
            credentials,
        }
    }

    /// Free-text title search.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Manga>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("empty search query".into()));
        }
        let req = self
            .get("manga")
            .await
            .query(&[("title", query.to_string()), ("limit", limit.clamp(1, 100).to_string())])
            .query(&INCLUDES);
        let resp: Collection<MangaDto> = decode_json(Service::Catalog, req.send().await?).await?;
        ensure_ok(resp.result.as_deref())?;

        let results: Vec<Manga> = resp
            .data
            .into_iter()
            .map(|dto| self.to_manga(dto))
            .collect();
        info!(query, found = results.len(), "catalog search");
        Ok(results)
    }

    pub async fn manga(&self, id: &str) -> Result<Manga> {
        let req = self.get(&format!("manga/{id}")).await.query(&INCLUDES);
        let resp: Envelope<MangaDto> = decode_json(Service::Catalog, req.send().await?).await?;
        ensure_ok(resp.result.as_deref())?;
        Ok(self.to_manga(resp.data))
    }

    /// Every chapter in `language`, ascending. Walks the feed page by page.
    pub async fn chapters(&self, manga_id: &str, language: Option<&str>) -> Result<Vec<Chapter>> {
        let language = language.unwrap_or(&self.language).to_string();
        let mut chapters = Vec::new();
        let mut offset = 0;

        loop {
            let req = self.get(&format!("manga/{manga_id}/feed")).await.query(&[
                ("translatedLanguage[]", language.clone()),
                ("order[volume]", "asc".to_string()),
                ("order[chapter]", "asc".to_string()),
                ("limit", FEED_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            let page: Collection<ChapterDto> =
                decode_json(Service::Catalog, req.send().await?).await?;
            ensure_ok(page.result.as_deref())?;

            let received = page.data.len();
            chapters.extend(page.data.into_iter().map(|dto| to_chapter(manga_id, dto)));
            offset = page.offset + received;
            debug!(manga_id, offset, total = page.total, "chapter feed page");

            if received == 0 || offset >= page.total {
                break;
            }
        }
        Ok(chapters)
    }

    /// Ordered page image URLs for a chapter.
    pub async fn pages(&self, chapter_id: &str, quality: ImageQuality) -> Result<Vec<String>> {
        let req = self.get(&format!("at-home/server/{chapter_id}")).await;
        let at_home: AtHome = decode_json(Service::Catalog, req.send().await?).await?;
        ensure_ok(at_home.result.as_deref())?;
        let pages = page_urls(&at_home, quality);
        debug!(chapter_id, pages = pages.len(), ?quality, "resolved pages");
        Ok(pages)
    }

    async fn get(&self, path: &str) -> RequestBuilder {
        let req = self.client.get(join_url(&self.base_url, path));
        match self.credentials.token(Service::Catalog).await {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn to_manga(&self, dto: MangaDto) -> Manga {
        to_manga(dto, &self.covers_base_url, &self.language)
    }
}

fn ensure_ok(result: Option<&str>) -> Result<()> {
    match result {
        Some("error") => Err(Error::Decode("catalog reported an error result".into())),
        _ => Ok(()),
    }
}

/// Preferred language, then English, then whatever comes first.
fn localized(values: &Localized, language: &str) -> Option<String> {
    values
        .get(language)
        .or_else(|| values.get(FALLBACK_LANGUAGE))
        .or_else(|| values.values().next())
        .cloned()
}

fn to_manga(dto: MangaDto, covers_base_url: &str, language: &str) -> Manga {
    let attrs = dto.attributes;
    let title = localized(&attrs.title, language)
        .or_else(|| attrs.alt_titles.iter().find_map(|t| localized(t, language)))
        .unwrap_or_default();

    let mut authors = Vec::new();
    let mut cover_url = None;
    for rel in &dto.relationships {
        let Some(rel_attrs) = rel.attributes.as_ref() else {
            continue;
        };
        match rel.kind.as_str() {
            "author" | "artist" => {
                if let Some(name) = rel_attrs.name.as_ref() {
                    if !authors.contains(name) {
                        authors.push(name.clone());
                    }
                }
            }
            "cover_art" => {
                cover_url = rel_attrs
                    .file_name
                    .as_ref()
                    .map(|file| join_url(covers_base_url, &format!("{}/{file}", dto.id)));
            }
            _ => {}
        }
    }

    Manga {
        id: dto.id,
        alt_titles: attrs
            .alt_titles
            .iter()
            .flat_map(|t| t.values().cloned())
            .filter(|t| *t != title)
            .collect(),
        title,
        description: attrs
            .description
            .as_ref()
            .and_then(|d| localized(d, language))
            .unwrap_or_default(),
        cover_url,
        authors,
        tags: attrs
            .tags
            .iter()
            .filter_map(|t| localized(&t.attributes.name, language))
            .collect(),
        status: attrs.status.as_deref().map(MangaStatus::parse).unwrap_or_default(),
        year: attrs.year,
    }
}

fn to_chapter(manga_id: &str, dto: ChapterDto) -> Chapter {
    let attrs = dto.attributes;
    Chapter {
        id: dto.id,
        manga_id: manga_id.to_string(),
        volume: attrs.volume,
        chapter: attrs.chapter,
        title: attrs.title,
        language: attrs.translated_language,
        pages: attrs.pages,
        published_at: attrs.publish_at,
    }
}

fn page_urls(at_home: &AtHome, quality: ImageQuality) -> Vec<String> {
    let (segment, files) = match quality {
        ImageQuality::DataSaver if !at_home.chapter.data_saver.is_empty() => {
            ("data-saver", &at_home.chapter.data_saver)
        }
        _ => ("data", &at_home.chapter.data),
    };
    files
        .iter()
        .map(|file| {
            join_url(
                &at_home.base_url,
                &format!("{segment}/{}/{file}", at_home.chapter.hash),
            )
        })
        .collect()
}
