// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Publication status of a work as reported by the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MangaStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    #[default]
    Unknown,
}

impl MangaStatus {
    /// Lenient parse of the catalog's status string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ongoing" | "publishing" => Self::Ongoing,
            "completed" | "finished" => Self::Completed,
            "hiatus" => Self::Hiatus,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

/// A work as returned by the catalog service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manga {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub alt_titles: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: MangaStatus,
    pub year: Option<u32>,
}

/// One chapter of a work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub manga_id: String,
    pub volume: Option<String>,
    pub chapter: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub pages: u32,
    pub published_at: Option<String>,
}

impl Chapter {
    /// Human-readable label, e.g. "Vol. 2 Ch. 10 - The Visitor".
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(volume) = self.volume.as_deref().filter(|v| !v.is_empty()) {
            parts.push(format!("Vol. {volume}"));
        }
        if let Some(chapter) = self.chapter.as_deref().filter(|c| !c.is_empty()) {
            parts.push(format!("Ch. {chapter}"));
        }
        let mut label = if parts.is_empty() {
            "Oneshot".to_string()
        } else {
            parts.join(" ")
        };
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            label.push_str(" - ");
            label.push_str(title);
        }
        label
    }
}

/// Status of an item tracked by the download service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    WaitingFileSelection,
    Downloaded,
    Error,
    Other(String),
}

impl DownloadStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" | "magnet_conversion" => Self::Queued,
            "downloading" | "compressing" | "uploading" => Self::Downloading,
            "waiting_files_selection" => Self::WaitingFileSelection,
            "downloaded" => Self::Downloaded,
            "error" | "magnet_error" | "virus" | "dead" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Downloaded)
    }
}

/// A file inside a tracked download item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadFile {
    pub id: u64,
    pub path: String,
    pub size_bytes: u64,
    pub selected: bool,
}

/// An item (torrent) tracked by the download service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadItem {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    /// Completion as a fraction from 0.0 to 1.0.
    pub progress: f32,
    pub status: DownloadStatus,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub files: Vec<DownloadFile>,
}

impl DownloadItem {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// A direct link for a completed item's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnrestrictedLink {
    pub download_url: String,
    pub filename: String,
    pub size_bytes: u64,
}

/// Saved reading position for one chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReadingProgress {
    pub last_page: u32,
    pub completed: bool,
    pub bookmark: Option<String>,
    /// Unix seconds of the last update.
    pub updated_at: u64,
}

impl ReadingProgress {
    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

/// A work the user saved to their library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryEntry {
    pub manga_id: String,
    pub title: String,
    pub added_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOrientation {
    LeftToRight,
    #[default]
    RightToLeft,
    Vertical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageQuality {
    #[default]
    Original,
    DataSaver,
}

/// User preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Preferences {
    pub orientation: ReadingOrientation,
    pub auto_download: bool,
    pub quality: ImageQuality,
}

/// External services that hold a credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Catalog,
    Debrid,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Catalog => "catalog",
            Service::Debrid => "debrid",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
