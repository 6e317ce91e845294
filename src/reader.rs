// src/reader.rs

use crate::error::{Error, Result};
use crate::models::{Chapter, ReadingOrientation, ReadingProgress};
use crate::state_store::StateStore;
use std::collections::HashMap;
use tracing::debug;

/// A chapter being read. Every position change is written to the store.
pub struct ChapterReader {
    store: StateStore,
    manga_id: String,
    chapter_id: String,
    /// Page locations in reading order: remote URLs or local file paths.
    pages: Vec<String>,
    progress: ReadingProgress,
}

impl ChapterReader {
    /// Opens a chapter, restoring the saved position (clamped to the page count).
    ///
    /// Landing on the last page counts as reaching it, so a one-page chapter
    /// is completed as soon as it is opened.
    pub async fn open(
        store: StateStore,
        manga_id: &str,
        chapter_id: &str,
        pages: Vec<String>,
    ) -> Result<Self> {
        if pages.is_empty() {
            return Err(Error::InvalidInput(format!("chapter {chapter_id} has no pages")));
        }
        let mut progress = store
            .progress(manga_id, chapter_id)
            .await?
            .unwrap_or_default();
        let last = (pages.len() - 1) as u32;
        if progress.last_page > last {
            progress.last_page = last;
        }
        debug!(manga_id, chapter_id, page = progress.last_page, "opened chapter");

        let mut reader = Self {
            store,
            manga_id: manga_id.to_owned(),
            chapter_id: chapter_id.to_owned(),
            pages,
            progress,
        };
        if reader.progress.last_page == last && !reader.progress.completed {
            reader.mark_completed().await?;
        }
        Ok(reader)
    }

    pub fn manga_id(&self) -> &str {
        &self.manga_id
    }

    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Zero-based index of the current page.
    pub fn current_page(&self) -> usize {
        self.progress.last_page as usize
    }

    pub fn current_location(&self) -> &str {
        &self.pages[self.current_page()]
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn progress(&self) -> &ReadingProgress {
        &self.progress
    }

    pub async fn go_to(&mut self, index: usize) -> Result<()> {
        if index >= self.pages.len() {
            return Err(Error::InvalidInput(format!(
                "page {index} out of range (chapter has {} pages)",
                self.pages.len()
            )));
        }
        self.progress.last_page = index as u32;
        if index + 1 == self.pages.len() {
            self.progress.completed = true;
        }
        self.persist().await
    }

    /// Returns false when already on the last page.
    pub async fn next(&mut self) -> Result<bool> {
        let next = self.current_page() + 1;
        if next >= self.pages.len() {
            return Ok(false);
        }
        self.go_to(next).await?;
        Ok(true)
    }

    /// Returns false when already on the first page.
    pub async fn previous(&mut self) -> Result<bool> {
        match self.current_page().checked_sub(1) {
            Some(prev) => {
                self.go_to(prev).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Set or clear (with `None` or blank text) the free-text bookmark.
    pub async fn bookmark(&mut self, note: Option<&str>) -> Result<()> {
        self.progress.bookmark = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        self.persist().await
    }

    pub async fn mark_completed(&mut self) -> Result<()> {
        self.progress.completed = true;
        self.persist().await
    }

    async fn persist(&mut self) -> Result<()> {
        self.progress.touch();
        self.store
            .save_progress(&self.manga_id, &self.chapter_id, &self.progress)
            .await?;
        Ok(())
    }
}

/// Pages in the order they are laid out on screen for `orientation`.
pub fn display_order<T>(pages: &[T], orientation: ReadingOrientation) -> Vec<&T> {
    match orientation {
        ReadingOrientation::RightToLeft => pages.iter().rev().collect(),
        ReadingOrientation::LeftToRight | ReadingOrientation::Vertical => pages.iter().collect(),
    }
}

/// First chapter, in list order, that has not been completed.
pub fn next_unread<'a>(
    chapters: &'a [Chapter],
    progress: &[(String, ReadingProgress)],
) -> Option<&'a Chapter> {
    let completed: HashMap<&str, bool> = progress
        .iter()
        .map(|(id, p)| (id.as_str(), p.completed))
        .collect();
    chapters
        .iter()
        .find(|c| !completed.get(c.id.as_str()).copied().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://n.test/{i}.png")).collect()
    }

    fn chapter(id: &str) -> Chapter {
        Chapter {
            id: id.into(),
            manga_id: "m1".into(),
            volume: None,
            chapter: Some(id.into()),
            title: None,
            language: None,
            pages: 3,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn navigation_persists_and_completes() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut reader = ChapterReader::open(store.clone(), "m1", "c1", pages(3)).await.unwrap();

        assert_eq!(reader.current_page(), 0);
        assert!(!reader.previous().await.unwrap());
        assert!(reader.next().await.unwrap());
        assert_eq!(reader.current_location(), "https://n.test/1.png");
        assert!(!reader.progress().completed);

        assert!(reader.next().await.unwrap());
        assert!(!reader.next().await.unwrap());
        assert!(reader.progress().completed);

        // going back keeps the chapter completed
        assert!(reader.previous().await.unwrap());
        let saved = store.progress("m1", "c1").await.unwrap().unwrap();
        assert_eq!(saved.last_page, 1);
        assert!(saved.completed);
        assert!(saved.updated_at > 0);
    }

    #[tokio::test]
    async fn reopening_restores_and_clamps() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut reader = ChapterReader::open(store.clone(), "m1", "c1", pages(10)).await.unwrap();
        reader.go_to(8).await.unwrap();
        reader.bookmark(Some("  cliffhanger ")).await.unwrap();

        let reopened = ChapterReader::open(store.clone(), "m1", "c1", pages(10)).await.unwrap();
        assert_eq!(reopened.current_page(), 8);
        assert_eq!(reopened.progress().bookmark.as_deref(), Some("cliffhanger"));

        let shorter = ChapterReader::open(store, "m1", "c1", pages(4)).await.unwrap();
        assert_eq!(shorter.current_page(), 3);
    }

    #[tokio::test]
    async fn single_page_chapter_completes() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut reader = ChapterReader::open(store.clone(), "m1", "one-shot", pages(1)).await.unwrap();

        assert!(reader.progress().completed);
        assert!(!reader.next().await.unwrap());
        assert!(!reader.previous().await.unwrap());

        let saved = store.progress("m1", "one-shot").await.unwrap().unwrap();
        assert_eq!(saved.last_page, 0);
        assert!(saved.completed);
    }

    #[tokio::test]
    async fn clamping_onto_last_page_completes() {
        let store = StateStore::open_in_memory().await.unwrap();
        let mut reader = ChapterReader::open(store.clone(), "m1", "c1", pages(10)).await.unwrap();
        reader.go_to(6).await.unwrap();
        assert!(!reader.progress().completed);

        let shorter = ChapterReader::open(store.clone(), "m1", "c1", pages(5)).await.unwrap();
        assert_eq!(shorter.current_page(), 4);
        assert!(store.progress("m1", "c1").await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let store = StateStore::open_in_memory().await.unwrap();
        assert!(matches!(
            ChapterReader::open(store.clone(), "m1", "c1", Vec::new()).await,
            Err(Error::InvalidInput(_))
        ));

        let mut reader = ChapterReader::open(store, "m1", "c1", pages(2)).await.unwrap();
        assert!(matches!(reader.go_to(2).await, Err(Error::InvalidInput(_))));
        reader.bookmark(Some("x")).await.unwrap();
        reader.bookmark(Some("   ")).await.unwrap();
        assert_eq!(reader.progress().bookmark, None);
    }

    #[test]
    fn display_order_follows_orientation() {
        let p = [1, 2, 3];
        assert_eq!(display_order(&p, ReadingOrientation::RightToLeft), vec![&3, &2, &1]);
        assert_eq!(display_order(&p, ReadingOrientation::LeftToRight), vec![&1, &2, &3]);
        assert_eq!(display_order(&p, ReadingOrientation::Vertical), vec![&1, &2, &3]);
    }

    #[test]
    fn next_unread_skips_completed() {
        let chapters = vec![chapter("1"), chapter("2"), chapter("3")];
        let done = ReadingProgress {
            completed: true,
            ..Default::default()
        };
        let partial = ReadingProgress {
            last_page: 1,
            ..Default::default()
        };
        let progress = vec![("1".to_string(), done.clone()), ("2".to_string(), partial)];
        assert_eq!(next_unread(&chapters, &progress).map(|c| c.id.as_str()), Some("2"));

        let all_done: Vec<_> = ["1", "2", "3"].iter().map(|id| (id.to_string(), done.clone())).collect();
        assert_eq!(next_unread(&chapters, &all_done), None);
    }
}
