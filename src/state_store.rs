// src/state_store.rs

use crate::models::{unix_now, LibraryEntry, Preferences, ReadingProgress, Service};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

const PREFERENCES_KEY: &str = "preferences";
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Published after every successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ProgressChanged { manga_id: String, chapter_id: String },
    ProgressCleared { manga_id: String },
    LibraryChanged { manga_id: String, added: bool },
    PreferencesChanged(Preferences),
    CredentialChanged(Service),
}

/// Persists reading progress, the library, preferences and credentials to SQLite.
///
/// Values are stored as JSON text so they read back exactly as written.
/// Cloning is cheap; clones share the connection and the event channel.
#[derive(Clone)]
pub struct StateStore {
    conn: Connection,
    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    /// Opens (creating if needed) the database file and its tables.
    pub async fn open(db_path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(db_path).await?;
        debug!(path = %db_path.display(), "opened state database");
        Self::with_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, StateError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = Self { conn, events };
        store.setup_database().await?;
        Ok(store)
    }

    async fn setup_database(&self) -> Result<(), StateError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS progress (
                        manga_id        TEXT NOT NULL,
                        chapter_id      TEXT NOT NULL,
                        data            TEXT NOT NULL,
                        PRIMARY KEY (manga_id, chapter_id)
                    );
                    CREATE TABLE IF NOT EXISTS library (
                        manga_id        TEXT PRIMARY KEY,
                        added_at        INTEGER NOT NULL,
                        data            TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS settings (
                        key             TEXT PRIMARY KEY,
                        value           TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS credentials (
                        service         TEXT PRIMARY KEY,
                        token           TEXT NOT NULL
                    );",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Receive every change made through this store or its clones.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        trace!(?event, "store changed");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    // --- progress ---

    pub async fn progress(
        &self,
        manga_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ReadingProgress>, StateError> {
        let (manga_id, chapter_id) = (manga_id.to_owned(), chapter_id.to_owned());
        let data = self
            .conn
            .call(move |conn| {
                let data = conn
                    .query_row(
                        "SELECT data FROM progress WHERE manga_id = ?1 AND chapter_id = ?2",
                        params![manga_id, chapter_id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(data)
            })
            .await?;
        data.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(StateError::from)
    }

    /// Saves (inserts or updates) the progress for one chapter.
    pub async fn save_progress(
        &self,
        manga_id: &str,
        chapter_id: &str,
        progress: &ReadingProgress,
    ) -> Result<(), StateError> {
        let data = serde_json::to_string(progress)?;
        let (m, c) = (manga_id.to_owned(), chapter_id.to_owned());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO progress (manga_id, chapter_id, data) VALUES (?1, ?2, ?3)",
                    params![m, c, data],
                )?;
                Ok(())
            })
            .await?;
        self.notify(StoreEvent::ProgressChanged {
            manga_id: manga_id.to_owned(),
            chapter_id: chapter_id.to_owned(),
        });
        Ok(())
    }

    /// All saved progress for a work, keyed by chapter id.
    pub async fn progress_for_manga(
        &self,
        manga_id: &str,
    ) -> Result<Vec<(String, ReadingProgress)>, StateError> {
        let manga_id = manga_id.to_owned();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT chapter_id, data FROM progress WHERE manga_id = ?1 ORDER BY chapter_id",
                )?;
                let rows = stmt
                    .query_map(params![manga_id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(chapter_id, data)| -> Result<_, StateError> {
                Ok((chapter_id, serde_json::from_str(&data)?))
            })
            .collect()
    }

    pub async fn clear_progress(&self, manga_id: &str) -> Result<(), StateError> {
        let m = manga_id.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM progress WHERE manga_id = ?1", params![m])?;
                Ok(())
            })
            .await?;
        self.notify(StoreEvent::ProgressCleared {
            manga_id: manga_id.to_owned(),
        });
        Ok(())
    }

    // --- library ---

    pub async fn add_to_library(&self, manga_id: &str, title: &str) -> Result<LibraryEntry, StateError> {
        let entry = LibraryEntry {
            manga_id: manga_id.to_owned(),
            title: title.to_owned(),
            added_at: unix_now(),
        };
        let data = serde_json::to_string(&entry)?;
        let (m, added_at) = (entry.manga_id.clone(), entry.added_at as i64);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO library (manga_id, added_at, data) VALUES (?1, ?2, ?3)",
                    params![m, added_at, data],
                )?;
                Ok(())
            })
            .await?;
        self.notify(StoreEvent::LibraryChanged {
            manga_id: manga_id.to_owned(),
            added: true,
        });
        Ok(entry)
    }

    /// Returns whether the work was in the library.
    pub async fn remove_from_library(&self, manga_id: &str) -> Result<bool, StateError> {
        let m = manga_id.to_owned();
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM library WHERE manga_id = ?1", params![m])?))
            .await?;
        if removed > 0 {
            self.notify(StoreEvent::LibraryChanged {
                manga_id: manga_id.to_owned(),
                added: false,
            });
        }
        Ok(removed > 0)
    }

    pub async fn is_in_library(&self, manga_id: &str) -> Result<bool, StateError> {
        let m = manga_id.to_owned();
        let found = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM library WHERE manga_id = ?1",
                        params![m],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(found)
    }

    /// Library entries, oldest first.
    pub async fn library(&self) -> Result<Vec<LibraryEntry>, StateError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT data FROM library ORDER BY added_at, manga_id")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(StateError::from))
            .collect()
    }

    // --- preferences ---

    /// Stored preferences, or defaults when none were saved.
    pub async fn preferences(&self) -> Result<Preferences, StateError> {
        let value = self.setting(PREFERENCES_KEY).await?;
        match value {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(Preferences::default()),
        }
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> Result<(), StateError> {
        let value = serde_json::to_string(preferences)?;
        self.save_setting(PREFERENCES_KEY, value).await?;
        self.notify(StoreEvent::PreferencesChanged(preferences.clone()));
        Ok(())
    }

    async fn setting(&self, key: &'static str) -> Result<Option<String>, StateError> {
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn save_setting(&self, key: &'static str, value: String) -> Result<(), StateError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // --- credentials ---

    pub async fn token(&self, service: Service) -> Result<Option<String>, StateError> {
        let key = service.as_str();
        let token = self
            .conn
            .call(move |conn| {
                let token = conn
                    .query_row(
                        "SELECT token FROM credentials WHERE service = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(token)
            })
            .await?;
        Ok(token)
    }

    pub async fn save_token(&self, service: Service, token: String) -> Result<(), StateError> {
        let key = service.as_str();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO credentials (service, token) VALUES (?1, ?2)",
                    params![key, token],
                )?;
                Ok(())
            })
            .await?;
        self.notify(StoreEvent::CredentialChanged(service));
        Ok(())
    }

    pub async fn delete_token(&self, service: Service) -> Result<(), StateError> {
        let key = service.as_str();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM credentials WHERE service = ?1", params![key])?;
                Ok(())
            })
            .await?;
        self.notify(StoreEvent::CredentialChanged(service));
        Ok(())
    }
}
