pub mod catalog;
pub mod config;
pub mod credentials;
pub mod debrid;
pub mod error;
pub mod fetcher;
mod http;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod reader;
pub mod session;
pub mod state_store;

/// Convenient re-exports of the common types.
pub mod prelude {
    pub use crate::catalog::CatalogClient;
    pub use crate::config::Config;
    pub use crate::credentials::Credentials;
    pub use crate::debrid::DebridClient;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::fetcher::{FetchOutcome, Fetcher};
    pub use crate::matcher::{matches, TitleMatcher};
    pub use crate::models::*;
    pub use crate::reader::ChapterReader;
    pub use crate::session::{Session, Suggestion};
    pub use crate::state_store::{StateStore, StoreEvent};
}
