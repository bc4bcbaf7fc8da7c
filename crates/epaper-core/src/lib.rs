//! ePaper core: edition lookup, accounts and watermarked downloads
//!
//! This crate holds everything the server and the CLI share:
//! - `resolver`: which edition a location published on a date
//! - `watermark`: diagonal per-user stamp on every page of a PDF (lopdf)
//! - `download`: fetch, stamp and hand off to a [`sink::SaveSink`]
//! - `auth` / `session`: accounts, bearer tokens and persisted sessions
//! - `repository`: storage traits plus a seeded in-memory store

pub mod auth;
pub mod date;
pub mod download;
pub mod error;
pub mod fetch;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod watermark;

pub use auth::{AuthPayload, AuthService, TokenRegistry};
pub use download::{DownloadOutcome, DownloadService, Notice, NoticeVariant};
pub use error::{EpaperError, Result};
pub use fetch::{HttpFetcher, MemoryFetcher, SourceFetcher};
pub use models::{City, DownloadLog, Edition, LocalizedName, LocationNode, PdfAsset, State, User};
pub use repository::{
    DownloadLogRepository, EditionFilter, EditionRepository, InMemoryStore, LocationRepository,
    UserRepository,
};
pub use resolver::{DownloadAvailability, EditionLookup, EditionResolver};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use sink::{DirectorySink, MemorySink, SaveSink, SavedDownload, WatermarkedOutput};
pub use watermark::{apply_watermark, stamp_document, watermark_text, WatermarkStyle};
