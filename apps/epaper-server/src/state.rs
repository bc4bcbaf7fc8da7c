//! Application state for the ePaper server

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use epaper_core::{
    AuthService, DownloadLogRepository, DownloadService, EditionRepository, EditionResolver,
    HttpFetcher, InMemoryStore, LocationRepository, SourceFetcher, UserRepository,
};
use tracing::info;

/// Shared application state. Cheap to clone; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub locations: Arc<dyn LocationRepository>,
    pub editions: Arc<dyn EditionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub download_logs: Arc<dyn DownloadLogRepository>,
    pub resolver: Arc<EditionResolver>,
    pub auth: Arc<AuthService>,
    pub downloads: Arc<DownloadService>,
}

impl AppState {
    pub fn new(store: Arc<InMemoryStore>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            locations: store.clone(),
            editions: store.clone(),
            users: store.clone(),
            download_logs: store.clone(),
            resolver: Arc::new(EditionResolver::new(store.clone(), store.clone())),
            auth: Arc::new(AuthService::new(store)),
            downloads: Arc::new(DownloadService::new(fetcher)),
        }
    }

    /// State backed by a seed file, or the bundled seed when none is given.
    pub fn load(seed: Option<&Path>) -> Result<Self> {
        let store = match seed {
            Some(path) => {
                info!("Loading seed data from {}", path.display());
                InMemoryStore::from_seed_file(path)?
            }
            None => InMemoryStore::with_default_seed()?,
        };
        Ok(Self::new(Arc::new(store), Arc::new(HttpFetcher::new())))
    }
}
