//! Edition lookup by location and date

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::date::format_edition_date;
use crate::models::Edition;
use crate::repository::{EditionRepository, LocationRepository};

const FALLBACK_TITLE: &str = "EPaper";

/// Whether an edition can be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadAvailability {
    Available { url: String },
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditionLookup {
    /// No edition for this location on this date. Not an error.
    NotFound {
        location_id: String,
        edition_date: String,
    },
    Found {
        edition: Edition,
        download: DownloadAvailability,
    },
}

impl EditionLookup {
    pub fn edition(&self) -> Option<&Edition> {
        match self {
            EditionLookup::Found { edition, .. } => Some(edition),
            EditionLookup::NotFound { .. } => None,
        }
    }

    pub fn download_url(&self) -> Option<&str> {
        match self {
            EditionLookup::Found {
                download: DownloadAvailability::Available { url },
                ..
            } => Some(url),
            _ => None,
        }
    }
}

pub struct EditionResolver {
    editions: Arc<dyn EditionRepository>,
    locations: Arc<dyn LocationRepository>,
}

impl EditionResolver {
    pub fn new(editions: Arc<dyn EditionRepository>, locations: Arc<dyn LocationRepository>) -> Self {
        Self { editions, locations }
    }

    /// All records for `location_id` on `date`, in store order.
    pub async fn editions_on(&self, location_id: &str, date: NaiveDate) -> Vec<Edition> {
        let key = format_edition_date(date);
        self.editions.editions_for(location_id, &key).await
    }

    /// The edition for a location on a date. When several records match, the
    /// first one wins.
    pub async fn resolve_edition(&self, location_id: &str, date: NaiveDate) -> EditionLookup {
        let edition_date = format_edition_date(date);
        let edition = self
            .editions
            .editions_for(location_id, &edition_date)
            .await
            .into_iter()
            .next();

        match edition {
            None => {
                debug!("No edition for {} on {}", location_id, edition_date);
                EditionLookup::NotFound {
                    location_id: location_id.to_string(),
                    edition_date,
                }
            }
            Some(edition) => {
                let download = match edition.primary_pdf_url() {
                    Some(url) => DownloadAvailability::Available {
                        url: url.to_string(),
                    },
                    None => DownloadAvailability::Unavailable,
                };
                EditionLookup::Found { edition, download }
            }
        }
    }

    /// Like [`resolve_edition`](Self::resolve_edition), with a missing date
    /// meaning `today`.
    pub async fn resolve_edition_on(
        &self,
        location_id: &str,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> EditionLookup {
        self.resolve_edition(location_id, date.unwrap_or(today)).await
    }

    /// Title to display for a location card: the edition title, else the
    /// city name, else a generic label.
    pub async fn display_title(&self, edition: Option<&Edition>, location_id: &str) -> String {
        if let Some(title) = edition.map(|e| e.title.trim()).filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        self.locations
            .city(location_id)
            .await
            .and_then(|city| city.name.display().map(str::to_string))
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use pretty_assertions::assert_eq;

    fn resolver() -> EditionResolver {
        let store = Arc::new(InMemoryStore::with_default_seed().unwrap());
        EditionResolver::new(store.clone(), store)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_with_day_month_year_key() {
        let lookup = resolver().resolve_edition("4121844", date(2024, 3, 5)).await;
        let edition = lookup.edition().unwrap();
        assert_eq!(edition.id, "90001");
        assert_eq!(edition.edition_date, "05-03-2024");
        assert_eq!(
            lookup.download_url(),
            Some("https://epaper.example.com/pdf/2024/03/05/indore-main.pdf")
        );
    }

    #[tokio::test]
    async fn test_not_found_reports_formatted_key() {
        let lookup = resolver().resolve_edition("4121844", date(2024, 3, 7)).await;
        assert_eq!(
            lookup,
            EditionLookup::NotFound {
                location_id: "4121844".into(),
                edition_date: "07-03-2024".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_month_and_day_are_not_swapped() {
        // 2024-05-03 formats as 03-05-2024, which no seed record uses.
        let lookup = resolver().resolve_edition("4121844", date(2024, 5, 3)).await;
        assert!(matches!(lookup, EditionLookup::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_asset_list_is_unavailable() {
        let lookup = resolver().resolve_edition("4121845", date(2024, 3, 5)).await;
        match lookup {
            EditionLookup::Found { edition, download } => {
                assert_eq!(edition.id, "90003");
                assert_eq!(download, DownloadAvailability::Unavailable);
            }
            other => panic!("expected edition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_date_defaults_to_today() {
        let lookup = resolver()
            .resolve_edition_on("4121844", None, date(2024, 3, 4))
            .await;
        assert_eq!(lookup.edition().map(|e| e.id.as_str()), Some("90002"));
    }

    #[tokio::test]
    async fn test_display_title_fallbacks() {
        let resolver = resolver();
        let untitled = resolver
            .resolve_edition("4121846", date(2024, 3, 5))
            .await;
        // Ujjain only has a Hindi name
        assert_eq!(
            resolver.display_title(untitled.edition(), "4121846").await,
            "उज्जैन"
        );
        assert_eq!(resolver.display_title(None, "4121844").await, "Indore");
        assert_eq!(resolver.display_title(None, "unknown").await, "EPaper");
    }

    #[test]
    fn test_lookup_serializes_with_status_tag() {
        let lookup = EditionLookup::NotFound {
            location_id: "1".into(),
            edition_date: "05-03-2024".into(),
        };
        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["edition_date"], "05-03-2024");
    }
}
