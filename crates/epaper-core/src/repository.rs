//! Repository interfaces and the in-memory backing store
//!
//! The resolver and API layers only see the traits; `InMemoryStore` is one
//! implementation, loaded from a JSON seed document.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::{UserRecord, ACCOUNT_EXISTS};
use crate::error::{EpaperError, Result};
use crate::models::{City, DownloadLog, Edition, LocationNode, State, User};

const DEFAULT_SEED: &str = include_str!("../data/seed.json");

#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// States ordered by priority.
    async fn states(&self) -> Vec<State>;

    /// Cities ordered by priority, optionally restricted to one state.
    async fn cities(&self, state_id: Option<&str>) -> Vec<City>;

    async fn state(&self, id: &str) -> Option<State>;

    async fn city(&self, id: &str) -> Option<City>;

    /// The two-level state → city tree.
    async fn hierarchy(&self) -> Vec<LocationNode> {
        let mut nodes = Vec::new();
        for state in self.states().await {
            let children = self.cities(Some(&state.id)).await;
            nodes.push(LocationNode { state, children });
        }
        nodes
    }
}

#[async_trait]
pub trait EditionRepository: Send + Sync {
    /// Editions matching `filter`, newest first.
    async fn editions(&self, filter: &EditionFilter) -> Vec<Edition>;

    async fn edition(&self, id: &str) -> Option<Edition>;

    /// Editions for a location whose `edition_date` equals `edition_date`
    /// exactly, in store order.
    async fn editions_for(&self, location_id: &str, edition_date: &str) -> Vec<Edition>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn users(&self) -> Vec<User>;

    async fn user(&self, id: &str) -> Option<User>;

    async fn find_by_email(&self, email: &str) -> Option<UserRecord>;

    /// Insert unless the email or username is already taken.
    async fn insert_unique(&self, record: UserRecord) -> Result<User>;
}

#[async_trait]
pub trait DownloadLogRepository: Send + Sync {
    async fn append(&self, log: DownloadLog);

    async fn logs(&self, user_id: Option<&str>) -> Vec<DownloadLog>;
}

/// Filters for the edition listing. Empty fields do not filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionFilter {
    pub state_id: Option<String>,
    pub city_id: Option<String>,
    /// `dd-MM-yyyy`
    pub date: Option<String>,
    pub search: Option<String>,
}

impl EditionFilter {
    /// `state_of_location` is the state owning the edition's city, if known.
    pub fn matches(&self, edition: &Edition, state_of_location: Option<&str>) -> bool {
        if let Some(state_id) = non_empty(&self.state_id) {
            if state_of_location != Some(state_id) {
                return false;
            }
        }
        if let Some(city_id) = non_empty(&self.city_id) {
            if edition.location_id != city_id {
                return false;
            }
        }
        if let Some(date) = non_empty(&self.date) {
            if edition.edition_date != date {
                return false;
            }
        }
        if let Some(search) = non_empty(&self.search) {
            let needle = search.to_lowercase();
            let in_title = edition.title.to_lowercase().contains(&needle);
            let in_description = edition
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedUser {
    id: String,
    email: String,
    username: String,
    password: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SeedData {
    states: Vec<State>,
    cities: Vec<City>,
    editions: Vec<Edition>,
    #[serde(default)]
    users: Vec<SeedUser>,
}

struct StoreData {
    states: Vec<State>,
    cities: Vec<City>,
    editions: Vec<Edition>,
    users: Vec<UserRecord>,
    download_logs: Vec<DownloadLog>,
}

pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    /// Store loaded from the seed document bundled with the crate.
    pub fn with_default_seed() -> Result<Self> {
        Self::from_seed_json(DEFAULT_SEED)
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EpaperError::Seed(format!("{}: {}", path.display(), e)))?;
        Self::from_seed_json(&json)
    }

    pub fn from_seed_json(json: &str) -> Result<Self> {
        let seed: SeedData =
            serde_json::from_str(json).map_err(|e| EpaperError::Seed(e.to_string()))?;

        for city in &seed.cities {
            if !seed.states.iter().any(|s| s.id == city.state_id) {
                return Err(EpaperError::Seed(format!(
                    "City {} references unknown state {}",
                    city.id, city.state_id
                )));
            }
        }
        for edition in &seed.editions {
            if !seed.cities.iter().any(|c| c.id == edition.location_id) {
                return Err(EpaperError::Seed(format!(
                    "Edition {} references unknown city {}",
                    edition.id, edition.location_id
                )));
            }
        }

        let users = seed
            .users
            .into_iter()
            .map(|u| {
                let user = User {
                    id: u.id,
                    email: u.email,
                    username: u.username,
                    created_at: u.created_at,
                };
                UserRecord::new(user, &u.password)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Loaded seed: {} states, {} cities, {} editions",
            seed.states.len(),
            seed.cities.len(),
            seed.editions.len()
        );

        Ok(Self {
            data: RwLock::new(StoreData {
                states: seed.states,
                cities: seed.cities,
                editions: seed.editions,
                users,
                download_logs: Vec::new(),
            }),
        })
    }
}

#[async_trait]
impl LocationRepository for InMemoryStore {
    async fn states(&self) -> Vec<State> {
        let mut states = self.data.read().await.states.clone();
        states.sort_by_key(|s| s.priority);
        states
    }

    async fn cities(&self, state_id: Option<&str>) -> Vec<City> {
        let data = self.data.read().await;
        let mut cities: Vec<City> = data
            .cities
            .iter()
            .filter(|c| state_id.map_or(true, |id| c.state_id == id))
            .cloned()
            .collect();
        cities.sort_by_key(|c| c.priority);
        cities
    }

    async fn state(&self, id: &str) -> Option<State> {
        self.data.read().await.states.iter().find(|s| s.id == id).cloned()
    }

    async fn city(&self, id: &str) -> Option<City> {
        self.data.read().await.cities.iter().find(|c| c.id == id).cloned()
    }
}

#[async_trait]
impl EditionRepository for InMemoryStore {
    async fn editions(&self, filter: &EditionFilter) -> Vec<Edition> {
        let data = self.data.read().await;
        let state_of = |city_id: &str| {
            data.cities
                .iter()
                .find(|c| c.id == city_id)
                .map(|c| c.state_id.as_str())
        };

        let mut editions: Vec<Edition> = data
            .editions
            .iter()
            .filter(|e| filter.matches(e, state_of(&e.location_id)))
            .cloned()
            .collect();

        // Newest first; undated records sink to the end.
        editions.sort_by(|a, b| b.publication_date().cmp(&a.publication_date()));
        editions
    }

    async fn edition(&self, id: &str) -> Option<Edition> {
        self.data.read().await.editions.iter().find(|e| e.id == id).cloned()
    }

    async fn editions_for(&self, location_id: &str, edition_date: &str) -> Vec<Edition> {
        self.data
            .read()
            .await
            .editions
            .iter()
            .filter(|e| e.location_id == location_id && e.edition_date == edition_date)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn users(&self) -> Vec<User> {
        self.data
            .read()
            .await
            .users
            .iter()
            .map(|r| r.user.clone())
            .collect()
    }

    async fn user(&self, id: &str) -> Option<User> {
        self.data
            .read()
            .await
            .users
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone())
    }

    async fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.data
            .read()
            .await
            .users
            .iter()
            .find(|r| r.user.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    async fn insert_unique(&self, record: UserRecord) -> Result<User> {
        let mut data = self.data.write().await;
        let taken = data.users.iter().any(|r| {
            r.user.email.eq_ignore_ascii_case(&record.user.email)
                || r.user.username == record.user.username
        });
        if taken {
            return Err(EpaperError::Validation(ACCOUNT_EXISTS.into()));
        }
        let user = record.user.clone();
        data.users.push(record);
        Ok(user)
    }
}

#[async_trait]
impl DownloadLogRepository for InMemoryStore {
    async fn append(&self, log: DownloadLog) {
        self.data.write().await.download_logs.push(log);
    }

    async fn logs(&self, user_id: Option<&str>) -> Vec<DownloadLog> {
        self.data
            .read()
            .await
            .download_logs
            .iter()
            .filter(|l| user_id.map_or(true, |id| l.user_id == id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> InMemoryStore {
        InMemoryStore::with_default_seed().unwrap()
    }

    #[tokio::test]
    async fn test_default_seed_loads() {
        let store = store();
        assert!(!store.states().await.is_empty());
        assert!(!store.cities(None).await.is_empty());
        assert!(store.user("user_1").await.is_some());
    }

    #[tokio::test]
    async fn test_hierarchy_groups_cities_under_states() {
        let store = store();
        let tree = store.hierarchy().await;
        let mp = tree.iter().find(|n| n.state.id == "4121001").unwrap();
        assert!(mp.children.iter().any(|c| c.id == "4121844"));
        for node in &tree {
            assert!(node.children.iter().all(|c| c.state_id == node.state.id));
        }
    }

    #[tokio::test]
    async fn test_cities_sorted_by_priority() {
        let store = store();
        let cities = store.cities(Some("4121001")).await;
        let priorities: Vec<u32> = cities.iter().map(|c| c.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[tokio::test]
    async fn test_editions_sorted_newest_first() {
        let store = store();
        let editions = store.editions(&EditionFilter::default()).await;
        let dates: Vec<_> = editions.iter().map(|e| e.publication_date()).collect();
        for pair in dates.windows(2) {
            assert!(pair[0] >= pair[1], "{:?} should not precede {:?}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_edition_filter_by_state_city_and_date() {
        let store = store();
        let by_state = store
            .editions(&EditionFilter {
                state_id: Some("4121001".into()),
                ..Default::default()
            })
            .await;
        assert!(!by_state.is_empty());
        for edition in &by_state {
            let city = store.city(&edition.location_id).await.unwrap();
            assert_eq!(city.state_id, "4121001");
        }

        let by_day = store
            .editions(&EditionFilter {
                city_id: Some("4121844".into()),
                date: Some("05-03-2024".into()),
                ..Default::default()
            })
            .await;
        assert!(by_day
            .iter()
            .all(|e| e.location_id == "4121844" && e.edition_date == "05-03-2024"));
    }

    #[tokio::test]
    async fn test_edition_search_is_case_insensitive() {
        let store = store();
        let hits = store
            .editions(&EditionFilter {
                search: Some("INDORE".into()),
                ..Default::default()
            })
            .await;
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|e| {
            e.title.to_lowercase().contains("indore")
                || e.description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains("indore"))
        }));
    }

    #[tokio::test]
    async fn test_blank_filter_fields_are_ignored() {
        let store = store();
        let all = store.editions(&EditionFilter::default()).await;
        let blank = store
            .editions(&EditionFilter {
                search: Some("   ".into()),
                date: Some(String::new()),
                ..Default::default()
            })
            .await;
        assert_eq!(all.len(), blank.len());
    }

    #[tokio::test]
    async fn test_download_logs_filter_by_user() {
        let store = store();
        for (id, user) in [("l1", "user_1"), ("l2", "user_2"), ("l3", "user_1")] {
            store
                .append(DownloadLog {
                    id: id.into(),
                    user_id: user.into(),
                    edition_id: "e1".into(),
                    downloaded_at: Utc::now(),
                })
                .await;
        }
        assert_eq!(store.logs(None).await.len(), 3);
        let mine: Vec<String> = store
            .logs(Some("user_1"))
            .await
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(mine, vec!["l1".to_string(), "l3".to_string()]);
    }

    #[test]
    fn test_seed_rejects_dangling_city() {
        let json = r#"{
            "states": [],
            "cities": [{"id": "c1", "name": "X", "parent": "missing"}],
            "editions": []
        }"#;
        let err = InMemoryStore::from_seed_json(json).err().unwrap();
        assert!(matches!(err, EpaperError::Seed(_)));
    }
}
