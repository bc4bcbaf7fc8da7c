//! Domain records served by the catalogue and account APIs
//!
//! Field names on the wire follow the upstream ePaper feed (`edition_date`,
//! `group_epaper_pdf`, `parent`, `imageurl`) so that records can be loaded
//! from, and served back in, the same shape the feed uses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::date::parse_edition_date;

/// A location name as published by the feed: either a plain string or a
/// per-language map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedName {
    Plain(String),
    Localized {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        en: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hi: Option<String>,
    },
}

impl LocalizedName {
    /// Name to show, preferring English over Hindi.
    pub fn display(&self) -> Option<&str> {
        let name = match self {
            LocalizedName::Plain(name) => Some(name.as_str()),
            LocalizedName::Localized { en, hi } => en.as_deref().or(hi.as_deref()),
        };
        name.filter(|name| !name.is_empty())
    }
}

impl From<&str> for LocalizedName {
    fn from(name: &str) -> Self {
        LocalizedName::Plain(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: String,
    pub name: LocalizedName,
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "edition_priority", default)]
    pub priority: u32,
    #[serde(rename = "imageurl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: LocalizedName,
    #[serde(default)]
    pub slug: String,
    /// Owning state id
    #[serde(rename = "parent")]
    pub state_id: String,
    #[serde(rename = "edition_priority", default)]
    pub priority: u32,
    #[serde(rename = "imageurl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One state with its cities, as returned by `epaperEditions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationNode {
    #[serde(flatten)]
    pub state: State,
    pub children: Vec<City>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfAsset {
    pub url: String,
}

/// One dated issue for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publication date in `dd-MM-yyyy` form
    pub edition_date: String,
    /// City the edition belongs to
    #[serde(rename = "parent")]
    pub location_id: String,
    #[serde(rename = "group_epaper_pdf", default)]
    pub pdf_assets: Vec<PdfAsset>,
    #[serde(rename = "imageurl", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Edition {
    pub fn publication_date(&self) -> Option<NaiveDate> {
        parse_edition_date(&self.edition_date)
    }

    /// URL of the PDF a download should fetch, if the edition has one.
    pub fn primary_pdf_url(&self) -> Option<&str> {
        self.pdf_assets
            .first()
            .map(|asset| asset.url.trim())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLog {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "epaperId")]
    pub edition_id: String,
    pub downloaded_at: DateTime<Utc>,
}
