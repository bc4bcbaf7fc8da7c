//! HTTP client for the ePaper server

use chrono::NaiveDate;
use epaper_core::date::format_edition_date;
use epaper_core::EditionLookup;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Error body returned by the server on non-2xx responses.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Response of `GET /api/editions/:location_id/:date`.
#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    pub title: String,
    pub lookup: EditionLookup,
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Run a named operation and return its `data.<name>` field.
    pub async fn operation<T: DeserializeOwned>(
        &self,
        name: &str,
        variables: Value,
    ) -> Result<T, ClientError> {
        debug!("Operation {} {}", name, variables);
        let request = self
            .client
            .post(format!("{}/graphql", self.base_url))
            .json(&json!({ "operation": name, "variables": variables }));
        let body = send(self.authorize(request)).await?;
        extract_data(name, body)
    }

    pub async fn lookup(
        &self,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<LookupResponse, ClientError> {
        let url = format!(
            "{}/api/editions/{}/{}",
            self.base_url,
            location_id,
            format_edition_date(date)
        );
        let body = send(self.client.get(url)).await?;
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(api_error(status.as_u16(), body))
    }
}

fn api_error(status: u16, body: Value) -> ClientError {
    let message = serde_json::from_value::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| "unknown error".to_string());
    ClientError::Api { status, message }
}

/// Pull `data.<name>` out of an operation response.
pub fn extract_data<T: DeserializeOwned>(name: &str, mut body: Value) -> Result<T, ClientError> {
    let field = body
        .get_mut("data")
        .and_then(|data| data.get_mut(name))
        .map(Value::take)
        .ok_or_else(|| ClientError::Decode(format!("missing data.{}", name)))?;
    serde_json::from_value(field).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use epaper_core::{AuthPayload, Edition};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_auth_payload() {
        let body = json!({
            "data": {
                "signIn": { "user": null, "token": null, "error": "Invalid email or password" }
            }
        });
        let payload: AuthPayload = extract_data("signIn", body).unwrap();
        assert_eq!(payload.error.as_deref(), Some("Invalid email or password"));
        assert!(payload.token.is_none());
    }

    #[test]
    fn test_extract_edition_list() {
        let body = json!({
            "data": {
                "epaperChildEditionByIdDate": [{
                    "id": "90001",
                    "title": "Indore",
                    "edition_date": "05-03-2024",
                    "parent": "4121844",
                    "group_epaper_pdf": [{ "url": "https://e/x.pdf" }]
                }]
            }
        });
        let editions: Vec<Edition> = extract_data("epaperChildEditionByIdDate", body).unwrap();
        assert_eq!(editions.len(), 1);
        assert_eq!(editions[0].primary_pdf_url(), Some("https://e/x.pdf"));
    }

    #[test]
    fn test_extract_missing_field() {
        let err = extract_data::<Value>("me", json!({ "data": {} })).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_api_error_message() {
        let err = api_error(
            401,
            json!({ "success": false, "error": "Please sign in", "code": "UNAUTHORIZED" }),
        );
        assert_eq!(err.to_string(), "Server error (401): Please sign in");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:4000/");
        assert_eq!(client.base_url, "http://localhost:4000");
    }
}
