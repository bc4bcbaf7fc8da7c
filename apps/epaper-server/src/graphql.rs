//! Named-operation endpoint at `POST /graphql`
//!
//! Requests are `{ "operation": "<name>", "variables": { ... } }` and
//! responses are `{ "data": { "<name>": <result> } }`, using the field names
//! the web client queries. Each operation deserializes its own variables.

use axum::{extract::State, Json};
use chrono::Utc;
use epaper_core::date::parse_date_input;
use epaper_core::{DownloadLog, EditionFilter, Notice};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::extract::CurrentUser;
use crate::state::AppState;

const EPAPER_NOT_FOUND: &str = "EPaper not found";

#[derive(Debug, Deserialize)]
pub struct OperationRequest {
    pub operation: String,
    #[serde(default)]
    pub variables: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub success: bool,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl DownloadPayload {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ChildEditionVars {
    id: String,
    date: String,
}

#[derive(Deserialize)]
struct SignInVars {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpVars {
    email: String,
    password: String,
    username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitiesVars {
    state_id: Option<String>,
}

#[derive(Deserialize)]
struct IdVars {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadLogsVars {
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadEPaperVars {
    epaper_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogDownloadVars {
    user_id: String,
    epaper_id: String,
}

fn variables<T: DeserializeOwned>(operation: &str, variables: Value) -> Result<T, ServerError> {
    let variables = if variables.is_null() {
        Value::Object(Map::new())
    } else {
        variables
    };
    serde_json::from_value(variables).map_err(|e| {
        ServerError::InvalidRequest(format!("Invalid variables for {}: {}", operation, e))
    })
}

fn data<T: Serialize>(value: T) -> Result<Value, ServerError> {
    serde_json::to_value(value).map_err(|e| ServerError::Internal(e.to_string()))
}

/// Handler: POST /graphql
pub async fn handle_operation(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<OperationRequest>,
) -> Result<Json<Value>, ServerError> {
    debug!("Operation {}", request.operation);
    let result = execute(&state, &current, &request.operation, request.variables).await?;

    let mut fields = Map::new();
    fields.insert(request.operation, result);
    let mut body = Map::new();
    body.insert("data".to_string(), Value::Object(fields));
    Ok(Json(Value::Object(body)))
}

async fn execute(
    state: &AppState,
    current: &CurrentUser,
    operation: &str,
    vars: Value,
) -> Result<Value, ServerError> {
    match operation {
        "epaperEditions" => data(state.locations.hierarchy().await),
        "epaperChildEditionByIdDate" => {
            let v: ChildEditionVars = variables(operation, vars)?;
            let date = parse_date_input(&v.date)
                .ok_or_else(|| ServerError::InvalidRequest(format!("Invalid date '{}'", v.date)))?;
            data(state.resolver.editions_on(&v.id, date).await)
        }
        "signIn" => {
            let v: SignInVars = variables(operation, vars)?;
            data(state.auth.sign_in(&v.email, &v.password).await)
        }
        "signUp" => {
            let v: SignUpVars = variables(operation, vars)?;
            data(state.auth.sign_up(&v.email, &v.password, &v.username).await)
        }
        "signOut" => data(state.auth.sign_out(current.token.as_deref()).await),
        "me" => data(&current.user),
        "users" => data(state.users.users().await),
        "states" => data(state.locations.states().await),
        "cities" => {
            let v: CitiesVars = variables(operation, vars)?;
            data(state.locations.cities(v.state_id.as_deref()).await)
        }
        "epapers" => {
            let filter: EditionFilter = variables(operation, vars)?;
            data(state.editions.editions(&filter).await)
        }
        "epaper" => {
            let v: IdVars = variables(operation, vars)?;
            data(state.editions.edition(&v.id).await)
        }
        "downloadLogs" => {
            let v: DownloadLogsVars = variables(operation, vars)?;
            data(state.download_logs.logs(v.user_id.as_deref()).await)
        }
        "downloadEPaper" => {
            let v: DownloadEPaperVars = variables(operation, vars)?;
            data(download_epaper(state, &v.epaper_id).await)
        }
        "logDownload" => {
            let v: LogDownloadVars = variables(operation, vars)?;
            let log = DownloadLog {
                id: Uuid::new_v4().to_string(),
                user_id: v.user_id,
                edition_id: v.epaper_id,
                downloaded_at: Utc::now(),
            };
            state.download_logs.append(log.clone()).await;
            info!("Logged download of {} by {}", log.edition_id, log.user_id);
            data(log)
        }
        other => Err(ServerError::InvalidRequest(format!(
            "Unknown operation '{}'",
            other
        ))),
    }
}

/// Points the client at the authenticated download route.
async fn download_epaper(state: &AppState, epaper_id: &str) -> DownloadPayload {
    let edition = match state.editions.edition(epaper_id).await {
        Some(edition) => edition,
        None => return DownloadPayload::failure(EPAPER_NOT_FOUND),
    };

    if edition.primary_pdf_url().is_none() {
        return DownloadPayload::failure(&Notice::download_unavailable().description);
    }

    DownloadPayload {
        success: true,
        url: Some(format!("/api/download/{}", edition.id)),
        error: None,
    }
}
