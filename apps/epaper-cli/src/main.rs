//! ePaper command-line client
//!
//! Browse editions by location and date, manage a persisted sign-in, and
//! download editions. Downloads are watermarked locally with the signed-in
//! username before they are written to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use epaper_core::date::{format_edition_date, parse_date_input};
use epaper_core::{
    AuthPayload, City, DirectorySink, DownloadLog, DownloadOutcome, DownloadService, Edition,
    EditionLookup, FileSessionStore, HttpFetcher, LocationNode, Session, User,
};
use serde_json::json;
use tracing::{debug, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;

use client::ApiClient;

#[derive(Parser, Debug)]
#[command(name = "epaper")]
#[command(about = "Browse and download watermarked ePapers")]
struct Cli {
    /// ePaper server base URL
    #[arg(long, env = "EPAPER_SERVER", default_value = "http://localhost:4000")]
    server: String,

    /// Where the sign-in session is kept
    #[arg(long, env = "EPAPER_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        username: String,
    },
    /// Forget the stored session
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// List states and their cities
    Locations,
    /// Show the edition for a city on a date (default: today)
    Edition {
        location_id: String,
        /// `YYYY-MM-DD` or `DD-MM-YYYY`
        #[arg(long)]
        date: Option<String>,
    },
    /// Download a watermarked edition
    Download {
        location_id: String,
        #[arg(long)]
        date: Option<String>,
        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let session_path = match cli.session_file.clone() {
        Some(path) => path,
        None => default_session_file()?,
    };
    debug!("Session file: {}", session_path.display());
    let mut store = FileSessionStore::new(session_path);

    let session = Session::load(&mut store)?;
    let api = ApiClient::new(&cli.server).with_token(session.as_ref().map(|s| s.token.clone()));

    match cli.command {
        Command::SignIn { email, password } => {
            let payload: AuthPayload = api
                .operation("signIn", json!({ "email": email, "password": password }))
                .await?;
            remember(&mut store, payload)?;
        }
        Command::SignUp {
            email,
            password,
            username,
        } => {
            let payload: AuthPayload = api
                .operation(
                    "signUp",
                    json!({ "email": email, "password": password, "username": username }),
                )
                .await?;
            remember(&mut store, payload)?;
        }
        Command::SignOut => {
            if session.is_some() {
                // The local session goes away even if the server is unreachable
                if let Err(e) = api.operation::<bool>("signOut", json!({})).await {
                    warn!("Server sign-out failed: {}", e);
                }
            }
            Session::clear(&mut store)?;
            println!("Signed out");
        }
        Command::Whoami => match session {
            Some(_) => {
                let me: Option<User> = api.operation("me", json!({})).await?;
                match me {
                    Some(user) => println!("{} <{}>", user.username, user.email),
                    None => {
                        Session::clear(&mut store)?;
                        println!("Session expired; please sign in again");
                    }
                }
            }
            None => println!("Not signed in"),
        },
        Command::Locations => {
            let nodes: Vec<LocationNode> = api.operation("epaperEditions", json!({})).await?;
            for node in nodes {
                println!("{}  {}", node.state.id, label(node.state.name.display()));
                for city in &node.children {
                    print_city(city);
                }
            }
        }
        Command::Edition { location_id, date } => {
            let date = resolve_date(date.as_deref())?;
            let response = api.lookup(&location_id, date).await?;
            println!("{}", response.title);
            match response.lookup {
                EditionLookup::NotFound { edition_date, .. } => {
                    println!("No edition published on {}", edition_date)
                }
                EditionLookup::Found { edition, .. } => print_edition(&edition),
            }
        }
        Command::Download {
            location_id,
            date,
            output,
        } => {
            let session = match session {
                Some(session) => session,
                None => bail!("Please sign in to download ePapers"),
            };
            let date = resolve_date(date.as_deref())?;
            download(&api, &session, &location_id, date, output).await?;
        }
    }

    Ok(())
}

/// `<data dir>/epaper/session.json` under the platform data directory.
fn default_session_file() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| session_file_in(&dir))
        .context("No data directory found; pass --session-file")
}

fn session_file_in(data_dir: &Path) -> PathBuf {
    data_dir.join("epaper").join("session.json")
}

/// Today's date unless one was given.
fn resolve_date(input: Option<&str>) -> Result<NaiveDate> {
    match input {
        Some(value) => parse_date_input(value).with_context(|| format!("Invalid date '{}'", value)),
        None => Ok(Local::now().date_naive()),
    }
}

fn remember(store: &mut FileSessionStore, payload: AuthPayload) -> Result<()> {
    if let Some(error) = payload.error {
        bail!(error);
    }
    let (user, token) = match (payload.user, payload.token) {
        (Some(user), Some(token)) => (user, token),
        _ => bail!("Server returned no session"),
    };
    println!("Signed in as {}", user.username);
    Session::new(user, token).persist(store)?;
    Ok(())
}

async fn download(
    api: &ApiClient,
    session: &Session,
    location_id: &str,
    date: NaiveDate,
    output: PathBuf,
) -> Result<()> {
    let editions: Vec<Edition> = api
        .operation(
            "epaperChildEditionByIdDate",
            json!({ "id": location_id, "date": format_edition_date(date) }),
        )
        .await?;

    let edition = match editions.into_iter().next() {
        Some(edition) => edition,
        None => bail!("No edition for {} on {}", location_id, date),
    };

    let service = DownloadService::new(Arc::new(HttpFetcher::new()));
    let mut sink = DirectorySink::new(output);
    let outcome = service
        .download(
            &edition,
            &session.user.username,
            Local::now().fixed_offset(),
            &mut sink,
        )
        .await;

    let notice = outcome.notice();
    println!("{}: {}", notice.title, notice.description);

    match outcome {
        DownloadOutcome::Saved(saved) => {
            if let Some(path) = &saved.path {
                println!("Saved {}", path.display());
            }
            let logged: Result<DownloadLog, _> = api
                .operation(
                    "logDownload",
                    json!({ "userId": session.user.id, "epaperId": edition.id }),
                )
                .await;
            if let Err(e) = logged {
                warn!("Could not record download: {}", e);
            }
            Ok(())
        }
        DownloadOutcome::Unavailable => Ok(()),
        DownloadOutcome::Failed(e) => Err(e.into()),
    }
}

fn label(name: Option<&str>) -> &str {
    name.unwrap_or("(unnamed)")
}

fn print_city(city: &City) {
    println!("  {}  {}", city.id, label(city.name.display()));
}

fn print_edition(edition: &Edition) {
    println!("{}  {}  {}", edition.id, edition.edition_date, edition.title);
    match edition.primary_pdf_url() {
        Some(url) => println!("PDF: {}", url),
        None => println!("No PDF available"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epaper_core::session::{SessionStore, AUTH_TOKEN_KEY};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_date_accepts_both_spellings() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(resolve_date(Some("2024-03-05")).unwrap(), expected);
        assert_eq!(resolve_date(Some("05-03-2024")).unwrap(), expected);
        assert!(resolve_date(Some("March 5")).is_err());
    }

    #[test]
    fn test_session_file_lives_under_app_dir() {
        let path = session_file_in(Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/epaper/session.json"));
    }

    #[test]
    fn test_default_session_file_uses_platform_data_dir() {
        if let Some(data_dir) = dirs::data_dir() {
            let path = default_session_file().unwrap();
            assert!(path.starts_with(&data_dir));
            assert!(path.ends_with("epaper/session.json"));
        }
    }

    #[test]
    fn test_remember_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("session.json"));
        let user = User {
            id: "user_1".into(),
            email: "john@example.com".into(),
            username: "johndoe".into(),
            created_at: chrono::Utc::now(),
        };
        let payload = AuthPayload {
            user: Some(user),
            token: Some("tok".into()),
            error: None,
        };

        remember(&mut store, payload).unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("tok"));
    }

    #[test]
    fn test_remember_surfaces_payload_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("session.json"));
        let payload = AuthPayload {
            user: None,
            token: None,
            error: Some("Invalid email or password".into()),
        };

        let err = remember(&mut store, payload).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
    }
}
