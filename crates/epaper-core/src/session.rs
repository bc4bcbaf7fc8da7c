//! Client-side session persistence
//!
//! A signed-in session is two entries in a key/value store: the serialized
//! user under [`AUTH_USER_KEY`] and the bearer token under [`AUTH_TOKEN_KEY`].
//! Both are written on sign-in and both are removed on sign-out, so a store
//! never holds one without the other for long.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{EpaperError, Result};
use crate::models::User;

pub const AUTH_USER_KEY: &str = "epaper_auth_user";
pub const AUTH_TOKEN_KEY: &str = "epaper_auth_token";

/// String key/value storage that survives restarts.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    entries: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// A JSON object on disk. Every write replaces the file atomically.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                EpaperError::SessionStorage(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(EpaperError::SessionStorage(e.to_string())),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| EpaperError::SessionStorage(e.to_string()))?;

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| EpaperError::SessionStorage(e.to_string()))?;
        let mut tmp =
            NamedTempFile::new_in(&dir).map_err(|e| EpaperError::SessionStorage(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| EpaperError::SessionStorage(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| EpaperError::SessionStorage(e.to_string()))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// The signed-in user and their bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    /// Restore a session. Returns `None` unless both entries exist. A user
    /// entry that does not parse is treated as no session and both entries
    /// are cleared.
    pub fn load<S: SessionStore + ?Sized>(store: &mut S) -> Result<Option<Session>> {
        let user = store.get(AUTH_USER_KEY)?;
        let token = store.get(AUTH_TOKEN_KEY)?;

        let (raw_user, token) = match (user, token) {
            (Some(user), Some(token)) => (user, token),
            _ => return Ok(None),
        };

        match serde_json::from_str::<User>(&raw_user) {
            Ok(user) => {
                debug!("Restored session for {}", user.email);
                Ok(Some(Session { user, token }))
            }
            Err(e) => {
                warn!("Discarding unreadable stored user: {}", e);
                Self::clear(store)?;
                Ok(None)
            }
        }
    }

    pub fn persist<S: SessionStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let user = serde_json::to_string(&self.user)
            .map_err(|e| EpaperError::SessionStorage(e.to_string()))?;
        store.set(AUTH_USER_KEY, &user)?;
        store.set(AUTH_TOKEN_KEY, &self.token)
    }

    pub fn clear<S: SessionStore + ?Sized>(store: &mut S) -> Result<()> {
        store.remove(AUTH_USER_KEY)?;
        store.remove(AUTH_TOKEN_KEY)
    }
}
