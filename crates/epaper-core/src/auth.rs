//! Accounts: credential validation, sign-in/sign-up and bearer tokens

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EpaperError, Result};
use crate::models::User;
use crate::repository::UserRepository;

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const ACCOUNT_EXISTS: &str = "Email or username already exists";

const MIN_PASSWORD_LEN: usize = 6;
const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 30;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Stored account: the public user plus an Argon2id hash in PHC string form.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    password_hash: String,
}

impl UserRecord {
    pub fn new(user: User, password: &str) -> Result<Self> {
        Ok(Self {
            user,
            password_hash: hash_password(password)?,
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EpaperError::Internal(format!("Failed to hash password: {}", e)))
}

/// False for a mismatch and for a hash that does not parse.
fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn validate_sign_in(email: &str, password: &str) -> Result<()> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(EpaperError::Validation("Invalid email address".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(EpaperError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str, username: &str) -> Result<()> {
    validate_sign_in(email, password)?;
    let len = username.trim().chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(EpaperError::Validation(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if len > MAX_USERNAME_LEN {
        return Err(EpaperError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

/// Result of `signIn` / `signUp`. Failures are reported in `error`, not as
/// transport errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: Option<User>,
    pub token: Option<String>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn success(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            error: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            user: None,
            token: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Bearer tokens handed out at sign-in.
pub struct TokenRegistry {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    ttl: Duration,
}

impl TokenRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// New token for `user_id`. Expired tokens are swept first.
    pub async fn issue(&self, user_id: &str) -> String {
        let now = Utc::now();
        let token = Uuid::new_v4().to_string();
        let issued = IssuedToken {
            user_id: user_id.to_string(),
            expires_at: now + self.ttl,
        };

        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(token.clone(), issued);
        token
    }

    /// User id for a live token. Expired tokens are dropped on lookup.
    pub async fn user_id(&self, token: &str) -> Option<String> {
        let mut tokens = self.tokens.write().await;
        match tokens.get(token) {
            Some(issued) if issued.expires_at > Utc::now() => Some(issued.user_id.clone()),
            Some(_) => {
                tokens.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: TokenRegistry,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self::with_tokens(users, TokenRegistry::default())
    }

    pub fn with_tokens(users: Arc<dyn UserRepository>, tokens: TokenRegistry) -> Self {
        Self { users, tokens }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthPayload {
        if let Err(e) = validate_sign_in(email, password) {
            return AuthPayload::failure(e.to_string());
        }

        let record = match self.users.find_by_email(email.trim()).await {
            Some(record) if record.verify(password) => record,
            _ => {
                debug!("Rejected sign-in for {}", email);
                return AuthPayload::failure(INVALID_CREDENTIALS);
            }
        };

        let token = self.tokens.issue(&record.user.id).await;
        info!("User {} signed in", record.user.id);
        AuthPayload::success(record.user, token)
    }

    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> AuthPayload {
        if let Err(e) = validate_sign_up(email, password, username) {
            return AuthPayload::failure(e.to_string());
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            username: username.trim().to_string(),
            created_at: Utc::now(),
        };

        let record = match UserRecord::new(user, password) {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not hash password: {}", e);
                return AuthPayload::failure(e.to_string());
            }
        };

        let user = match self.users.insert_unique(record).await {
            Ok(user) => user,
            Err(EpaperError::Validation(message)) => return AuthPayload::failure(message),
            Err(e) => return AuthPayload::failure(e.to_string()),
        };

        let token = self.tokens.issue(&user.id).await;
        info!("Registered user {}", user.id);
        AuthPayload::success(user, token)
    }

    pub async fn sign_out(&self, token: Option<&str>) -> bool {
        if let Some(token) = token {
            self.tokens.revoke(token).await;
        }
        true
    }

    /// The user a bearer token belongs to, if the token is live.
    pub async fn current_user(&self, token: &str) -> Option<User> {
        let user_id = self.tokens.user_id(token).await?;
        self.users.user(&user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use pretty_assertions::assert_eq;

    fn service() -> AuthService {
        let store = Arc::new(InMemoryStore::with_default_seed().unwrap());
        AuthService::new(store)
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate_sign_in("john@example.com", "secret1").is_ok());
        assert!(validate_sign_in("not-an-email", "secret1").is_err());
        assert!(validate_sign_in("john@example.com", "short").is_err());
        assert!(validate_sign_up("a@b.co", "secret1", "jo").is_err());
        assert!(validate_sign_up("a@b.co", "secret1", &"x".repeat(31)).is_err());
        assert!(validate_sign_up("a@b.co", "secret1", &"x".repeat(30)).is_ok());
    }

    #[test]
    fn test_password_hash_is_argon2_phc() {
        let user = User {
            id: "u".into(),
            email: "u@example.com".into(),
            username: "user".into(),
            created_at: Utc::now(),
        };
        let a = UserRecord::new(user.clone(), "password123").unwrap();
        let b = UserRecord::new(user, "password123").unwrap();
        assert!(a.password_hash.starts_with("$argon2"));
        assert_ne!(a.password_hash, b.password_hash);
        assert!(a.verify("password123"));
        assert!(!a.verify("password124"));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("password123", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_sign_in_with_seed_user() {
        let auth = service();
        let payload = auth.sign_in("john@example.com", "password123").await;
        assert_eq!(payload.error, None);
        let user = payload.user.unwrap();
        assert_eq!(user.username, "johndoe");

        let token = payload.token.unwrap();
        assert_eq!(auth.current_user(&token).await, Some(user));
    }

    #[tokio::test]
    async fn test_sign_in_rejects_wrong_password() {
        let auth = service();
        let payload = auth.sign_in("john@example.com", "wrongpass").await;
        assert_eq!(payload.error.as_deref(), Some(INVALID_CREDENTIALS));
        assert!(payload.token.is_none());

        let unknown = auth.sign_in("nobody@example.com", "password123").await;
        assert_eq!(unknown.error.as_deref(), Some(INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicates() {
        let auth = service();
        let taken_email = auth
            .sign_up("john@example.com", "password123", "someoneelse")
            .await;
        assert_eq!(taken_email.error.as_deref(), Some(ACCOUNT_EXISTS));

        let taken_name = auth
            .sign_up("fresh@example.com", "password123", "johndoe")
            .await;
        assert_eq!(taken_name.error.as_deref(), Some(ACCOUNT_EXISTS));

        let created = auth
            .sign_up("fresh@example.com", "password123", "freshuser")
            .await;
        assert_eq!(created.error, None);
        assert!(auth.sign_in("fresh@example.com", "password123").await.token.is_some());
    }

    #[tokio::test]
    async fn test_sign_up_reports_validation_message() {
        let auth = service();
        let payload = auth.sign_up("fresh@example.com", "123", "freshuser").await;
        assert_eq!(
            payload.error.as_deref(),
            Some("Password must be at least 6 characters")
        );
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let auth = service();
        let token = auth
            .sign_in("john@example.com", "password123")
            .await
            .token
            .unwrap();
        assert!(auth.sign_out(Some(&token)).await);
        assert_eq!(auth.current_user(&token).await, None);
        assert!(auth.sign_out(None).await);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let registry = TokenRegistry::new(Duration::seconds(-1));
        let token = registry.issue("user_1").await;
        assert_eq!(registry.user_id(&token).await, None);
    }

    #[tokio::test]
    async fn test_issue_sweeps_expired_tokens() {
        let registry = TokenRegistry::new(Duration::seconds(-1));
        for user in ["user_1", "user_2", "user_3"] {
            registry.issue(user).await;
        }
        assert_eq!(registry.tokens.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_issue_keeps_live_tokens() {
        let registry = TokenRegistry::default();
        let first = registry.issue("user_1").await;
        registry.issue("user_2").await;
        assert_eq!(registry.tokens.read().await.len(), 2);
        assert_eq!(registry.user_id(&first).await.as_deref(), Some("user_1"));
    }
}
