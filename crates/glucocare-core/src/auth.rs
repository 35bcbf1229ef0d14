use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Identity provider failures. `Display` is the message shown to the user;
/// unknown provider codes fall back to the provider's own message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredential,
    #[error("No account found with this email")]
    UserNotFound,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Password is too weak. Use at least 6 characters.")]
    WeakPassword,
    #[error("This email is already registered. Please login instead.")]
    EmailInUse,
    #[error("Sign-in cancelled")]
    PopupCancelled,
    #[error("{message}")]
    Provider { code: String, message: String },
}

impl AuthError {
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "auth/invalid-credential" => AuthError::InvalidCredential,
            "auth/user-not-found" => AuthError::UserNotFound,
            "auth/wrong-password" => AuthError::WrongPassword,
            "auth/invalid-email" => AuthError::InvalidEmail,
            "auth/weak-password" => AuthError::WeakPassword,
            "auth/email-already-in-use" => AuthError::EmailInUse,
            "auth/popup-closed-by-user" => AuthError::PopupCancelled,
            _ => AuthError::Provider {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AuthError::InvalidCredential => "auth/invalid-credential",
            AuthError::UserNotFound => "auth/user-not-found",
            AuthError::WrongPassword => "auth/wrong-password",
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::WeakPassword => "auth/weak-password",
            AuthError::EmailInUse => "auth/email-already-in-use",
            AuthError::PopupCancelled => "auth/popup-closed-by-user",
            AuthError::Provider { code, .. } => code,
        }
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Message for the federated sign-in button, which prefixes raw failures.
    pub fn federated_message(&self) -> String {
        match self {
            AuthError::PopupCancelled => self.to_string(),
            other => format!("Federated sign-in failed: {}", other),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        AuthError::Provider {
            code: "auth/internal-error".to_string(),
            message: err.to_string(),
        }
    }
}

/// Checks done before any provider call.
pub fn validate_credentials(email: &str, password: &str, signing_up: bool) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::invalid("Please enter both email and password"));
    }
    if signing_up && password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::invalid("Password must be at least 6 characters"));
    }
    Ok(())
}

#[async_trait]
pub trait Identity: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> std::result::Result<User, AuthError>;
    async fn sign_up_with_password(&self, email: &str, password: &str) -> std::result::Result<User, AuthError>;
    async fn sign_in_federated(&self) -> std::result::Result<User, AuthError>;
    async fn sign_out(&self) -> std::result::Result<(), AuthError>;
    fn current_user(&self) -> Option<User>;
    /// Receiver that observes every sign-in and sign-out.
    fn on_session_change(&self) -> watch::Receiver<Option<User>>;
}

/// Accounts kept in a local SQLite file with salted SHA-256 password hashes.
pub struct LocalIdentity {
    conn: Mutex<Connection>,
    session: watch::Sender<Option<User>>,
}

impl LocalIdentity {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                salt TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        let (session, _) = watch::channel(None);
        Ok(Self {
            conn: Mutex::new(conn),
            session,
        })
    }

    fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, AuthError> {
        self.conn.lock().map_err(AuthError::internal)
    }

    /// Remove the signed-in account and end the session.
    pub async fn delete_account(&self) -> std::result::Result<(), AuthError> {
        let Some(user) = self.current_user() else {
            return Err(AuthError::Provider {
                code: "auth/no-current-user".to_string(),
                message: "Please log in again to verify before deleting.".to_string(),
            });
        };

        self.conn()?
            .execute("DELETE FROM accounts WHERE id = ?1", params![user.id])
            .map_err(AuthError::internal)?;
        info!(user_id = %user.id, "account deleted");
        self.session.send_replace(None);
        Ok(())
    }
}

#[async_trait]
impl Identity for LocalIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        let email = normalize_email(email)?;

        let row: Option<(String, String, String)> = self
            .conn()?
            .query_row(
                "SELECT id, salt, password_hash FROM accounts WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(AuthError::internal)?;

        let Some((id, salt, stored_hash)) = row else {
            return Err(AuthError::UserNotFound);
        };
        if hash_password(&salt, password) != stored_hash {
            warn!(%email, "sign-in rejected: wrong password");
            return Err(AuthError::WrongPassword);
        }

        let user = User { id, email };
        info!(user_id = %user.id, "signed in");
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email,
        };
        let salt = uuid::Uuid::new_v4().simple().to_string();

        {
            let conn = self.conn()?;
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
                    params![user.email],
                    |row| row.get(0),
                )
                .map_err(AuthError::internal)?;
            if exists {
                return Err(AuthError::EmailInUse);
            }

            conn.execute(
                "INSERT INTO accounts (id, email, salt, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.id, user.email, salt, hash_password(&salt, password), Utc::now().timestamp_millis()],
            )
            .map_err(AuthError::internal)?;
        }

        info!(user_id = %user.id, "account created");
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_federated(&self) -> std::result::Result<User, AuthError> {
        Err(AuthError::Provider {
            code: "auth/operation-not-allowed".to_string(),
            message: "Federated sign-in is not available for local accounts".to_string(),
        })
    }

    async fn sign_out(&self) -> std::result::Result<(), AuthError> {
        if let Some(user) = self.session.send_replace(None) {
            info!(user_id = %user.id, "signed out");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    fn on_session_change(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }
}

fn normalize_email(email: &str) -> std::result::Result<String, AuthError> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

    let email = email.trim().to_lowercase();
    if pattern.is_match(&email) {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail)
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("", "secret", false).unwrap_err().is_input_validation());
        assert!(validate_credentials("a@b.co", "", false).is_err());
        assert!(validate_credentials("a@b.co", "123", false).is_ok());
        let err = validate_credentials("a@b.co", "123", true).unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");
    }

    #[test]
    fn test_code_mapping_and_fallback() {
        assert_eq!(
            AuthError::from_code("auth/email-already-in-use", "raw").user_message(),
            "This email is already registered. Please login instead."
        );
        assert_eq!(
            AuthError::from_code("auth/popup-closed-by-user", "raw").user_message(),
            "Sign-in cancelled"
        );
        let unknown = AuthError::from_code("auth/too-many-requests", "Access temporarily disabled");
        assert_eq!(unknown.user_message(), "Access temporarily disabled");
        assert_eq!(unknown.code(), "auth/too-many-requests");
        assert_eq!(AuthError::WrongPassword.code(), "auth/wrong-password");
    }

    #[test]
    fn test_federated_message() {
        assert_eq!(AuthError::PopupCancelled.federated_message(), "Sign-in cancelled");
        assert!(AuthError::InvalidCredential
            .federated_message()
            .starts_with("Federated sign-in failed:"));
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let identity = LocalIdentity::in_memory().unwrap();
        let mut session = identity.on_session_change();

        let created = identity.sign_up_with_password(" Ana@Example.com ", "secret1").await.unwrap();
        assert_eq!(created.email, "ana@example.com");
        assert!(session.has_changed().unwrap());
        assert_eq!(session.borrow_and_update().clone(), Some(created.clone()));

        identity.sign_out().await.unwrap();
        assert!(identity.current_user().is_none());

        let signed_in = identity.sign_in_with_password("ana@example.com", "secret1").await.unwrap();
        assert_eq!(signed_in, created);
        assert_eq!(identity.current_user(), Some(created));
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let identity = LocalIdentity::in_memory().unwrap();
        identity.sign_up_with_password("ana@example.com", "secret1").await.unwrap();

        assert_eq!(
            identity.sign_in_with_password("bob@example.com", "secret1").await.unwrap_err(),
            AuthError::UserNotFound
        );
        assert_eq!(
            identity.sign_in_with_password("ana@example.com", "nope").await.unwrap_err(),
            AuthError::WrongPassword
        );
        assert_eq!(
            identity.sign_in_with_password("not-an-email", "secret1").await.unwrap_err(),
            AuthError::InvalidEmail
        );
    }

    #[tokio::test]
    async fn test_sign_up_failures() {
        let identity = LocalIdentity::in_memory().unwrap();
        identity.sign_up_with_password("ana@example.com", "secret1").await.unwrap();

        assert_eq!(
            identity.sign_up_with_password("ANA@example.com", "another1").await.unwrap_err(),
            AuthError::EmailInUse
        );
        assert_eq!(
            identity.sign_up_with_password("new@example.com", "123").await.unwrap_err(),
            AuthError::WeakPassword
        );
    }

    #[tokio::test]
    async fn test_federated_is_not_allowed_locally() {
        let identity = LocalIdentity::in_memory().unwrap();
        let err = identity.sign_in_federated().await.unwrap_err();
        assert_eq!(err.code(), "auth/operation-not-allowed");
    }

    #[tokio::test]
    async fn test_delete_account_requires_session() {
        let identity = LocalIdentity::in_memory().unwrap();
        assert!(identity.delete_account().await.is_err());

        identity.sign_up_with_password("ana@example.com", "secret1").await.unwrap();
        identity.delete_account().await.unwrap();
        assert!(identity.current_user().is_none());
        assert_eq!(
            identity.sign_in_with_password("ana@example.com", "secret1").await.unwrap_err(),
            AuthError::UserNotFound
        );
    }
}
