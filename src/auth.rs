//! Credentials sign-in and signed session tokens.
//!
//! Tokens look like `<user_id>.<expires_unix>.<epoch>.<hex hmac-sha256>`. Signing
//! out bumps the epoch, which invalidates every token issued before it; there is
//! only ever one signed-in session.
use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use serde::Serialize;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const SESSION_TTL_DAYS: i64 = 30;

static DEMO_USERS: Lazy<UserDirectory> = Lazy::new(|| UserDirectory {
    entries: vec![Credential {
        user: User {
            id: "1".to_string(),
            email: "user@example.com".to_string(),
            name: "Explorer".to_string(),
        },
        password: "password123".to_string(),
    }],
});

#[derive(thiserror::Error, Debug)]
pub enum AuthConfigError {
    #[error("user entry '{0}' must look like email:password:name")]
    BadUserEntry(String),
    #[error("duplicate user email '{0}'")]
    DuplicateEmail(String),
    #[error("session secret must not be empty")]
    EmptySecret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Credential {
    user: User,
    password: String,
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    entries: Vec<Credential>,
}

impl UserDirectory {
    pub fn demo() -> Self {
        DEMO_USERS.clone()
    }

    /// Parses `email:password:name` entries separated by `;`.
    pub fn parse(raw: &str) -> Result<Self, AuthConfigError> {
        let mut entries: Vec<Credential> = Vec::new();
        for chunk in raw.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let mut parts = chunk.splitn(3, ':');
            let (Some(email), Some(password), Some(name)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(AuthConfigError::BadUserEntry(chunk.to_string()));
            };
            let email = email.trim().to_lowercase();
            if email.is_empty() || password.is_empty() {
                return Err(AuthConfigError::BadUserEntry(chunk.to_string()));
            }
            if entries.iter().any(|c| c.user.email == email) {
                return Err(AuthConfigError::DuplicateEmail(email));
            }
            entries.push(Credential {
                user: User {
                    id: (entries.len() + 1).to_string(),
                    email,
                    name: name.trim().to_string(),
                },
                password: password.to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn authorize(&self, email: &str, password: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        let entry = self.entries.iter().find(|c| c.user.email == email)?;
        if constant_time_eq(entry.password.as_bytes(), password.as_bytes()) {
            Some(entry.user.clone())
        } else {
            None
        }
    }

    pub fn find(&self, id: &str) -> Option<&User> {
        self.entries.iter().map(|c| &c.user).find(|u| u.id == id)
    }
}

pub struct SessionSigner {
    mac: Hmac<Sha256>,
    ttl: Duration,
    epoch: AtomicU64,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Result<Self, AuthConfigError> {
        if secret.is_empty() {
            return Err(AuthConfigError::EmptySecret);
        }
        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| AuthConfigError::EmptySecret)?;
        Ok(Self {
            mac,
            ttl: Duration::days(SESSION_TTL_DAYS),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> String {
        let expires = (now + self.ttl).timestamp();
        let epoch = self.epoch.load(Ordering::SeqCst);
        let payload = format!("{}.{}.{}", user.id, expires, epoch);
        let sig = hex::encode(self.sign(&payload));
        info!("Issued session for user {}", user.id);
        format!("{payload}.{sig}")
    }

    /// Returns the user id carried by a valid, unexpired, current-epoch token.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let (payload, sig_hex) = token.rsplit_once('.')?;
        let mut parts = payload.split('.');
        let (Some(user_id), Some(expires), Some(epoch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };

        let Ok(expected) = hex::decode(sig_hex) else {
            return None;
        };
        let computed = self.sign(payload);
        if expected.len() != computed.len() || !constant_time_eq(&computed, &expected) {
            warn!("Rejected session token with bad signature");
            return None;
        }

        let expires: i64 = expires.parse().ok()?;
        if now.timestamp() >= expires {
            debug!("Session token for user {} expired", user_id);
            return None;
        }
        let epoch: u64 = epoch.parse().ok()?;
        if epoch != self.epoch.load(Ordering::SeqCst) {
            debug!("Session token for user {} was signed out", user_id);
            return None;
        }
        Some(user_id.to_string())
    }

    pub fn sign_out(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        info!("Signed out current session");
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    Authenticated(User),
    Unauthenticated,
}

/// Session state handed explicitly to whatever needs to know who is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct SessionView<'a> {
    pub status: &'static str,
    pub user: Option<&'a User>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Loading,
        }
    }

    pub fn resolve(
        mut self,
        token: Option<&str>,
        signer: &SessionSigner,
        users: &UserDirectory,
        now: DateTime<Utc>,
    ) -> Self {
        let user = token
            .and_then(|t| signer.verify(t, now))
            .and_then(|id| users.find(&id).cloned());
        self.status = match user {
            Some(u) => SessionStatus::Authenticated(u),
            None => SessionStatus::Unauthenticated,
        };
        self
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn user(&self) -> Option<&User> {
        match &self.status {
            SessionStatus::Authenticated(u) => Some(u),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn view(&self) -> SessionView<'_> {
        let status = match self.status {
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated(_) => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        };
        SessionView {
            status,
            user: self.user(),
        }
    }
}
