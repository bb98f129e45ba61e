//! User identity models

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Stored user identity
///
/// `password_digest` is an Argon2id PHC string. It is never serialized and is
/// redacted from `Debug` output.
#[derive(Clone, sqlx::FromRow)]
pub struct UserIdentity {
    pub id: Uuid,
    pub handle: String,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserIdentity")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("password_digest", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Identity about to be inserted, with id and timestamp assigned up front
#[derive(Clone)]
pub struct NewIdentity {
    pub id: Uuid,
    pub handle: String,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

impl NewIdentity {
    pub fn new(handle: String, password_digest: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle,
            password_digest,
            created_at: Utc::now(),
        }
    }
}

impl From<NewIdentity> for UserIdentity {
    fn from(new: NewIdentity) -> Self {
        Self {
            id: new.id,
            handle: new.handle,
            password_digest: new.password_digest,
            created_at: new.created_at,
        }
    }
}

/// User response (without sensitive data)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserIdentity> for UserResponse {
    fn from(user: UserIdentity) -> Self {
        Self {
            id: user.id,
            handle: user.handle,
            created_at: user.created_at,
        }
    }
}

/// Canonical form of a login handle: trimmed, lower-cased
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}
