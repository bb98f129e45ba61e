//! Authentication-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Signup request
#[derive(Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "handle must be a valid e-mail address"))]
    pub handle: String,
    #[validate(length(min = 1, max = 1024, message = "password must be 1 to 1024 characters"))]
    pub password: String,
}

/// Login request
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 320, message = "handle is required"))]
    pub handle: String,
    #[validate(length(min = 1, max = 1024, message = "password is required"))]
    pub password: String,
}

// 两个请求都携带明文密码，Debug 输出中隐藏
impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("handle", &self.handle)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("handle", &self.handle)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Issued session token
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
