//! 认证服务：注册、登录、令牌校验
//!
//! 所有来自哈希器、令牌服务和凭据存储的失败都在这里被映射为 `AuthError`
//! 的某一种，内部错误细节不会越过这一层。

use crate::{
    auth::{jwt::JwtService, password::PasswordHasher},
    models::{
        auth::{LoginRequest, SessionToken, SignupRequest},
        user::{normalize_handle, NewIdentity, UserIdentity},
    },
    repository::{CredentialStore, StoreError},
};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use validator::Validate;

/// 认证服务边界错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("handle already registered")]
    DuplicateHandle,

    /// handle 不存在与密码错误共用此变体
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("credential store unavailable")]
    StoreUnavailable,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<PasswordHasher>,
    jwt_service: Arc<JwtService>,
    token_ttl: chrono::Duration,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<PasswordHasher>,
        jwt_service: Arc<JwtService>,
        token_ttl: chrono::Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            jwt_service,
            token_ttl,
            store_timeout,
        }
    }

    /// 用户注册
    pub async fn signup(&self, mut req: SignupRequest) -> Result<UserIdentity, AuthError> {
        // 先规范化再校验，与登录对同一输入的处理一致
        req.handle = normalize_handle(&req.handle);
        req.validate().map_err(|e| AuthError::Validation(e.to_string()))?;

        let SignupRequest { handle, password } = req;

        // 明文在哈希后随闭包一起丢弃
        let password_digest = self.hash_blocking(password).await?;

        let user = self
            .with_timeout(self.store.insert(NewIdentity::new(handle, password_digest)))
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    tracing::info!("Signup rejected: handle already registered");
                    AuthError::DuplicateHandle
                }
                StoreError::Unavailable(_) => AuthError::StoreUnavailable,
            })?;

        metrics::counter!("auth_signup_total").increment(1);
        tracing::info!(user_id = %user.id, "User signed up");

        Ok(user)
    }

    /// 用户登录
    pub async fn login(&self, mut req: LoginRequest) -> Result<SessionToken, AuthError> {
        req.handle = normalize_handle(&req.handle);
        req.validate().map_err(|e| AuthError::Validation(e.to_string()))?;

        let LoginRequest { handle, password } = req;

        let user = self
            .with_timeout(self.store.find_by_handle(&handle))
            .await
            .map_err(|_| AuthError::StoreUnavailable)?;

        // 验证密码；handle 不存在时仍然做一次等价的哈希计算
        let hasher = self.hasher.clone();
        let digest = user.as_ref().map(|u| u.password_digest.clone());
        let verified = tokio::task::spawn_blocking(move || match digest {
            Some(digest) => hasher.verify(&password, &digest),
            None => hasher.dummy_verify(&password),
        })
        .await
        .map_err(|e| {
            tracing::error!("Password verification task failed: {}", e);
            AuthError::StoreUnavailable
        })?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                metrics::counter!("auth_login_total", "outcome" => "rejected").increment(1);
                tracing::info!("Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let issued = self.jwt_service.issue(&user.id, self.token_ttl).map_err(|e| {
            tracing::error!("Failed to issue session token: {}", e);
            AuthError::StoreUnavailable
        })?;

        metrics::counter!("auth_login_total", "outcome" => "authenticated").increment(1);
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(SessionToken {
            user_id: user.id,
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// 校验会话令牌并加载对应身份
    pub async fn authenticate(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let user_id = self
            .jwt_service
            .verify(token)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.with_timeout(self.store.find_by_id(&user_id))
            .await
            .map_err(|_| AuthError::StoreUnavailable)?
            .ok_or(AuthError::InvalidCredentials)
    }

    /// 就绪检查
    pub async fn store_ready(&self) -> Result<(), AuthError> {
        self.with_timeout(self.store.ping())
            .await
            .map_err(|_| AuthError::StoreUnavailable)
    }

    /// Argon2 计算量大，放到阻塞线程池
    async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                tracing::error!("Password hashing task failed: {}", e);
                AuthError::StoreUnavailable
            })?
            .map_err(|_| AuthError::StoreUnavailable)
    }

    /// 为存储访问加上超时，超时视为存储不可用
    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Credential store access timed out"
                );
                Err(StoreError::Unavailable("timed out".to_string()))
            }
        }
    }
}
