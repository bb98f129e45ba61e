//! User repository (数据库访问层)

use super::{CredentialStore, StoreError};
use crate::models::user::{NewIdentity, UserIdentity};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    /// 创建用户，依赖 users.handle 上的 UNIQUE 约束检测重复
    async fn insert(&self, identity: NewIdentity) -> Result<UserIdentity, StoreError> {
        let user = sqlx::query_as::<_, UserIdentity>(
            r#"
            INSERT INTO users (id, handle, password_digest, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, handle, password_digest, created_at
            "#,
        )
        .bind(identity.id)
        .bind(&identity.handle)
        .bind(&identity.password_digest)
        .bind(identity.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_sqlx_error)?;

        Ok(user)
    }

    /// 根据 handle 查找用户
    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserIdentity>, StoreError> {
        let user = sqlx::query_as::<_, UserIdentity>(
            "SELECT id, handle, password_digest, created_at FROM users WHERE handle = $1",
        )
        .bind(handle)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx_error)?;

        Ok(user)
    }

    /// 根据 ID 查找用户
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserIdentity>, StoreError> {
        let user = sqlx::query_as::<_, UserIdentity>(
            "SELECT id, handle, password_digest, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx_error)?;

        Ok(user)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match crate::db::health_check(&self.db).await {
            crate::db::HealthStatus::Healthy => Ok(()),
            crate::db::HealthStatus::Unhealthy(msg) => Err(StoreError::Unavailable(msg)),
        }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict,
        _ => {
            tracing::warn!(error = %e, "Credential store query failed");
            StoreError::Unavailable(e.to_string())
        }
    }
}
