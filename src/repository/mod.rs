//! Credential store layer
//! 凭据存储边界：Postgres 实现用于生产，内存实现用于测试与本地开发

pub mod memory;
pub mod user_repo;

pub use memory::InMemoryCredentialStore;
pub use user_repo::UserRepository;

use crate::models::user::{NewIdentity, UserIdentity};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 唯一约束冲突（handle 已存在）
    #[error("unique constraint violated")]
    Conflict,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 用户身份持久化边界
///
/// handle 的唯一性必须由存储自身保证：`insert` 在冲突时返回
/// `StoreError::Conflict`，调用方不做先查后写。
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 写入新身份
    async fn insert(&self, identity: NewIdentity) -> Result<UserIdentity, StoreError>;

    /// 根据 handle 查找
    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserIdentity>, StoreError>;

    /// 根据 ID 查找
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserIdentity>, StoreError>;

    /// 就绪检查
    async fn ping(&self) -> Result<(), StoreError>;
}
