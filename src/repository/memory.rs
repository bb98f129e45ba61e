//! In-memory credential store

use super::{CredentialStore, StoreError};
use crate::models::user::{NewIdentity, UserIdentity};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

/// DashMap 存储，按 handle 建键；entry API 保证同一 handle 的插入是原子的
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_handle: DashMap<String, UserIdentity>,
    handle_by_id: DashMap<Uuid, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert(&self, identity: NewIdentity) -> Result<UserIdentity, StoreError> {
        match self.by_handle.entry(identity.handle.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                let user: UserIdentity = identity.into();
                self.handle_by_id.insert(user.id, user.handle.clone());
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.by_handle.get(handle).map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserIdentity>, StoreError> {
        let Some(handle) = self.handle_by_id.get(id).map(|h| h.value().clone()) else {
            return Ok(None);
        };
        self.find_by_handle(&handle).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
