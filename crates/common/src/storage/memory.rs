use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::provider::{StorageError, StorageProvider};
use crate::models::{User, Workspace};

/// In-memory object-storage double: containers are sets of chunk
/// names plus an access list of user ids.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<StorageInner>>,
}

#[derive(Debug, Default)]
struct StorageInner {
    containers: HashMap<String, BTreeSet<String>>,
    access: HashMap<String, HashSet<Uuid>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryStorageError {
    #[error("memory storage error: {0}")]
    Internal(String),
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a chunk into a container (test setup).
    pub fn put_chunk(
        &self,
        container: &str,
        chunk_name: &str,
    ) -> Result<(), StorageError<MemoryStorageError>> {
        let mut inner = self.write()?;
        inner
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(chunk_name.to_string());
        Ok(())
    }

    pub fn has_chunk(
        &self,
        container: &str,
        chunk_name: &str,
    ) -> Result<bool, StorageError<MemoryStorageError>> {
        Ok(self
            .read()?
            .containers
            .get(container)
            .map(|chunks| chunks.contains(chunk_name))
            .unwrap_or(false))
    }

    pub fn container_exists(
        &self,
        container: &str,
    ) -> Result<bool, StorageError<MemoryStorageError>> {
        Ok(self.read()?.containers.contains_key(container))
    }

    pub fn can_access(
        &self,
        container: &str,
        user_id: Uuid,
    ) -> Result<bool, StorageError<MemoryStorageError>> {
        Ok(self
            .read()?
            .access
            .get(container)
            .map(|users| users.contains(&user_id))
            .unwrap_or(false))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StorageInner>, StorageError<MemoryStorageError>> {
        self.inner.read().map_err(|e| {
            StorageError::Provider(MemoryStorageError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, StorageInner>, StorageError<MemoryStorageError>> {
        self.inner.write().map_err(|e| {
            StorageError::Provider(MemoryStorageError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    type Error = MemoryStorageError;

    async fn create_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let mut inner = self.write()?;
        inner
            .containers
            .entry(workspace.container.clone())
            .or_default();
        inner.access.entry(workspace.container.clone()).or_default();
        Ok(())
    }

    async fn delete_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let mut inner = self.write()?;
        if inner.containers.remove(&workspace.container).is_none() {
            return Err(StorageError::UnexpectedStatus(404));
        }
        inner.access.remove(&workspace.container);
        Ok(())
    }

    async fn grant_access(
        &self,
        _granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let mut inner = self.write()?;
        if !inner.containers.contains_key(&workspace.container) {
            return Err(StorageError::UnexpectedStatus(404));
        }
        inner
            .access
            .entry(workspace.container.clone())
            .or_default()
            .insert(grantee.id);
        Ok(())
    }

    async fn revoke_access(
        &self,
        _granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let mut inner = self.write()?;
        if let Some(users) = inner.access.get_mut(&workspace.container) {
            users.remove(&grantee.id);
        }
        Ok(())
    }

    async fn copy_chunk(
        &self,
        source: &Workspace,
        target: &Workspace,
        chunk_name: &str,
    ) -> Result<(), StorageError<Self::Error>> {
        let mut inner = self.write()?;
        let present = inner
            .containers
            .get(&source.container)
            .ok_or(StorageError::UnexpectedStatus(404))?
            .contains(chunk_name);
        if !present {
            return Err(StorageError::ObjectNotFound(chunk_name.to_string()));
        }
        let target_chunks = inner
            .containers
            .get_mut(&target.container)
            .ok_or(StorageError::UnexpectedStatus(404))?;
        target_chunks.insert(chunk_name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkspaceCrypto;

    fn workspace(container: &str) -> Workspace {
        Workspace {
            id: Uuid::new_v4(),
            name: "ws".into(),
            owner: Uuid::new_v4(),
            is_shared: true,
            is_default: false,
            container: container.into(),
            crypto: WorkspaceCrypto::Plain,
        }
    }

    #[tokio::test]
    async fn copy_of_a_missing_chunk_is_object_not_found() {
        let storage = MemoryStorage::new();
        let src = workspace("src");
        let dst = workspace("dst");
        storage.create_container(&src).await.unwrap();
        storage.create_container(&dst).await.unwrap();

        let err = storage.copy_chunk(&src, &dst, "missing").await.unwrap_err();
        assert!(err.is_object_not_found());
    }

    #[tokio::test]
    async fn copy_lands_in_the_target_container() {
        let storage = MemoryStorage::new();
        let src = workspace("src");
        let dst = workspace("dst");
        storage.create_container(&src).await.unwrap();
        storage.create_container(&dst).await.unwrap();
        storage.put_chunk("src", "chk-1").unwrap();

        storage.copy_chunk(&src, &dst, "chk-1").await.unwrap();
        assert!(storage.has_chunk("dst", "chk-1").unwrap());
        assert!(storage.has_chunk("src", "chk-1").unwrap());
    }

    #[tokio::test]
    async fn grants_are_idempotent() {
        let storage = MemoryStorage::new();
        let ws = workspace("shared");
        storage.create_container(&ws).await.unwrap();
        let owner = User {
            id: Uuid::new_v4(),
            name: "o".into(),
            email: "o@x.com".into(),
            storage_account: "o".into(),
        };

        storage.grant_access(&owner, &owner, &ws).await.unwrap();
        storage.grant_access(&owner, &owner, &ws).await.unwrap();
        assert!(storage.can_access("shared", owner.id).unwrap());

        storage.revoke_access(&owner, &owner, &ws).await.unwrap();
        assert!(!storage.can_access("shared", owner.id).unwrap());
    }
}
