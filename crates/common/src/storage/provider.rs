use async_trait::async_trait;

use crate::models::{User, Workspace};

/// Errors from the object-storage backend, mapped to the reactions
/// the engines take: `ObjectNotFound` during a chunk copy is logged
/// and skipped, everything else aborts the enclosing operation.
#[derive(thiserror::Error, Debug)]
pub enum StorageError<T> {
    #[error("storage provider error: {0}")]
    Provider(#[from] T),
    #[error("unauthorized against the object store")]
    Unauthorized,
    #[error("object-store endpoint not found in service catalog")]
    EndpointNotFound,
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),
}

impl<T> StorageError<T> {
    pub fn is_object_not_found(&self) -> bool {
        matches!(self, StorageError::ObjectNotFound(_))
    }
}

/// Object-storage port. One container per workspace; access is
/// granted per user on the whole container.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create the workspace's backing container. Repeating the call
    /// for an existing container is not an error.
    async fn create_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>>;

    async fn delete_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>>;

    /// Grant `grantee` access to the workspace's container.
    /// Granting an existing grantee again is a no-op.
    async fn grant_access(
        &self,
        granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>>;

    async fn revoke_access(
        &self,
        granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>>;

    /// Server-side copy of one chunk between containers. Fails with
    /// `ObjectNotFound` when the source chunk is absent; callers
    /// treat that as non-fatal.
    async fn copy_chunk(
        &self,
        source: &Workspace,
        target: &Workspace,
        chunk_name: &str,
    ) -> Result<(), StorageError<Self::Error>>;
}
