use uuid::Uuid;

use super::Handler;
use crate::abe::AbeScheme;
use crate::models::{ItemMetadata, User, VersionStatus, Workspace};
use crate::storage::StorageProvider;
use crate::store::{StoreError, StoreProvider};

/// Shaping flags for a metadata read.
#[derive(Debug, Clone, Default)]
pub struct GetMetadataOptions {
    /// Populate `children` when the item is a folder.
    pub include_list: bool,
    /// Keep children whose latest version is a deletion.
    pub include_deleted: bool,
    /// Keep the chunk name lists; stripped otherwise.
    pub include_chunks: bool,
    /// Read this version instead of the latest one.
    pub version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ItemListing {
    pub metadata: ItemMetadata,
    pub children: Vec<ItemMetadata>,
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError<S: StoreProvider> {
    #[error("item {0} not found")]
    ItemNotFound(i64),
    #[error("item {item} has no version {version}")]
    VersionNotFound { item: i64, version: u64 },
    #[error("user {user} cannot read workspace {workspace}")]
    NotPermitted { user: Uuid, workspace: Uuid },
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    /// Read one item's metadata, optionally at a pinned version and
    /// with its direct children.
    pub async fn get_metadata(
        &self,
        user: &User,
        item_id: i64,
        options: GetMetadataOptions,
    ) -> Result<ItemListing, MetadataError<S>> {
        let item = match self.store().get_item(item_id).await {
            Ok(item) => item,
            Err(e) if e.is_no_result() => return Err(MetadataError::ItemNotFound(item_id)),
            Err(e) => return Err(e.into()),
        };
        self.check_membership(user, item.workspace_id).await?;

        let version = options.version.unwrap_or(item.latest_version);
        let mut metadata = match self.store().find_version_metadata(item_id, version).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_no_result() => {
                return Err(MetadataError::VersionNotFound {
                    item: item_id,
                    version,
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !options.include_chunks {
            metadata.chunks.clear();
        }

        let mut children = Vec::new();
        if options.include_list && item.is_folder {
            children = self.store().find_children_metadata(item_id).await?;
            if !options.include_deleted {
                children.retain(|child| child.status != VersionStatus::Deleted);
            }
            if !options.include_chunks {
                for child in &mut children {
                    child.chunks.clear();
                }
            }
        }

        Ok(ItemListing { metadata, children })
    }

    /// Latest metadata of every item in a workspace, the client's
    /// bootstrap read after connecting.
    pub async fn get_changes(
        &self,
        user: &User,
        workspace_id: Uuid,
    ) -> Result<Vec<ItemMetadata>, MetadataError<S>> {
        self.check_membership(user, workspace_id).await?;
        Ok(self.store().find_workspace_metadata(workspace_id).await?)
    }

    /// Workspaces the user owns or is a member of.
    pub async fn get_workspaces(
        &self,
        user: &User,
    ) -> Result<Vec<Workspace>, MetadataError<S>> {
        Ok(self.store().get_user_workspaces(user.id).await?)
    }

    async fn check_membership(
        &self,
        user: &User,
        workspace_id: Uuid,
    ) -> Result<(), MetadataError<S>> {
        let workspaces = self.store().get_user_workspaces(user.id).await?;
        if !workspaces.iter().any(|w| w.id == workspace_id) {
            return Err(MetadataError::NotPermitted {
                user: user.id,
                workspace: workspace_id,
            });
        }
        Ok(())
    }
}
