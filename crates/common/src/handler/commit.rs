use std::collections::HashMap;
use uuid::Uuid;

use super::Handler;
use crate::abe::AbeScheme;
use crate::models::{
    Chunk, CommitInfo, Device, EncryptionMetadata, Item, ItemMetadata, ItemVersion, User,
    Workspace, WorkspaceCrypto,
};
use crate::storage::StorageProvider;
use crate::store::{StoreError, StoreProvider};

/// Outcome of reconciling one submitted descriptor against server
/// state. Returned as a value, never raised: wrong-version and
/// duplicate submissions are expected control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Freshly persisted; carries the just-written metadata with the
    /// server-assigned id.
    Accepted(ItemMetadata),
    /// The version was already seen with identical metadata; safe to
    /// report as committed again (at-least-once delivery).
    Duplicate { metadata: ItemMetadata, version: u64 },
    /// The submitted version conflicts with server history; carries
    /// the canonical current metadata so the client can resync.
    Conflict { server: ItemMetadata },
    /// First-ever submission that is not version 1: the client claims
    /// history the server never saw.
    NoParent,
}

/// Batch-level failures. Per-descriptor failures never surface here;
/// they are recorded in the descriptor's `CommitInfo`.
#[derive(thiserror::Error, Debug)]
pub enum CommitError<S: StoreProvider> {
    #[error("workspace {0} not found")]
    WorkspaceNotFound(Uuid),
    #[error("device {0} not found")]
    DeviceNotFound(Uuid),
    #[error("device {device} does not belong to user {user}")]
    DeviceOwnership { device: Uuid, user: Uuid },
    #[error("user {user} has no access to workspace {workspace}")]
    NotPermitted { user: Uuid, workspace: Uuid },
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
}

/// Per-descriptor failures inside the batch loop.
#[derive(thiserror::Error, Debug)]
enum ItemError<S: StoreProvider> {
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
    #[error("abe workspace requires an abe payload on the descriptor")]
    MissingAbePayload,
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    /// Apply a batch of item change descriptors for one device.
    ///
    /// Descriptors are processed strictly in submitted order: later
    /// descriptors may reference ids assigned to earlier ones via
    /// their temp ids. Each descriptor succeeds or fails on its own;
    /// a failure is reported in that descriptor's `CommitInfo` and
    /// never aborts its siblings.
    pub async fn commit(
        &self,
        user: &User,
        workspace_id: Uuid,
        device_id: Uuid,
        items: Vec<ItemMetadata>,
    ) -> Result<Vec<CommitInfo>, CommitError<S>> {
        let workspace = match self.store().get_workspace(workspace_id).await {
            Ok(workspace) => workspace,
            Err(e) if e.is_no_result() => return Err(CommitError::WorkspaceNotFound(workspace_id)),
            Err(e) => return Err(e.into()),
        };
        let device = match self.store().get_device(device_id).await {
            Ok(device) => device,
            Err(e) if e.is_no_result() => return Err(CommitError::DeviceNotFound(device_id)),
            Err(e) => return Err(e.into()),
        };
        if device.owner != user.id {
            return Err(CommitError::DeviceOwnership {
                device: device.id,
                user: user.id,
            });
        }
        if workspace.owner != user.id {
            let member = workspace.is_shared
                && self
                    .store()
                    .get_workspace_members(workspace.id)
                    .await?
                    .iter()
                    .any(|m| m.user.id == user.id);
            if !member {
                return Err(CommitError::NotPermitted {
                    user: user.id,
                    workspace: workspace.id,
                });
            }
        }

        // temp id -> server id, filled as descriptors are accepted
        let mut temp_ids: HashMap<i64, i64> = HashMap::new();
        let mut response = Vec::with_capacity(items.len());

        for mut item in items {
            if let Some(parent) = item.parent_id {
                if let Some(assigned) = temp_ids.get(&parent) {
                    item.parent_id = Some(*assigned);
                }
            }
            if item.id.is_none() {
                if let Some(temp) = item.temp_id {
                    if let Some(assigned) = temp_ids.get(&temp) {
                        item.id = Some(*assigned);
                    }
                }
            }

            let version = item.version;
            let temp_id = item.temp_id;
            let info = match self.commit_item(item, &workspace, &device).await {
                Ok(CommitOutcome::Accepted(metadata)) => {
                    if let (Some(temp), Some(id)) = (temp_id, metadata.id) {
                        temp_ids.insert(temp, id);
                    }
                    CommitInfo {
                        version,
                        committed: true,
                        metadata: Some(metadata),
                    }
                }
                Ok(CommitOutcome::Duplicate { metadata, version: seen }) => {
                    tracing::debug!("version {} resubmitted, reporting as committed", seen);
                    if let (Some(temp), Some(id)) = (temp_id, metadata.id) {
                        temp_ids.insert(temp, id);
                    }
                    CommitInfo {
                        version,
                        committed: true,
                        metadata: Some(metadata),
                    }
                }
                Ok(CommitOutcome::Conflict { server }) => CommitInfo {
                    version,
                    committed: false,
                    metadata: Some(server),
                },
                Ok(CommitOutcome::NoParent) => CommitInfo {
                    version,
                    committed: false,
                    metadata: None,
                },
                Err(e) => {
                    tracing::warn!("descriptor at version {} failed to commit: {}", version, e);
                    CommitInfo {
                        version,
                        committed: false,
                        metadata: None,
                    }
                }
            };
            response.push(info);
        }

        Ok(response)
    }

    /// The per-item protocol: reconcile the claimed version against
    /// the server item, then persist if the submission is the next
    /// version (or the first).
    async fn commit_item(
        &self,
        metadata: ItemMetadata,
        workspace: &Workspace,
        device: &Device,
    ) -> Result<CommitOutcome, ItemError<S>> {
        let server_item = match metadata.id {
            Some(id) => match self.store().get_item(id).await {
                Ok(item) => Some(item),
                Err(e) if e.is_no_result() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let item = match server_item {
            Some(item) => item,
            None => {
                if metadata.version != 1 {
                    return Ok(CommitOutcome::NoParent);
                }
                let written = self.save_new_item(metadata, workspace, device).await?;
                return Ok(CommitOutcome::Accepted(written));
            }
        };

        let server_version = item.latest_version;
        let client_version = metadata.version;

        if server_version >= client_version {
            // the claimed version already exists on the server
            let stored = self
                .store()
                .find_version_metadata(item.id, client_version)
                .await?;
            if !metadata.matches(&stored) {
                let server = self
                    .store()
                    .find_version_metadata(item.id, server_version)
                    .await?;
                return Ok(CommitOutcome::Conflict { server });
            }
            if server_version == client_version {
                return Ok(CommitOutcome::Duplicate {
                    metadata: stored,
                    version: client_version,
                });
            }
            // stale duplicate: report the current latest metadata
            let latest = self
                .store()
                .find_version_metadata(item.id, server_version)
                .await?;
            return Ok(CommitOutcome::Duplicate {
                metadata: latest,
                version: client_version,
            });
        }

        if server_version + 1 == client_version {
            let written = self
                .save_new_version(metadata, item, workspace, device)
                .await?;
            return Ok(CommitOutcome::Accepted(written));
        }

        // gap between server state and the claimed version
        let server = self
            .store()
            .find_version_metadata(item.id, server_version)
            .await?;
        Ok(CommitOutcome::Conflict { server })
    }

    async fn save_new_item(
        &self,
        mut metadata: ItemMetadata,
        workspace: &Workspace,
        device: &Device,
    ) -> Result<ItemMetadata, ItemError<S>> {
        let parent = match metadata.parent_id {
            Some(parent_id) => match self.store().get_item(parent_id).await {
                Ok(parent) => Some(parent),
                Err(e) if e.is_no_result() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        self.store().begin().await?;
        let result = self
            .write_new_item(&mut metadata, parent, workspace, device)
            .await;
        match result {
            Ok(()) => {
                self.store().commit().await?;
                Ok(metadata)
            }
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed item insert also failed: {}", re);
                }
                Err(e)
            }
        }
    }

    async fn write_new_item(
        &self,
        metadata: &mut ItemMetadata,
        parent: Option<Item>,
        workspace: &Workspace,
        device: &Device,
    ) -> Result<(), ItemError<S>> {
        let item = Item {
            id: 0,
            workspace_id: workspace.id,
            parent_id: parent.as_ref().map(|p| p.id),
            client_parent_version: parent.as_ref().and_then(|_| metadata.parent_version),
            filename: metadata.filename.clone(),
            mimetype: metadata.mimetype.clone(),
            is_folder: metadata.is_folder,
            latest_version: metadata.version,
        };

        let id = match &workspace.crypto {
            WorkspaceCrypto::Abe(_) => match &metadata.encryption {
                EncryptionMetadata::Abe(payload) => self.store().put_abe_item(&item, payload).await?,
                EncryptionMetadata::Plain => return Err(ItemError::MissingAbePayload),
            },
            _ => self.store().put_item(&item).await?,
        };
        metadata.id = Some(id);
        metadata.parent_id = parent.map(|p| p.id);

        let version_id = self
            .store()
            .add_item_version(&version_from(metadata, id, device))
            .await?;
        if !metadata.is_folder && !metadata.chunks.is_empty() {
            self.store()
                .insert_chunks(version_id, &chunks_from(&metadata.chunks))
                .await?;
        }
        Ok(())
    }

    async fn save_new_version(
        &self,
        metadata: ItemMetadata,
        item: Item,
        workspace: &Workspace,
        device: &Device,
    ) -> Result<ItemMetadata, ItemError<S>> {
        self.store().begin().await?;
        let result = self
            .write_new_version(&metadata, item, workspace, device)
            .await;
        match result {
            Ok(written) => {
                self.store().commit().await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed version insert also failed: {}", re);
                }
                Err(e)
            }
        }
    }

    async fn write_new_version(
        &self,
        metadata: &ItemMetadata,
        mut item: Item,
        workspace: &Workspace,
        device: &Device,
    ) -> Result<ItemMetadata, ItemError<S>> {
        let server_version = item.latest_version;

        let version_id = self
            .store()
            .add_item_version(&version_from(metadata, item.id, device))
            .await?;
        if !metadata.is_folder && !metadata.chunks.is_empty() {
            self.store()
                .insert_chunks(version_id, &chunks_from(&metadata.chunks))
                .await?;
        }

        if metadata.status.moves_item() {
            item.filename = metadata.filename.clone();
            match metadata.parent_id {
                // parent absent: detach to the workspace root
                None => {
                    item.parent_id = None;
                    item.client_parent_version = None;
                }
                Some(parent_id) => match self.store().get_item(parent_id).await {
                    Ok(parent) => {
                        item.parent_id = Some(parent.id);
                        item.client_parent_version = metadata.parent_version;
                    }
                    Err(e) if e.is_no_result() => {
                        item.parent_id = None;
                        item.client_parent_version = None;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        // serialize the read-check-write on the version counter
        self.store()
            .advance_item_version(item.id, server_version, metadata.version)
            .await?;
        item.latest_version = metadata.version;

        match &workspace.crypto {
            WorkspaceCrypto::Abe(_) => match &metadata.encryption {
                EncryptionMetadata::Abe(payload) => {
                    self.store().put_abe_item(&item, payload).await?;
                }
                EncryptionMetadata::Plain => return Err(ItemError::MissingAbePayload),
            },
            _ => {
                self.store().put_item(&item).await?;
            }
        }

        let mut written = metadata.clone();
        written.id = Some(item.id);
        written.parent_id = item.parent_id;
        Ok(written)
    }
}

fn version_from(metadata: &ItemMetadata, item_id: i64, device: &Device) -> ItemVersion {
    ItemVersion {
        id: 0,
        item_id,
        device_id: device.id,
        version: metadata.version,
        modified_at: metadata.modified_at,
        checksum: metadata.checksum,
        size: metadata.size,
        status: metadata.status,
        chunks: vec![],
    }
}

fn chunks_from(names: &[String]) -> Vec<Chunk> {
    names
        .iter()
        .enumerate()
        .map(|(position, name)| Chunk {
            name: name.clone(),
            position: position as u32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, Fixture};

    #[tokio::test]
    async fn first_submission_at_version_one_is_accepted() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;

        assert_eq!(infos.len(), 1);
        assert!(infos[0].committed);
        let written = infos[0].metadata.as_ref().unwrap();
        assert!(written.id.is_some());
        assert_eq!(written.version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn first_submission_above_version_one_is_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 2, "notes.txt", &["chk-1"]);
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;

        assert!(!infos[0].committed);
        assert!(infos[0].metadata.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn resubmitting_identical_metadata_is_idempotent() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id;

        let mut replay = testkit::file_meta(&fx, None, None, 1, "notes.txt", &["chk-1"]);
        replay.id = id;
        let second = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![replay])
            .await?;

        assert!(second[0].committed);
        // exactly one version row exists
        let listing = handler.store().find_version_metadata(id.unwrap(), 1).await?;
        assert_eq!(listing.version, 1);
        assert_eq!(handler.store().get_item(id.unwrap()).await?.latest_version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn skipping_a_version_is_a_conflict() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id;

        let mut skipped = testkit::file_meta(&fx, None, None, 3, "notes.txt", &["chk-2"]);
        skipped.id = id;
        skipped.status = crate::models::VersionStatus::Changed;
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![skipped])
            .await?;

        assert!(!infos[0].committed);
        let server = infos[0].metadata.as_ref().unwrap();
        assert_eq!(server.version, 1);
        assert_eq!(handler.store().get_item(id.unwrap()).await?.latest_version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn conflicting_metadata_at_a_seen_version_is_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id;

        let mut diverged = testkit::file_meta(&fx, None, None, 1, "notes.txt", &["chk-other"]);
        diverged.id = id;
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![diverged])
            .await?;

        assert!(!infos[0].committed);
        assert!(infos[0].metadata.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn batch_resolves_forward_references_through_temp_ids() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let folder = testkit::folder_meta(&fx, None, Some(1), 1, "photos");
        let file = testkit::file_meta(&fx, Some(1), Some(2), 1, "cat.jpg", &["chk-cat"]);
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![folder, file])
            .await?;

        assert!(infos[0].committed && infos[1].committed);
        let folder_id = infos[0].metadata.as_ref().unwrap().id.unwrap();
        let file_id = infos[1].metadata.as_ref().unwrap().id.unwrap();
        let child = handler.store().get_item(file_id).await?;
        assert_eq!(child.parent_id, Some(folder_id));
        Ok(())
    }

    #[tokio::test]
    async fn new_versions_advance_the_counter_gap_free() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id;

        let mut next = testkit::file_meta(&fx, None, None, 2, "notes.txt", &["chk-2"]);
        next.id = id;
        next.status = crate::models::VersionStatus::Changed;
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![next])
            .await?;

        assert!(infos[0].committed);
        let item = handler.store().get_item(id.unwrap()).await?;
        assert_eq!(item.latest_version, 2);
        for v in 1..=2 {
            handler.store().find_version_metadata(item.id, v).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn rename_updates_the_item_row() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "old.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id;

        let mut renamed = testkit::file_meta(&fx, None, None, 2, "new.txt", &["chk-1"]);
        renamed.id = id;
        renamed.status = crate::models::VersionStatus::Renamed;
        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![renamed])
            .await?;

        assert!(infos[0].committed);
        assert_eq!(handler.store().get_item(id.unwrap()).await?.filename, "new.txt");
        Ok(())
    }

    #[tokio::test]
    async fn failed_descriptor_rolls_back_without_disturbing_siblings() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let first = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![meta])
            .await?;
        let id = first[0].metadata.as_ref().unwrap().id.unwrap();

        // plant a version row at 2 while the counter still reads 1,
        // so the next accept fails inside its transaction
        let planted = ItemVersion {
            id: 0,
            item_id: id,
            device_id: fx.device.id,
            version: 2,
            modified_at: time::OffsetDateTime::now_utc(),
            checksum: 0,
            size: 0,
            status: crate::models::VersionStatus::Changed,
            chunks: vec![],
        };
        handler.store().add_item_version(&planted).await?;

        let mut blocked = testkit::file_meta(&fx, None, None, 2, "notes.txt", &["chk-2"]);
        blocked.id = Some(id);
        blocked.status = crate::models::VersionStatus::Changed;
        let sibling = testkit::file_meta(&fx, None, Some(9), 1, "other.txt", &["chk-3"]);

        let infos = handler
            .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![blocked, sibling])
            .await?;

        assert!(!infos[0].committed);
        assert!(infos[1].committed);
        assert_eq!(handler.store().get_item(id).await?.latest_version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_devices_are_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let meta = testkit::file_meta(&fx, None, Some(1), 1, "notes.txt", &["chk-1"]);
        let err = handler
            .commit(&fx.bob, fx.workspace.id, fx.device.id, vec![meta])
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::DeviceOwnership { .. }));
        Ok(())
    }
}
