use super::share::ShareError;
use super::Handler;
use crate::abe::AbeScheme;
use crate::models::User;
use crate::storage::StorageProvider;
use crate::store::{StoreError, StoreProvider};

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    /// Remove the users behind `emails` from the shared workspace a
    /// folder lives in.
    ///
    /// When at most the owner remains afterwards the workspace is
    /// dissolved: the subtree moves back into the owner's default
    /// workspace, its chunks are copied over best-effort, and the
    /// shared workspace and its container are deleted.
    pub async fn unshare_folder(
        &self,
        user: &User,
        item_id: i64,
        emails: Vec<String>,
    ) -> Result<(), ShareError<S, B>> {
        let owner = match self.store().get_user(user.id).await {
            Ok(owner) => owner,
            Err(e) if e.is_no_result() => {
                tracing::warn!("unshare requested by unknown user {}", user.id);
                return Err(ShareError::UserNotFound(user.id));
            }
            Err(e) => return Err(e.into()),
        };

        let item = match self.store().get_item(item_id).await {
            Ok(item) => item,
            Err(e) if e.is_no_result() => return Err(ShareError::FolderNotFound(item_id)),
            Err(e) => return Err(e.into()),
        };
        if !item.is_folder {
            return Err(ShareError::FolderNotFound(item_id));
        }

        let workspace = match self.store().get_workspace(item.workspace_id).await {
            Ok(workspace) => workspace,
            Err(e) if e.is_no_result() => {
                return Err(ShareError::WorkspaceNotFound(item.workspace_id))
            }
            Err(e) => return Err(e.into()),
        };
        if !workspace.is_shared {
            return Err(ShareError::NotShared(workspace.id));
        }

        let addressees = self.resolve_addressees(&owner, &emails).await?;
        if addressees.is_empty() {
            return Err(ShareError::NoAddressees);
        }

        let members = self.store().get_workspace_members(workspace.id).await?;
        for addressee in &addressees {
            if !members.iter().any(|m| m.user.id == addressee.id) {
                tracing::warn!(
                    "user '{}' is not a member of workspace '{}'; skipping",
                    addressee.email,
                    workspace.id
                );
                continue;
            }
            if let Err(e) = self.remove_member(&workspace, addressee).await {
                tracing::error!(
                    "failed to remove user '{}' from workspace '{}': {}",
                    addressee.id,
                    workspace.id,
                    e
                );
                continue;
            }

            // revocations on storage are fatal: a removed member who
            // keeps container access can still read everything
            self.storage()
                .revoke_access(&owner, addressee, &workspace)
                .await?;
        }

        let remaining = self.store().get_workspace_members(workspace.id).await?;
        if remaining.len() <= 1 {
            self.dissolve_workspace(&owner, item_id, &workspace).await?;
        }

        Ok(())
    }

    async fn remove_member(
        &self,
        workspace: &crate::models::Workspace,
        addressee: &User,
    ) -> Result<(), StoreError<S::Error>> {
        self.store().begin().await?;
        let result = self
            .store()
            .remove_workspace_member(workspace.id, addressee.id)
            .await;
        match result {
            Ok(()) => self.store().commit().await,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed membership delete also failed: {}", re);
                }
                Err(e)
            }
        }
    }

    /// Move the subtree back to the owner's default workspace and
    /// drop the shared workspace with its container.
    async fn dissolve_workspace(
        &self,
        owner: &User,
        item_id: i64,
        workspace: &crate::models::Workspace,
    ) -> Result<(), ShareError<S, B>> {
        let default = self.store().get_default_workspace(owner.id).await?;

        let chunks = self
            .store()
            .migrate_item_subtree(item_id, default.id)
            .await?;
        for chunk in &chunks {
            match self.storage().copy_chunk(workspace, &default, chunk).await {
                Ok(()) => {}
                Err(e) if e.is_object_not_found() => {
                    tracing::warn!(
                        "chunk {} not found in container {}; could not migrate to container {}",
                        chunk,
                        workspace.container,
                        default.container
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store().begin().await?;
        let deleted = self.store().delete_workspace(workspace.id).await;
        match deleted {
            Ok(()) => self.store().commit().await?,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed workspace delete also failed: {}", re);
                }
                return Err(e.into());
            }
        }

        self.storage().delete_container(workspace).await?;

        tracing::info!(
            "workspace {} dissolved; subtree returned to workspace {}",
            workspace.id,
            default.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ShareCrypto;
    use crate::testkit::{self, Fixture};

    async fn shared_folder(fx: &Fixture) -> anyhow::Result<(i64, crate::models::Workspace)> {
        let handler = fx.handler();
        let folder_id = testkit::seed_folder_with_file(fx, "shared", "doc.txt", "chk-1").await?;
        let workspace = handler
            .share_folder(
                &fx.alice,
                folder_id,
                vec![fx.bob.email.clone(), fx.carol.email.clone()],
                ShareCrypto::Plain,
            )
            .await?;
        Ok((folder_id, workspace))
    }

    #[tokio::test]
    async fn removing_one_member_keeps_the_workspace_alive() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let (folder_id, workspace) = shared_folder(&fx).await?;

        handler
            .unshare_folder(&fx.alice, folder_id, vec![fx.bob.email.clone()])
            .await?;

        let members = handler.store().get_workspace_members(workspace.id).await?;
        assert_eq!(members.len(), 2);
        assert!(!members.iter().any(|m| m.user.id == fx.bob.id));
        assert!(!fx.storage.can_access(&workspace.container, fx.bob.id)?);
        assert!(fx.storage.container_exists(&workspace.container)?);
        Ok(())
    }

    #[tokio::test]
    async fn removing_the_last_member_dissolves_the_workspace() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let (folder_id, workspace) = shared_folder(&fx).await?;

        handler
            .unshare_folder(
                &fx.alice,
                folder_id,
                vec![fx.bob.email.clone(), fx.carol.email.clone()],
            )
            .await?;

        // workspace row and container are gone
        let err = handler.store().get_workspace(workspace.id).await.unwrap_err();
        assert!(err.is_no_result());
        assert!(!fx.storage.container_exists(&workspace.container)?);

        // the folder lives in alice's default workspace again, chunk included
        let folder = handler.store().get_item(folder_id).await?;
        assert_eq!(folder.workspace_id, fx.workspace.id);
        assert!(fx.storage.has_chunk(&fx.workspace.container, "chk-1")?);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_emails_and_non_members_are_skipped() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let (folder_id, workspace) = shared_folder(&fx).await?;

        handler
            .unshare_folder(
                &fx.alice,
                folder_id,
                vec!["nobody@x.com".into(), fx.bob.email.clone()],
            )
            .await?;

        let members = handler.store().get_workspace_members(workspace.id).await?;
        assert_eq!(members.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unsharing_a_non_shared_folder_is_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let folder_id = testkit::seed_folder_with_file(&fx, "private", "doc.txt", "chk-1").await?;

        let err = handler
            .unshare_folder(&fx.alice, folder_id, vec![fx.bob.email.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotShared(_)));
        Ok(())
    }
}
