use uuid::Uuid;

use super::Handler;
use crate::abe::AbeScheme;
use crate::models::WorkspaceMember;
use crate::storage::StorageProvider;
use crate::store::{StoreError, StoreProvider};

#[derive(thiserror::Error, Debug)]
pub enum MembersError<S: StoreProvider> {
    /// Every workspace has at least its owner as a member, so an
    /// empty result means the workspace does not exist.
    #[error("workspace {0} has no members")]
    Empty(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    pub async fn get_workspace_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMember>, MembersError<S>> {
        let members = match self.store().get_workspace_members(workspace_id).await {
            Ok(members) => members,
            Err(e) if e.is_no_result() => return Err(MembersError::Empty(workspace_id)),
            Err(e) => return Err(e.into()),
        };
        if members.is_empty() {
            return Err(MembersError::Empty(workspace_id));
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ShareCrypto;
    use crate::testkit::{self, Fixture};

    #[tokio::test]
    async fn members_include_the_owner_flag() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let folder_id = testkit::seed_folder_with_file(&fx, "shared", "doc.txt", "chk-1").await?;
        let workspace = handler
            .share_folder(
                &fx.alice,
                folder_id,
                vec![fx.bob.email.clone()],
                ShareCrypto::Plain,
            )
            .await?;

        let members = handler.get_workspace_members(workspace.id).await?;
        assert_eq!(members.len(), 2);
        let owner = members.iter().find(|m| m.is_owner).expect("an owner");
        assert_eq!(owner.user.id, fx.alice.id);
        Ok(())
    }

    #[tokio::test]
    async fn an_unknown_workspace_yields_empty() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();

        let err = handler
            .get_workspace_members(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MembersError::Empty(_)));
        Ok(())
    }
}
