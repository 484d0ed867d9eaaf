use std::collections::HashMap;

use uuid::Uuid;

use super::Handler;
use crate::abe::{AbeScheme, AbeSecretKey, MemberAttribute};
use crate::models::{
    AbeWorkspace, AttributeUniverse, MemberKeyMaterial, User, Workspace, WorkspaceCrypto,
};
use crate::storage::{StorageError, StorageProvider};
use crate::store::{StoreError, StoreProvider};

/// Crypto mode requested for a share. For ABE shares the caller
/// supplies the workspace public key, the attribute universe, and
/// per-addressee key material keyed by email (generated out-of-band,
/// already encrypted for each addressee).
#[derive(Debug, Clone)]
pub enum ShareCrypto {
    Plain,
    Symmetric,
    Abe {
        public_key: Vec<u8>,
        attribute_universe: AttributeUniverse,
        member_keys: HashMap<String, MemberKeyMaterial>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ShareError<S: StoreProvider, B: StorageProvider> {
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error("no folder found with id {0}")]
    FolderNotFound(i64),
    #[error("workspace {0} not found")]
    WorkspaceNotFound(Uuid),
    #[error("workspace {0} is not shared")]
    NotShared(Uuid),
    #[error("no addressees found")]
    NoAddressees,
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError<B::Error>),
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    /// Share a folder with the users behind `emails`.
    ///
    /// If the folder's workspace is already shared the addressees
    /// simply join it. Otherwise the folder is promoted: a new shared
    /// workspace with a fresh container is created, the subtree is
    /// migrated into it, and its chunks are copied over best-effort.
    pub async fn share_folder(
        &self,
        user: &User,
        item_id: i64,
        emails: Vec<String>,
        crypto: ShareCrypto,
    ) -> Result<Workspace, ShareError<S, B>> {
        let owner = match self.store().get_user(user.id).await {
            Ok(owner) => owner,
            Err(e) if e.is_no_result() => {
                tracing::warn!("share requested by unknown user {}", user.id);
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

        let source = match self.store().get_workspace(item.workspace_id).await {
            Ok(workspace) => workspace,
            Err(e) if e.is_no_result() => {
                return Err(ShareError::WorkspaceNotFound(item.workspace_id))
            }
            Err(e) => return Err(e.into()),
        };

        let addressees = self.resolve_addressees(&owner, &emails).await?;
        if addressees.is_empty() {
            return Err(ShareError::NoAddressees);
        }

        let workspace = if source.is_shared {
            source.clone()
        } else {
            self.promote_workspace(&owner, &item, &source, &crypto).await?
        };

        let member_keys = match &crypto {
            ShareCrypto::Abe { member_keys, .. } => Some(member_keys),
            _ => None,
        };

        for addressee in &addressees {
            if workspace.crypto.is_abe() {
                let material = member_keys.and_then(|keys| keys.get(&addressee.email));
                let material = match material {
                    Some(material) => material,
                    None => {
                        tracing::warn!(
                            "no key material provided for '{}'; skipping addressee",
                            addressee.email
                        );
                        continue;
                    }
                };
                if let Err(e) = self.add_abe_member(&workspace, addressee, material).await {
                    tracing::error!(
                        "failed to add user '{}' to workspace '{}': {}",
                        addressee.id,
                        workspace.id,
                        e
                    );
                    continue;
                }
            } else if let Err(e) = self.add_plain_member(&workspace, addressee).await {
                tracing::error!(
                    "failed to add user '{}' to workspace '{}': {}",
                    addressee.id,
                    workspace.id,
                    e
                );
                continue;
            }

            // storage grants are fatal: a member without container
            // access cannot sync at all
            self.storage()
                .grant_access(&owner, addressee, &workspace)
                .await?;
        }

        Ok(workspace)
    }

    /// Resolve addressee emails to users, dropping the requester and
    /// skipping unknown emails with a warning.
    pub(super) async fn resolve_addressees(
        &self,
        owner: &User,
        emails: &[String],
    ) -> Result<Vec<User>, StoreError<S::Error>> {
        let mut addressees: Vec<User> = Vec::new();
        for email in emails {
            match self.store().get_user_by_email(email).await {
                Ok(user) if user.id == owner.id => {}
                Ok(user) => {
                    if !addressees.iter().any(|a| a.id == user.id) {
                        addressees.push(user);
                    }
                }
                Err(e) if e.is_no_result() => {
                    tracing::warn!("email '{}' does not correspond with any user", email);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(addressees)
    }

    /// Promote a non-shared folder into a fresh shared workspace and
    /// migrate its subtree.
    async fn promote_workspace(
        &self,
        owner: &User,
        item: &crate::models::Item,
        source: &Workspace,
        crypto: &ShareCrypto,
    ) -> Result<Workspace, ShareError<S, B>> {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: item.filename.clone(),
            owner: owner.id,
            is_shared: true,
            is_default: false,
            container: Uuid::new_v4().to_string(),
            crypto: match crypto {
                ShareCrypto::Plain => WorkspaceCrypto::Plain,
                ShareCrypto::Symmetric => WorkspaceCrypto::Symmetric,
                ShareCrypto::Abe {
                    public_key,
                    attribute_universe,
                    ..
                } => WorkspaceCrypto::Abe(AbeWorkspace {
                    public_key: public_key.clone(),
                    attribute_universe: attribute_universe.clone(),
                }),
            },
        };

        self.storage().create_container(&workspace).await?;

        self.store().begin().await?;
        let persisted: Result<(), StoreError<S::Error>> = async {
            self.store().add_workspace(&workspace).await?;
            self.store()
                .add_workspace_member(workspace.id, owner.id, None)
                .await?;
            Ok(())
        }
        .await;
        match persisted {
            Ok(()) => self.store().commit().await?,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed promotion also failed: {}", re);
                }
                return Err(e.into());
            }
        }

        self.storage()
            .grant_access(owner, owner, &workspace)
            .await?;

        let chunks = self
            .store()
            .migrate_item_subtree(item.id, workspace.id)
            .await?;
        for chunk in &chunks {
            match self.storage().copy_chunk(source, &workspace, chunk).await {
                Ok(()) => {}
                Err(e) if e.is_object_not_found() => {
                    tracing::warn!(
                        "chunk {} not found in container {}; could not migrate to container {}",
                        chunk,
                        source.container,
                        workspace.container
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(workspace)
    }

    async fn add_plain_member(
        &self,
        workspace: &Workspace,
        addressee: &User,
    ) -> Result<(), StoreError<S::Error>> {
        self.store().begin().await?;
        let result = self
            .store()
            .add_workspace_member(workspace.id, addressee.id, None)
            .await;
        match result {
            Ok(()) => self.store().commit().await,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed membership insert also failed: {}", re);
                }
                Err(e)
            }
        }
    }

    /// Persist an ABE member: the membership row with its key
    /// material, plus version-1 attribute bindings decomposed from
    /// the secret key's leaves via the attribute universe.
    async fn add_abe_member(
        &self,
        workspace: &Workspace,
        addressee: &User,
        material: &MemberKeyMaterial,
    ) -> Result<(), StoreError<S::Error>> {
        let empty = AttributeUniverse::new();
        let universe = workspace
            .crypto
            .abe()
            .map(|abe| &abe.attribute_universe)
            .unwrap_or(&empty);
        let secret_key = match AbeSecretKey::from_bytes(&material.secret_key) {
            Ok(key) => key,
            Err(e) => {
                return Err(StoreError::NoResult(format!(
                    "secret key for '{}' does not parse: {}",
                    addressee.email, e
                )))
            }
        };
        let bindings: Vec<MemberAttribute> = secret_key
            .leaf_keys
            .iter()
            .filter_map(|(leaf, component)| {
                universe.get(leaf).map(|name| MemberAttribute {
                    attribute: name.clone(),
                    version: 1,
                    component: component.clone(),
                })
            })
            .collect();

        self.store().begin().await?;
        let result: Result<(), StoreError<S::Error>> = async {
            self.store()
                .add_workspace_member(workspace.id, addressee.id, Some(material))
                .await?;
            self.store()
                .set_member_attributes(workspace.id, addressee.id, &bindings)
                .await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => self.store().commit().await,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed membership insert also failed: {}", re);
                }
                Err(e)
            }
        }
    }
}
