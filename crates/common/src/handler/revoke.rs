use std::collections::HashMap;

use uuid::Uuid;

use super::Handler;
use crate::abe::{
    AbeScheme, AbeSecretKey, AttributeVersion, MemberAttribute, RevokeMessage, RevokeNotification,
    SystemKey,
};
use crate::models::User;
use crate::storage::StorageProvider;
use crate::store::{StoreError, StoreProvider};

#[derive(thiserror::Error, Debug)]
pub enum RevokeError<S: StoreProvider, A: AbeScheme> {
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error("workspace {0} not found")]
    WorkspaceNotFound(Uuid),
    #[error("workspace {0} is not shared")]
    NotShared(Uuid),
    #[error("workspace {0} is not abe-encrypted")]
    NotAbeEncrypted(Uuid),
    #[error("no addressees found")]
    NoAddressees,
    #[error("no members found in workspace {0}")]
    NoMembers(Uuid),
    /// Chains start at version 1 and a rotation departs from the
    /// previous version, so a rotated component is always at 2 or
    /// later. Anything lower is a malformed message.
    #[error("component for '{attribute}' carries version {version}; rotations start at 2")]
    BadComponentVersion { attribute: String, version: u64 },
    /// The chain walk ended somewhere other than the chain tip; the
    /// stored chain is broken or out of order. Internal error, never
    /// trusted arithmetic.
    #[error("attribute chain mismatch for '{attribute}': reached version {reached}, expected {expected}")]
    ChainMismatch {
        attribute: String,
        reached: u64,
        expected: u64,
    },
    #[error("key codec error: {0}")]
    KeyCodec(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError<S::Error>),
    #[error("abe scheme error: {0}")]
    Abe(A::Error),
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    /// Revoke members' attributes and advance everyone else.
    ///
    /// Messages are applied strictly in list order. Phase 1 folds the
    /// rotated public key and collects the chain appends; phase 2
    /// persists both in one transaction (so phase 3 reads its own
    /// writes); phase 3 walks every remaining member's held
    /// components to the chain tips and re-serializes their secret
    /// keys, collecting one notification per member for out-of-band
    /// delivery.
    ///
    /// Replaying an identical call is a no-op: binding removals match
    /// nothing, chain appends land on existing versions, and chain
    /// walks start at the tip.
    pub async fn revoke_folder(
        &self,
        user: &User,
        workspace_id: Uuid,
        messages: Vec<RevokeMessage>,
    ) -> Result<HashMap<Uuid, RevokeNotification>, RevokeError<S, A>> {
        let owner = match self.store().get_user(user.id).await {
            Ok(owner) => owner,
            Err(e) if e.is_no_result() => {
                tracing::warn!("revoke requested by unknown user {}", user.id);
                return Err(RevokeError::UserNotFound(user.id));
            }
            Err(e) => return Err(e.into()),
        };
        let workspace = match self.store().get_workspace(workspace_id).await {
            Ok(workspace) => workspace,
            Err(e) if e.is_no_result() => return Err(RevokeError::WorkspaceNotFound(workspace_id)),
            Err(e) => return Err(e.into()),
        };
        if !workspace.is_shared {
            return Err(RevokeError::NotShared(workspace_id));
        }
        let abe = workspace
            .crypto
            .abe()
            .ok_or(RevokeError::NotAbeEncrypted(workspace_id))?;

        // resolve the targeted users; unknown emails only skip the
        // binding removal, the key rotation is workspace-global
        let mut targets: Vec<Option<Uuid>> = Vec::with_capacity(messages.len());
        let mut any_addressee = false;
        for message in &messages {
            match self.store().get_user_by_email(&message.email).await {
                Ok(target) => {
                    if target.id != owner.id {
                        any_addressee = true;
                    }
                    targets.push(Some(target.id));
                }
                Err(e) if e.is_no_result() => {
                    tracing::warn!(
                        "email '{}' does not correspond with any user",
                        message.email
                    );
                    targets.push(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if !any_addressee {
            return Err(RevokeError::NoAddressees);
        }

        for message in &messages {
            for component in &message.components {
                if component.version < 2 {
                    return Err(RevokeError::BadComponentVersion {
                        attribute: component.attribute.clone(),
                        version: component.version,
                    });
                }
            }
        }

        // phases 1 and 2: fold the new public key immutably, then
        // persist rotation + chain appends + binding removals at once
        let mut system_key = SystemKey::from_bytes(&abe.public_key)?;
        let mut chain_appends: Vec<AttributeVersion> = Vec::new();
        for message in &messages {
            for component in &message.components {
                system_key
                    .attribute_map
                    .insert(component.attribute.clone(), component.public_component.clone());
                // the re-encryption key departs from the previous version
                chain_appends.push(AttributeVersion {
                    attribute: component.attribute.clone(),
                    version: component.version - 1,
                    re_encryption_key: component.re_encryption_key.clone(),
                });
            }
        }
        let public_key = system_key.to_bytes()?;

        self.store().begin().await?;
        let rotated: Result<(), StoreError<S::Error>> = async {
            for (message, target) in messages.iter().zip(&targets) {
                if let Some(target) = target {
                    match self
                        .store()
                        .delete_member_attributes(workspace_id, *target, &message.minimal_set)
                        .await
                    {
                        Ok(()) => {}
                        Err(e) if e.is_no_rows_affected() => {
                            tracing::debug!(
                                "no attributes to remove for user {} (already revoked?)",
                                target
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            self.store()
                .append_attribute_versions(workspace_id, &chain_appends)
                .await?;
            self.store()
                .update_workspace_public_key(workspace_id, &public_key)
                .await?;
            Ok(())
        }
        .await;
        match rotated {
            Ok(()) => self.store().commit().await?,
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed key rotation also failed: {}", re);
                }
                return Err(e.into());
            }
        }

        // phase 3: advance every remaining member
        let members = self.store().get_workspace_members(workspace_id).await?;
        if members.is_empty() {
            return Err(RevokeError::NoMembers(workspace_id));
        }
        let chains = self
            .store()
            .get_attribute_version_chains(workspace_id)
            .await?;
        let universe = self.store().get_attribute_universe(workspace_id).await?;
        let attribute_ids: HashMap<&String, u32> =
            universe.iter().map(|(id, name)| (name, *id)).collect();

        let mut notifications = HashMap::new();
        for member in members.iter().filter(|m| m.user.id != owner.id) {
            match self
                .advance_member(workspace_id, member.user.id, &messages, &chains, &attribute_ids)
                .await
            {
                Ok(secret_key) => {
                    notifications.insert(
                        member.user.id,
                        RevokeNotification {
                            workspace_id,
                            public_key: public_key.clone(),
                            secret_key,
                        },
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "failed to advance member {} of workspace {}: {}",
                        member.user.id,
                        workspace_id,
                        e
                    );
                }
            }
        }

        Ok(notifications)
    }

    /// Walk one member's held components to the chain tips and
    /// persist the updated bindings and spliced secret key.
    async fn advance_member(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        messages: &[RevokeMessage],
        chains: &HashMap<String, Vec<AttributeVersion>>,
        attribute_ids: &HashMap<&String, u32>,
    ) -> Result<Vec<u8>, RevokeError<S, A>> {
        let mut bindings = self
            .store()
            .get_member_attributes(workspace_id, member_id)
            .await?;

        for message in messages {
            for component in &message.components {
                let held = match bindings.get(&component.attribute) {
                    Some(held) => held.clone(),
                    None => continue,
                };
                let chain = chains
                    .get(&component.attribute)
                    .cloned()
                    .unwrap_or_default();
                let (advanced, reached) = walk_chain(self.abe(), &held, &chain)?;
                let expected = chain.len() as u64 + 1;
                if reached != expected {
                    return Err(RevokeError::ChainMismatch {
                        attribute: component.attribute.clone(),
                        reached,
                        expected,
                    });
                }
                bindings.insert(
                    component.attribute.clone(),
                    MemberAttribute {
                        attribute: component.attribute.clone(),
                        version: reached,
                        component: advanced,
                    },
                );
            }
        }

        let updated: Vec<MemberAttribute> = bindings.values().cloned().collect();

        self.store().begin().await?;
        let result: Result<Vec<u8>, RevokeError<S, A>> = async {
            self.store()
                .set_member_attributes(workspace_id, member_id, &updated)
                .await?;

            let stored = self
                .store()
                .get_member_secret_key(workspace_id, member_id)
                .await?;
            let mut secret_key = AbeSecretKey::from_bytes(&stored)?;
            for binding in &updated {
                if let Some(id) = attribute_ids.get(&binding.attribute) {
                    secret_key.leaf_keys.insert(*id, binding.component.clone());
                }
            }
            let serialized = secret_key.to_bytes()?;
            self.store()
                .set_member_secret_key(workspace_id, member_id, &serialized)
                .await?;
            Ok(serialized)
        }
        .await;
        match result {
            Ok(serialized) => {
                self.store().commit().await?;
                Ok(serialized)
            }
            Err(e) => {
                if let Err(re) = self.store().rollback().await {
                    tracing::warn!("rollback after failed member advance also failed: {}", re);
                }
                Err(e)
            }
        }
    }
}

/// Apply the single-step update once per chain entry from the held
/// version to the tip, validating that the entries are contiguous.
/// Returns the advanced component and the version it is valid at.
fn walk_chain<S: StoreProvider, A: AbeScheme>(
    abe: &A,
    held: &MemberAttribute,
    chain: &[AttributeVersion],
) -> Result<(Vec<u8>, u64), RevokeError<S, A>> {
    let mut version = held.version;
    let mut component = held.component.clone();
    for step in chain.iter().filter(|s| s.version >= held.version) {
        if step.version != version {
            return Err(RevokeError::ChainMismatch {
                attribute: held.attribute.clone(),
                reached: version,
                expected: step.version,
            });
        }
        component = abe
            .advance_secret_key_component(version, &component, step)
            .map_err(RevokeError::Abe)?;
        version += 1;
    }
    Ok((component, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ShareCrypto;
    use crate::models::Workspace;
    use crate::testkit::{self, Fixture};

    async fn abe_shared_workspace(fx: &Fixture) -> anyhow::Result<Workspace> {
        let handler = fx.handler();
        let folder_id = testkit::seed_folder_with_file(fx, "shared", "doc.txt", "chk-1").await?;
        let universe = testkit::universe(&["age>18", "dept:eng"]);
        let crypto = testkit::abe_crypto(&universe, &[&fx.bob, &fx.carol]);
        let workspace = handler
            .share_folder(
                &fx.alice,
                folder_id,
                vec![fx.bob.email.clone(), fx.carol.email.clone()],
                crypto,
            )
            .await?;
        Ok(workspace)
    }

    async fn public_components(fx: &Fixture, workspace_id: Uuid) -> anyhow::Result<SystemKey> {
        let workspace = fx.handler().store().get_workspace(workspace_id).await?;
        let abe = workspace.crypto.abe().expect("abe workspace");
        Ok(SystemKey::from_bytes(&abe.public_key)?)
    }

    #[tokio::test]
    async fn revocation_strips_bindings_and_rotates_the_public_key() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        let message = testkit::revoke_message(&fx.carol.email, &["age>18"], 2);
        let notifications = handler
            .revoke_folder(&fx.alice, workspace.id, vec![message.clone()])
            .await?;

        // carol lost the binding, bob was advanced to the new version
        let carol = handler
            .store()
            .get_member_attributes(workspace.id, fx.carol.id)
            .await?;
        assert!(!carol.contains_key("age>18"));
        assert!(carol.contains_key("dept:eng"));

        let bob = handler
            .store()
            .get_member_attributes(workspace.id, fx.bob.id)
            .await?;
        assert_eq!(bob["age>18"].version, 2);
        assert_eq!(bob["dept:eng"].version, 1);

        let system_key = public_components(&fx, workspace.id).await?;
        assert_eq!(
            system_key.attribute_map["age>18"],
            message.components[0].public_component
        );

        assert!(notifications.contains_key(&fx.bob.id));
        assert!(notifications.contains_key(&fx.carol.id));
        assert!(!notifications.contains_key(&fx.alice.id));
        Ok(())
    }

    #[tokio::test]
    async fn member_versions_track_the_chain_tip() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        for next in [2u64, 3] {
            let message = testkit::revoke_message(&fx.carol.email, &["age>18"], next);
            handler
                .revoke_folder(&fx.alice, workspace.id, vec![message])
                .await?;
        }

        let chains = handler
            .store()
            .get_attribute_version_chains(workspace.id)
            .await?;
        let chain = &chains["age>18"];
        let bob = handler
            .store()
            .get_member_attributes(workspace.id, fx.bob.id)
            .await?;
        assert_eq!(bob["age>18"].version, chain.len() as u64 + 1);
        assert_eq!(bob["age>18"].version, 3);

        let system_key = public_components(&fx, workspace.id).await?;
        assert_eq!(system_key.attribute_map["age>18"], b"pk:age>18:v3".to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn replaying_an_identical_revocation_is_a_no_op() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        let message = testkit::revoke_message(&fx.carol.email, &["age>18"], 2);
        handler
            .revoke_folder(&fx.alice, workspace.id, vec![message.clone()])
            .await?;
        let bob_before = handler
            .store()
            .get_member_attributes(workspace.id, fx.bob.id)
            .await?;

        handler
            .revoke_folder(&fx.alice, workspace.id, vec![message])
            .await?;
        let bob_after = handler
            .store()
            .get_member_attributes(workspace.id, fx.bob.id)
            .await?;
        assert_eq!(bob_before["age>18"].version, bob_after["age>18"].version);
        assert_eq!(
            bob_before["age>18"].component,
            bob_after["age>18"].component
        );

        let chains = handler
            .store()
            .get_attribute_version_chains(workspace.id)
            .await?;
        assert_eq!(chains["age>18"].len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn a_broken_chain_skips_the_member_instead_of_failing() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        // plant an out-of-order entry so bob's walk cannot reach the tip
        handler
            .store()
            .append_attribute_versions(
                workspace.id,
                &[AttributeVersion {
                    attribute: "age>18".into(),
                    version: 3,
                    re_encryption_key: b"rk:age>18:3->4".to_vec(),
                }],
            )
            .await?;

        let message = testkit::revoke_message(&fx.carol.email, &["age>18"], 2);
        let notifications = handler
            .revoke_folder(&fx.alice, workspace.id, vec![message])
            .await?;
        assert!(!notifications.contains_key(&fx.bob.id));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_emails_still_rotate_the_key() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        let known = testkit::revoke_message(&fx.carol.email, &["dept:eng"], 2);
        let unknown = testkit::revoke_message("nobody@x.com", &["age>18"], 2);
        handler
            .revoke_folder(&fx.alice, workspace.id, vec![known, unknown])
            .await?;

        let system_key = public_components(&fx, workspace.id).await?;
        assert_eq!(system_key.attribute_map["age>18"], b"pk:age>18:v2".to_vec());
        assert_eq!(
            system_key.attribute_map["dept:eng"],
            b"pk:dept:eng:v2".to_vec()
        );
        Ok(())
    }

    #[tokio::test]
    async fn revoking_addressed_only_to_the_owner_is_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        let message = testkit::revoke_message(&fx.alice.email, &["age>18"], 2);
        let err = handler
            .revoke_folder(&fx.alice, workspace.id, vec![message])
            .await
            .unwrap_err();
        assert!(matches!(err, RevokeError::NoAddressees));
        Ok(())
    }

    #[tokio::test]
    async fn components_below_version_two_are_rejected() -> anyhow::Result<()> {
        let fx = Fixture::new().await?;
        let handler = fx.handler();
        let workspace = abe_shared_workspace(&fx).await?;

        for bad in [0u64, 1] {
            let message = testkit::revoke_message(&fx.carol.email, &["age>18"], bad);
            let err = handler
                .revoke_folder(&fx.alice, workspace.id, vec![message])
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RevokeError::BadComponentVersion { version, .. } if version == bad
            ));
        }

        // rejected before anything was persisted
        let system_key = public_components(&fx, workspace.id).await?;
        assert_eq!(system_key.attribute_map["age>18"], b"pk:age>18:v1".to_vec());
        let carol = handler
            .store()
            .get_member_attributes(workspace.id, fx.carol.id)
            .await?;
        assert!(carol.contains_key("age>18"));
        Ok(())
    }

    #[tokio::test]
    async fn plain_workspaces_cannot_be_revoked() -> anyhow::Result<()> {
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

        let message = testkit::revoke_message(&fx.bob.email, &["age>18"], 2);
        let err = handler
            .revoke_folder(&fx.alice, workspace.id, vec![message])
            .await
            .unwrap_err();
        assert!(matches!(err, RevokeError::NotAbeEncrypted(_)));
        Ok(())
    }
}
