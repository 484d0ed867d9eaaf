/**
 * Test fixtures shared across the handler tests.
 *
 *  `Fixture` wires a fresh in-memory store and storage double with
 *  three seeded users (alice owns a device and is the acting user in
 *  most tests) and builds handlers on demand. The free functions
 *  produce wire descriptors and ABE material with deterministic,
 *  readable byte values so assertions can name exact expected keys.
 */
use std::collections::HashMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::abe::{AbeScheme, AbeSecretKey, AttributeVersion, PublicKeyComponent, RevokeMessage, SystemKey};
use crate::handler::{Handler, ShareCrypto};
use crate::models::{
    AttributeUniverse, Device, EncryptionMetadata, ItemMetadata, MemberKeyMaterial, User,
    VersionStatus, Workspace, WorkspaceCrypto,
};
use crate::storage::{MemoryStorage, StorageProvider};
use crate::store::{MemoryStore, StoreProvider};

/// Deterministic stand-in for the KP-ABE primitive: advancing a
/// component hashes the current version, the component and the
/// re-encryption key. Good enough to observe chain walks in tests
/// without a pairing library.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashChainScheme;

#[derive(thiserror::Error, Debug)]
pub enum HashChainError {}

impl AbeScheme for HashChainScheme {
    type Error = HashChainError;

    fn advance_secret_key_component(
        &self,
        current_version: u64,
        component: &[u8],
        step: &AttributeVersion,
    ) -> Result<Vec<u8>, Self::Error> {
        let mut hasher = Sha256::new();
        hasher.update(current_version.to_be_bytes());
        hasher.update(component);
        hasher.update(&step.re_encryption_key);
        Ok(hasher.finalize().to_vec())
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub storage: MemoryStorage,
    pub alice: User,
    pub bob: User,
    pub carol: User,
    /// Alice's device.
    pub device: Device,
    /// Alice's default workspace.
    pub workspace: Workspace,
}

impl Fixture {
    pub async fn new() -> anyhow::Result<Self> {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();

        let mut users = Vec::new();
        let mut workspaces = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let user = User {
                id: Uuid::new_v4(),
                name: name.into(),
                email: format!("{}@x.com", name),
                storage_account: format!("acct-{}", name),
            };
            store.seed_user(user.clone())?;

            let workspace = Workspace {
                id: Uuid::new_v4(),
                name: format!("{}-default", name),
                owner: user.id,
                is_shared: false,
                is_default: true,
                container: format!("container-{}", name),
                crypto: WorkspaceCrypto::Plain,
            };
            store.add_workspace(&workspace).await?;
            storage.create_container(&workspace).await?;

            users.push(user);
            workspaces.push(workspace);
        }

        let device = Device {
            id: Uuid::new_v4(),
            name: "laptop".into(),
            owner: users[0].id,
        };
        store.seed_device(device.clone())?;

        Ok(Fixture {
            store,
            storage,
            carol: users.pop().expect("carol"),
            bob: users.pop().expect("bob"),
            alice: users.pop().expect("alice"),
            device,
            workspace: workspaces.swap_remove(0),
        })
    }

    /// A handler on a fresh store session sharing this fixture's data.
    pub fn handler(&self) -> Handler<MemoryStore, MemoryStorage, HashChainScheme> {
        Handler::builder()
            .store(self.store.clone())
            .storage(self.storage.clone())
            .abe(HashChainScheme)
            .build()
    }
}

/// A version-`version` file descriptor for alice's device. `parent_id`
/// may be a temp id of an earlier descriptor in the same batch.
pub fn file_meta(
    fx: &Fixture,
    parent_id: Option<i64>,
    temp_id: Option<i64>,
    version: u64,
    filename: &str,
    chunks: &[&str],
) -> ItemMetadata {
    ItemMetadata {
        id: None,
        temp_id,
        parent_id,
        parent_version: parent_id.map(|_| 1),
        version,
        device_id: fx.device.id,
        modified_at: time::OffsetDateTime::now_utc(),
        filename: filename.into(),
        mimetype: "text/plain".into(),
        is_folder: false,
        status: VersionStatus::New,
        checksum: 42,
        size: 1024,
        chunks: chunks.iter().map(|c| c.to_string()).collect(),
        encryption: EncryptionMetadata::Plain,
    }
}

pub fn folder_meta(
    fx: &Fixture,
    parent_id: Option<i64>,
    temp_id: Option<i64>,
    version: u64,
    filename: &str,
) -> ItemMetadata {
    ItemMetadata {
        id: None,
        temp_id,
        parent_id,
        parent_version: parent_id.map(|_| 1),
        version,
        device_id: fx.device.id,
        modified_at: time::OffsetDateTime::now_utc(),
        filename: filename.into(),
        mimetype: "inode/directory".into(),
        is_folder: true,
        status: VersionStatus::New,
        checksum: 0,
        size: 0,
        chunks: vec![],
        encryption: EncryptionMetadata::Plain,
    }
}

/// Commit a folder containing one file into alice's default workspace
/// and seed the file's chunk into her container. Returns the folder's
/// server id.
pub async fn seed_folder_with_file(
    fx: &Fixture,
    folder: &str,
    file: &str,
    chunk: &str,
) -> anyhow::Result<i64> {
    let handler = fx.handler();
    let folder_desc = folder_meta(fx, None, Some(901), 1, folder);
    let file_desc = file_meta(fx, Some(901), Some(902), 1, file, &[chunk]);
    let infos = handler
        .commit(&fx.alice, fx.workspace.id, fx.device.id, vec![folder_desc, file_desc])
        .await?;
    if !infos.iter().all(|i| i.committed) {
        anyhow::bail!("fixture commit was rejected: {:?}", infos);
    }
    fx.storage.put_chunk(&fx.workspace.container, chunk)?;
    let folder_id = infos[0]
        .metadata
        .as_ref()
        .and_then(|m| m.id)
        .ok_or_else(|| anyhow::anyhow!("folder id missing from commit response"))?;
    Ok(folder_id)
}

/// Attribute universe mapping ids 1.. to the given names.
pub fn universe(names: &[&str]) -> AttributeUniverse {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (i as u32 + 1, name.to_string()))
        .collect()
}

/// ABE share crypto with a version-1 public key over `universe` and
/// per-user secret keys holding one leaf per attribute.
pub fn abe_crypto(universe: &AttributeUniverse, users: &[&User]) -> ShareCrypto {
    let system_key = SystemKey {
        attribute_map: universe
            .values()
            .map(|name| (name.clone(), format!("pk:{}:v1", name).into_bytes()))
            .collect(),
    };
    let public_key = system_key.to_bytes().expect("system key serializes");

    let mut member_keys = HashMap::new();
    for user in users {
        let secret_key = AbeSecretKey {
            leaf_keys: universe
                .iter()
                .map(|(id, name)| (*id, format!("leaf:{}:{}", user.email, name).into_bytes()))
                .collect(),
        };
        member_keys.insert(
            user.email.clone(),
            MemberKeyMaterial {
                access_structure: format!("policy:{}", user.email).into_bytes(),
                secret_key: secret_key.to_bytes().expect("secret key serializes"),
            },
        );
    }

    ShareCrypto::Abe {
        public_key,
        attribute_universe: universe.clone(),
        member_keys,
    }
}

/// A rotated public-key component taking `attribute` to `version`.
pub fn revoke_component(attribute: &str, version: u64) -> PublicKeyComponent {
    PublicKeyComponent {
        attribute: attribute.into(),
        version,
        public_component: format!("pk:{}:v{}", attribute, version).into_bytes(),
        re_encryption_key: format!("rk:{}:{}->{}", attribute, version.saturating_sub(1), version)
            .into_bytes(),
    }
}

/// A revoke message stripping `attributes` from the user behind
/// `email`, rotating each attribute to `version`.
pub fn revoke_message(email: &str, attributes: &[&str], version: u64) -> RevokeMessage {
    RevokeMessage {
        email: email.into(),
        minimal_set: attributes.iter().map(|a| a.to_string()).collect(),
        components: attributes
            .iter()
            .map(|a| revoke_component(a, version))
            .collect(),
    }
}
