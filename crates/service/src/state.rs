use common::abe::AbeScheme;
use common::storage::{MemoryStorage, StorageProvider};
use common::store::{MemoryStore, StoreProvider};
use common::testkit::HashChainScheme;
use object_store::{SwiftClient, SwiftConfig};

use super::config::SwiftSettings;
use super::session::Session;

/// Long-lived service state: the store, storage and ABE clients that
/// every request session borrows a clone of. Constructed explicitly
/// and passed down; no globals.
#[derive(Debug, Clone)]
pub struct State<S, B, A> {
    store: S,
    storage: B,
    abe: A,
}

impl<S, B, A> State<S, B, A>
where
    S: StoreProvider + Clone,
    B: StorageProvider + Clone,
    A: AbeScheme + Clone,
{
    pub fn new(store: S, storage: B, abe: A) -> Self {
        State {
            store,
            storage,
            abe,
        }
    }

    /// Open a fresh session. Store clones are independent sessions
    /// against shared data; storage and ABE clients share their
    /// connections.
    pub fn session(&self) -> Session<S, B, A> {
        Session::new(
            self.store.clone(),
            self.storage.clone(),
            self.abe.clone(),
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn storage(&self) -> &B {
        &self.storage
    }
}

impl State<MemoryStore, MemoryStorage, HashChainScheme> {
    /// Fully in-process state: memory store, memory storage and the
    /// deterministic ABE stand-in. Data lives as long as the state.
    pub fn ephemeral() -> Self {
        State::new(MemoryStore::new(), MemoryStorage::new(), HashChainScheme)
    }
}

impl State<MemoryStore, SwiftClient, HashChainScheme> {
    /// Memory store against a real Swift object store.
    pub fn with_swift(settings: &SwiftSettings) -> Self {
        let client = SwiftClient::new(SwiftConfig {
            auth_url: settings.auth_url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            tenant: settings.tenant.clone(),
        });
        State::new(MemoryStore::new(), client, HashChainScheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{Device, User, Workspace, WorkspaceCrypto};
    use uuid::Uuid;

    #[tokio::test]
    async fn sessions_share_state_but_not_transactions() -> anyhow::Result<()> {
        let state = State::ephemeral();

        let user = User {
            id: Uuid::new_v4(),
            name: "alice".into(),
            email: "alice@x.com".into(),
            storage_account: "acct-alice".into(),
        };
        state.store().seed_user(user.clone())?;
        let device = Device {
            id: Uuid::new_v4(),
            name: "laptop".into(),
            owner: user.id,
        };
        state.store().seed_device(device.clone())?;
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: "alice-default".into(),
            owner: user.id,
            is_shared: false,
            is_default: true,
            container: "container-alice".into(),
            crypto: WorkspaceCrypto::Plain,
        };
        state.store().add_workspace(&workspace).await?;
        state.storage().create_container(&workspace).await?;

        // commit through one session, read through another
        let writer = state.session();
        let meta = testkit_meta(&device, 1, "notes.txt");
        let infos = writer
            .handler()
            .commit(&user, workspace.id, device.id, vec![meta])
            .await?;
        assert!(infos[0].committed);

        let reader = state.session();
        assert_ne!(writer.id(), reader.id());
        let changes = reader.handler().get_changes(&user, workspace.id).await?;
        assert_eq!(changes.len(), 1);
        Ok(())
    }

    fn testkit_meta(
        device: &Device,
        version: u64,
        filename: &str,
    ) -> common::models::ItemMetadata {
        common::models::ItemMetadata {
            id: None,
            temp_id: Some(1),
            parent_id: None,
            parent_version: None,
            version,
            device_id: device.id,
            modified_at: time::OffsetDateTime::now_utc(),
            filename: filename.into(),
            mimetype: "text/plain".into(),
            is_folder: false,
            status: common::models::VersionStatus::New,
            checksum: 7,
            size: 64,
            chunks: vec!["chk-1".into()],
            encryption: common::models::EncryptionMetadata::Plain,
        }
    }
}
