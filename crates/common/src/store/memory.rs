use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::provider::{StoreError, StoreProvider};
use crate::abe::{AttributeVersion, MemberAttribute};
use crate::models::{
    AbeItemPayload, AttributeUniverse, Chunk, Device, EncryptionMetadata, Item, ItemMetadata,
    ItemVersion, MemberKeyMaterial, User, Workspace, WorkspaceCrypto, WorkspaceMember,
};

/// In-memory store provider backed by hash maps.
///
/// A clone shares the underlying state but carries its own
/// transaction scope, so `store.clone()` is how a new logical
/// session is opened. Transactions snapshot the whole state on
/// `begin` and restore it on `rollback`; a store-wide gate serializes
/// them, which also gives the per-item serialization the commit
/// protocol's version-counter check needs.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    gate: Arc<tokio::sync::Mutex<()>>,
    txn: Arc<StdMutex<Option<Txn>>>,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: self.gate.clone(),
            // fresh transaction scope per session
            txn: Arc::new(StdMutex::new(None)),
        }
    }
}

#[derive(Debug)]
struct Txn {
    snapshot: StoreInner,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone)]
struct MemberRow {
    user_id: Uuid,
    joined_at: OffsetDateTime,
    key_material: Option<MemberKeyMaterial>,
}

#[derive(Debug, Clone, Default)]
struct StoreInner {
    users: HashMap<Uuid, User>,
    devices: HashMap<Uuid, Device>,
    workspaces: HashMap<Uuid, Workspace>,
    members: HashMap<Uuid, Vec<MemberRow>>,
    items: BTreeMap<i64, Item>,
    versions: BTreeMap<i64, ItemVersion>,
    abe_payloads: HashMap<i64, AbeItemPayload>,
    attribute_chains: HashMap<Uuid, HashMap<String, Vec<AttributeVersion>>>,
    member_attributes: HashMap<(Uuid, Uuid), HashMap<String, MemberAttribute>>,
    next_item_id: i64,
    next_version_id: i64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            txn: Arc::new(StdMutex::new(None)),
        }
    }

    /// Seed a user row. User management is outside the engines'
    /// scope, so there is no port operation for it.
    pub fn seed_user(&self, user: User) -> Result<(), StoreError<MemoryStoreError>> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    /// Seed a device row.
    pub fn seed_device(&self, device: Device) -> Result<(), StoreError<MemoryStoreError>> {
        self.write()?.devices.insert(device.id, device);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, StoreError<MemoryStoreError>> {
        self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, StoreError<MemoryStoreError>> {
        self.inner.write().map_err(|e| {
            StoreError::Provider(MemoryStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }

    fn txn_cell(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Txn>>, StoreError<MemoryStoreError>> {
        self.txn.lock().map_err(|e| {
            StoreError::Provider(MemoryStoreError::Internal(format!(
                "failed to acquire transaction lock: {}",
                e
            )))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build wire metadata from an item row joined with one of its
/// version rows. Filename and parent reflect the current item state,
/// the rest comes from the version.
fn metadata_for(inner: &StoreInner, item: &Item, row: &ItemVersion) -> ItemMetadata {
    let mut chunks = row.chunks.clone();
    chunks.sort_by_key(|c| c.position);
    ItemMetadata {
        id: Some(item.id),
        temp_id: None,
        parent_id: item.parent_id,
        parent_version: item.client_parent_version,
        version: row.version,
        device_id: row.device_id,
        modified_at: row.modified_at,
        filename: item.filename.clone(),
        mimetype: item.mimetype.clone(),
        is_folder: item.is_folder,
        status: row.status,
        checksum: row.checksum,
        size: row.size,
        chunks: chunks.into_iter().map(|c| c.name).collect(),
        encryption: match inner.abe_payloads.get(&item.id) {
            Some(payload) => EncryptionMetadata::Abe(payload.clone()),
            None => EncryptionMetadata::Plain,
        },
    }
}

fn version_row<'a>(inner: &'a StoreInner, item_id: i64, version: u64) -> Option<&'a ItemVersion> {
    inner
        .versions
        .values()
        .find(|v| v.item_id == item_id && v.version == version)
}

fn latest_metadata(inner: &StoreInner, item: &Item) -> Option<ItemMetadata> {
    version_row(inner, item.id, item.latest_version).map(|row| metadata_for(inner, item, row))
}

#[async_trait]
impl StoreProvider for MemoryStore {
    type Error = MemoryStoreError;

    async fn begin(&self) -> Result<(), StoreError<Self::Error>> {
        {
            let txn = self.txn_cell()?;
            if txn.is_some() {
                return Err(StoreError::Provider(MemoryStoreError::Internal(
                    "transaction already open on this session".into(),
                )));
            }
        }
        let guard = self.gate.clone().lock_owned().await;
        let snapshot = self.read()?.clone();
        *self.txn_cell()? = Some(Txn {
            snapshot,
            _guard: guard,
        });
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError<Self::Error>> {
        match self.txn_cell()?.take() {
            Some(_) => Ok(()),
            None => Err(StoreError::Provider(MemoryStoreError::Internal(
                "commit without an open transaction".into(),
            ))),
        }
    }

    async fn rollback(&self) -> Result<(), StoreError<Self::Error>> {
        match self.txn_cell()?.take() {
            Some(txn) => {
                *self.write()? = txn.snapshot;
                Ok(())
            }
            None => Err(StoreError::Provider(MemoryStoreError::Internal(
                "rollback without an open transaction".into(),
            ))),
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError<Self::Error>> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("user {}", id)))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError<Self::Error>> {
        self.read()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("user with email '{}'", email)))
    }

    async fn get_device(&self, id: Uuid) -> Result<Device, StoreError<Self::Error>> {
        self.read()?
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("device {}", id)))
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError<Self::Error>> {
        self.read()?
            .workspaces
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("workspace {}", id)))
    }

    async fn get_user_workspaces(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Workspace>, StoreError<Self::Error>> {
        let inner = self.read()?;
        let mut workspaces: Vec<Workspace> = inner
            .workspaces
            .values()
            .filter(|w| {
                w.owner == user_id
                    || inner
                        .members
                        .get(&w.id)
                        .map(|rows| rows.iter().any(|r| r.user_id == user_id))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        workspaces.sort_by_key(|w| w.id);
        Ok(workspaces)
    }

    async fn get_default_workspace(
        &self,
        user_id: Uuid,
    ) -> Result<Workspace, StoreError<Self::Error>> {
        self.read()?
            .workspaces
            .values()
            .find(|w| w.owner == user_id && w.is_default)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("default workspace of user {}", user_id)))
    }

    async fn add_workspace(&self, workspace: &Workspace) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if inner.workspaces.contains_key(&workspace.id) {
            return Err(StoreError::Conflict(format!(
                "workspace {} already exists",
                workspace.id
            )));
        }
        inner.workspaces.insert(workspace.id, workspace.clone());
        Ok(())
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if inner.workspaces.remove(&id).is_none() {
            return Err(StoreError::NoRowsAffected(format!("workspace {}", id)));
        }
        inner.members.remove(&id);
        inner.attribute_chains.remove(&id);
        inner.member_attributes.retain(|(ws, _), _| *ws != id);
        Ok(())
    }

    async fn update_workspace_public_key(
        &self,
        id: Uuid,
        public_key: &[u8],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let workspace = inner
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| StoreError::NoRowsAffected(format!("workspace {}", id)))?;
        match &mut workspace.crypto {
            WorkspaceCrypto::Abe(abe) => {
                abe.public_key = public_key.to_vec();
                Ok(())
            }
            _ => Err(StoreError::NoRowsAffected(format!(
                "workspace {} is not abe-encrypted",
                id
            ))),
        }
    }

    async fn get_attribute_universe(
        &self,
        workspace_id: Uuid,
    ) -> Result<AttributeUniverse, StoreError<Self::Error>> {
        let inner = self.read()?;
        let workspace = inner
            .workspaces
            .get(&workspace_id)
            .ok_or_else(|| StoreError::NoResult(format!("workspace {}", workspace_id)))?;
        workspace
            .crypto
            .abe()
            .map(|abe| abe.attribute_universe.clone())
            .ok_or_else(|| {
                StoreError::NoResult(format!("attribute universe of workspace {}", workspace_id))
            })
    }

    async fn add_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        key_material: Option<&MemberKeyMaterial>,
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if !inner.workspaces.contains_key(&workspace_id) {
            return Err(StoreError::NoResult(format!("workspace {}", workspace_id)));
        }
        let rows = inner.members.entry(workspace_id).or_default();
        if rows.iter().any(|r| r.user_id == user_id) {
            return Err(StoreError::Conflict(format!(
                "user {} is already a member of workspace {}",
                user_id, workspace_id
            )));
        }
        rows.push(MemberRow {
            user_id,
            joined_at: OffsetDateTime::now_utc(),
            key_material: key_material.cloned(),
        });
        Ok(())
    }

    async fn remove_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let rows = inner
            .members
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::NoRowsAffected(format!("workspace {}", workspace_id)))?;
        let before = rows.len();
        rows.retain(|r| r.user_id != user_id);
        if rows.len() == before {
            return Err(StoreError::NoRowsAffected(format!(
                "user {} in workspace {}",
                user_id, workspace_id
            )));
        }
        inner.member_attributes.remove(&(workspace_id, user_id));
        Ok(())
    }

    async fn get_workspace_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMember>, StoreError<Self::Error>> {
        let inner = self.read()?;
        let workspace = inner
            .workspaces
            .get(&workspace_id)
            .ok_or_else(|| StoreError::NoResult(format!("workspace {}", workspace_id)))?;
        let rows = match inner.members.get(&workspace_id) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };
        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let user = inner
                .users
                .get(&row.user_id)
                .cloned()
                .ok_or_else(|| StoreError::NoResult(format!("user {}", row.user_id)))?;
            members.push(WorkspaceMember {
                is_owner: user.id == workspace.owner,
                user,
                workspace_id,
                joined_at: row.joined_at,
            });
        }
        Ok(members)
    }

    async fn get_item(&self, id: i64) -> Result<Item, StoreError<Self::Error>> {
        self.read()?
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NoResult(format!("item {}", id)))
    }

    async fn put_item(&self, item: &Item) -> Result<i64, StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if item.id == 0 {
            inner.next_item_id += 1;
            let id = inner.next_item_id;
            let mut row = item.clone();
            row.id = id;
            inner.items.insert(id, row);
            Ok(id)
        } else {
            if !inner.items.contains_key(&item.id) {
                return Err(StoreError::NoRowsAffected(format!("item {}", item.id)));
            }
            inner.items.insert(item.id, item.clone());
            Ok(item.id)
        }
    }

    async fn put_abe_item(
        &self,
        item: &Item,
        payload: &AbeItemPayload,
    ) -> Result<i64, StoreError<Self::Error>> {
        let id = self.put_item(item).await?;
        self.write()?.abe_payloads.insert(id, payload.clone());
        Ok(id)
    }

    async fn add_item_version(
        &self,
        version: &ItemVersion,
    ) -> Result<i64, StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if version_row(&inner, version.item_id, version.version).is_some() {
            return Err(StoreError::Conflict(format!(
                "version {} of item {} already exists",
                version.version, version.item_id
            )));
        }
        inner.next_version_id += 1;
        let id = inner.next_version_id;
        let mut row = version.clone();
        row.id = id;
        inner.versions.insert(id, row);
        Ok(id)
    }

    async fn insert_chunks(
        &self,
        version_id: i64,
        chunks: &[Chunk],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let row = inner
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| StoreError::NoRowsAffected(format!("item version {}", version_id)))?;
        row.chunks = chunks.to_vec();
        Ok(())
    }

    async fn advance_item_version(
        &self,
        item_id: i64,
        expected: u64,
        next: u64,
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let item = inner
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::NoResult(format!("item {}", item_id)))?;
        if item.latest_version != expected {
            return Err(StoreError::Conflict(format!(
                "item {} version counter is {}, expected {}",
                item_id, item.latest_version, expected
            )));
        }
        item.latest_version = next;
        Ok(())
    }

    async fn find_version_metadata(
        &self,
        item_id: i64,
        version: u64,
    ) -> Result<ItemMetadata, StoreError<Self::Error>> {
        let inner = self.read()?;
        let item = inner
            .items
            .get(&item_id)
            .ok_or_else(|| StoreError::NoResult(format!("item {}", item_id)))?;
        let row = version_row(&inner, item_id, version).ok_or_else(|| {
            StoreError::NoResult(format!("version {} of item {}", version, item_id))
        })?;
        Ok(metadata_for(&inner, item, row))
    }

    async fn find_children_metadata(
        &self,
        item_id: i64,
    ) -> Result<Vec<ItemMetadata>, StoreError<Self::Error>> {
        let inner = self.read()?;
        Ok(inner
            .items
            .values()
            .filter(|i| i.parent_id == Some(item_id))
            .filter_map(|i| latest_metadata(&inner, i))
            .collect())
    }

    async fn find_workspace_metadata(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<ItemMetadata>, StoreError<Self::Error>> {
        let inner = self.read()?;
        Ok(inner
            .items
            .values()
            .filter(|i| i.workspace_id == workspace_id)
            .filter_map(|i| latest_metadata(&inner, i))
            .collect())
    }

    async fn migrate_item_subtree(
        &self,
        item_id: i64,
        target_workspace_id: Uuid,
    ) -> Result<Vec<String>, StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if !inner.items.contains_key(&item_id) {
            return Err(StoreError::NoResult(format!("item {}", item_id)));
        }
        if !inner.workspaces.contains_key(&target_workspace_id) {
            return Err(StoreError::NoResult(format!(
                "workspace {}",
                target_workspace_id
            )));
        }

        // collect the subtree breadth-first
        let mut subtree = vec![item_id];
        let mut queue = vec![item_id];
        while let Some(current) = queue.pop() {
            for (id, item) in inner.items.iter() {
                if item.parent_id == Some(current) {
                    subtree.push(*id);
                    queue.push(*id);
                }
            }
        }

        for id in &subtree {
            if let Some(item) = inner.items.get_mut(id) {
                item.workspace_id = target_workspace_id;
            }
        }
        // the migrated root becomes a root of the target workspace
        if let Some(root) = inner.items.get_mut(&item_id) {
            root.parent_id = None;
            root.client_parent_version = None;
        }

        let mut seen = std::collections::HashSet::new();
        let mut chunks = Vec::new();
        for row in inner.versions.values() {
            if subtree.contains(&row.item_id) {
                for chunk in &row.chunks {
                    if seen.insert(chunk.name.clone()) {
                        chunks.push(chunk.name.clone());
                    }
                }
            }
        }
        Ok(chunks)
    }

    async fn append_attribute_versions(
        &self,
        workspace_id: Uuid,
        entries: &[AttributeVersion],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        if !inner.workspaces.contains_key(&workspace_id) {
            return Err(StoreError::NoResult(format!("workspace {}", workspace_id)));
        }
        let chains = inner.attribute_chains.entry(workspace_id).or_default();
        for entry in entries {
            let chain = chains.entry(entry.attribute.clone()).or_default();
            // replayed appends land on an already-present version
            if chain.iter().any(|e| e.version == entry.version) {
                continue;
            }
            chain.push(entry.clone());
            chain.sort_by_key(|e| e.version);
        }
        Ok(())
    }

    async fn get_attribute_version_chains(
        &self,
        workspace_id: Uuid,
    ) -> Result<HashMap<String, Vec<AttributeVersion>>, StoreError<Self::Error>> {
        Ok(self
            .read()?
            .attribute_chains
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<HashMap<String, MemberAttribute>, StoreError<Self::Error>> {
        Ok(self
            .read()?
            .member_attributes
            .get(&(workspace_id, user_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        attributes: &[MemberAttribute],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let bindings = inner
            .member_attributes
            .entry((workspace_id, user_id))
            .or_default();
        for attribute in attributes {
            bindings.insert(attribute.attribute.clone(), attribute.clone());
        }
        Ok(())
    }

    async fn delete_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        attributes: &[String],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let removed = match inner.member_attributes.get_mut(&(workspace_id, user_id)) {
            Some(bindings) => attributes
                .iter()
                .filter(|name| bindings.remove(*name).is_some())
                .count(),
            None => 0,
        };
        if removed == 0 {
            return Err(StoreError::NoRowsAffected(format!(
                "attributes of user {} in workspace {}",
                user_id, workspace_id
            )));
        }
        Ok(())
    }

    async fn get_member_secret_key(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<u8>, StoreError<Self::Error>> {
        let inner = self.read()?;
        inner
            .members
            .get(&workspace_id)
            .and_then(|rows| rows.iter().find(|r| r.user_id == user_id))
            .and_then(|row| row.key_material.as_ref())
            .map(|material| material.secret_key.clone())
            .ok_or_else(|| {
                StoreError::NoResult(format!(
                    "secret key of user {} in workspace {}",
                    user_id, workspace_id
                ))
            })
    }

    async fn set_member_secret_key(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        secret_key: &[u8],
    ) -> Result<(), StoreError<Self::Error>> {
        let mut inner = self.write()?;
        let material = inner
            .members
            .get_mut(&workspace_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.user_id == user_id))
            .and_then(|row| row.key_material.as_mut())
            .ok_or_else(|| {
                StoreError::NoRowsAffected(format!(
                    "secret key of user {} in workspace {}",
                    user_id, workspace_id
                ))
            })?;
        material.secret_key = secret_key.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionStatus;

    fn workspace(owner: Uuid) -> Workspace {
        Workspace {
            id: Uuid::new_v4(),
            name: "default".into(),
            owner,
            is_shared: false,
            is_default: true,
            container: Uuid::new_v4().to_string(),
            crypto: WorkspaceCrypto::Plain,
        }
    }

    fn item(workspace_id: Uuid, parent_id: Option<i64>, folder: bool) -> Item {
        Item {
            id: 0,
            workspace_id,
            parent_id,
            client_parent_version: None,
            filename: "file.txt".into(),
            mimetype: "text/plain".into(),
            is_folder: folder,
            latest_version: 1,
        }
    }

    fn version(item_id: i64, version: u64) -> ItemVersion {
        ItemVersion {
            id: 0,
            item_id,
            device_id: Uuid::new_v4(),
            version,
            modified_at: OffsetDateTime::now_utc(),
            checksum: 7,
            size: 42,
            status: VersionStatus::New,
            chunks: vec![],
        }
    }

    #[tokio::test]
    async fn rollback_restores_the_snapshot() {
        let store = MemoryStore::new();
        let ws = workspace(Uuid::new_v4());
        store.add_workspace(&ws).await.unwrap();

        store.begin().await.unwrap();
        let id = store.put_item(&item(ws.id, None, false)).await.unwrap();
        store.rollback().await.unwrap();

        assert!(store.get_item(id).await.unwrap_err().is_no_result());
    }

    #[tokio::test]
    async fn duplicate_version_insert_conflicts() {
        let store = MemoryStore::new();
        let ws = workspace(Uuid::new_v4());
        store.add_workspace(&ws).await.unwrap();
        let id = store.put_item(&item(ws.id, None, false)).await.unwrap();

        store.add_item_version(&version(id, 1)).await.unwrap();
        let err = store.add_item_version(&version(id, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn version_counter_cas_rejects_stale_expectations() {
        let store = MemoryStore::new();
        let ws = workspace(Uuid::new_v4());
        store.add_workspace(&ws).await.unwrap();
        let id = store.put_item(&item(ws.id, None, false)).await.unwrap();

        store.advance_item_version(id, 1, 2).await.unwrap();
        let err = store.advance_item_version(id, 1, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get_item(id).await.unwrap().latest_version, 2);
    }

    #[tokio::test]
    async fn migrate_moves_the_subtree_and_reports_chunks() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let source = workspace(owner);
        let target = workspace(owner);
        store.add_workspace(&source).await.unwrap();
        store.add_workspace(&target).await.unwrap();

        let folder = store.put_item(&item(source.id, None, true)).await.unwrap();
        let child = store
            .put_item(&item(source.id, Some(folder), false))
            .await
            .unwrap();
        let vid = store.add_item_version(&version(child, 1)).await.unwrap();
        store
            .insert_chunks(
                vid,
                &[
                    Chunk {
                        name: "chk-a".into(),
                        position: 0,
                    },
                    Chunk {
                        name: "chk-b".into(),
                        position: 1,
                    },
                ],
            )
            .await
            .unwrap();

        let chunks = store.migrate_item_subtree(folder, target.id).await.unwrap();
        assert_eq!(chunks, vec!["chk-a".to_string(), "chk-b".to_string()]);
        assert_eq!(store.get_item(child).await.unwrap().workspace_id, target.id);
        assert_eq!(store.get_item(folder).await.unwrap().parent_id, None);
    }

    #[tokio::test]
    async fn chain_append_is_idempotent_under_replay() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut ws = workspace(owner);
        ws.crypto = WorkspaceCrypto::Abe(crate::models::AbeWorkspace {
            public_key: vec![],
            attribute_universe: AttributeUniverse::new(),
        });
        store.add_workspace(&ws).await.unwrap();

        let entry = AttributeVersion {
            attribute: "age>18".into(),
            version: 1,
            re_encryption_key: vec![1],
        };
        store
            .append_attribute_versions(ws.id, &[entry.clone()])
            .await
            .unwrap();
        store
            .append_attribute_versions(ws.id, &[entry])
            .await
            .unwrap();

        let chains = store.get_attribute_version_chains(ws.id).await.unwrap();
        assert_eq!(chains.get("age>18").map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn delete_member_attributes_reports_noop() {
        let store = MemoryStore::new();
        let ws = workspace(Uuid::new_v4());
        store.add_workspace(&ws).await.unwrap();
        let user = Uuid::new_v4();

        let err = store
            .delete_member_attributes(ws.id, user, &["age>18".into()])
            .await
            .unwrap_err();
        assert!(err.is_no_rows_affected());
    }
}
