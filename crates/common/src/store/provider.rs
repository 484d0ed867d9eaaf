use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::abe::{AttributeVersion, MemberAttribute};
use crate::models::{
    AbeItemPayload, AttributeUniverse, Chunk, Device, Item, ItemMetadata, ItemVersion,
    MemberKeyMaterial, User, Workspace, WorkspaceMember,
};

/// Errors a store provider can signal, with the distinctions the
/// engines care about: a lookup miss is often a recoverable skip, a
/// write that matched nothing is a benign no-op in revocation, and a
/// conflict aborts the current unit.
#[derive(thiserror::Error, Debug)]
pub enum StoreError<T> {
    /// Underlying provider/transport failure. Aborts the current
    /// transactional unit, never silently ignored.
    #[error("store provider error: {0}")]
    Provider(#[from] T),
    /// A lookup returned no result.
    #[error("no result: {0}")]
    NoResult(String),
    /// An update or delete matched no rows.
    #[error("no rows affected: {0}")]
    NoRowsAffected(String),
    /// A write conflicted with concurrent or existing state
    /// (duplicate version insert, failed version-counter CAS).
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl<T> StoreError<T> {
    pub fn is_no_result(&self) -> bool {
        matches!(self, StoreError::NoResult(_))
    }

    pub fn is_no_rows_affected(&self) -> bool {
        matches!(self, StoreError::NoRowsAffected(_))
    }
}

/// Transactional persistence port.
///
/// One value of an implementing type represents one logical session;
/// `begin`/`commit`/`rollback` scope a transaction on that session.
/// At-least read-committed isolation is assumed, and
/// `advance_item_version` must be serialized per item (row lock or
/// compare-and-set) so two concurrent commits cannot both observe
/// the same stale version counter.
#[async_trait]
pub trait StoreProvider: Send + Sync + std::fmt::Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    // transaction scoping
    async fn begin(&self) -> Result<(), StoreError<Self::Error>>;
    async fn commit(&self) -> Result<(), StoreError<Self::Error>>;
    async fn rollback(&self) -> Result<(), StoreError<Self::Error>>;

    // users and devices
    async fn get_user(&self, id: Uuid) -> Result<User, StoreError<Self::Error>>;
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError<Self::Error>>;
    async fn get_device(&self, id: Uuid) -> Result<Device, StoreError<Self::Error>>;

    // workspaces
    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError<Self::Error>>;
    /// Workspaces the user owns or is a member of.
    async fn get_user_workspaces(&self, user_id: Uuid)
        -> Result<Vec<Workspace>, StoreError<Self::Error>>;
    async fn get_default_workspace(
        &self,
        user_id: Uuid,
    ) -> Result<Workspace, StoreError<Self::Error>>;
    async fn add_workspace(&self, workspace: &Workspace) -> Result<(), StoreError<Self::Error>>;
    /// Deletes the workspace row and everything hanging off it
    /// (memberships, attribute chains, member bindings). Items are
    /// expected to have been migrated out beforehand.
    async fn delete_workspace(&self, id: Uuid) -> Result<(), StoreError<Self::Error>>;
    async fn update_workspace_public_key(
        &self,
        id: Uuid,
        public_key: &[u8],
    ) -> Result<(), StoreError<Self::Error>>;
    async fn get_attribute_universe(
        &self,
        workspace_id: Uuid,
    ) -> Result<AttributeUniverse, StoreError<Self::Error>>;

    // membership
    async fn add_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        key_material: Option<&MemberKeyMaterial>,
    ) -> Result<(), StoreError<Self::Error>>;
    async fn remove_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError<Self::Error>>;
    async fn get_workspace_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMember>, StoreError<Self::Error>>;

    // items and versions
    async fn get_item(&self, id: i64) -> Result<Item, StoreError<Self::Error>>;
    /// Insert (id 0) or update (id set) an item row. Returns the id.
    async fn put_item(&self, item: &Item) -> Result<i64, StoreError<Self::Error>>;
    /// Like `put_item`, additionally persisting the ABE payload.
    async fn put_abe_item(
        &self,
        item: &Item,
        payload: &AbeItemPayload,
    ) -> Result<i64, StoreError<Self::Error>>;
    /// Insert a version row. Fails with `Conflict` if a version with
    /// the same (item, version) pair already exists.
    async fn add_item_version(
        &self,
        version: &ItemVersion,
    ) -> Result<i64, StoreError<Self::Error>>;
    async fn insert_chunks(
        &self,
        version_id: i64,
        chunks: &[Chunk],
    ) -> Result<(), StoreError<Self::Error>>;
    /// Compare-and-set on the item's version counter. Fails with
    /// `Conflict` when the stored counter is not `expected`.
    async fn advance_item_version(
        &self,
        item_id: i64,
        expected: u64,
        next: u64,
    ) -> Result<(), StoreError<Self::Error>>;
    async fn find_version_metadata(
        &self,
        item_id: i64,
        version: u64,
    ) -> Result<ItemMetadata, StoreError<Self::Error>>;
    /// Latest metadata of every direct child of the item.
    async fn find_children_metadata(
        &self,
        item_id: i64,
    ) -> Result<Vec<ItemMetadata>, StoreError<Self::Error>>;
    /// Latest metadata of every item in the workspace.
    async fn find_workspace_metadata(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<ItemMetadata>, StoreError<Self::Error>>;
    /// Server-side move of an item and its descendants into another
    /// workspace. Returns the content chunk names found under the
    /// subtree so the caller can migrate them between containers.
    async fn migrate_item_subtree(
        &self,
        item_id: i64,
        target_workspace_id: Uuid,
    ) -> Result<Vec<String>, StoreError<Self::Error>>;

    // attribute version chains
    /// Append chain entries. Entries whose version is already present
    /// in the target chain are skipped, keeping the append idempotent
    /// under replay.
    async fn append_attribute_versions(
        &self,
        workspace_id: Uuid,
        entries: &[AttributeVersion],
    ) -> Result<(), StoreError<Self::Error>>;
    /// All chains of the workspace, each sorted by ascending version.
    async fn get_attribute_version_chains(
        &self,
        workspace_id: Uuid,
    ) -> Result<HashMap<String, Vec<AttributeVersion>>, StoreError<Self::Error>>;

    // per-member attribute bindings
    async fn get_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<HashMap<String, MemberAttribute>, StoreError<Self::Error>>;
    async fn set_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        attributes: &[MemberAttribute],
    ) -> Result<(), StoreError<Self::Error>>;
    /// Remove the listed bindings. Fails with `NoRowsAffected` when
    /// nothing matched; callers treat that as a benign no-op.
    async fn delete_member_attributes(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        attributes: &[String],
    ) -> Result<(), StoreError<Self::Error>>;

    // per-member secret keys
    async fn get_member_secret_key(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<u8>, StoreError<Self::Error>>;
    async fn set_member_secret_key(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        secret_key: &[u8],
    ) -> Result<(), StoreError<Self::Error>>;
}
