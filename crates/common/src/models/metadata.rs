use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::item::{AbeItemPayload, VersionStatus};

/// Encryption payload carried on wire metadata. Mirrors
/// `WorkspaceCrypto` on the item level: plain items carry nothing,
/// items in ABE workspaces carry their ciphertext components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMetadata {
    Plain,
    Abe(AbeItemPayload),
}

/// The wire descriptor for one item change, both as submitted by a
/// client and as returned as the canonical server metadata.
///
/// `id` is absent on a first-ever submission; `temp_id` is a
/// client-local placeholder that lets descriptors later in the same
/// batch reference this item before a server id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: Option<i64>,
    pub temp_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub parent_version: Option<u64>,
    pub version: u64,
    pub device_id: Uuid,
    pub modified_at: OffsetDateTime,
    pub filename: String,
    pub mimetype: String,
    pub is_folder: bool,
    pub status: VersionStatus,
    pub checksum: i64,
    pub size: u64,
    /// Ordered content chunk names; empty for folders.
    pub chunks: Vec<String>,
    pub encryption: EncryptionMetadata,
}

impl ItemMetadata {
    /// Field-wise comparison used to tell a duplicate resubmission
    /// from a conflicting one. Ids are excluded because temp-id
    /// resolution makes them unstable across retries, and
    /// `modified_at` because client clocks are not trustworthy.
    pub fn matches(&self, other: &Self) -> bool {
        self.version == other.version
            && self.status == other.status
            && self.is_folder == other.is_folder
            && self.filename == other.filename
            && self.mimetype == other.mimetype
            && self.checksum == other.checksum
            && self.size == other.size
            && self.chunks == other.chunks
    }
}

/// Per-descriptor commit result. `metadata` is the canonical current
/// server metadata when the commit was rejected or a duplicate, and
/// the just-written metadata when freshly accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub version: u64,
    pub committed: bool,
    pub metadata: Option<ItemMetadata>,
}
