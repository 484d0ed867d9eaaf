use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A file or folder record. Folders carry no content chunks.
///
/// `id` is assigned by the store on first insert; an item built by an
/// engine carries `0` until then. `latest_version` is the
/// server-authoritative version counter, advanced only through the
/// store's compare-and-set operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub workspace_id: Uuid,
    pub parent_id: Option<i64>,
    /// Version of the parent as last reported by the client.
    pub client_parent_version: Option<u64>,
    pub filename: String,
    pub mimetype: String,
    pub is_folder: bool,
    pub latest_version: u64,
}

/// Status tag of an item version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionStatus {
    New,
    Deleted,
    Changed,
    Renamed,
    Moved,
}

impl VersionStatus {
    /// Statuses that also update the item row (filename/parent),
    /// not just append a version.
    pub fn moves_item(&self) -> bool {
        matches!(
            self,
            VersionStatus::Renamed | VersionStatus::Moved | VersionStatus::Deleted
        )
    }
}

/// An immutable snapshot of an item at one version. Version numbers
/// for a given item form a gap-free sequence starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVersion {
    pub id: i64,
    pub item_id: i64,
    pub device_id: Uuid,
    pub version: u64,
    pub modified_at: OffsetDateTime,
    pub checksum: i64,
    pub size: u64,
    pub status: VersionStatus,
    /// Content chunks in position order; empty for folders.
    pub chunks: Vec<Chunk>,
}

/// A content-addressed piece of an item version's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub name: String,
    /// 0-based position within the owning version.
    pub position: u32,
}

/// One ABE ciphertext component of an item's content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbeComponent {
    /// Attribute id within the workspace's attribute universe.
    pub attribute: u32,
    pub value: Vec<u8>,
}

/// ABE payload persisted alongside an item in an ABE-encrypted
/// workspace: the ciphertext components and the symmetric content
/// key encrypted under the ABE policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbeItemPayload {
    pub components: Vec<AbeComponent>,
    pub cipher_sym_key: Vec<u8>,
}
