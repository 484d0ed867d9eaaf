use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::user::User;

/// Maps small integer attribute ids to attribute names
/// (e.g. `1 -> "age>18"`). Fixed at workspace promotion time.
pub type AttributeUniverse = BTreeMap<u32, String>;

/// How the content of a workspace is protected.
///
/// Explicit variants instead of `encrypted`/`abe_encrypted` flag
/// pairs, so branching on the crypto mode is a pattern match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceCrypto {
    /// Plaintext content.
    Plain,
    /// Content encrypted with a symmetric key held by the members.
    Symmetric,
    /// Content under KP-ABE enforced access control.
    Abe(AbeWorkspace),
}

impl WorkspaceCrypto {
    pub fn is_abe(&self) -> bool {
        matches!(self, WorkspaceCrypto::Abe(_))
    }

    pub fn abe(&self) -> Option<&AbeWorkspace> {
        match self {
            WorkspaceCrypto::Abe(abe) => Some(abe),
            _ => None,
        }
    }
}

/// ABE state carried by a workspace: the serialized public key and
/// the attribute universe it was set up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbeWorkspace {
    pub public_key: Vec<u8>,
    pub attribute_universe: AttributeUniverse,
}

/// A namespace owning a subtree of items, backed by one storage
/// container. Every user has a non-shared default workspace; shared
/// workspaces are created by folder promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub is_shared: bool,
    pub is_default: bool,
    /// Name of the backing container at the object store.
    pub container: String,
    pub crypto: WorkspaceCrypto,
}

/// A user's membership in a shared workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub user: User,
    pub workspace_id: Uuid,
    pub joined_at: OffsetDateTime,
    pub is_owner: bool,
}

/// Pre-provisioned ABE key material for one addressee of a share,
/// supplied by the caller already encrypted for that addressee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberKeyMaterial {
    /// Serialized access structure the secret key encodes.
    pub access_structure: Vec<u8>,
    /// Serialized full secret key (see `abe::AbeSecretKey`).
    pub secret_key: Vec<u8>,
}
