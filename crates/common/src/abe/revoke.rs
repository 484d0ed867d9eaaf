use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rotated public-key component for one attribute, carried inside
/// a revoke message. `version` is the version the attribute is being
/// rotated *to*; the re-encryption key transitions from
/// `version - 1` to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyComponent {
    pub attribute: String,
    pub version: u64,
    pub public_component: Vec<u8>,
    pub re_encryption_key: Vec<u8>,
}

/// One revocation: strip `minimal_set` attributes from the user
/// named by `email`, and rotate the listed public-key components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeMessage {
    pub email: String,
    /// Smallest set of attributes whose removal revokes the user's
    /// access under their policy.
    pub minimal_set: Vec<String>,
    pub components: Vec<PublicKeyComponent>,
}

/// Payload queued for out-of-band delivery to each remaining member
/// after a revocation: the rotated workspace public key and the
/// member's re-serialized secret key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeNotification {
    pub workspace_id: Uuid,
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}
