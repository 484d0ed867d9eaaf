/**
 * KP-ABE support types.
 *  The cryptographic primitive itself lives behind the
 *  `AbeScheme` port; this module only carries the serialized
 *  key blobs, the revocation wire types, and the per-member
 *  attribute state the engines shuffle around.
 */
mod keys;
mod revoke;
mod scheme;

pub use keys::{AbeSecretKey, SystemKey};
pub use revoke::{PublicKeyComponent, RevokeMessage, RevokeNotification};
pub use scheme::AbeScheme;

use serde::{Deserialize, Serialize};

/// One link of an attribute's version chain: the re-encryption key
/// that advances a secret-key component *from* `version` to
/// `version + 1`. Chains are append-only and strictly increasing
/// from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeVersion {
    pub attribute: String,
    pub version: u64,
    pub re_encryption_key: Vec<u8>,
}

/// A member's held secret-key component for one attribute, and the
/// chain version it is valid at. Never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAttribute {
    pub attribute: String,
    pub version: u64,
    pub component: Vec<u8>,
}
