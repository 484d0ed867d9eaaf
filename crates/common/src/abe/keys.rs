use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The ABE public key of a workspace: one public component per
/// attribute name. Stored serialized as JSON on the workspace row,
/// rotated wholesale on revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemKey {
    pub attribute_map: BTreeMap<String, Vec<u8>>,
}

impl SystemKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A member's full ABE secret key: one component per leaf of the
/// member's access tree, keyed by attribute id. Stored serialized as
/// JSON in the membership row; revocation splices updated leaves in
/// and writes the whole blob back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbeSecretKey {
    pub leaf_keys: BTreeMap<u32, Vec<u8>>,
}

impl AbeSecretKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
