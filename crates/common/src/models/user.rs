use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account known to the sync service.
///
/// `storage_account` is the user's handle at the object-storage
/// backend, used when granting container access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub storage_account: String,
}

/// A client device owned by a user. Every committed item version
/// records the device it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
}
