/**
 * KP-ABE support types.
 *  Serialized key blobs, revocation wire types and the
 *  `AbeScheme` port onto the cryptographic primitive.
 */
pub mod abe;
/**
 * Protocol engines.
 *  Commit, sharing, revocation, unsharing and the metadata
 *  read path, all generic over the persistence and storage
 *  ports.
 */
pub mod handler;
/**
 * Domain rows and wire metadata.
 *  Users, devices, workspaces, items, versions, and the
 *  commit descriptor types.
 */
pub mod models;
/**
 * Object-storage port.
 *  Container lifecycle, ACL grants and chunk copies.
 */
pub mod storage;
/**
 * Persistence port.
 *  The transactional `StoreProvider` the engines drive, plus
 *  the in-memory provider used by tests and ephemeral mode.
 */
pub mod store;
/**
 * Test fixtures shared across the handler tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::abe::{AbeScheme, RevokeMessage, RevokeNotification};
    pub use crate::handler::{
        CommitOutcome, GetMetadataOptions, Handler, ItemListing, ShareCrypto,
    };
    pub use crate::models::{CommitInfo, ItemMetadata, User, Workspace};
    pub use crate::storage::{StorageError, StorageProvider};
    pub use crate::store::{StoreError, StoreProvider};
}
