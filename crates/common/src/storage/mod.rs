/**
 * Object-storage port.
 *  Container lifecycle, ACL grants and chunk copies against the
 *  remote object store. Side effects here sit outside the store's
 *  transactions, so every operation is designed to be idempotent.
 */
mod memory;
mod provider;

pub use memory::{MemoryStorage, MemoryStorageError};
pub use provider::{StorageError, StorageProvider};
