/**
 * Persistence port.
 *  `StoreProvider` is the transactional store the engines drive;
 *  `MemoryStore` is the in-process provider used by tests and the
 *  ephemeral service mode.
 */
mod memory;
mod provider;

pub use memory::{MemoryStore, MemoryStoreError};
pub use provider::{StoreError, StoreProvider};
