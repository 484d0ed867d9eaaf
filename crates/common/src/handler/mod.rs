/**
 * Protocol engines.
 *  A `Handler` is built once per request from a store session, a
 *  storage client and an ABE scheme, and drives the commit,
 *  sharing, revocation and unsharing protocols plus the read path.
 */
mod commit;
mod members;
mod metadata;
mod revoke;
mod share;
mod unshare;

pub use commit::{CommitError, CommitOutcome};
pub use members::MembersError;
pub use metadata::{GetMetadataOptions, ItemListing, MetadataError};
pub use revoke::RevokeError;
pub use share::{ShareCrypto, ShareError};

use crate::abe::AbeScheme;
use crate::store::StoreProvider;
use crate::storage::StorageProvider;

/// One request's view of the system: a store session, a storage
/// client and the ABE primitive. Constructed explicitly by the
/// caller; there is no hidden global state.
#[derive(Debug)]
pub struct Handler<S, B, A> {
    store: S,
    storage: B,
    abe: A,
}

impl<S, B, A> Handler<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    pub fn builder() -> HandlerBuilder<S, B, A> {
        HandlerBuilder::new()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn storage(&self) -> &B {
        &self.storage
    }

    pub fn abe(&self) -> &A {
        &self.abe
    }
}

#[derive(Default)]
pub struct HandlerBuilder<S, B, A> {
    store: Option<S>,
    storage: Option<B>,
    abe: Option<A>,
}

impl<S, B, A> HandlerBuilder<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    pub fn new() -> Self {
        HandlerBuilder {
            store: None,
            storage: None,
            abe: None,
        }
    }

    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    pub fn storage(mut self, storage: B) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn abe(mut self, abe: A) -> Self {
        self.abe = Some(abe);
        self
    }

    pub fn build(self) -> Handler<S, B, A> {
        Handler {
            store: self.store.expect("store is required"),
            storage: self.storage.expect("storage is required"),
            abe: self.abe.expect("abe scheme is required"),
        }
    }
}
