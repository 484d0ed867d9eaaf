use uuid::Uuid;

use common::abe::AbeScheme;
use common::handler::Handler;
use common::storage::StorageProvider;
use common::store::StoreProvider;

/// One request's worth of work: a fresh store session wrapped in a
/// handler, plus a span correlating everything logged under it.
#[derive(Debug)]
pub struct Session<S, B, A> {
    id: Uuid,
    handler: Handler<S, B, A>,
    span: tracing::Span,
}

impl<S, B, A> Session<S, B, A>
where
    S: StoreProvider,
    B: StorageProvider,
    A: AbeScheme,
{
    pub(crate) fn new(store: S, storage: B, abe: A) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %id);
        Session {
            id,
            handler: Handler::builder()
                .store(store)
                .storage(storage)
                .abe(abe)
                .build(),
            span,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handler(&self) -> &Handler<S, B, A> {
        &self.handler
    }

    /// Enter this before driving the handler so the engines' logs
    /// carry the session id.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
