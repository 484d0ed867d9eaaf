use super::AttributeVersion;

/// Port onto the KP-ABE primitive.
///
/// The engines only ever need the single-step secret-key update:
/// given a component valid at `current_version` and the chain entry
/// departing from that version, produce the component valid one
/// version later. Walking a whole chain is the revocation engine's
/// job, one call per entry.
pub trait AbeScheme: Send + Sync + std::fmt::Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Advance a held secret-key component by one chain entry.
    ///
    /// `step.version` is expected to equal `current_version`; callers
    /// validate this before invoking.
    fn advance_secret_key_component(
        &self,
        current_version: u64,
        component: &[u8],
        step: &AttributeVersion,
    ) -> Result<Vec<u8>, Self::Error>;
}
