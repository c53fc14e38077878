// Path: crates/api/src/state/mod.rs
//! The contract of the persistence/state-application layer.

use async_trait::async_trait;
use meridian_types::app::Delta;
use meridian_types::error::ApplyError;

/// Applies confirmed deltas to local state.
///
/// Implementations must be idempotent per digest: applying a delta that has
/// already been applied is a successful no-op. The reconciler relies on this
/// to replay safely after a restart.
#[async_trait]
pub trait DeltaApplier: Send + Sync {
    /// Applies `delta` on top of the current state.
    async fn apply(&self, delta: &Delta) -> Result<(), ApplyError>;
}

#[async_trait]
impl<T: DeltaApplier + ?Sized> DeltaApplier for std::sync::Arc<T> {
    async fn apply(&self, delta: &Delta) -> Result<(), ApplyError> {
        (**self).apply(delta).await
    }
}
