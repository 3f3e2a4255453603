use async_trait::async_trait;

use hadron_common::types::AtomUpdate;

use crate::error::AccountError;

/// A named, stateful fold over an account's atom-update stream.
///
/// Systems are registered on an [`crate::Account`] in deterministic insertion
/// order and invoked sequentially per update; `process_atom_update` must have
/// finished updating the system's state before it returns. Anything a system
/// exposes beyond this (snapshots, event streams) is consumer-side only and
/// never feeds back into the pipeline.
#[async_trait]
pub trait AccountSystem: Send + Sync {
    fn name(&self) -> &str;

    async fn process_atom_update(&mut self, update: &AtomUpdate) -> Result<(), AccountError>;
}
