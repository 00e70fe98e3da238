//! The error type of the orchestration layer.

use crate::data::BoxError;
use thiserror::Error;

/// Main error type for wims-gradesync.
///
/// Remote failures inside the synchronisation workflow are not errors at
/// this level; they are counted and reported per item. Only protocol errors
/// surfaced to a caller and local collaborator failures end up here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Wims(#[from] wims_client::WimsError),
    #[error("The course module has no remote class bound to it yet")]
    ClassNotProvisioned,
    #[error("Failed to enumerate local users")]
    UserDirectory(#[source] BoxError),
    #[error("Failed to enumerate course modules")]
    ModuleStore(#[source] BoxError),
    #[error("Failed to persist the remote class id for module {0}")]
    PersistClassId(u64, #[source] BoxError),
}
