use thiserror::Error;

/// Named failures of the reconciliation engine.
///
/// Data-quality variants (`MalformedEdition`, `AmbiguousPrecedence`,
/// `MalformedWireField`) leave the stored record untouched. The two
/// cancellation variants differ in whether anything was written.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("certification edition '{edition}' of {identity} is not a year")]
    MalformedEdition { identity: String, edition: String },

    #[error(
        "certification edition and date are equal; unknown precedence for updates; not performing update: {existing} to {incoming}"
    )]
    AmbiguousPrecedence { existing: String, incoming: String },

    #[error("malformed {field} in registry record: {detail}")]
    MalformedWireField { field: &'static str, detail: String },

    #[error("{entity} batch cancelled before any record was processed")]
    CancelledBeforeStart { entity: &'static str },

    #[error("persisted {processed} out of {total} {entity} records before cancellation")]
    Cancelled {
        entity: &'static str,
        processed: usize,
        total: usize,
    },
}

impl ReconcileError {
    /// Conflicts are data-quality signals for an operator, not faults.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReconcileError::AmbiguousPrecedence { .. } | ReconcileError::MalformedEdition { .. }
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ReconcileError::CancelledBeforeStart { .. } | ReconcileError::Cancelled { .. }
        )
    }
}

/// Finds a `ReconcileError` anywhere in an `anyhow` context chain.
pub fn find_reconcile_error(err: &anyhow::Error) -> Option<&ReconcileError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ReconcileError>())
}
