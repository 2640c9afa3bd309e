//! Error types for the arbitration core.

use thiserror::Error;

/// Failures surfaced by the selector's fallible operations.
///
/// Mutators reject atomically: on error the stored policy and current
/// mode are unchanged. Queries return defined values instead of errors,
/// except where a feature was disabled at construction.
#[derive(Error, Debug)]
pub enum ArbiterError {
    /// A referenced mode id is absent from the catalog.
    #[error("mode not found: {0}")]
    NotFound(String),

    /// A proposed policy violates the catalog/range invariants.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The operation is disabled in this configuration.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
