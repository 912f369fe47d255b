//! Error types shared across the core.

use thiserror::Error;

/// Errors from the semantic distance and loss computation path.
#[derive(Debug, Error)]
pub enum GaloisError {
    /// The generator capability failed to restructure content.
    #[error("restructure failed: {reason}")]
    RestructureFailed { reason: String },

    /// The generator capability failed to reconstitute content.
    #[error("reconstitute failed: {reason}")]
    ReconstituteFailed { reason: String },

    /// Distance computation failed for every metric in the fallback chain.
    #[error("distance computation exhausted all fallbacks: {reason}")]
    DistanceExhausted { reason: String },

    /// No generator capability was configured where one was required.
    #[error("no generator configured")]
    NoGenerator,
}

/// Result type for the galois loss/distance subsystem.
pub type GaloisResult<T> = std::result::Result<T, GaloisError>;

/// Errors from the soul engine's dialogue and intercept paths.
#[derive(Debug, Error)]
pub enum SoulError {
    /// The generator capability returned an error.
    #[error("generator failure: {0}")]
    Generator(#[from] GaloisError),

    /// An unknown mode name was requested.
    #[error("unknown mode: {0}")]
    UnknownMode(String),

    /// The underlying audit log failed to append an entry.
    #[error("audit append failed: {0}")]
    Audit(#[from] AuditError),
}

/// Result type for soul engine operations.
pub type SoulResult<T> = std::result::Result<T, SoulError>;

/// Errors from the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Durable storage write failed. Callers should treat this as non-fatal;
    /// the in-memory cache is still updated.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// Durable storage read (hydration) failed.
    #[error("storage read failed: {0}")]
    StorageRead(String),
}

/// Result type for audit log operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors from the flux runtime.
#[derive(Debug, Error)]
pub enum FluxError {
    /// A perturbation was not serviced before its configured timeout.
    #[error("perturbation timed out after {0:?}")]
    PerturbationTimeout(std::time::Duration),

    /// The runtime's entropy budget has been exhausted.
    #[error("entropy budget exhausted")]
    EntropyExhausted,

    /// An operation was attempted from an invalid lifecycle state.
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type for flux runtime operations.
pub type FluxResult<T> = std::result::Result<T, FluxError>;

/// Errors from the constitution/contradiction subsystem.
#[derive(Debug, Error)]
pub enum ConstitutionError {
    /// Candidate axiom's loss did not clear the fixed-point threshold.
    #[error("axiom rejected: loss {loss} >= threshold {threshold}")]
    LossTooHigh { loss: f64, threshold: f64 },

    /// An axiom with equivalent content is already active.
    #[error("duplicate axiom content")]
    Duplicate,

    /// The referenced axiom id does not exist.
    #[error("axiom not found: {0}")]
    NotFound(String),

    /// Underlying loss computation failed.
    #[error("loss computation failed: {0}")]
    Galois(#[from] GaloisError),
}

/// Result type for constitution operations.
pub type ConstitutionResult<T> = std::result::Result<T, ConstitutionError>;

/// Aggregated error type for hosts that need a single boundary type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Galois(#[from] GaloisError),
    #[error(transparent)]
    Soul(#[from] SoulError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Flux(#[from] FluxError),
    #[error(transparent)]
    Constitution(#[from] ConstitutionError),
}

/// Result type using the aggregated [`CoreError`].
pub type CoreResult<T> = std::result::Result<T, CoreError>;
