//! Structured logging init. Never installs a global subscriber implicitly —
//! hosts call [`init_tracing`] explicitly from their own entry point.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize a `tracing_subscriber::fmt` subscriber with the given
/// default filter directive (overridable via `RUST_LOG`). Returns an
/// error rather than panicking if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// Same as [`init_tracing`] but emits newline-delimited JSON, for hosts
/// shipping logs to a collector.
pub fn init_tracing_json(default_filter: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt().with_env_filter(filter).json().finish();
    tracing::subscriber::set_global_default(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_on_double_init() {
        let _ = init_tracing("info");
        assert!(init_tracing("info").is_err());
    }
}
