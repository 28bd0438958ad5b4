//! Error types for enzyme-kinetics inference.

use thiserror::Error;

/// Error type shared by all `ek-*` crates.
///
/// Divergent transitions and cross-chain non-convergence are not variants here:
/// they are sampling diagnostics reported alongside valid draws, not failures.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input payload dimensions or ordering do not match the declared counts.
    #[error("Invalid data shape: {0}")]
    InvalidDataShape(String),

    /// A constrained parameter was given a value outside its domain.
    #[error("Constraint violation: {parameter} = {value} is outside its domain")]
    ConstraintViolation {
        /// Parameter name (e.g. `K_M`, `sigma_a[3]`).
        parameter: String,
        /// Offending value.
        value: f64,
    },

    /// Log-density (or its gradient) is not finite at a chain's initial point.
    #[error("Non-finite log-density at initial point of chain {chain}: {value}")]
    NonFiniteDensity {
        /// Chain index (0-based).
        chain: usize,
        /// The offending log-density value.
        value: f64,
    },

    /// Invalid configuration or argument.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_failing_parameter() {
        let e = Error::ConstraintViolation { parameter: "K_M".into(), value: -1.0 };
        let msg = e.to_string();
        assert!(msg.contains("K_M"), "{msg}");
        assert!(msg.contains("-1"), "{msg}");
    }

    #[test]
    fn test_non_finite_density_mentions_chain() {
        let e = Error::NonFiniteDensity { chain: 3, value: f64::NAN };
        assert!(e.to_string().contains("chain 3"));
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
        let e: Error = err.into();
        assert!(matches!(e, Error::Json(_)));
    }
}
