//! # ek-core
//!
//! Shared error taxonomy and the log-density model trait used by the
//! enzyme-kinetics inference stack.
//!
//! Inference code in `ek-inference` depends only on [`traits::LogDensityModel`],
//! never on a concrete model type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;

pub use error::{Error, Result};
pub use traits::LogDensityModel;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
