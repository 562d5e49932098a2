//! Polymarket Gamma API client library.
//!
//! Read-only access to Polymarket event and market discovery data.

pub mod gamma;

pub use gamma::GammaClient;
