//! Provider-specific schemas and snapshot sources.
//!
//! Both providers share the generic cache and service; they differ only in
//! record types, key accessors and field weights.

pub mod kalshi;
pub mod polymarket;
