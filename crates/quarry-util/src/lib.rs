//! Shared utilities for Quarry.
//!
//! Cross-cutting concerns used by the other Quarry crates: the error
//! taxonomy, hashing for environment fingerprints, and filesystem helpers
//! for the lock store.

pub mod errors;
pub mod fs;
pub mod hash;
