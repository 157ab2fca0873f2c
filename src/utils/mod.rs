//! Utility modules
//!
//! - `analysis/` - graph construction and the algorithms run over it
//! - `cache` - per-session graph cache

pub mod analysis;
pub mod cache;
