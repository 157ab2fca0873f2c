//! Core module for the dependency graph engine
//!
//! Holds the input types shared by the builder, the analyzers and the CLI.

mod types;

pub use types::*;
