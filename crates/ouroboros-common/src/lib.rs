//! Common utilities for ouroboros
//!
//! This crate provides the error type shared by the ouroboros query translation crates.

pub mod error;

pub use error::{Result, TranslationError};
