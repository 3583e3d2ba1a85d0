//! Core infrastructure for the USSE translator
//!
//! This crate provides the error handling, configuration, and logging
//! infrastructure shared by the translator crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Result, ShaderError, TranslatorError};
