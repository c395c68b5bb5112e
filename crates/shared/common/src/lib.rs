//! Common utilities shared across the workspace.
//!
//! This crate provides:
//! - The stable error taxonomy and the error type carrying it
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, ErrorCode};
