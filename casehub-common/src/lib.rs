//! # CaseHub Common Library
//!
//! Shared code for the CaseHub backend including:
//! - Database bootstrap and row models
//! - Configuration loading
//! - Error types
//! - Password hashing and access-token signing

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use config::Config;
pub use error::{Error, Result};
