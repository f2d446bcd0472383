//! Query layer for the API

pub mod sessions;
