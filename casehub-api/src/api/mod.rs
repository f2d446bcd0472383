//! HTTP handlers, grouped by API area

pub mod assessments;
pub mod auth;
pub mod catalog;
pub mod faculty;
pub mod health;
pub mod middleware;
pub mod observations;
pub mod progress;
pub mod reviews;
pub mod sessions;
pub mod subscription;
