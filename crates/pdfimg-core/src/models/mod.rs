//! Data models for image records and configuration.

pub mod config;
pub mod image;
