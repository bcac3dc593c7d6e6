//! Skywatch - a headless track reconciliation and chat choreography engine.
//!
//! This library provides the core functionality for the `skw` CLI tool:
//! reconciling a stream of tracked-object updates into live map entities
//! (with smoothed trails, classification badges and auto-expiry), and
//! threading the same event stream into the chat surfaces that react to
//! classification events.

pub mod api;
pub mod channel;
pub mod chat;
pub mod clock;
pub mod commands;
pub mod config;
pub mod engine;
pub mod geo;
pub mod map;
pub mod models;
pub mod storage;
pub mod track;

pub mod cli;

/// Library-level error type for skywatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for skywatch operations.
pub type Result<T> = std::result::Result<T, Error>;
