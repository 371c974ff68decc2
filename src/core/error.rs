//! Error types for mediagraph
//!
//! Graph and stream operations report failures as `bool`/`Option` returns so
//! a running pipeline never aborts. `MediaGraphError` exists for the places
//! where a reason is worth carrying: worker bodies, property parsing, and
//! thread spawning.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaGraphError {
    #[error("stream closed")]
    StreamClosed,

    #[error("pin is not connected")]
    NotConnected,

    #[error("invalid property value: {0}")]
    Property(String),

    #[error("worker thread error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type that uses MediaGraphError
pub type Result<T> = std::result::Result<T, MediaGraphError>;
