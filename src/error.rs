// src/error.rs
use thiserror::Error;

/// Why a frame's text could not be turned into a [`crate::frame::Frame`].
///
/// Never fatal: callers log it and continue with an all-absent frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame text is empty")]
    Empty,
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame JSON is not an object")]
    NotAnObject,
}

/// Scheduler operations that were ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no capture loaded")]
    NoData,
    #[error("operation not allowed while playing")]
    Playing,
}
