//! Error types shared by the gateway and the control surface.

use thiserror::Error;

use crate::frame::FrameError;

/// Result type alias using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error taxonomy for gateway operations.
///
/// Resolution-time errors (`NotFound`, `Permission`, `BadValue`) abort
/// channel establishment before any subscription exists. Post-attachment
/// write failures (`Io`) are reported per-frame and keep the channel open.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown process, stream, or pid.
    #[error("not found")]
    NotFound,

    /// The stream exists but the requested mode is unsupported.
    #[error("operation not permitted")]
    Permission,

    /// Malformed identifier or signal token.
    #[error("bad value: {0}")]
    BadValue(String),

    /// A write to a live target failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// Malformed wire frame.
    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),
}

impl GatewayError {
    /// Stable error code used in JSON bodies and error frames.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Permission => "eperm",
            Self::BadValue(_) => "bad_value",
            Self::Io(_) => "eio",
            Self::Frame(_) => "bad_frame",
        }
    }

    /// HTTP status class paired with this error.
    pub const fn errno(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Permission => 403,
            Self::BadValue(_) | Self::Frame(_) => 400,
            Self::Io(_) => 500,
        }
    }

    /// Structured JSON error body: `{"error": <code>, "errno": <status>}`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.code(), "errno": self.errno() })
    }
}
