//! Streamgate Core Library
//!
//! Shared functionality for streamgate components:
//! - Frame codec for the duplex channel wire protocol
//! - Error taxonomy shared by the gateway and the control surface
//! - POSIX signal name/number table
//! - Tracing initialization

pub mod error;
pub mod frame;
pub mod signal;
pub mod tracing_init;

pub use error::{GatewayError, Result};
pub use frame::{Frame, FrameError, FrameKind};
pub use signal::SignalSpec;
