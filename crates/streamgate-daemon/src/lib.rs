//! Streamgate Daemon
//!
//! Bidirectional process-I/O streaming gateway: exposes a managed
//! process's redirected stdio and custom streams over a message-framed
//! WebSocket channel, and serves the REST control surface used to
//! inspect and signal processes.

pub mod channel;
pub mod events;
pub mod manager;
pub mod registry;
pub mod server;

pub use events::{EventBus, StreamEvent, SubscriberId, Topic};
pub use manager::{Pid, ProcessManager, ProcessRef, ProcessSpec};
pub use registry::{StreamCaps, StreamMode, StreamTarget};
