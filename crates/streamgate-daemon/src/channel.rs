//! Duplex channel session: the stateful binding between one opened
//! connection and one resolved process stream target.
//!
//! A session runs as a single task owning all of its state, so no locks
//! guard session fields. It `select!`s over the inbound frame stream and
//! its event-bus subscriptions; replies therefore preserve inbound order
//! and outbound data frames preserve stream emission order. Transport
//! close, process exit and outbound failure all funnel into one teardown
//! path, and the bus's idempotent unsubscribe makes racing exits safe.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use streamgate_core::frame::SENTINEL_ID;
use streamgate_core::{Frame, FrameKind, GatewayError};

use crate::events::{StreamEvent, Topic};
use crate::manager::{Pid, ProcessManager, ProcessRef};
use crate::registry::{self, StreamMode, StreamTarget};

/// Captured write function for a `WRITABLE` session.
enum WriteHandle {
    /// Default input redirect; also used by named redirects.
    Default(ProcessRef),
    /// A custom stream's own input sink.
    Custom(ProcessRef, String),
}

impl WriteHandle {
    fn write(&self, bytes: Vec<u8>) -> streamgate_core::Result<()> {
        match self {
            Self::Default(process) => process.write(bytes),
            Self::Custom(process, name) => process.write_stream(name, bytes),
        }
    }
}

fn error_frame(id: Option<Vec<u8>>, err: &GatewayError) -> Frame {
    Frame::error(id, err.to_body().to_string())
}

/// Encode and push a frame; returns false when the transport is gone.
async fn send_frame(outbound: &mpsc::Sender<Vec<u8>>, frame: &Frame) -> bool {
    match frame.encode() {
        Ok(buf) => outbound.send(buf).await.is_ok(),
        Err(err) => {
            // only reachable with an oversized id, which decode can't produce
            warn!(error = %err, "dropping unencodable frame");
            true
        }
    }
}

/// Map one raw inbound message to its correlated reply.
fn handle_inbound(raw: &[u8], writer: Option<&WriteHandle>) -> Frame {
    let frame = match Frame::decode(raw) {
        Ok(frame) => frame,
        Err(err) => return error_frame(None, &GatewayError::Frame(err)),
    };

    match frame.kind {
        FrameKind::Data => match writer {
            None => error_frame(Some(frame.id), &GatewayError::Permission),
            Some(writer) => match writer.write(frame.body) {
                Ok(()) => Frame::ok(frame.id),
                Err(err) => error_frame(Some(frame.id), &err),
            },
        },
        // only data frames carry a write request
        FrameKind::Error | FrameKind::Ok => error_frame(
            Some(frame.id),
            &GatewayError::BadValue("expected data frame".to_string()),
        ),
    }
}

async fn next_data(
    rx: &mut Option<mpsc::UnboundedReceiver<StreamEvent>>,
) -> Option<StreamEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run one channel session to completion.
///
/// `inbound` carries raw frames from the transport; encoded reply and
/// push frames go to `outbound`. Dropping `outbound` on return is the
/// signal for the transport adapter to close the connection.
///
/// Resolution failures emit a single sentinel-id error frame and return
/// without ever touching the event bus.
pub async fn run(
    manager: Arc<ProcessManager>,
    pid: Pid,
    stream: Option<String>,
    mode: StreamMode,
    mut inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
) {
    let session = Uuid::new_v4();

    // Opening: resolve the target before any subscription exists.
    let process = match manager.get_process(pid).await {
        Ok(process) => process,
        Err(err) => {
            debug!(%session, pid, code = err.code(), "channel open failed");
            let _ = send_frame(&outbound, &error_frame(None, &err)).await;
            return;
        }
    };
    let target = match registry::resolve(process.caps(), stream.as_deref(), mode) {
        Ok(target) => target,
        Err(err) => {
            debug!(%session, pid, stream = ?stream, code = err.code(), "stream resolution failed");
            let _ = send_frame(&outbound, &error_frame(None, &err)).await;
            return;
        }
    };

    // Attached: exit topic unconditionally, data topic iff readable,
    // write handle iff writable (resolution already vetted the mode).
    let bus = manager.bus();
    let subscriber = bus.subscriber_id();
    let exit_topic = Topic::ProcessExit(pid);
    let mut exit_rx = bus.subscribe(exit_topic.clone(), subscriber).await;

    let data_topic = if mode.readable() {
        target
            .read_stream(process.caps())
            .map(|name| Topic::StreamData(pid, name.to_string()))
    } else {
        None
    };
    let mut data_rx = match &data_topic {
        Some(topic) => Some(bus.subscribe(topic.clone(), subscriber).await),
        None => None,
    };

    let writer = if mode.writable() {
        Some(match &target {
            StreamTarget::CustomStream(name) => {
                WriteHandle::Custom(process.clone(), name.clone())
            }
            StreamTarget::DefaultRedirect | StreamTarget::NamedRedirect(_) => {
                WriteHandle::Default(process.clone())
            }
        })
    } else {
        None
    };

    info!(%session, pid, ?target, mode = mode.mask(), "channel attached");

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(raw) => {
                    let reply = handle_inbound(&raw, writer.as_ref());
                    if !send_frame(&outbound, &reply).await {
                        break;
                    }
                }
                None => {
                    debug!(%session, pid, "transport closed");
                    break;
                }
            },
            event = next_data(&mut data_rx) => match event {
                Some(StreamEvent::Data(chunk)) => {
                    let push = Frame::data(SENTINEL_ID.to_vec(), chunk);
                    if !send_frame(&outbound, &push).await {
                        break;
                    }
                }
                Some(StreamEvent::Exited) | None => break,
            },
            _ = exit_rx.recv() => {
                info!(%session, pid, "process exited, closing channel");
                break;
            }
        }
    }

    // Closing: remove subscriptions exactly once; both cancellation
    // paths land here and unsubscribe is a no-op the second time.
    bus.unsubscribe(&exit_topic, subscriber).await;
    if let Some(topic) = &data_topic {
        bus.unsubscribe(topic, subscriber).await;
    }
    debug!(%session, pid, "channel closed");
}
