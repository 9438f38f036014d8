//! Process manager interface consumed by the gateway, with an in-memory
//! implementation.
//!
//! Spawning, restart policy and supervision live outside the gateway; an
//! embedder registers each process with its stream capabilities and input
//! sinks, feeds output through [`ProcessManager::publish_output`], and
//! reports termination with [`ProcessManager::mark_exited`]. The gateway
//! only consumes the lookup/signal/event interface.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use streamgate_core::{GatewayError, Result, SignalSpec};

use crate::events::{EventBus, StreamEvent, Topic};
use crate::registry::StreamCaps;

pub use crate::events::Pid;

/// Static process metadata returned by `GET /processes/{pid}`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub cmd: String,
    pub args: Vec<String>,
    pub active: bool,
}

/// Resource/runtime snapshot returned by `GET /processes/{pid}/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessStats {
    /// CPU usage percent.
    pub cpu: f64,
    /// Memory usage percent.
    pub mem: f64,
    /// Resident set size in bytes.
    pub rss: u64,
    /// Cumulative CPU time in milliseconds.
    pub ctime: u64,
}

/// Registration-time description of a process.
#[derive(Debug, Default)]
pub struct ProcessSpec {
    pub name: String,
    pub cmd: String,
    pub args: Vec<String>,
    pub caps: StreamCaps,
    /// Sink for the default input redirect, when stdin is redirected.
    pub stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Per-stream sinks for custom streams that accept writes.
    pub custom_input: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    /// Where resolved signal numbers are delivered.
    pub signal_tx: Option<mpsc::UnboundedSender<i32>>,
}

struct ProcessInner {
    info: ProcessInfo,
    caps: StreamCaps,
    stats: RwLock<ProcessStats>,
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    custom_input: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    signal_tx: Option<mpsc::UnboundedSender<i32>>,
}

/// Non-owning handle to a registered process, valid while it is running.
#[derive(Clone)]
pub struct ProcessRef {
    inner: Arc<ProcessInner>,
}

impl ProcessRef {
    pub fn pid(&self) -> Pid {
        self.inner.info.pid
    }

    pub fn caps(&self) -> &StreamCaps {
        &self.inner.caps
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.inner.info
    }

    pub async fn stats(&self) -> ProcessStats {
        self.inner.stats.read().await.clone()
    }

    /// Replace the stats snapshot; called by whatever samples the process.
    pub async fn set_stats(&self, stats: ProcessStats) {
        *self.inner.stats.write().await = stats;
    }

    /// Write to the default input redirect.
    pub fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let tx = self.inner.stdin.as_ref().ok_or(GatewayError::Permission)?;
        tx.send(bytes)
            .map_err(|_| GatewayError::Io("input stream closed".to_string()))
    }

    /// Write to a custom stream's input sink. The stream's existence was
    /// vetted at resolution time, so a missing or closed sink is an I/O
    /// failure, not a lookup failure.
    pub fn write_stream(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let tx = self
            .inner
            .custom_input
            .get(name)
            .ok_or_else(|| GatewayError::Io(format!("stream {name:?} has no input sink")))?;
        tx.send(bytes)
            .map_err(|_| GatewayError::Io(format!("stream {name:?} closed")))
    }

    /// Resolve and deliver a signal.
    pub fn kill(&self, signal: &SignalSpec) -> Result<()> {
        let signum = signal.resolve()?;
        match &self.inner.signal_tx {
            Some(tx) => {
                if tx.send(signum).is_err() {
                    warn!(pid = self.pid(), signum, "signal sink closed, dropping signal");
                }
            }
            None => debug!(pid = self.pid(), signum, "no signal sink registered"),
        }
        Ok(())
    }
}

/// In-memory registry of running processes plus their event bus.
pub struct ProcessManager {
    bus: Arc<EventBus>,
    next_pid: AtomicU64,
    processes: RwLock<HashMap<Pid, ProcessRef>>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            next_pid: AtomicU64::new(1),
            processes: RwLock::new(HashMap::new()),
        }
    }

    /// The event bus carrying per-process exit and stream-data topics.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Register a process, assigning it the next pid.
    pub async fn register(&self, spec: ProcessSpec) -> ProcessRef {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let process = ProcessRef {
            inner: Arc::new(ProcessInner {
                info: ProcessInfo {
                    pid,
                    name: spec.name,
                    cmd: spec.cmd,
                    args: spec.args,
                    active: true,
                },
                caps: spec.caps,
                stats: RwLock::new(ProcessStats::default()),
                stdin: spec.stdin,
                custom_input: spec.custom_input,
                signal_tx: spec.signal_tx,
            }),
        };
        self.processes.write().await.insert(pid, process.clone());
        info!(pid, name = %process.info().name, "process registered");
        process
    }

    /// Look up a running process by pid.
    pub async fn get_process(&self, pid: Pid) -> Result<ProcessRef> {
        self.processes
            .read()
            .await
            .get(&pid)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    /// Currently running pids, sorted.
    pub async fn running(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.read().await.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Request asynchronous termination: deliver SIGTERM when a signal
    /// sink exists, then retire the process.
    pub async fn stop_process(&self, pid: Pid) -> Result<()> {
        let process = self.get_process(pid).await?;
        // best effort; the process may have no signal sink
        let _ = process.kill(&SignalSpec::Number(15));
        self.mark_exited(pid).await
    }

    /// Send a signal to a running process. Unknown signals fail with
    /// `BadValue`, distinct from an unknown pid's `NotFound`.
    pub async fn send_signal(&self, pid: Pid, signal: &SignalSpec) -> Result<()> {
        let process = self.get_process(pid).await?;
        process.kill(signal)
    }

    /// Publish a chunk of process output on its stream-data topic.
    pub async fn publish_output(&self, pid: Pid, stream: &str, data: Vec<u8>) -> Result<()> {
        // refuse to publish for retired pids so late producers can't
        // resurrect a topic
        let _ = self.get_process(pid).await?;
        self.bus
            .publish(
                &Topic::StreamData(pid, stream.to_string()),
                &StreamEvent::Data(data),
            )
            .await;
        Ok(())
    }

    /// Retire a pid and publish its exit notification exactly once.
    pub async fn mark_exited(&self, pid: Pid) -> Result<()> {
        let removed = self.processes.write().await.remove(&pid);
        match removed {
            Some(process) => {
                info!(pid, name = %process.info().name, "process exited");
                self.bus
                    .publish(&Topic::ProcessExit(pid), &StreamEvent::Exited)
                    .await;
                Ok(())
            }
            None => Err(GatewayError::NotFound),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn spec_with_stdin(stdin: mpsc::UnboundedSender<Vec<u8>>) -> ProcessSpec {
        ProcessSpec {
            name: "worker".to_string(),
            cmd: "sleep".to_string(),
            args: vec!["60".to_string()],
            caps: StreamCaps {
                output_streams: vec!["stdout".to_string()],
                has_input_stream: true,
                custom_streams: BTreeSet::new(),
            },
            stdin: Some(stdin),
            ..ProcessSpec::default()
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let manager = ProcessManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;

        assert_eq!(manager.running().await, vec![p.pid()]);
        let found = manager.get_process(p.pid()).await.unwrap();
        assert_eq!(found.info().name, "worker");
        assert!(found.info().active);
    }

    #[tokio::test]
    async fn unknown_pid_is_not_found() {
        let manager = ProcessManager::new();
        assert!(matches!(
            manager.get_process(99).await,
            Err(GatewayError::NotFound)
        ));
        assert!(matches!(
            manager.send_signal(99, &SignalSpec::Number(9)).await,
            Err(GatewayError::NotFound)
        ));
    }

    #[tokio::test]
    async fn write_reaches_stdin_sink() {
        let manager = ProcessManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;

        p.write(b"line\n".to_vec()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"line\n".to_vec());
    }

    #[tokio::test]
    async fn write_to_closed_sink_is_io_error() {
        let manager = ProcessManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;

        drop(rx);
        assert!(matches!(p.write(b"x".to_vec()), Err(GatewayError::Io(_))));
    }

    #[tokio::test]
    async fn stop_publishes_exit_once_and_delivers_sigterm() {
        let manager = ProcessManager::new();
        let (stdin_tx, _stdin_rx) = mpsc::unbounded_channel();
        let (sig_tx, mut sig_rx) = mpsc::unbounded_channel();
        let mut spec = spec_with_stdin(stdin_tx);
        spec.signal_tx = Some(sig_tx);
        let p = manager.register(spec).await;
        let pid = p.pid();

        let bus = manager.bus();
        let mut exit_rx = bus
            .subscribe(Topic::ProcessExit(pid), bus.subscriber_id())
            .await;

        manager.stop_process(pid).await.unwrap();
        assert_eq!(sig_rx.recv().await.unwrap(), 15);
        assert_eq!(exit_rx.recv().await.unwrap(), StreamEvent::Exited);

        // second stop: the pid is gone, no second exit event
        assert!(matches!(
            manager.stop_process(pid).await,
            Err(GatewayError::NotFound)
        ));
        assert!(exit_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_signal_is_bad_value_not_not_found() {
        let manager = ProcessManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;

        let err = manager
            .send_signal(p.pid(), &SignalSpec::Name("SIGBOGUS".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadValue(_)));
    }

    #[tokio::test]
    async fn publish_output_fans_out_to_subscribers() {
        let manager = ProcessManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;
        let pid = p.pid();

        let bus = manager.bus();
        let mut data_rx = bus
            .subscribe(
                Topic::StreamData(pid, "stdout".to_string()),
                bus.subscriber_id(),
            )
            .await;

        manager
            .publish_output(pid, "stdout", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(
            data_rx.recv().await.unwrap(),
            StreamEvent::Data(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn publish_output_for_retired_pid_fails() {
        let manager = ProcessManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;
        let pid = p.pid();

        manager.mark_exited(pid).await.unwrap();
        assert!(matches!(
            manager.publish_output(pid, "stdout", b"late".to_vec()).await,
            Err(GatewayError::NotFound)
        ));
    }

    #[tokio::test]
    async fn custom_stream_write_without_sink_is_io_error() {
        let manager = ProcessManager::new();
        // "logs" is a declared custom stream, but no input sink was
        // registered for it
        let spec = ProcessSpec {
            name: "app".to_string(),
            cmd: "app".to_string(),
            caps: StreamCaps {
                output_streams: Vec::new(),
                has_input_stream: false,
                custom_streams: BTreeSet::from(["logs".to_string()]),
            },
            ..ProcessSpec::default()
        };
        let p = manager.register(spec).await;

        assert!(matches!(
            p.write_stream("logs", b"x".to_vec()),
            Err(GatewayError::Io(_))
        ));
    }

    #[tokio::test]
    async fn stats_snapshot_round_trip() {
        let manager = ProcessManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = manager.register(spec_with_stdin(tx)).await;

        assert_eq!(p.stats().await, ProcessStats::default());
        let stats = ProcessStats {
            cpu: 1.5,
            mem: 0.2,
            rss: 4096,
            ctime: 120,
        };
        p.set_stats(stats.clone()).await;
        assert_eq!(p.stats().await, stats);
    }
}
