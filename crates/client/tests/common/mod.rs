//! Scripted fakes for the Progress Channel's injected capabilities.
//!
//! [`FakePush`] hands out in-memory streams fed through an mpsc sender,
//! [`FakeStatus`] answers status queries from a script. Both count
//! calls so tests can assert that no network activity happens once a
//! session is idle or detached.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use shorts_client::channel::MonitorSnapshot;
use shorts_client::config::ChannelTiming;
use shorts_client::monitor::ProgressMonitor;
use shorts_client::transport::{PushStream, PushTransport, StatusSource, TransportError};
use shorts_core::status::ExecutionStatus;
use shorts_core::types::ExecutionId;
use tokio::sync::mpsc;

/// Sending half of a fake push stream. Dropping it closes the stream.
pub type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;

// ---------------------------------------------------------------------------
// FakePush
// ---------------------------------------------------------------------------

/// Push transport whose connection attempts follow a script.
///
/// Each `open` consumes the next scripted outcome; once the script is
/// exhausted every attempt is refused.
#[derive(Default)]
pub struct FakePush {
    outcomes: Mutex<VecDeque<Result<PushStream, TransportError>>>,
    opens: AtomicUsize,
}

impl FakePush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script a successful connection; returns the sender feeding it.
    pub fn accept(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(frames_from(rx)));
        tx
    }

    /// Script a refused connection.
    pub fn refuse(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Connect("connection refused".into())));
    }

    /// Number of connection attempts so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn open(&self, _execution_id: ExecutionId) -> Result<PushStream, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcomes.lock().unwrap().pop_front();
        outcome.unwrap_or_else(|| Err(TransportError::Connect("connection refused".into())))
    }
}

/// Stream fed by `rx`; dropping it drops the receiver, which closes
/// the matching [`FrameSender`].
fn frames_from(rx: mpsc::UnboundedReceiver<Result<String, TransportError>>) -> PushStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (frame, rx)) }).boxed()
}

// ---------------------------------------------------------------------------
// FakeStatus
// ---------------------------------------------------------------------------

/// Status source answering from a script.
///
/// Scripted answers are consumed in order; once exhausted, the last
/// successful answer is repeated (or an error if there never was one).
#[derive(Default)]
pub struct FakeStatus {
    script: Mutex<VecDeque<Result<ExecutionStatus, TransportError>>>,
    last: Mutex<Option<ExecutionStatus>>,
    calls: AtomicUsize,
}

impl FakeStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: ExecutionStatus) {
        self.script.lock().unwrap().push_back(Ok(status));
    }

    pub fn fail(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Status("503 Service Unavailable".into())));
    }

    /// Number of status queries so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for FakeStatus {
    async fn fetch_status(
        &self,
        _execution_id: ExecutionId,
    ) -> Result<ExecutionStatus, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => {
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TransportError::Status("no scripted answer".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn monitor(push: &Arc<FakePush>, status: &Arc<FakeStatus>) -> ProgressMonitor {
    monitor_with(push, status, ChannelTiming::default())
}

pub fn monitor_with(
    push: &Arc<FakePush>,
    status: &Arc<FakeStatus>,
    timing: ChannelTiming,
) -> ProgressMonitor {
    ProgressMonitor::new(push.clone(), status.clone(), timing)
}

/// JSON text frame as the backend sends it.
pub fn frame(agent: &str, step: &str, percent: f64, log: &str) -> String {
    serde_json::json!({
        "agent": agent,
        "step": step,
        "percent": percent,
        "log": log,
    })
    .to_string()
}

/// Wait (on the test clock) until a published snapshot satisfies `pred`.
pub async fn wait_for<F>(monitor: &ProgressMonitor, pred: F) -> MonitorSnapshot
where
    F: FnMut(&MonitorSnapshot) -> bool,
{
    let mut rx = monitor.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("monitor dropped while waiting");
    snapshot.clone()
}

/// Wait (on the test clock) until the session settles in Idle.
pub async fn settle(monitor: &ProgressMonitor) -> MonitorSnapshot {
    tokio::time::timeout(Duration::from_secs(120), monitor.wait_until_settled())
        .await
        .expect("timed out waiting for the session to settle");
    monitor.snapshot()
}
