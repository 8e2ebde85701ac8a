//! Observer handle over the Progress Channel.
//!
//! [`ProgressMonitor`] is what the rest of the application holds. It
//! exposes the current [`ExecutionView`], a watch channel of
//! [`MonitorSnapshot`]s, and the session lifecycle controls:
//! [`observe`](ProgressMonitor::observe) (the "should observe" gate) and
//! [`detach`](ProgressMonitor::detach). At most one session is alive per
//! monitor; no session outlives the monitor.

use std::sync::Arc;

use shorts_core::tracker::{ExecutionTracker, ExecutionView};
use shorts_core::types::{is_valid_execution_id, ExecutionId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::{ApiError, ShortsApi};
use crate::channel::{ChannelState, MonitorSnapshot, Publisher, Session, StreamSlot};
use crate::client::ProgressSocketClient;
use crate::config::{ChannelTiming, MonitorConfig};
use crate::transport::{PushTransport, StatusSource};

/// Bookkeeping for the session currently running.
struct ActiveSession {
    execution_id: ExecutionId,
    stream: StreamSlot,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one execution's view current while it is observed.
///
/// Must be used from within a tokio runtime: starting a session spawns
/// its task.
pub struct ProgressMonitor {
    push: Arc<dyn PushTransport>,
    status: Arc<dyn StatusSource>,
    timing: ChannelTiming,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
    session: Option<ActiveSession>,
}

impl ProgressMonitor {
    /// Create a monitor over injected capabilities. Starts Idle.
    pub fn new(
        push: Arc<dyn PushTransport>,
        status: Arc<dyn StatusSource>,
        timing: ChannelTiming,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot::default());
        Self {
            push,
            status,
            timing,
            snapshot_tx: Arc::new(snapshot_tx),
            session: None,
        }
    }

    /// Create a monitor talking to the backend described by `config`.
    pub fn connect(config: &MonitorConfig) -> Result<Self, ApiError> {
        let api = ShortsApi::with_timeout(config.api_url.clone(), config.request_timeout)?;
        let socket = ProgressSocketClient::new(config.ws_url.clone(), config.request_timeout);
        Ok(Self::new(Arc::new(socket), Arc::new(api), config.timing))
    }

    /// Point the monitor at an execution, or stop observing.
    ///
    /// Observation runs only when `enabled` is set and `execution_id`
    /// names a run. Asking for the execution already observed is a
    /// no-op, even if its session has settled; anything else detaches
    /// the current session first and starts a fresh one with an empty
    /// view.
    pub fn observe(&mut self, execution_id: Option<ExecutionId>, enabled: bool) {
        let target = execution_id.filter(|id| enabled && is_valid_execution_id(*id));

        if target == self.observed() {
            return;
        }

        self.detach();
        if let Some(id) = target {
            self.start(id);
        }
    }

    /// Stop observing.
    ///
    /// Closes the push connection before returning. From then on nothing
    /// from the old session (a late frame, a pending timer, an in-flight
    /// status answer) can change the published snapshot. The last view
    /// is kept with `connected` off.
    pub fn detach(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.state = ChannelState::Idle;
            snapshot.view.connected = false;
        });
        session.stream.release();
        session.cancel.cancel();
        session.task.abort();

        tracing::info!(execution_id = session.execution_id, "Stopped observing execution");
    }

    /// Execution currently observed, if any.
    pub fn observed(&self) -> Option<ExecutionId> {
        self.session.as_ref().map(|s| s.execution_id)
    }

    /// Copy of the current view.
    pub fn view(&self) -> ExecutionView {
        self.snapshot_tx.borrow().view.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot_tx.borrow().state
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receive every published snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Wait until the channel has no network activity left and return
    /// the view at that point.
    pub async fn wait_until_settled(&self) -> ExecutionView {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| snapshot.state == ChannelState::Idle)
            .await
            .map(|snapshot| snapshot.view.clone());
        settled.unwrap_or_else(|_| self.view())
    }

    // ---- private helpers ----

    fn start(&mut self, execution_id: ExecutionId) {
        let tracker = ExecutionTracker::new(execution_id);
        let mut generation = 0;
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.generation += 1;
            generation = snapshot.generation;
            snapshot.state = ChannelState::Connecting;
            snapshot.view = tracker.view().clone();
        });

        let stream = StreamSlot::default();
        let cancel = CancellationToken::new();
        let session = Session::new(
            execution_id,
            Arc::clone(&self.push),
            Arc::clone(&self.status),
            self.timing,
            Publisher::new(generation, Arc::clone(&self.snapshot_tx)),
            stream.clone(),
            cancel.clone(),
        );

        let span = tracing::info_span!("progress_session", execution_id, generation);
        let task = tokio::spawn(session.run().instrument(span));

        tracing::info!(execution_id, generation, "Observing execution");

        self.session = Some(ActiveSession {
            execution_id,
            stream,
            cancel,
            task,
        });
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.detach();
    }
}
