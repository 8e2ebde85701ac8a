//! Progress Channel state machine.
//!
//! One [`Session`] runs per observed execution, as a single tokio task
//! spawned by [`ProgressMonitor`](crate::monitor::ProgressMonitor). It
//! owns its [`ExecutionTracker`] and moves between four states:
//!
//! ```text
//! Connecting --status check: not live--> Idle
//!     |
//!     +--ok--> Streaming --closed/error--> Polling --terminal--> Idle
//!     |            |                          |
//!     +--failed--> Polling                    +--re-attempt--> Connecting
//!                  +--terminal (cross-check)--> Idle
//! ```
//!
//! A session first asks the status endpoint once: a run that already
//! finished is applied and settles without opening a push connection.
//!
//! The open push stream sits in a [`StreamSlot`] shared with the
//! monitor, so detaching can drop it on the spot. The poll timer is a
//! local of the Polling phase. Streaming and Polling never run at the
//! same time. Every publish goes through a [`Publisher`] whose
//! generation check is atomic with the write, which keeps a detached
//! session from touching the visible state.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;

use futures::StreamExt;
use serde::Serialize;
use shorts_core::tracker::{ExecutionTracker, ExecutionView};
use shorts_core::types::ExecutionId;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelTiming;
use crate::messages::parse_frame;
use crate::transport::{PushStream, PushTransport, StatusSource, TransportError};

/// Where a tracking session currently gets its updates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No network activity.
    #[default]
    Idle,
    /// Status checked, then push connection requested.
    Connecting,
    /// Push connection open; events feed the tracker.
    Streaming,
    /// Status endpoint queried on a fixed interval.
    Polling,
}

/// What observers of a [`ProgressMonitor`](crate::monitor::ProgressMonitor)
/// see: the tracker's view plus the channel state that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    /// Incremented every time a session starts or is detached.
    pub generation: u64,
    pub state: ChannelState,
    pub view: ExecutionView,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Write access to the shared snapshot, valid for one generation only.
pub(crate) struct Publisher {
    generation: u64,
    tx: Arc<watch::Sender<MonitorSnapshot>>,
}

impl Publisher {
    pub(crate) fn new(generation: u64, tx: Arc<watch::Sender<MonitorSnapshot>>) -> Self {
        Self { generation, tx }
    }

    /// Publish `state` and `view` unless a newer generation took over.
    ///
    /// Returns `false` once superseded; the session must stop then.
    /// Only new events are copied, and receivers are only woken when
    /// something actually changed.
    pub(crate) fn publish(&self, state: ChannelState, view: &ExecutionView) -> bool {
        let mut live = true;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.generation != self.generation {
                live = false;
                return false;
            }
            let moved = snapshot.state != state;
            snapshot.state = state;
            let updated = snapshot.view.sync_from(view);
            moved || updated
        });
        live
    }
}

// ---------------------------------------------------------------------------
// StreamSlot
// ---------------------------------------------------------------------------

/// Holder of a session's open push stream, shared with the monitor.
///
/// The lock is only taken for a single poll, never across an await, so
/// [`release`](StreamSlot::release) can always drop the stream at once.
#[derive(Clone, Default)]
pub(crate) struct StreamSlot(Arc<Mutex<Option<PushStream>>>);

impl StreamSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PushStream>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(&self, stream: PushStream) {
        *self.lock() = Some(stream);
    }

    /// Drop the stream, closing the connection.
    pub(crate) fn release(&self) {
        let stream = self.lock().take();
        drop(stream);
    }

    /// Next frame of the held stream; `None` once it ended or was released.
    fn next_frame(&self) -> impl Future<Output = Option<Result<String, TransportError>>> + '_ {
        futures::future::poll_fn(move |cx| match self.lock().as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Internal phases. Checking and Connecting both show as
/// [`ChannelState::Connecting`].
enum Phase {
    Checking,
    Connecting,
    Streaming,
    Polling,
    Idle,
}

/// Why the streaming loop woke up.
enum StreamWake {
    Frame(Option<Result<String, TransportError>>),
    Silent,
}

/// Why the polling loop woke up.
enum PollWake {
    Tick,
    Reattempt,
}

/// One tracking session: the state machine plus the tracker it feeds.
pub(crate) struct Session {
    execution_id: ExecutionId,
    tracker: ExecutionTracker,
    state: ChannelState,
    push: Arc<dyn PushTransport>,
    status: Arc<dyn StatusSource>,
    timing: ChannelTiming,
    publisher: Publisher,
    stream: StreamSlot,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        execution_id: ExecutionId,
        push: Arc<dyn PushTransport>,
        status: Arc<dyn StatusSource>,
        timing: ChannelTiming,
        publisher: Publisher,
        stream: StreamSlot,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            tracker: ExecutionTracker::new(execution_id),
            state: ChannelState::Idle,
            push,
            status,
            timing,
            publisher,
            stream,
            cancel,
        }
    }

    /// Drive the session until it settles in Idle or is cancelled.
    pub(crate) async fn run(mut self) {
        let mut phase = Phase::Checking;
        loop {
            let next = match phase {
                Phase::Checking => self.check().await,
                Phase::Connecting => self.connect().await,
                Phase::Streaming => self.stream().await,
                Phase::Polling => self.poll().await,
                Phase::Idle => {
                    if self.enter(ChannelState::Idle).is_some() {
                        tracing::info!(
                            status = %self.tracker.view().status,
                            percent = self.tracker.view().percent,
                            "Tracking session settled",
                        );
                    }
                    return;
                }
            };
            match next {
                Some(next) => phase = next,
                None => {
                    self.stream.release();
                    tracing::debug!(state = ?self.state, "Tracking session cancelled");
                    return;
                }
            }
        }
    }

    // ---- phases ----

    /// One status query before any push connection: a run that is no
    /// longer live has nothing left to stream.
    async fn check(&mut self) -> Option<Phase> {
        self.enter(ChannelState::Connecting)?;

        if self.query_status().await? {
            tracing::info!(status = %self.tracker.view().status, "Execution already finished");
            return Some(Phase::Idle);
        }
        Some(Phase::Connecting)
    }

    async fn connect(&mut self) -> Option<Phase> {
        self.enter(ChannelState::Connecting)?;

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            opened = self.push.open(self.execution_id) => opened,
        };

        match opened {
            Ok(stream) => {
                self.stream.hold(stream);
                self.tracker.set_connected(true);
                if self.enter(ChannelState::Streaming).is_none() {
                    self.stream.release();
                    return None;
                }
                Some(Phase::Streaming)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push connection failed, falling back to polling");
                Some(Phase::Polling)
            }
        }
    }

    async fn stream(&mut self) -> Option<Phase> {
        let idle_check = self.timing.stream_idle_check;

        let next = loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                frame = self.stream.next_frame() => StreamWake::Frame(frame),
                _ = tokio::time::sleep(idle_check.unwrap_or_default()), if idle_check.is_some() => {
                    StreamWake::Silent
                }
            };

            match wake {
                StreamWake::Frame(Some(Ok(text))) => match parse_frame(&text) {
                    Ok(event) => {
                        let ends = event.signals_end();
                        tracing::debug!(
                            agent = %event.agent,
                            step = %event.step,
                            percent = ?event.percent,
                            "Progress event",
                        );
                        self.tracker.apply_event(event);
                        self.publish()?;
                        if ends && self.query_status().await? {
                            break Phase::Idle;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, raw_message = %text, "Dropping malformed progress frame");
                    }
                },
                StreamWake::Frame(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Progress stream failed");
                    break self.after_stream();
                }
                StreamWake::Frame(None) => {
                    tracing::info!("Progress stream closed");
                    break self.after_stream();
                }
                StreamWake::Silent => {
                    tracing::debug!("Progress stream silent, cross-checking status");
                    if self.query_status().await? {
                        break Phase::Idle;
                    }
                }
            }
        };

        self.stream.release();
        self.tracker.set_connected(false);
        Some(next)
    }

    async fn poll(&mut self) -> Option<Phase> {
        self.enter(ChannelState::Polling)?;

        let mut ticker = tokio::time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // One push re-attempt per entry into Polling; the re-attempt
        // leaves this phase, so the timer cannot fire twice.
        let reconnect_after = self.timing.reconnect_after;
        let reattempt = tokio::time::sleep(reconnect_after.unwrap_or_default());
        tokio::pin!(reattempt);

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = ticker.tick() => PollWake::Tick,
                _ = &mut reattempt, if reconnect_after.is_some() => PollWake::Reattempt,
            };

            match wake {
                PollWake::Tick => {
                    if self.query_status().await? {
                        return Some(Phase::Idle);
                    }
                }
                PollWake::Reattempt => {
                    tracing::info!("Re-attempting push connection");
                    return Some(Phase::Connecting);
                }
            }
        }
    }

    // ---- helpers ----

    /// Where to go once the push stream is gone.
    fn after_stream(&self) -> Phase {
        if self.tracker.view().is_terminal() {
            Phase::Idle
        } else {
            Phase::Polling
        }
    }

    /// Ask the status endpoint once and fold the answer in.
    ///
    /// Returns `Some(true)` when the execution is now known terminal.
    /// Query failures are logged and leave the view untouched.
    async fn query_status(&mut self) -> Option<bool> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = self.status.fetch_status(self.execution_id) => result,
        };

        match result {
            Ok(snapshot) => {
                tracing::debug!(
                    status = %snapshot.status,
                    current_stage = ?snapshot.current_stage,
                    "Status snapshot",
                );
                if self.tracker.apply_snapshot(&snapshot) {
                    self.publish()?;
                } else if snapshot.execution_id != self.execution_id {
                    tracing::warn!(
                        received = snapshot.execution_id,
                        "Status answer for another execution",
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Status query failed");
            }
        }
        Some(!self.tracker.view().status.is_live())
    }

    fn enter(&mut self, state: ChannelState) -> Option<()> {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "Channel transition");
        }
        self.state = state;
        self.publish()
    }

    fn publish(&self) -> Option<()> {
        self.publisher
            .publish(self.state, self.tracker.view())
            .then_some(())
    }
}
