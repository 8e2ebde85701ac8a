//! Text rendering of monitor snapshots.
//!
//! [`Renderer`] remembers what it already printed so each published
//! snapshot only yields the lines that are new.

use shorts_client::channel::{ChannelState, MonitorSnapshot};
use shorts_core::progress::ProgressEvent;
use shorts_core::status::Lifecycle;
use shorts_core::tracker::ExecutionView;

const BAR_WIDTH: usize = 20;

#[derive(Debug, Default)]
pub struct Renderer {
    generation: Option<u64>,
    events_seen: usize,
    state: Option<ChannelState>,
    status: Option<Lifecycle>,
    percent: f64,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing what changed since the previous snapshot.
    pub fn render(&mut self, snapshot: &MonitorSnapshot) -> Vec<String> {
        if self.generation != Some(snapshot.generation) {
            *self = Self {
                generation: Some(snapshot.generation),
                ..Self::default()
            };
        }

        let view = &snapshot.view;
        let mut lines = Vec::new();

        if self.state != Some(snapshot.state) {
            lines.push(format!("channel: {}", state_label(snapshot.state, view)));
            self.state = Some(snapshot.state);
        }

        for event in view.events.iter().skip(self.events_seen) {
            lines.push(event_line(event));
        }
        self.events_seen = view.events.len();

        if self.status != Some(view.status) {
            let line = match &view.stage {
                Some(stage) => format!("status: {} ({stage})", view.status),
                None => format!("status: {}", view.status),
            };
            lines.push(line);
            self.status = Some(view.status);
        }

        if view.percent > self.percent {
            lines.push(progress_bar(view.percent));
            self.percent = view.percent;
        }

        lines
    }
}

fn state_label(state: ChannelState, view: &ExecutionView) -> &'static str {
    match state {
        ChannelState::Idle if view.is_terminal() => "idle (run finished)",
        ChannelState::Idle => "idle",
        ChannelState::Connecting => "connecting",
        ChannelState::Streaming => "live",
        ChannelState::Polling => "polling",
    }
}

fn event_line(event: &ProgressEvent) -> String {
    let percent = event
        .reported_percent()
        .map(|p| format!("{p:>3.0}%"))
        .unwrap_or_else(|| "   -".to_string());
    if event.is_pipeline_error() {
        format!("{percent} [{}] ERROR {}", event.agent, event.log)
    } else {
        format!("{percent} [{}] {}: {}", event.agent, event.step, event.log)
    }
}

/// Fixed-width bar such as `[#####...............]  25%`.
pub fn progress_bar(percent: f64) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {percent:>3.0}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
    )
}

/// Closing line for a finished run.
pub fn summary(view: &ExecutionView, video_url: Option<&str>) -> String {
    let id = view
        .execution_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    match view.status {
        Lifecycle::Completed => {
            let mut line = format!("execution {id} completed (cost ${:.2})", view.cost);
            if let Some(url) = video_url {
                line.push_str(&format!(", video: {url}"));
            }
            line
        }
        Lifecycle::Failed => format!(
            "execution {id} failed: {}",
            view.error_message.as_deref().unwrap_or("no error message"),
        ),
        status => format!("execution {id} stopped while {status}"),
    }
}
