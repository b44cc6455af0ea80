//! Structured progress, milestones, and problems — an interface the
//! engine emits into rather than a concrete line-formatting layer.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::stats::StatsSnapshot;

/// A queue lifecycle action, reported to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Enqueue,
    Dequeue,
    Drop,
    Retry,
    Defer,
}

/// One structured event the engine can emit. No wire format is mandated;
/// a `TelemetrySink` decides how (or whether) to render these.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TelemetryEvent {
    /// Throttled to at most once every 300ms by the emitting component.
    Progress { stats: StatsSnapshot },
    Queue {
        action: QueueAction,
        url: String,
        reason: Option<String>,
    },
    /// Deduplicated by `kind` once per run by the emitting component.
    Milestone {
        kind: String,
        details: serde_json::Value,
    },
    /// Counters are aggregated by the emitting component; only the first
    /// sample is retained in `target`.
    Problem {
        kind: String,
        scope: String,
        target: String,
        count: u64,
    },
    Cache { url: String, forced: bool },
    Error { kind: String, target: String, message: String },
}

/// Where the engine sends structured events. No format is mandated; a CLI
/// layer decides how to render these into the `PROGRESS`/`QUEUE`/
/// `MILESTONE`/`PROBLEM`/`CACHE`/`ERROR` tagged line stream.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Discards every event. The default when no sink is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Forwards events over an unbounded `tokio::sync::mpsc` channel, for a
/// caller (e.g. a CLI) to drain and format independently of the engine.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TelemetrySink for ChannelSink {
    fn emit(&self, event: TelemetryEvent) {
        // A dropped receiver means nobody is listening anymore; that's not
        // this sink's problem to surface.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_events_to_its_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(TelemetryEvent::Cache {
            url: "https://example.com/a".into(),
            forced: true,
        });
        let event = rx.recv().await.unwrap();
        match event {
            TelemetryEvent::Cache { forced, .. } => assert!(forced),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn null_sink_accepts_events_without_panicking() {
        let sink = NullSink;
        sink.emit(TelemetryEvent::Milestone {
            kind: "intelligent-completion".into(),
            details: serde_json::json!({}),
        });
    }
}
