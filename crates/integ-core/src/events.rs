//! Advisory event stream
//!
//! Human-facing progress messages travel on their own channel, separate from
//! the typed results workers return. A background task drains the channel
//! into `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Kind of advisory event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// General progress
    Progress,
    /// Command line reproducing a synth
    Repro,
    /// Reminder to destroy stacks left deployed
    DestroyReminder,
    /// Non-fatal problem
    Warning,
    /// Assertion outcome in watch mode
    AssertionNotification,
}

/// One advisory event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerEvent {
    /// Emission time
    pub at: DateTime<Utc>,
    /// Test the event belongs to
    pub test_name: String,
    /// Event kind
    pub kind: EventKind,
    /// Message text
    pub message: String,
}

/// Sending half of the event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<RunnerEvent>>,
}

impl EventSink {
    /// Create a sink and its receiver
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunnerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Sink that drops every event
    #[must_use]
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Emit an event; a closed stream is ignored
    pub fn emit(&self, test_name: &str, kind: EventKind, message: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = RunnerEvent {
            at: Utc::now(),
            test_name: test_name.to_string(),
            kind,
            message: message.into(),
        };
        if sender.send(event).is_err() {
            tracing::trace!("event stream closed");
        }
    }

    /// Emit a progress event
    pub fn progress(&self, test_name: &str, message: impl Into<String>) {
        self.emit(test_name, EventKind::Progress, message);
    }

    /// Emit a warning event
    pub fn warning(&self, test_name: &str, message: impl Into<String>) {
        self.emit(test_name, EventKind::Warning, message);
    }
}

/// Drain `receiver` into `tracing` until every sink is dropped
pub fn spawn_event_logger(mut receiver: mpsc::UnboundedReceiver<RunnerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let at = event.at.to_rfc3339();
            match event.kind {
                EventKind::Warning => {
                    tracing::warn!(test = %event.test_name, %at, "{}", event.message);
                }
                EventKind::Repro | EventKind::DestroyReminder => {
                    tracing::info!(test = %event.test_name, kind = ?event.kind, %at, "\n{}", event.message);
                }
                EventKind::Progress | EventKind::AssertionNotification => {
                    tracing::info!(test = %event.test_name, kind = ?event.kind, %at, "{}", event.message);
                }
            }
        }
    })
}
