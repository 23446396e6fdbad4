//! Session events for live rendering
//!
//! Every state change a presentation layer may care about is published on a
//! broadcast channel. Publishing never blocks and never fails: with no
//! subscribers the event is dropped, and slow subscribers see `Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::phase::Phase;

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    /// One outline attempt (stream, parse, and title) failed
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    OutlineReady {
        title: String,
        sections: usize,
    },
    /// A chapter went back to pending with its content cleared
    ChapterReset {
        task_id: String,
    },
    ChapterStarted {
        task_id: String,
        title: String,
        rewrite: bool,
    },
    ChapterDelta {
        task_id: String,
        fragment: String,
    },
    ChapterCompleted {
        task_id: String,
        chars: usize,
    },
    ChapterFailed {
        task_id: String,
        title: String,
        message: String,
    },
    AutoModeChanged {
        enabled: bool,
    },
    ErrorRaised {
        message: String,
    },
    ErrorCleared,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        // An error only means nobody is listening.
        let _ = self.sender.send(event);
    }
}
