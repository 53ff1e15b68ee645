use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the lifecycle broadcast channel. Slow subscribers that fall
/// further behind than this see `RecvError::Lagged`, never a stalled store.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Kind of a script lifecycle notification.
///
/// Mutations emit a pre/post pair around the persisted change
/// (`Enabling`/`Enabled`, `Disabling`/`Disabled`, `Uninstalling`/
/// `Uninstalled`); installs emit a single `Installed` after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptEventKind {
    Installed,
    Uninstalling,
    Uninstalled,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
}

/// One lifecycle notification on the broadcast stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEvent {
    pub kind: ScriptEventKind,
    pub script_id: i64,
    pub name: String,
}

/// Fan-out point for lifecycle notifications.
pub struct EventBus {
    sender: broadcast::Sender<ScriptEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a new listener. Only events emitted after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.sender.subscribe()
    }

    /// Same as [`subscribe`](Self::subscribe), wrapped as a `Stream`.
    pub fn stream(&self) -> BroadcastStream<ScriptEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Emit an event to all current listeners. A send with no listeners is
    /// not an error.
    pub fn emit(&self, kind: ScriptEventKind, script_id: i64, name: &str) {
        let _ = self.sender.send(ScriptEvent {
            kind,
            script_id,
            name: name.to_string(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
