//! Engine lifecycle states and the shared readiness signal

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of the embedded module.
///
/// `Unloaded → Instantiating → MountPending → Ready`. A failed attempt goes
/// back to `Unloaded`; `Ready` is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Instantiating,
    MountPending,
    Ready,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Instantiating => "instantiating",
            EngineState::MountPending => "mount-pending",
            EngineState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// One-shot readiness signal shared by every observer of an engine.
///
/// Built on a `watch` channel: all waiters see the same transition, and a
/// waiter that subscribes after `Ready` returns immediately.
pub struct ReadySignal {
    tx: watch::Sender<EngineState>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineState::Unloaded);
        Self { tx }
    }

    pub fn state(&self) -> EngineState {
        *self.tx.borrow()
    }

    /// Move to `next`. Leaving `Ready` is ignored.
    pub(crate) fn transition(&self, next: EngineState) {
        self.tx.send_if_modified(|current| {
            if *current == next || *current == EngineState::Ready {
                return false;
            }
            debug!(from = %current, to = %next, "Engine state transition");
            *current = next;
            true
        });
    }

    /// Wait until the state is `Ready`.
    pub async fn wait_ready(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == EngineState::Ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
