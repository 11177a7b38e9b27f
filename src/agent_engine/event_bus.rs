use tokio::sync::{broadcast, mpsc, watch};

use crate::agent_engine::state::{RunCommand, RunEvent, RunState};

/// Channels between the controller and its collaborators.
///
/// Commands flow in over `mpsc`; snapshots flow out over `watch` (latest
/// state only) and events over `broadcast`. Nothing outside the controller
/// can write to the state.
pub struct EventBus {
    events: broadcast::Sender<RunEvent>,
    state: watch::Sender<RunState>,
    command_tx: mpsc::Sender<RunCommand>,
    command_rx: mpsc::Receiver<RunCommand>,
}

impl EventBus {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        let (state, _) = watch::channel(RunState::default());
        let (command_tx, command_rx) = mpsc::channel(100);

        Self {
            events,
            state,
            command_tx,
            command_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Sender<RunEvent> {
        self.events.clone()
    }

    pub fn command_sender(&self) -> mpsc::Sender<RunCommand> {
        self.command_tx.clone()
    }

    /// No subscribers is not an error for the controller.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    pub fn publish(&self, state: &RunState) {
        self.state.send_replace(state.clone());
        self.emit(state.changed_event());
    }

    /// Edits the published snapshot in place and notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut RunState)) {
        self.state.send_modify(f);
        let event = self.state.borrow().changed_event();
        self.emit(event);
    }

    pub async fn recv_command(&mut self) -> Option<RunCommand> {
        self.command_rx.recv().await
    }

    pub fn try_recv_command(&mut self) -> Option<RunCommand> {
        self.command_rx.try_recv().ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
