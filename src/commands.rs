use tokio::sync::{broadcast, mpsc, watch};

use crate::agent_engine::state::{RunCommand, RunEvent, RunState};
use crate::errors::{DeskPilotError, DeskPilotResult};

/// Client side of the run controller. Cheap to clone; every front end
/// (CLI, signal handler, tests) talks to the controller through one of these.
#[derive(Clone)]
pub struct OperatorHandle {
    tx: mpsc::Sender<RunCommand>,
    events: broadcast::Sender<RunEvent>,
    state: watch::Receiver<RunState>,
}

impl OperatorHandle {
    pub fn new(
        tx: mpsc::Sender<RunCommand>,
        events: broadcast::Sender<RunEvent>,
        state: watch::Receiver<RunState>,
    ) -> Self {
        Self { tx, events, state }
    }

    /// Begin a run. Blank instructions are refused here, before anything is queued.
    pub async fn start(&self, instructions: &str, human_supervised: bool) -> DeskPilotResult<()> {
        if instructions.trim().is_empty() {
            return Err(DeskPilotError::RunRejected("instructions are empty".into()));
        }
        self.send(RunCommand::Start {
            instructions: instructions.to_string(),
            human_supervised,
        })
        .await
    }

    pub async fn stop(&self) -> DeskPilotResult<()> {
        self.send(RunCommand::Stop).await
    }

    pub async fn clear_history(&self) -> DeskPilotResult<()> {
        self.send(RunCommand::ClearHistory).await
    }

    pub async fn set_instructions(&self, instructions: &str) -> DeskPilotResult<()> {
        self.send(RunCommand::SetInstructions { instructions: instructions.to_string() })
            .await
    }

    pub async fn set_human_supervised(&self, human_supervised: bool) -> DeskPilotResult<()> {
        self.send(RunCommand::SetHumanSupervised { human_supervised }).await
    }

    pub async fn approve(&self) -> DeskPilotResult<()> {
        self.send(RunCommand::Approve).await
    }

    pub async fn reject(&self) -> DeskPilotResult<()> {
        self.send(RunCommand::Reject).await
    }

    /// Stops any active run and ends the controller task.
    pub async fn shutdown(&self) -> DeskPilotResult<()> {
        self.send(RunCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Waits until the current run (if any) reaches a terminal phase.
    pub async fn wait_until_settled(&self) -> DeskPilotResult<RunState> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| s.phase.is_terminal())
            .await
            .map_err(|_| DeskPilotError::Cancelled)?;
        Ok(settled.clone())
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> mpsc::Sender<RunCommand> {
        self.tx.clone()
    }

    async fn send(&self, command: RunCommand) -> DeskPilotResult<()> {
        tracing::debug!(command = command.name(), "sending command");
        self.tx.send(command).await.map_err(|_| DeskPilotError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::event_bus::EventBus;
    use crate::agent_engine::state::RunPhase;

    fn handle(bus: &EventBus) -> OperatorHandle {
        OperatorHandle::new(bus.command_sender(), bus.events(), bus.watch())
    }

    #[tokio::test]
    async fn blank_instructions_never_reach_the_controller() {
        let mut bus = EventBus::new();
        let h = handle(&bus);
        let err = h.start("  \n", false).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::RunRejected(_)));
        assert_eq!(bus.try_recv_command(), None);
    }

    #[tokio::test]
    async fn commands_are_forwarded() {
        let mut bus = EventBus::new();
        let h = handle(&bus);
        h.start("open notepad", true).await.unwrap();
        h.stop().await.unwrap();
        assert_eq!(
            bus.try_recv_command(),
            Some(RunCommand::Start { instructions: "open notepad".into(), human_supervised: true })
        );
        assert_eq!(bus.try_recv_command(), Some(RunCommand::Stop));
    }

    #[tokio::test]
    async fn send_after_controller_gone_is_cancelled() {
        let bus = EventBus::new();
        let h = handle(&bus);
        drop(bus);
        assert!(matches!(h.stop().await, Err(DeskPilotError::Cancelled)));
    }

    #[tokio::test]
    async fn wait_until_settled_returns_terminal_state() {
        let bus = EventBus::new();
        let h = handle(&bus);
        let waiter = tokio::spawn({
            let h = h.clone();
            async move { h.wait_until_settled().await }
        });
        bus.publish(&RunState { phase: RunPhase::Running, running: true, ..Default::default() });
        bus.publish(&RunState { phase: RunPhase::Errored, error: Some("boom".into()), ..Default::default() });
        let state = waiter.await.unwrap().unwrap();
        assert_eq!(state.phase, RunPhase::Errored);
        assert_eq!(state.phase.exit_code(), 1);
    }
}
