use serde::{Deserialize, Serialize};

use crate::agent_engine::history::TurnRecord;

/// Next step chosen by the decision service. Coordinates are in decision space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Key { text: String },
    Type { text: String },
    MouseMove { x: i32, y: i32 },
    LeftClick,
    LeftClickDrag { x: i32, y: i32 },
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
    Finish,
    Error { message: String },
}

impl Action {
    pub fn error(message: impl Into<String>) -> Self {
        Action::Error { message: message.into() }
    }

    /// Wire name of the action, as used by the computer tool.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Key { .. } => "key",
            Action::Type { .. } => "type",
            Action::MouseMove { .. } => "mouse_move",
            Action::LeftClick => "left_click",
            Action::LeftClickDrag { .. } => "left_click_drag",
            Action::RightClick => "right_click",
            Action::MiddleClick => "middle_click",
            Action::DoubleClick => "double_click",
            Action::Screenshot => "screenshot",
            Action::CursorPosition => "cursor_position",
            Action::Finish => "finish",
            Action::Error { .. } => "error",
        }
    }

    /// `finish` and `error` end the run and never reach the executor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Finish | Action::Error { .. })
    }
}

/// Lifecycle of the run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Finished,
    Errored,
    Stopped,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Finished | RunPhase::Errored | RunPhase::Stopped)
    }

    /// Process exit status for a settled run.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunPhase::Errored => 1,
            _ => 0,
        }
    }
}

/// Snapshot of the run as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: RunPhase,
    pub instructions: Option<String>,
    pub human_supervised: bool,
    pub running: bool,
    pub error: Option<String>,
    /// Action waiting for operator approval in a supervised run.
    pub pending_approval: Option<Action>,
    pub history: Vec<TurnRecord>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            instructions: None,
            human_supervised: false,
            running: false,
            error: None,
            pending_approval: None,
            history: Vec::new(),
        }
    }
}

impl RunState {
    pub fn changed_event(&self) -> RunEvent {
        RunEvent::StateChanged {
            phase: self.phase,
            running: self.running,
            error: self.error.clone(),
            history_len: self.history.len(),
        }
    }
}

/// Requests from external collaborators to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RunCommand {
    Start { instructions: String, human_supervised: bool },
    Stop,
    ClearHistory,
    SetInstructions { instructions: String },
    SetHumanSupervised { human_supervised: bool },
    Approve,
    Reject,
    Shutdown,
}

impl RunCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RunCommand::Start { .. } => "start",
            RunCommand::Stop => "stop",
            RunCommand::ClearHistory => "clear_history",
            RunCommand::SetInstructions { .. } => "set_instructions",
            RunCommand::SetHumanSupervised { .. } => "set_human_supervised",
            RunCommand::Approve => "approve",
            RunCommand::Reject => "reject",
            RunCommand::Shutdown => "shutdown",
        }
    }
}

/// Notifications broadcast by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Lightweight change notice; the full snapshot lives on the watch channel.
    StateChanged { phase: RunPhase, running: bool, error: Option<String>, history_len: usize },
    Reasoning { turn: u32, text: String },
    ActionExecuted { turn: u32, action: Action, success: bool, summary: String },
    ScreenshotCaptured { turn: u32, data_url: String },
    CursorPosition { turn: u32, x: i32, y: i32 },
    ApprovalRequired { turn: u32, action: Action },
    CommandRejected { command: String, reason: String },
}
