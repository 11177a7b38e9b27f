use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::history::{RunHistory, TurnRecord};
use crate::agent_engine::loop_control::{LoopConfig, LoopController};
use crate::agent_engine::state::{Action, RunCommand, RunEvent, RunPhase};
use crate::commands::OperatorHandle;
use crate::config::{AppConfig, CaptureConfig, RunConfig};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::ScreenMapper;
use crate::executor::dispatcher::{ActionExecutor, ExecutionOutcome};
use crate::executor::input::InputDriver;
use crate::executor::safety::SupervisionPolicy;
use crate::llm::decision::{Decision, DecisionClient};
use crate::llm::provider::LlmProvider;
use crate::perception::screenshot::{archive_full_resolution, capture_for_decision, default_archive_dir};
use crate::perception::traits::ScreenSource;
use crate::perception::types::CapturedFrame;

/// The only ways the run state changes. Applied by `RunController::apply`.
#[derive(Debug)]
enum Transition {
    Start { instructions: String, human_supervised: bool },
    Finish,
    Fail(String),
    Stop,
    ClearHistory,
    SetInstructions(String),
    SetHumanSupervised(bool),
    Append(TurnRecord),
    AwaitApproval(Option<Action>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// How a transition touched the turn log, mirrored into the published snapshot.
enum HistoryDelta {
    Unchanged,
    Pushed(TurnRecord),
    Cleared,
}

/// Outcome of waiting on an in-flight future while commands keep arriving.
enum Raced<T> {
    Completed(T),
    Stopped,
    Shutdown,
}

enum Approval {
    Approved,
    Rejected,
    Stopped,
    Shutdown,
}

/// Owns the single active run and drives capture → decide → execute.
pub struct RunController {
    phase: RunPhase,
    instructions: Option<String>,
    human_supervised: bool,
    error: Option<String>,
    pending_approval: Option<Action>,
    history: RunHistory,

    bus: EventBus,
    loop_ctrl: LoopController,
    run_config: RunConfig,
    capture_config: CaptureConfig,
    policy: SupervisionPolicy,

    screen: Arc<dyn ScreenSource>,
    decision: Arc<DecisionClient>,
    executor: ActionExecutor,
}

impl RunController {
    pub fn new(
        config: &AppConfig,
        screen: Arc<dyn ScreenSource>,
        provider: Arc<dyn LlmProvider>,
        driver: Arc<dyn InputDriver>,
    ) -> Self {
        let history = if config.history.persist {
            RunHistory::persistent()
        } else {
            RunHistory::new()
        };
        Self {
            phase: RunPhase::Idle,
            instructions: None,
            human_supervised: false,
            error: None,
            pending_approval: None,
            history,
            bus: EventBus::new(),
            loop_ctrl: LoopController::new(LoopConfig::from_run_config(&config.run)),
            run_config: config.run.clone(),
            capture_config: config.capture.clone(),
            policy: SupervisionPolicy::from_config(&config.safety),
            executor: ActionExecutor::new(driver, screen.clone()),
            screen,
            decision: Arc::new(DecisionClient::new(provider, &config.decision)),
        }
    }

    pub fn handle(&self) -> OperatorHandle {
        OperatorHandle::new(self.bus.command_sender(), self.bus.events(), self.bus.watch())
    }

    pub async fn run_loop(&mut self) {
        self.publish(HistoryDelta::Unchanged);

        loop {
            if self.phase != RunPhase::Running {
                let Some(command) = self.bus.recv_command().await else {
                    break;
                };
                if self.handle_command(command) == Flow::Shutdown {
                    break;
                }
                continue;
            }

            // Iteration boundary: commands queued during the last turn apply now.
            if self.drain_commands() == Flow::Shutdown {
                break;
            }
            if self.phase != RunPhase::Running {
                continue;
            }
            if let Some(reason) = self.loop_ctrl.limit_reached() {
                tracing::warn!(reason = %reason, "loop limit reached");
                self.apply(Transition::Fail(format!("Loop limit reached: {reason}")));
                continue;
            }
            if self.iterate().await == Flow::Shutdown {
                break;
            }

            tokio::task::yield_now().await;
        }
        tracing::info!(session = %self.history.session_id, "run controller exited");
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn drain_commands(&mut self) -> Flow {
        while let Some(command) = self.bus.try_recv_command() {
            if self.handle_command(command) == Flow::Shutdown {
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: RunCommand) -> Flow {
        let running = self.phase == RunPhase::Running;
        match command {
            RunCommand::Start { instructions, human_supervised } => {
                if running {
                    self.reject("start", "a run is already active");
                } else if instructions.trim().is_empty() {
                    self.reject("start", "instructions are empty");
                } else {
                    self.loop_ctrl.reset();
                    self.apply(Transition::Start { instructions, human_supervised });
                }
            }
            RunCommand::Stop => {
                if running {
                    self.apply(Transition::Stop);
                } else {
                    tracing::debug!("stop ignored: no active run");
                }
            }
            RunCommand::Shutdown => {
                if running {
                    self.apply(Transition::Stop);
                }
                return Flow::Shutdown;
            }
            RunCommand::ClearHistory if running => self.reject("clear_history", "a run is active"),
            RunCommand::ClearHistory => self.apply(Transition::ClearHistory),
            RunCommand::SetInstructions { .. } | RunCommand::SetHumanSupervised { .. } if running => {
                self.reject(command.name(), "a run is active")
            }
            RunCommand::SetInstructions { instructions } => {
                self.apply(Transition::SetInstructions(instructions))
            }
            RunCommand::SetHumanSupervised { human_supervised } => {
                self.apply(Transition::SetHumanSupervised(human_supervised))
            }
            RunCommand::Approve | RunCommand::Reject => {
                self.reject(command.name(), "no action is awaiting approval")
            }
        }
        Flow::Continue
    }

    fn reject(&self, command: &str, reason: &str) {
        tracing::warn!(command, reason, "command rejected");
        self.bus.emit(RunEvent::CommandRejected {
            command: command.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Polls `fut` to completion unless STOP/shutdown arrives first, in which
    /// case `fut` is dropped. Other commands are handled while waiting.
    async fn race_commands<F: Future>(&mut self, fut: F) -> Raced<F::Output> {
        tokio::pin!(fut);
        loop {
            // Commands first: a STOP that is already queued must win over a
            // result that became ready in the same poll.
            let command = tokio::select! {
                biased;
                command = self.bus.recv_command() => command,
                out = &mut fut => return Raced::Completed(out),
            };
            match command {
                Some(RunCommand::Stop) => {
                    self.apply(Transition::Stop);
                    return Raced::Stopped;
                }
                Some(RunCommand::Shutdown) | None => {
                    self.apply(Transition::Stop);
                    return Raced::Shutdown;
                }
                Some(other) => {
                    self.handle_command(other);
                }
            }
        }
    }

    // ── Iteration ─────────────────────────────────────────────────────────────

    async fn iterate(&mut self) -> Flow {
        let turn = self.loop_ctrl.begin_iteration();
        tracing::info!(turn, "iteration started");

        if turn == 1 && self.capture_config.archive_on_start {
            self.archive().await;
        }

        let (mapper, frame) = match self.capture().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(turn, error = %e, "capture failed, aborting run");
                self.apply(Transition::Fail(e.to_string()));
                return Flow::Continue;
            }
        };

        let decision = match self.decide(frame).await {
            Raced::Completed(Ok(decision)) => decision,
            Raced::Completed(Err(e)) => {
                tracing::error!(turn, error = %e, "decision request failed, aborting run");
                self.apply(Transition::Fail(e.to_string()));
                return Flow::Continue;
            }
            Raced::Stopped => return Flow::Continue,
            Raced::Shutdown => return Flow::Shutdown,
        };

        // Nothing has touched the OS yet; a STOP queued meanwhile discards the decision.
        if self.drain_commands() == Flow::Shutdown {
            return Flow::Shutdown;
        }
        if self.phase != RunPhase::Running {
            tracing::info!(turn, action = decision.action.name(), "decision discarded after stop");
            return Flow::Continue;
        }

        if let Some(text) = &decision.reasoning {
            tracing::info!(turn, reasoning = %text, "model reasoning");
            self.bus.emit(RunEvent::Reasoning { turn, text: text.clone() });
        }

        let Decision { action, reasoning, tool_use_id, content } = decision;
        match action {
            Action::Error { message } => {
                tracing::error!(turn, error = %message, "decision service returned an error action");
                self.apply(Transition::Fail(message));
            }
            Action::Finish => {
                tracing::info!(turn, "run finished");
                self.apply(Transition::Finish);
            }
            action => {
                let tool_use_id = tool_use_id.unwrap_or_default();
                self.apply(Transition::Append(TurnRecord::decision(
                    turn,
                    tool_use_id.clone(),
                    content,
                    action.clone(),
                    reasoning,
                )));

                if self.policy.requires_approval(&action, self.human_supervised) {
                    match self.await_approval(turn, &action).await {
                        Approval::Approved => {}
                        Approval::Rejected => {
                            self.apply(Transition::Append(TurnRecord::outcome(
                                turn,
                                tool_use_id,
                                false,
                                "Rejected by operator".into(),
                            )));
                            self.apply(Transition::Stop);
                            return Flow::Continue;
                        }
                        Approval::Stopped => return Flow::Continue,
                        Approval::Shutdown => return Flow::Shutdown,
                    }
                }

                self.execute(turn, tool_use_id, &action, &mapper).await;
            }
        }
        Flow::Continue
    }

    /// Captures a decision-space frame, retrying `capture_retries` times.
    async fn capture(&self) -> DeskPilotResult<(ScreenMapper, CapturedFrame)> {
        let mut attempt = 0;
        loop {
            let result = async {
                let native = self.screen.native_size().await?;
                let mapper = ScreenMapper::new(native)?;
                let frame = capture_for_decision(self.screen.as_ref(), &mapper).await?;
                Ok::<_, DeskPilotError>((mapper, frame))
            }
            .await;

            match result {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.run_config.capture_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "capture failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decision round-trip with bounded transport retry. Cancelled by STOP.
    async fn decide(&mut self, frame: CapturedFrame) -> Raced<DeskPilotResult<Decision>> {
        let instructions = self.instructions.clone().unwrap_or_default();
        let history = self.history.entries().to_vec();
        let frame = Arc::new(frame);
        let mut attempt = 0u32;

        loop {
            let client = self.decision.clone();
            let (instructions, history, frame) = (instructions.clone(), history.clone(), frame.clone());
            let request = async move { client.decide(&instructions, &history, &frame).await };

            let result = match self.race_commands(request).await {
                Raced::Completed(result) => result,
                Raced::Stopped => return Raced::Stopped,
                Raced::Shutdown => return Raced::Shutdown,
            };

            match result {
                Err(e) if e.is_transport() && attempt < self.run_config.max_transport_retries => {
                    let backoff = self.run_config.retry_backoff_ms.saturating_mul(1 << attempt.min(10));
                    attempt += 1;
                    tracing::warn!(attempt, backoff_ms = backoff, error = %e, "decision transport failed, retrying");
                    match self.race_commands(tokio::time::sleep(Duration::from_millis(backoff))).await {
                        Raced::Completed(()) => {}
                        Raced::Stopped => return Raced::Stopped,
                        Raced::Shutdown => return Raced::Shutdown,
                    }
                }
                other => return Raced::Completed(other),
            }
        }
    }

    async fn await_approval(&mut self, turn: u32, action: &Action) -> Approval {
        tracing::info!(turn, action = action.name(), "waiting for operator approval");
        self.apply(Transition::AwaitApproval(Some(action.clone())));
        self.bus.emit(RunEvent::ApprovalRequired { turn, action: action.clone() });

        let approval = loop {
            match self.bus.recv_command().await {
                Some(RunCommand::Approve) => break Approval::Approved,
                Some(RunCommand::Reject) => break Approval::Rejected,
                Some(RunCommand::Stop) => {
                    self.apply(Transition::Stop);
                    break Approval::Stopped;
                }
                Some(RunCommand::Shutdown) | None => {
                    self.apply(Transition::Stop);
                    break Approval::Shutdown;
                }
                Some(other) => {
                    self.handle_command(other);
                }
            }
        };
        if self.pending_approval.is_some() {
            self.apply(Transition::AwaitApproval(None));
        }
        approval
    }

    /// Runs one action to completion. Failures are recorded and the run goes on.
    async fn execute(&mut self, turn: u32, tool_use_id: String, action: &Action, mapper: &ScreenMapper) {
        let (success, summary) = match self.executor.execute(action, mapper).await {
            Ok(outcome) => {
                self.loop_ctrl.record_success();
                match &outcome {
                    ExecutionOutcome::Screenshot(frame) => self.bus.emit(RunEvent::ScreenshotCaptured {
                        turn,
                        data_url: frame.data_url(),
                    }),
                    ExecutionOutcome::CursorPosition { decision: (x, y), .. } => {
                        self.bus.emit(RunEvent::CursorPosition { turn, x: *x, y: *y })
                    }
                    ExecutionOutcome::Performed { .. } => {}
                }
                (true, outcome.summary())
            }
            Err(e) => {
                tracing::warn!(turn, action = action.name(), error = %e, "action failed, continuing");
                self.loop_ctrl.record_failure();
                (false, e.to_string())
            }
        };

        tracing::info!(turn, action = action.name(), success, summary = %summary, "action complete");
        self.bus.emit(RunEvent::ActionExecuted {
            turn,
            action: action.clone(),
            success,
            summary: summary.clone(),
        });
        self.apply(Transition::Append(TurnRecord::outcome(turn, tool_use_id, success, summary)));
    }

    async fn archive(&self) {
        let dir = self
            .capture_config
            .configured_archive_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_archive_dir);
        if let Err(e) = archive_full_resolution(self.screen.as_ref(), &dir).await {
            tracing::warn!(error = %e, dir = %dir.display(), "full-resolution archive failed");
        }
    }

    // ── Transition function ───────────────────────────────────────────────────

    fn apply(&mut self, transition: Transition) {
        let from = self.phase;
        let mut delta = HistoryDelta::Unchanged;
        match transition {
            Transition::Start { instructions, human_supervised } => {
                tracing::info!(instructions = %instructions, human_supervised, "run started");
                self.instructions = Some(instructions);
                self.human_supervised = human_supervised;
                self.error = None;
                self.pending_approval = None;
                self.phase = RunPhase::Running;
            }
            Transition::Finish | Transition::Fail(_) | Transition::Stop if from != RunPhase::Running => {
                tracing::debug!(?from, "terminal transition ignored outside a run");
                return;
            }
            Transition::Finish => self.phase = RunPhase::Finished,
            Transition::Fail(message) => {
                self.error = Some(message);
                self.phase = RunPhase::Errored;
            }
            Transition::Stop => self.phase = RunPhase::Stopped,
            Transition::ClearHistory => {
                self.history.clear();
                delta = HistoryDelta::Cleared;
            }
            Transition::SetInstructions(instructions) => self.instructions = Some(instructions),
            Transition::SetHumanSupervised(flag) => self.human_supervised = flag,
            Transition::Append(record) => {
                delta = HistoryDelta::Pushed(record.clone());
                self.history.push(record);
            }
            Transition::AwaitApproval(action) => self.pending_approval = action,
        }
        if self.phase != RunPhase::Running {
            self.pending_approval = None;
        }
        if from != self.phase {
            tracing::info!(from = ?from, to = ?self.phase, error = ?self.error, "run phase changed");
        }
        self.publish(delta);
    }

    /// Syncs the watch snapshot. History is patched, never re-copied.
    fn publish(&self, delta: HistoryDelta) {
        self.bus.update(|state| {
            state.phase = self.phase;
            state.running = self.phase == RunPhase::Running;
            state.instructions.clone_from(&self.instructions);
            state.human_supervised = self.human_supervised;
            state.error.clone_from(&self.error);
            state.pending_approval.clone_from(&self.pending_approval);
            match delta {
                HistoryDelta::Unchanged => {}
                HistoryDelta::Pushed(record) => state.history.push(record),
                HistoryDelta::Cleared => state.history.clear(),
            }
        });
    }
}
