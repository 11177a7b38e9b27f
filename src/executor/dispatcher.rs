use std::sync::Arc;

use crate::agent_engine::state::Action;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::ScreenMapper;
use crate::executor::input::{InputDriver, MouseButton};
use crate::perception::screenshot::capture_for_decision;
use crate::perception::traits::ScreenSource;
use crate::perception::types::CapturedFrame;

/// Result of a successfully executed action.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Performed { summary: String },
    Screenshot(CapturedFrame),
    /// Pointer position in both spaces; `decision` is what the service gets to see.
    CursorPosition { native: (i32, i32), decision: (i32, i32) },
}

impl ExecutionOutcome {
    /// Text fed back to the decision service as the tool result.
    pub fn summary(&self) -> String {
        match self {
            ExecutionOutcome::Performed { summary } => summary.clone(),
            ExecutionOutcome::Screenshot(frame) => {
                format!("Screenshot captured ({}).", frame.decision)
            }
            ExecutionOutcome::CursorPosition { decision: (x, y), .. } => {
                format!("Cursor position: x={x}, y={y}")
            }
        }
    }
}

/// Maps actions onto input primitives, translating decision-space
/// coordinates to native pixels right before the driver call.
pub struct ActionExecutor {
    driver: Arc<dyn InputDriver>,
    screen: Arc<dyn ScreenSource>,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn InputDriver>, screen: Arc<dyn ScreenSource>) -> Self {
        Self { driver, screen }
    }

    pub async fn execute(&self, action: &Action, mapper: &ScreenMapper) -> DeskPilotResult<ExecutionOutcome> {
        let performed = |summary: String| -> DeskPilotResult<ExecutionOutcome> {
            Ok(ExecutionOutcome::Performed { summary })
        };

        match action {
            Action::MouseMove { x, y } => {
                let (nx, ny) = mapper.to_native_pixel(*x, *y);
                tracing::info!(x, y, native_x = nx, native_y = ny, "mouse_move");
                self.driver.move_to(nx, ny).await?;
                performed(format!("Moved pointer to ({x}, {y})"))
            }
            Action::LeftClick => {
                self.driver.click(MouseButton::Left).await?;
                performed("Left click".into())
            }
            Action::RightClick => {
                self.driver.click(MouseButton::Right).await?;
                performed("Right click".into())
            }
            Action::MiddleClick => {
                self.driver.click(MouseButton::Middle).await?;
                performed("Middle click".into())
            }
            Action::DoubleClick => {
                self.driver.double_click().await?;
                performed("Double click".into())
            }
            Action::LeftClickDrag { x, y } => {
                let (nx, ny) = mapper.to_native_pixel(*x, *y);
                tracing::info!(x, y, native_x = nx, native_y = ny, "left_click_drag");
                self.driver.drag_to(nx, ny).await?;
                performed(format!("Dragged to ({x}, {y})"))
            }
            Action::Type { text } | Action::Key { text } => {
                tracing::info!(action = action.name(), chars = text.chars().count(), "injecting text");
                self.driver.type_text(text).await?;
                performed(format!("Typed {} characters", text.chars().count()))
            }
            Action::Screenshot => {
                let frame = capture_for_decision(self.screen.as_ref(), mapper).await?;
                Ok(ExecutionOutcome::Screenshot(frame))
            }
            Action::CursorPosition => {
                let native = self.driver.cursor_position().await?;
                let decision = mapper.to_decision_pixel(native.0, native.1);
                tracing::info!(x = decision.0, y = decision.1, native = ?native, "cursor position");
                Ok(ExecutionOutcome::CursorPosition { native, decision })
            }
            Action::Finish | Action::Error { .. } => Err(DeskPilotError::Execution(format!(
                "'{}' is a terminal signal and is not executable",
                action.name()
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::perception::screenshot::tests::FakeScreen;
    use crate::perception::types::Dimensions;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every primitive instead of touching the OS.
    #[derive(Default)]
    pub(crate) struct RecordingDriver {
        pub calls: Mutex<Vec<String>>,
        pub fail: Mutex<bool>,
        pub position: Mutex<(i32, i32)>,
    }

    impl RecordingDriver {
        fn record(&self, call: String) -> DeskPilotResult<()> {
            if *self.fail.lock().unwrap() {
                return Err(DeskPilotError::Execution("permission denied".into()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InputDriver for RecordingDriver {
        async fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
            self.record(format!("move {x},{y}"))?;
            *self.position.lock().unwrap() = (x, y);
            Ok(())
        }

        async fn click(&self, button: MouseButton) -> DeskPilotResult<()> {
            self.record(format!("click {button:?}"))
        }

        async fn double_click(&self) -> DeskPilotResult<()> {
            self.record("double_click".into())
        }

        async fn drag_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
            self.record(format!("drag {x},{y}"))
        }

        async fn type_text(&self, text: &str) -> DeskPilotResult<()> {
            self.record(format!("type {text}"))
        }

        async fn cursor_position(&self) -> DeskPilotResult<(i32, i32)> {
            Ok(*self.position.lock().unwrap())
        }
    }

    fn setup() -> (Arc<RecordingDriver>, ActionExecutor, ScreenMapper) {
        let driver = Arc::new(RecordingDriver::default());
        let screen = Arc::new(FakeScreen::new(1920, 1080));
        let executor = ActionExecutor::new(driver.clone(), screen);
        let mapper = ScreenMapper::new(Dimensions::native(1920, 1080)).unwrap();
        (driver, executor, mapper)
    }

    #[tokio::test]
    async fn click_scenario_moves_in_native_space_first() {
        let (driver, executor, mapper) = setup();
        executor.execute(&Action::MouseMove { x: 640, y: 360 }, &mapper).await.unwrap();
        executor.execute(&Action::LeftClick, &mapper).await.unwrap();
        assert_eq!(driver.calls(), vec!["move 960,540", "click Left"]);
    }

    #[tokio::test]
    async fn each_action_maps_to_one_primitive() {
        let (driver, executor, mapper) = setup();
        let actions = [
            Action::RightClick,
            Action::MiddleClick,
            Action::DoubleClick,
            Action::LeftClickDrag { x: 1280, y: 0 },
            Action::Type { text: "hello".into() },
            Action::Key { text: "Return".into() },
        ];
        for action in &actions {
            executor.execute(action, &mapper).await.unwrap();
        }
        assert_eq!(
            driver.calls(),
            vec![
                "click Right",
                "click Middle",
                "double_click",
                "drag 1919,0",
                "type hello",
                "type Return"
            ]
        );
    }

    #[tokio::test]
    async fn cursor_position_is_reported_without_side_effects() {
        let (driver, executor, mapper) = setup();
        *driver.position.lock().unwrap() = (960, 540);
        let outcome = executor.execute(&Action::CursorPosition, &mapper).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::CursorPosition { decision: (640, 360), .. }));
        assert_eq!(outcome.summary(), "Cursor position: x=640, y=360");
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn screenshot_produces_decision_space_frame() {
        let (driver, executor, mapper) = setup();
        let outcome = executor.execute(&Action::Screenshot, &mapper).await.unwrap();
        let ExecutionOutcome::Screenshot(frame) = outcome else {
            panic!("expected a screenshot outcome");
        };
        assert_eq!(frame.decision, Dimensions::decision(1280, 720));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn terminal_signals_are_surfaced_not_ignored() {
        let (driver, executor, mapper) = setup();
        for action in [Action::Finish, Action::error("boom")] {
            let err = executor.execute(&action, &mapper).await.unwrap_err();
            assert!(matches!(err, DeskPilotError::Execution(_)));
        }
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn driver_failure_is_an_execution_error() {
        let (driver, executor, mapper) = setup();
        *driver.fail.lock().unwrap() = true;
        let err = executor.execute(&Action::LeftClick, &mapper).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::Execution(_)));
    }
}
