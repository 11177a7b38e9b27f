// Physical input simulation through enigo.
use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// OS input primitives. All coordinates are native pixels.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()>;
    /// Click at the current pointer position.
    async fn click(&self, button: MouseButton) -> DeskPilotResult<()>;
    async fn double_click(&self) -> DeskPilotResult<()>;
    /// Press the left button at the current position, move to (x, y), release.
    async fn drag_to(&self, x: i32, y: i32) -> DeskPilotResult<()>;
    async fn type_text(&self, text: &str) -> DeskPilotResult<()>;
    async fn cursor_position(&self) -> DeskPilotResult<(i32, i32)>;
}

/// enigo-backed driver. Each primitive runs on a blocking thread with its own
/// connection, so no platform handle crosses threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoDriver;

impl EnigoDriver {
    pub fn new() -> Self {
        Self
    }
}

async fn with_enigo<T, F>(op: &'static str, f: F) -> DeskPilotResult<T>
where
    F: FnOnce(&mut Enigo) -> Result<T, enigo::InputError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::Execution(format!("{op}: input connection failed: {e}")))?;
        f(&mut enigo).map_err(|e| DeskPilotError::Execution(format!("{op}: {e}")))
    })
    .await
    .map_err(|e| DeskPilotError::Execution(format!("{op}: input task failed: {e}")))?
}

fn enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

#[async_trait]
impl InputDriver for EnigoDriver {
    async fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        with_enigo("mouse_move", move |e| e.move_mouse(x, y, Coordinate::Abs)).await
    }

    async fn click(&self, button: MouseButton) -> DeskPilotResult<()> {
        with_enigo("click", move |e| e.button(enigo_button(button), Direction::Click)).await
    }

    async fn double_click(&self) -> DeskPilotResult<()> {
        with_enigo("double_click", |e| {
            e.button(Button::Left, Direction::Click)?;
            e.button(Button::Left, Direction::Click)
        })
        .await
    }

    async fn drag_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        with_enigo("left_click_drag", move |e| {
            e.button(Button::Left, Direction::Press)?;
            let moved = e.move_mouse(x, y, Coordinate::Abs);
            // release even when the move failed so the button is never left held
            let released = e.button(Button::Left, Direction::Release);
            moved.and(released)
        })
        .await
    }

    async fn type_text(&self, text: &str) -> DeskPilotResult<()> {
        let text = text.to_string();
        with_enigo("type", move |e| e.text(&text)).await
    }

    async fn cursor_position(&self) -> DeskPilotResult<(i32, i32)> {
        with_enigo("cursor_position", |e| e.location()).await
    }
}
