use crate::agent_engine::state::Action;
use crate::llm::types::{ContentBlock, ToolSpec};
use crate::perception::types::Dimensions;

/// The only tool the decision service is offered.
pub const COMPUTER_TOOL: &str = "computer";

pub fn computer_tool(tool_type: &str, decision: Dimensions) -> ToolSpec {
    ToolSpec {
        tool_type: tool_type.to_string(),
        name: COMPUTER_TOOL.to_string(),
        display_width_px: decision.width,
        display_height_px: decision.height,
        display_number: 1,
    }
}

/// Interprets the last content block of a response.
///
/// Returns the action plus the tool_use id when a computer call was found.
/// Anything outside the closed action set becomes `Action::Error`.
pub fn parse_computer_call(last: Option<&ContentBlock>) -> (Action, Option<String>) {
    let Some(ContentBlock::ToolUse { id, name, input }) = last else {
        return (Action::error("No tool called"), None);
    };
    if name != COMPUTER_TOOL {
        return (Action::error(format!("Wrong tool called: {name}")), Some(id.clone()));
    }
    (action_from_input(input), Some(id.clone()))
}

/// Maps the computer tool's `input` object onto an `Action`.
pub fn action_from_input(input: &serde_json::Value) -> Action {
    let Some(action) = input["action"].as_str() else {
        return Action::error("Unsupported computer action: <missing>");
    };
    let text = input["text"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    match action {
        "type" | "key" => match text {
            None => Action::error(format!("No text provided for {action}")),
            Some(text) if action == "type" => Action::Type { text },
            Some(text) => Action::Key { text },
        },
        "mouse_move" | "left_click_drag" => match coordinate(&input["coordinate"]) {
            None => Action::error("No coordinate provided"),
            Some((x, y)) if action == "mouse_move" => Action::MouseMove { x, y },
            Some((x, y)) => Action::LeftClickDrag { x, y },
        },
        "left_click" => Action::LeftClick,
        "right_click" => Action::RightClick,
        "middle_click" => Action::MiddleClick,
        "double_click" => Action::DoubleClick,
        "screenshot" => Action::Screenshot,
        "cursor_position" => Action::CursorPosition,
        "finish" => Action::Finish,
        other => Action::error(format!("Unsupported computer action: {other}")),
    }
}

/// `[x, y]` with numeric members; fractional values are rounded.
fn coordinate(value: &serde_json::Value) -> Option<(i32, i32)> {
    let pair = value.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let x = pair[0].as_f64()?;
    let y = pair[1].as_f64()?;
    Some((x.round() as i32, y.round() as i32))
}
