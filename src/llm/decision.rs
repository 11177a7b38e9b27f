use std::sync::Arc;

use crate::agent_engine::history::{TurnKind, TurnRecord};
use crate::agent_engine::state::Action;
use crate::config::DecisionConfig;
use crate::errors::DeskPilotResult;
use crate::llm::provider::LlmProvider;
use crate::llm::tools::{computer_tool, parse_computer_call};
use crate::llm::types::{ContentBlock, Message, MessagesRequest};
use crate::perception::types::CapturedFrame;

pub const SYSTEM_DIRECTIVE: &str = "\
The user will ask you to perform a task and you should use their computer to do so. \
After each step, take a screenshot and carefully evaluate if you have achieved the right outcome. \
Explicitly show your thinking: \"I have evaluated step X...\" If not correct, try again. \
Only when you confirm a step was executed correctly should you move on to the next one.";

const NOT_EXECUTED: &str = "Action was not executed.";

/// Parsed answer of the decision service for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Free-text commentary that accompanied the tool call.
    pub reasoning: Option<String>,
    pub tool_use_id: Option<String>,
    /// Assistant blocks to replay on later requests (text + the computer call).
    pub content: Vec<ContentBlock>,
}

pub struct DecisionClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    tool_type: String,
    multi_turn: bool,
}

impl DecisionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &DecisionConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            tool_type: config.tool_type.clone(),
            multi_turn: config.multi_turn,
        }
    }

    /// Asks the service for the next action given the goal, prior turns and the current frame.
    ///
    /// Transport failures come back as `Err`; every semantic problem with the
    /// answer comes back as `Ok` with `Action::Error`.
    pub async fn decide(
        &self,
        instructions: &str,
        history: &[TurnRecord],
        frame: &CapturedFrame,
    ) -> DeskPilotResult<Decision> {
        let request = self.build_request(instructions, history, frame);
        let response = self.provider.create_message(&request).await?;
        let decision = interpret(response.content);
        tracing::info!(
            provider = self.provider.name(),
            action = decision.action.name(),
            has_reasoning = decision.reasoning.is_some(),
            "decision parsed"
        );
        Ok(decision)
    }

    pub fn build_request(
        &self,
        instructions: &str,
        history: &[TurnRecord],
        frame: &CapturedFrame,
    ) -> MessagesRequest {
        let history: &[TurnRecord] = if self.multi_turn { history } else { &[] };
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_DIRECTIVE.to_string(),
            tools: vec![computer_tool(&self.tool_type, frame.decision)],
            messages: build_conversation(instructions, history, frame),
        }
    }
}

/// Turns a response's content blocks into a `Decision`.
pub fn interpret(content: Vec<ContentBlock>) -> Decision {
    let texts: Vec<&str> = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let reasoning = (!texts.is_empty()).then(|| texts.join(" "));

    let (action, tool_use_id) = parse_computer_call(content.last());

    // Keep the text and the one call we answer so the replayed turn stays valid.
    let content = content
        .into_iter()
        .filter(|block| match block {
            ContentBlock::Text { .. } => true,
            ContentBlock::ToolUse { id, .. } => Some(id) == tool_use_id.as_ref(),
            _ => false,
        })
        .collect();

    Decision { action, reasoning, tool_use_id, content }
}

/// instructions ⊕ history ⊕ current frame, alternating user/assistant turns.
fn build_conversation(instructions: &str, history: &[TurnRecord], frame: &CapturedFrame) -> Vec<Message> {
    let image = ContentBlock::png(frame.image_base64.clone());
    let mut messages = vec![Message::user(vec![ContentBlock::text(instructions)])];
    let mut pending: Option<String> = None;

    for record in history {
        match &record.kind {
            TurnKind::Decision { tool_use_id, content, .. } => {
                if let Some(id) = pending.take() {
                    messages.push(tool_result(id, NOT_EXECUTED.into(), true));
                }
                messages.push(Message::assistant(content.clone()));
                pending = Some(tool_use_id.clone());
            }
            TurnKind::Outcome { tool_use_id, success, summary } => {
                if pending.as_ref() == Some(tool_use_id) {
                    pending = None;
                    messages.push(tool_result(tool_use_id.clone(), summary.clone(), !success));
                }
            }
        }
    }
    if let Some(id) = pending.take() {
        messages.push(tool_result(id, NOT_EXECUTED.into(), true));
    }

    // The last message is always a user turn: attach the current screen to it.
    if let Some(last) = messages.last_mut() {
        last.content.push(image);
    }
    messages
}

fn tool_result(tool_use_id: String, summary: String, is_error: bool) -> Message {
    Message::user(vec![ContentBlock::ToolResult {
        tool_use_id,
        content: vec![ContentBlock::text(summary)],
        is_error,
    }])
}
