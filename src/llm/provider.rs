use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::{MessagesRequest, MessagesResponse};

/// Transport to the remote decision service.
///
/// Implementations return `Transport`/`Http` errors for anything that kept the
/// request from completing and `Protocol` for a body that is not a
/// Messages API payload. Interpreting the content is left to `DecisionClient`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn create_message(&self, request: &MessagesRequest) -> DeskPilotResult<MessagesResponse>;
}
