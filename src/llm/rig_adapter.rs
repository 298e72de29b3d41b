//! Bridges a rig-core `CompletionModel` to [`LlmProvider`].
//!
//! Our transcript is flat (`ChatMessage` with roles); rig wants a preamble,
//! a chat history and a final prompt message. System messages become the
//! preamble and consecutive tool results are folded into one user turn, which
//! is how Anthropic expects answers to parallel tool calls.

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::message::{AssistantContent, Message, ToolResultContent, UserContent};
use rig::completion::{self as rig_completion, CompletionError, CompletionModel};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }
}

/// A transcript split the way rig's request builder wants it.
struct RigConversation {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

fn user_turn(content: Vec<UserContent>) -> Result<Message, LlmError> {
    let content = OneOrMany::many(content).map_err(|_| invalid("empty user turn"))?;
    Ok(Message::User { content })
}

fn assistant_turn(message: &ChatMessage) -> Result<Message, LlmError> {
    let mut content = Vec::with_capacity(message.tool_calls.len() + 1);
    if !message.content.trim().is_empty() {
        content.push(AssistantContent::text(message.content.clone()));
    }
    for call in &message.tool_calls {
        content.push(AssistantContent::tool_call(
            call.id.clone(),
            call.name.clone(),
            call.arguments.clone(),
        ));
    }
    let content = OneOrMany::many(content).map_err(|_| invalid("empty assistant turn"))?;
    Ok(Message::Assistant { id: None, content })
}

fn tool_result(message: &ChatMessage) -> Result<UserContent, LlmError> {
    let id = message
        .tool_call_id
        .clone()
        .ok_or_else(|| invalid("tool result without a call id"))?;
    Ok(UserContent::tool_result(
        id,
        OneOrMany::one(ToolResultContent::text(message.content.clone())),
    ))
}

fn to_conversation(messages: &[ChatMessage]) -> Result<RigConversation, LlmError> {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    let mut pending_results: Vec<UserContent> = Vec::new();

    for message in messages {
        if message.role != Role::Tool && !pending_results.is_empty() {
            turns.push(user_turn(std::mem::take(&mut pending_results))?);
        }
        match message.role {
            Role::System => system.push(message.content.clone()),
            Role::User => turns.push(Message::user(message.content.clone())),
            Role::Assistant => turns.push(assistant_turn(message)?),
            Role::Tool => pending_results.push(tool_result(message)?),
        }
    }
    if !pending_results.is_empty() {
        turns.push(user_turn(pending_results)?);
    }

    let prompt = turns.pop().ok_or_else(|| invalid("no messages to send"))?;
    Ok(RigConversation {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    })
}

fn to_rig_tool(tool: &ToolDefinition) -> rig_completion::ToolDefinition {
    rig_completion::ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.parameters.clone(),
    }
}

/// Text and tool calls out of a model reply.
fn from_choice(choice: &OneOrMany<AssistantContent>) -> (Option<String>, Vec<ToolCall>) {
    let mut text = Vec::new();
    let mut calls = Vec::new();
    for content in choice.iter() {
        match content {
            AssistantContent::Text(t) => text.push(t.text.clone()),
            AssistantContent::ToolCall(call) => calls.push(ToolCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            }),
            _ => {}
        }
    }
    let text = (!text.is_empty()).then(|| text.join("\n"));
    (text, calls)
}

fn invalid(reason: &str) -> LlmError {
    LlmError::InvalidResponse {
        provider: "anthropic".to_string(),
        reason: reason.to_string(),
    }
}

fn map_error(error: CompletionError) -> LlmError {
    let provider = "anthropic".to_string();
    match error {
        CompletionError::ProviderError(message) => {
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("authentication") || lowered.contains("401") {
                LlmError::AuthFailed { provider }
            } else if lowered.contains("rate_limit") || lowered.contains("429") {
                LlmError::RateLimited {
                    provider,
                    retry_after: None,
                }
            } else {
                LlmError::RequestFailed {
                    provider,
                    reason: message,
                }
            }
        }
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse { provider, reason },
        CompletionError::JsonError(e) => LlmError::Json(e),
        other => LlmError::RequestFailed {
            provider,
            reason: other.to_string(),
        },
    }
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + Clone + Send + Sync + 'static,
{
    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<(Option<String>, Vec<ToolCall>, u32, u32), LlmError> {
        let conversation = to_conversation(messages)?;

        let mut builder = self
            .model
            .completion_request(conversation.prompt)
            .messages(conversation.history)
            .tools(tools.iter().map(to_rig_tool).collect());
        if let Some(preamble) = conversation.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(map_error)?;
        let (text, calls) = from_choice(&response.choice);
        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        debug!(
            model = %self.model_name,
            input_tokens,
            output_tokens,
            tool_calls = calls.len(),
            "LLM response"
        );
        Ok((text, calls, input_tokens, output_tokens))
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Clone + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model_name)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (text, _, input_tokens, output_tokens) = self
            .send(
                &request.messages,
                &[],
                request.temperature,
                request.max_tokens,
            )
            .await?;
        Ok(CompletionResponse {
            content: text.unwrap_or_default(),
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let (content, tool_calls, input_tokens, output_tokens) = self
            .send(
                &request.messages,
                &request.tools,
                request.temperature,
                request.max_tokens,
            )
            .await?;
        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        };
        Ok(ToolCompletionResponse {
            content,
            tool_calls,
            input_tokens,
            output_tokens,
            finish_reason,
            response_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn move_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "archive_move_to_folder".to_string(),
            arguments: json!({"file_id": "file-1", "path": "2024/2024-01/Banking"}),
        }
    }

    fn user_contents(message: &Message) -> Vec<UserContent> {
        match message {
            Message::User { content, .. } => content.iter().cloned().collect(),
            other => panic!("expected user turn, got {other:?}"),
        }
    }

    #[test]
    fn system_messages_become_preamble() {
        let conversation = to_conversation(&[
            ChatMessage::system("policy"),
            ChatMessage::user("archive file-1"),
        ])
        .unwrap();
        assert_eq!(conversation.preamble.as_deref(), Some("policy"));
        assert!(conversation.history.is_empty());
        assert_eq!(user_contents(&conversation.prompt).len(), 1);
    }

    #[test]
    fn tool_results_fold_into_one_turn() {
        let conversation = to_conversation(&[
            ChatMessage::user("archive file-1"),
            ChatMessage::assistant_with_tool_calls(None, vec![move_call("tu_1"), move_call("tu_2")]),
            ChatMessage::tool_result("tu_1", "archive_move_to_folder", "queued"),
            ChatMessage::tool_result("tu_2", "archive_move_to_folder", "queued"),
        ])
        .unwrap();

        assert_eq!(conversation.history.len(), 2);
        let results = user_contents(&conversation.prompt);
        assert_eq!(results.len(), 2);
        match &results[0] {
            UserContent::ToolResult(result) => assert_eq!(result.id, "tu_1"),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[test]
    fn tool_result_needs_call_id() {
        let mut orphan = ChatMessage::tool_result("x", "archive_move_to_folder", "queued");
        orphan.tool_call_id = None;
        assert!(to_conversation(&[ChatMessage::user("hi"), orphan]).is_err());
    }

    #[test]
    fn empty_transcript_is_rejected() {
        assert!(to_conversation(&[ChatMessage::system("policy")]).is_err());
    }

    #[test]
    fn reply_splits_text_and_calls() {
        let choice = OneOrMany::many(vec![
            AssistantContent::text("Filing under Banking."),
            AssistantContent::tool_call("tu_1", "archive_move_to_folder", json!({"file_id": "file-1"})),
        ])
        .unwrap();
        let (text, calls) = from_choice(&choice);
        assert_eq!(text.as_deref(), Some("Filing under Banking."));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[0].arguments["file_id"], "file-1");
    }

    #[test]
    fn provider_errors_are_classified() {
        assert!(matches!(
            map_error(CompletionError::ProviderError(
                r#"{"type":"authentication_error"}"#.into()
            )),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            map_error(CompletionError::ProviderError("rate_limit_error".into())),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            map_error(CompletionError::ResponseError("no content".into())),
            LlmError::InvalidResponse { .. }
        ));
    }
}
