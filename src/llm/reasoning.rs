//! Tool-calling turns against an LLM provider.
//!
//! [`Reasoning`] holds the fixed half of a conversation (system prompt,
//! sampling settings and tool list). Each turn sends the running transcript
//! and reports whether the model asked for tools or stopped.

use std::ops::AddAssign;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition};

/// Tokens spent, summed across turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Cost at `(input, output)` per-token rates.
    pub fn cost(&self, rates: (Decimal, Decimal)) -> Decimal {
        let (input, output) = rates;
        input * Decimal::from(self.input_tokens) + output * Decimal::from(self.output_tokens)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Stopped calling tools; the text is its closing remark.
    Done(String),
    Calls {
        calls: Vec<ToolCall>,
        /// Text sent alongside the calls, if any.
        content: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub turn: Turn,
    pub usage: TokenUsage,
}

pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    system_prompt: Option<String>,
    tools: Vec<ToolDefinition>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            system_prompt: None,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn cost(&self, usage: TokenUsage) -> Decimal {
        usage.cost(self.llm.cost_per_token())
    }

    /// Send the system prompt plus `transcript` and read one turn back.
    pub async fn next_turn(&self, transcript: &[ChatMessage]) -> Result<TurnOutput, LlmError> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if let Some(ref prompt) = self.system_prompt {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend_from_slice(transcript);

        let mut request = ToolCompletionRequest::new(messages, self.tools.clone());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let response = self.llm.complete_with_tools(request).await?;
        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        };
        let turn = if response.tool_calls.is_empty() {
            Turn::Done(response.content.unwrap_or_default())
        } else {
            Turn::Calls {
                calls: response.tool_calls,
                content: response.content,
            }
        };
        Ok(TurnOutput { turn, usage })
    }
}
