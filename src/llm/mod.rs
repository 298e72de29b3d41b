//! LLM access for the planner.
//!
//! rig-core carries the HTTP transport; [`RigAdapter`] bridges its
//! `CompletionModel` to [`LlmProvider`] so planner tests can script responses.

mod costs;
pub mod provider;
pub mod reasoning;
mod rig_adapter;

pub use provider::*;
pub use reasoning::{Reasoning, TokenUsage, Turn, TurnOutput};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::LlmError;

/// Model used when `ARCHIVE_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Build the provider the planner will call.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let model = config.model.trim();
    if model.is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: "no model configured".to_string(),
        });
    }

    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config.api_key.expose_secret(), model),
    }
}

fn create_anthropic_provider(api_key: &str, model: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key).map_err(|e| LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: format!("could not create Anthropic client: {e}"),
        })?;

    info!(model = %model, "Planner LLM: Anthropic");
    Ok(Arc::new(RigAdapter::new(client.completion_model(model), model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> LlmConfig {
        LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from("sk-ant-test"),
            model: model.to_string(),
        }
    }

    #[test]
    fn provider_uses_configured_model() {
        let provider = create_provider(&config(DEFAULT_MODEL)).unwrap();
        assert_eq!(provider.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn blank_model_is_rejected() {
        assert!(create_provider(&config("  ")).is_err());
    }
}
