//! Bridges rig's `CompletionModel` to [`LlmProvider`].

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use serde_json::{Value, json};

use crate::error::LlmError;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig completion model behind our provider trait.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// A request reshaped into rig's preamble / history / prompt triple.
#[derive(Debug, PartialEq)]
struct Prepared {
    preamble: Option<String>,
    history: Vec<ChatMessage>,
    prompt: String,
}

/// System messages fold into the preamble; the final user turn is the prompt.
fn prepare(messages: &[ChatMessage]) -> Result<Prepared, LlmError> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let mut turns: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    let prompt = match turns.pop() {
        Some(last) if last.role == Role::User => last.content,
        _ => {
            return Err(LlmError::RequestFailed {
                provider: "rig".to_string(),
                reason: "request must end with a user message".to_string(),
            });
        }
    };

    Ok(Prepared {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    })
}

/// Sampling knobs rig has no first-class setter for, in Gemini's shape.
fn generation_params(request: &CompletionRequest) -> Option<Value> {
    let mut config = serde_json::Map::new();
    if let Some(k) = request.top_k {
        config.insert("topK".to_string(), json!(k));
    }
    if let Some(p) = request.top_p {
        config.insert("topP".to_string(), json!(p));
    }
    if let Some(n) = request.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(n));
    }
    if let Some(t) = request.temperature {
        config.insert("temperature".to_string(), json!(t));
    }
    (!config.is_empty()).then(|| json!({ "generationConfig": config }))
}

fn to_rig(message: &ChatMessage) -> Message {
    match message.role {
        Role::Assistant => Message::assistant(message.content.clone()),
        Role::User | Role::System => Message::user(message.content.clone()),
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prepared = prepare(&request.messages)?;

        let mut builder = self
            .model
            .completion_request(Message::user(prepared.prompt))
            .messages(prepared.history.iter().map(to_rig).collect());
        if let Some(preamble) = prepared.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(t) = request.temperature {
            builder = builder.temperature(f64::from(t));
        }
        if let Some(n) = request.max_tokens {
            builder = builder.max_tokens(u64::from(n));
        }
        if let Some(params) = generation_params(&request) {
            builder = builder.additional_params(params);
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect();

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "no text in completion".to_string(),
            });
        }

        tracing::debug!(
            model = %self.model_name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}
