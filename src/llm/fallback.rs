//! Generative fallback. Answers questions the menu cannot.
//!
//! Wraps a provider with the fixed persona and decoding parameters. Every
//! failure (provider error, timeout, empty text) ends here as
//! [`FallbackReply::Apology`]; nothing from the provider leaks to the user.

use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

use super::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// What the user gets back from the fallback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReply {
    Generated(String),
    Apology,
}

pub struct FallbackAdapter {
    llm: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl FallbackAdapter {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    fn request(&self, text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(&self.config.system_persona),
            ChatMessage::user(text),
        ])
        .with_max_tokens(self.config.max_output_tokens)
        .with_temperature(self.config.temperature)
        .with_top_p(self.config.top_p)
        .with_top_k(self.config.top_k)
    }

    /// One bounded generation call.
    pub async fn generate(&self, text: &str) -> Result<String, GenerationError> {
        let response = tokio::time::timeout(self.config.timeout, self.llm.complete(self.request(text)))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.timeout))??;

        let content = response.content.trim();
        if content.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(content.to_string())
    }

    pub async fn respond(&self, text: &str) -> FallbackReply {
        match self.generate(text).await {
            Ok(text) => FallbackReply::Generated(text),
            Err(e) => {
                tracing::warn!(model = %self.llm.model_name(), error = %e, "Fallback generation failed");
                FallbackReply::Apology
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, Role};

    /// Returns a fixed reply and records the last request.
    struct CannedLlm {
        reply: Result<String, ()>,
        delay: Duration,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl CannedLlm {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                last: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                delay: Duration::ZERO,
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 0,
                    output_tokens: 0,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "canned".to_string(),
                    reason: "boom".to_string(),
                }),
            }
        }
    }

    fn adapter(llm: Arc<CannedLlm>) -> FallbackAdapter {
        FallbackAdapter::new(llm, GenerationConfig::default())
    }

    #[tokio::test]
    async fn generated_text_is_trimmed() {
        let llm = Arc::new(CannedLlm::ok("  建議多補充水分。\n"));
        let reply = adapter(llm).respond("喉嚨乾").await;
        assert_eq!(reply, FallbackReply::Generated("建議多補充水分。".to_string()));
    }

    #[tokio::test]
    async fn request_carries_persona_and_decoding_params() {
        let llm = Arc::new(CannedLlm::ok("ok"));
        adapter(Arc::clone(&llm)).respond("頭痛").await;

        let request = llm.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("醫療輔助機器人"));
        assert_eq!(request.messages[1], ChatMessage::user("頭痛"));
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.top_p, Some(0.5));
        assert_eq!(request.top_k, Some(16));
    }

    #[tokio::test]
    async fn empty_text_becomes_apology() {
        let llm = Arc::new(CannedLlm::ok("   "));
        let adapter = adapter(llm);
        assert!(matches!(adapter.generate("?").await, Err(GenerationError::Empty)));
        let reply = adapter.respond("?").await;
        assert_eq!(reply, FallbackReply::Apology);
    }

    #[tokio::test]
    async fn provider_error_becomes_apology() {
        let adapter = adapter(Arc::new(CannedLlm::failing()));
        assert!(matches!(
            adapter.generate("?").await,
            Err(GenerationError::Provider(LlmError::RequestFailed { .. }))
        ));
        assert_eq!(adapter.respond("?").await, FallbackReply::Apology);
    }

    #[tokio::test]
    async fn timeout_becomes_apology() {
        let llm = Arc::new(CannedLlm {
            delay: Duration::from_secs(5),
            ..CannedLlm::ok("too late")
        });
        let config = GenerationConfig {
            timeout: Duration::from_millis(20),
            ..GenerationConfig::default()
        };
        let adapter = FallbackAdapter::new(llm, config);
        assert!(matches!(adapter.generate("?").await, Err(GenerationError::Timeout(_))));
        assert_eq!(adapter.respond("?").await, FallbackReply::Apology);
    }
}
