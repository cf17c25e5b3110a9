//! LLM integration.
//!
//! The triage engine only talks to [`FallbackAdapter`]; the adapter talks to
//! whichever [`LlmProvider`] was configured at startup. Transport is rig-core,
//! bridged to our trait by [`RigAdapter`].

pub mod fallback;
pub mod provider;
mod rig_adapter;

pub use fallback::{FallbackAdapter, FallbackReply};
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::ProviderConfig;
use crate::error::LlmError;

/// Create the Gemini provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::gemini;

    let client: gemini::Client =
        gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: format!("Failed to create Gemini client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
