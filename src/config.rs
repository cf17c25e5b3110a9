//! Configuration types.
//!
//! Everything here is read once at startup and handed to the components that
//! need it. Nothing is mutated while messages are being handled.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Fixed persona for the generative fallback.
pub const DEFAULT_SYSTEM_PERSONA: &str = "你是一個專業的醫療輔助機器人，只能回答與醫療相關的問題。\
請根據你的知識，提供準確、簡潔、符合醫療建議的回答。\
如果問題超出你的專業範圍，請回答「抱歉，我無法回答這個問題，請諮詢專業醫生。」";

/// Refusal the persona is instructed to use for out-of-scope questions.
pub const PERSONA_REFUSAL: &str = "抱歉，我無法回答這個問題，請諮詢專業醫生。";

/// Default generative model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Behaviour switches for the triage conversation.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Whether the bot replies at all. Disabled deployments log and drop
    /// inbound messages.
    pub talking_enabled: bool,
    /// Route unrecognized free text at the category stage to the fallback
    /// instead of re-prompting.
    pub free_text_fallback: bool,
    /// Override for the remedy monograph file.
    pub remedies_path: Option<PathBuf>,
    /// Override for the symptom taxonomy file.
    pub taxonomy_path: Option<PathBuf>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            talking_enabled: true,
            free_text_fallback: false,
            remedies_path: None,
            taxonomy_path: None,
        }
    }
}

impl TriageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // DEFALUT_TALKING is the spelling older deployments were configured with.
        let talking_enabled = match std::env::var("DEFAULT_TALKING")
            .or_else(|_| std::env::var("DEFALUT_TALKING"))
        {
            Ok(v) => parse_bool("DEFAULT_TALKING", &v)?,
            Err(_) => true,
        };

        let free_text_fallback = match std::env::var("TRIAGE_FREE_TEXT_FALLBACK") {
            Ok(v) => parse_bool("TRIAGE_FREE_TEXT_FALLBACK", &v)?,
            Err(_) => false,
        };

        Ok(Self {
            talking_enabled,
            free_text_fallback,
            remedies_path: std::env::var("TRIAGE_REMEDIES_PATH").ok().map(PathBuf::from),
            taxonomy_path: std::env::var("TRIAGE_TAXONOMY_PATH").ok().map(PathBuf::from),
        })
    }
}

/// Decoding parameters and persona for the generative fallback.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub system_persona: String,
    /// Upper bound on a single fallback call.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 0.2,
            top_p: 0.5,
            top_k: 16,
            system_persona: DEFAULT_SYSTEM_PERSONA.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("TRIAGE_FALLBACK_TIMEOUT_SECS") {
            let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRIAGE_FALLBACK_TIMEOUT_SECS".to_string(),
                message: format!("expected whole seconds, got {v:?}"),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Credentials and model for the generative provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_API_KEY".to_string()))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("TRIAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }
}

/// LINE Messaging API credentials.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_secret: SecretString,
    pub access_token: SecretString,
    pub api_base: String,
}

impl LineConfig {
    /// Returns `None` when the channel is not configured.
    pub fn from_env() -> Option<Self> {
        let access_token = std::env::var("CHANNEL_ACCESS_TOKEN").ok()?;
        let channel_secret = std::env::var("CHANNEL_SECRET").ok()?;

        Some(Self {
            channel_secret: SecretString::from(channel_secret),
            access_token: SecretString::from(access_token),
            api_base: std::env::var("LINE_API_BASE")
                .unwrap_or_else(|_| crate::channels::line::DEFAULT_API_BASE.to_string()),
        })
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cli_enabled: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("TRIAGE_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRIAGE_PORT".to_string(),
                message: format!("expected a port number, got {v:?}"),
            })?,
            Err(_) => 8000,
        };
        let cli_enabled = match std::env::var("TRIAGE_CLI") {
            Ok(v) => parse_bool("TRIAGE_CLI", &v)?,
            Err(_) => false,
        };
        Ok(Self { port, cli_enabled })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got {value:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults_match_reference_deployment() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_output_tokens, 2048);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.top_p - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.top_k, 16);
        assert!(config.system_persona.contains(PERSONA_REFUSAL));
    }

    #[test]
    fn triage_defaults() {
        let config = TriageConfig::default();
        assert!(config.talking_enabled);
        assert!(!config.free_text_fallback);
        assert!(config.remedies_path.is_none());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(parse_bool("K", " yes ").unwrap());
        assert!(!parse_bool("K", "false").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        let err = parse_bool("K", "maybe").unwrap_err();
        assert!(err.to_string().contains("K"));
    }
}
