//! Error types for the triage bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Integrity defects in the remedy data or the symptom taxonomy.
///
/// These are detected while loading, before any traffic is served.
#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    #[error("Failed to read data file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Taxonomy declares no categories")]
    NoCategories,

    #[error("Invalid code {code:?} for {context}: expected a single uppercase letter")]
    InvalidCode { context: String, code: String },

    #[error("Category code {0} is declared more than once")]
    DuplicateCategory(String),

    #[error("Reserved token {token:?} cannot be used as {context}")]
    ReservedToken { token: String, context: String },

    #[error("Category {0} has no symptoms")]
    EmptyCategory(String),

    #[error("Symptom {symptom} is declared in categories {first} and {second}")]
    DuplicateSymptom {
        symptom: String,
        first: String,
        second: String,
    },

    #[error("Symptom {0} has neither a direct remedy nor variants")]
    UnmappedSymptom(String),

    #[error("Symptom {0} has both a direct remedy and variants")]
    AmbiguousSymptom(String),

    #[error("Symptom {0} declares an empty variant list")]
    EmptyVariants(String),

    #[error("Table entry refers to undeclared symptom {0}")]
    UndeclaredSymptom(String),

    #[error("Variant {symptom}_{code} has no remedy mapping")]
    VariantWithoutRemedy { symptom: String, code: String },

    #[error("Remedy mapping {0} has no declared variant")]
    RemedyWithoutVariant(String),

    #[error("Malformed variant key {0:?}: expected Symptom_Code")]
    MalformedVariantKey(String),

    #[error("Remedy {remedy} referenced by {referenced_by} is missing from the knowledge base")]
    MissingRemedy {
        remedy: String,
        referenced_by: String,
    },

    #[error("Monograph {0} has no sections")]
    EmptyMonograph(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("No channel named {0}")]
    UnknownChannel(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Failure outcomes of a fallback generation.
///
/// Never shown to the user; the fallback adapter maps every variant to the
/// fixed apology text.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider returned empty content")]
    Empty,

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),
}
