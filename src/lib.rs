//! Herb Triage. Menu-driven symptom triage bot with a generative fallback.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod taxonomy;
pub mod triage;
