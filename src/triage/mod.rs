//! Triage conversation. Menus, per-session state, and the engine that ties
//! them to the knowledge base and the generative fallback.
//!
//! A conversation picks a category, then a symptom, then (for symptoms with
//! variants) a lettered variant, and ends with one remedy monograph. `無` ends
//! it without a match; `X` hands the question to the fallback.

pub mod engine;
pub mod prompts;
pub mod state;

pub use engine::{Outcome, TriageEngine, TriageReply};
pub use state::{RESTART_TOKEN, Session, Stage, Transition};
