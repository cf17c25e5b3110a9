//! TriageEngine. Owns the sessions and turns one inbound text into one reply.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::knowledge::{KnowledgeBase, RemedyKey};
use crate::llm::{FallbackAdapter, FallbackReply};
use crate::taxonomy::Taxonomy;

use super::prompts;
use super::state::{Session, Stage, Transition};

/// How an inbound message was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A menu or question was shown; the session waits at `Stage`.
    Prompted(Stage),
    /// Terminal: a remedy monograph was sent.
    Matched(RemedyKey),
    /// Terminal: the closing message was sent.
    NoMatch,
    /// Terminal: generated text from the fallback was sent.
    Generated,
    /// Terminal: a generation or data failure was answered with the apology.
    Apology,
}

/// Reply text plus what produced it.
#[derive(Debug, Clone)]
pub struct TriageReply {
    pub text: String,
    pub outcome: Outcome,
}

pub struct TriageEngine {
    taxonomy: Arc<Taxonomy>,
    knowledge: Arc<KnowledgeBase>,
    fallback: Arc<FallbackAdapter>,
    free_text_fallback: bool,
    /// The map lock is held only to fetch, insert or drop a handle; each
    /// session's own mutex orders that conversation's messages. Only sessions
    /// mid-conversation have an entry.
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl TriageEngine {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        knowledge: Arc<KnowledgeBase>,
        fallback: Arc<FallbackAdapter>,
    ) -> Self {
        Self {
            taxonomy,
            knowledge,
            fallback,
            free_text_fallback: false,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Route unrecognized free text at the category stage to the fallback.
    pub fn with_free_text_fallback(mut self, enabled: bool) -> Self {
        self.free_text_fallback = enabled;
        self
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Handle one inbound text and return the text to send back.
    pub async fn handle_inbound(&self, session_id: &str, text: &str) -> String {
        self.handle(session_id, text).await.text
    }

    /// Like [`handle_inbound`](Self::handle_inbound), but also reports the outcome.
    pub async fn handle(&self, session_id: &str, text: &str) -> TriageReply {
        let handle = self.session_handle(session_id).await;
        let (reply, idle) = {
            let mut session = handle.lock().await;
            let reply = self.step(session_id, &mut session, text).await;
            (reply, *session == Session::new())
        };
        if idle {
            self.release(session_id, handle).await;
        }
        reply
    }

    async fn step(&self, session_id: &str, session: &mut Session, text: &str) -> TriageReply {
        let before = session.stage;

        let transition = match session.apply(&self.taxonomy, text, self.free_text_fallback) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(session = %session_id, stage = %before, error = %e, "Taxonomy integrity failure");
                *session = Session::new();
                return TriageReply {
                    text: prompts::APOLOGY.to_string(),
                    outcome: Outcome::Apology,
                };
            }
        };

        tracing::debug!(session = %session_id, from = %before, to = %session.stage, "Triage transition");

        let reply = match transition {
            Transition::Reprompt => self.reprompt(session),
            Transition::Restart => TriageReply {
                text: prompts::category_menu(&self.taxonomy),
                outcome: Outcome::Prompted(Stage::AwaitingCategory),
            },
            Transition::SymptomMenu { category } => {
                match prompts::symptom_menu(&self.taxonomy, &category) {
                    Some(text) => TriageReply {
                        text,
                        outcome: Outcome::Prompted(Stage::AwaitingSymptom),
                    },
                    None => self.reprompt(session),
                }
            }
            Transition::VariantMenu { symptom } => {
                match prompts::variant_menu(&self.taxonomy, &symptom) {
                    Some(text) => TriageReply {
                        text,
                        outcome: Outcome::Prompted(Stage::AwaitingVariant),
                    },
                    None => self.reprompt(session),
                }
            }
            Transition::AskQuestion => TriageReply {
                text: prompts::ask_question(),
                outcome: Outcome::Prompted(Stage::AwaitingQuestion),
            },
            Transition::Matched(key) => match self.knowledge.lookup(key.as_str()) {
                Some(monograph) => {
                    tracing::info!(session = %session_id, remedy = %key, "Triage matched remedy");
                    TriageReply {
                        text: monograph.render(&key),
                        outcome: Outcome::Matched(key),
                    }
                }
                None => {
                    tracing::error!(session = %session_id, remedy = %key, "Resolved remedy has no monograph");
                    TriageReply {
                        text: prompts::APOLOGY.to_string(),
                        outcome: Outcome::Apology,
                    }
                }
            },
            Transition::NoMatch => {
                tracing::info!(session = %session_id, "Triage ended without a match");
                TriageReply {
                    text: prompts::no_match(),
                    outcome: Outcome::NoMatch,
                }
            }
            Transition::Fallback(question) => {
                tracing::info!(session = %session_id, "Routing to generative fallback");
                match self.fallback.respond(&question).await {
                    FallbackReply::Generated(text) => TriageReply {
                        text,
                        outcome: Outcome::Generated,
                    },
                    FallbackReply::Apology => TriageReply {
                        text: prompts::APOLOGY.to_string(),
                        outcome: Outcome::Apology,
                    },
                }
            }
        };

        if session.stage.is_terminal() {
            *session = Session::new();
        }
        reply
    }

    /// Current stage of a session. Sessions without state sit at the category menu.
    pub async fn stage(&self, session_id: &str) -> Stage {
        let Some(handle) = self.sessions.read().await.get(session_id).cloned() else {
            return Stage::AwaitingCategory;
        };
        let session = handle.lock().await;
        session.stage
    }

    /// Drop a session; the next message starts from the category menu.
    pub async fn reset(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop a session that has gone back to its initial state, unless another
    /// message for it is already holding or waiting on the handle.
    async fn release(&self, session_id: &str, handle: Arc<Mutex<Session>>) {
        let mut sessions = self.sessions.write().await;
        let Some(current) = sessions.get(session_id) else {
            return;
        };
        // One count for the map entry, one for `handle`.
        if !Arc::ptr_eq(current, &handle) || Arc::strong_count(&handle) > 2 {
            return;
        }
        let idle = handle
            .try_lock()
            .map(|session| *session == Session::new())
            .unwrap_or(false);
        if idle {
            sessions.remove(session_id);
        }
    }

    async fn session_handle(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return Arc::clone(handle);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new()))),
        )
    }

    /// Re-send the menu for the stage the session is waiting at.
    fn reprompt(&self, session: &Session) -> TriageReply {
        let text = match session.stage {
            Stage::AwaitingSymptom => session
                .category
                .as_deref()
                .and_then(|c| prompts::symptom_menu(&self.taxonomy, c)),
            Stage::AwaitingVariant => session
                .symptom
                .as_deref()
                .and_then(|s| prompts::variant_menu(&self.taxonomy, s)),
            Stage::AwaitingQuestion => Some(prompts::ask_question()),
            _ => None,
        };

        match text {
            Some(text) => TriageReply {
                text,
                outcome: Outcome::Prompted(session.stage),
            },
            None => TriageReply {
                text: prompts::category_menu(&self.taxonomy),
                outcome: Outcome::Prompted(Stage::AwaitingCategory),
            },
        }
    }
}
