//! Triage state machine. Tracks where one conversation is in the menu.
//!
//! Transitions are pure: [`Session::apply`] takes the taxonomy and one line of
//! user input and returns what happened. Rendering replies and calling the
//! generative fallback is left to the engine.

use serde::{Deserialize, Serialize};

use crate::error::TaxonomyError;
use crate::knowledge::RemedyKey;
use crate::taxonomy::{BYPASS_TOKEN, NONE_TOKEN, SymptomKind, Taxonomy};

/// Discards the current session from any stage and shows the category menu.
pub const RESTART_TOKEN: &str = "重新開始";

/// The stages of one triage traversal.
///
/// AwaitingCategory → AwaitingSymptom → AwaitingVariant → Matched, with
/// AwaitingVariant skipped for direct symptoms. NoMatch is reachable from
/// every waiting stage; the bypass token leads to AwaitingQuestion or
/// straight to Fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    AwaitingCategory,
    AwaitingSymptom,
    AwaitingVariant,
    /// The user bypassed the menu and is about to describe the problem.
    AwaitingQuestion,
    Matched,
    NoMatch,
    Fallback,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (AwaitingCategory, AwaitingSymptom)
                | (AwaitingSymptom, AwaitingVariant)
                | (AwaitingSymptom, Matched)
                | (AwaitingVariant, Matched)
                | (AwaitingCategory | AwaitingSymptom | AwaitingVariant, NoMatch)
                | (
                    AwaitingCategory | AwaitingSymptom | AwaitingVariant,
                    AwaitingQuestion
                )
                | (
                    AwaitingCategory | AwaitingSymptom | AwaitingVariant | AwaitingQuestion,
                    Fallback
                )
        )
    }

    /// Whether this stage ends the traversal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched | Self::NoMatch | Self::Fallback)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingCategory => "awaiting_category",
            Self::AwaitingSymptom => "awaiting_symptom",
            Self::AwaitingVariant => "awaiting_variant",
            Self::AwaitingQuestion => "awaiting_question",
            Self::Matched => "matched",
            Self::NoMatch => "no_match",
            Self::Fallback => "fallback",
        };
        write!(f, "{s}")
    }
}

/// What one input did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Input outside the legal option set; the stage is unchanged.
    Reprompt,
    /// A category was chosen; show its symptoms.
    SymptomMenu { category: String },
    /// A variant symptom was chosen; show its variants.
    VariantMenu { symptom: String },
    /// Terminal: the selection resolved to a remedy.
    Matched(RemedyKey),
    /// Terminal: the user said none of the options fit.
    NoMatch,
    /// Bare bypass; ask the user to describe the problem.
    AskQuestion,
    /// Terminal: send this text to the generative fallback.
    Fallback(String),
    /// The session was discarded on request.
    Restart,
}

/// Per-conversation triage state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub stage: Stage,
    /// Code of the selected category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptom: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of user input through the state machine.
    ///
    /// `free_text_fallback` routes unrecognized multi-character text at the
    /// category stage to the fallback instead of re-prompting. An `Err` means
    /// a validated selection failed to resolve, which is a data defect rather
    /// than a user mistake.
    pub fn apply(
        &mut self,
        taxonomy: &Taxonomy,
        input: &str,
        free_text_fallback: bool,
    ) -> Result<Transition, TaxonomyError> {
        if self.stage.is_terminal() {
            *self = Session::new();
        }

        let input = input.trim();
        if input.is_empty() {
            return Ok(Transition::Reprompt);
        }

        if input == RESTART_TOKEN {
            *self = Session::new();
            return Ok(Transition::Restart);
        }

        if self.stage == Stage::AwaitingQuestion {
            self.move_to(Stage::Fallback);
            return Ok(Transition::Fallback(input.to_string()));
        }

        if let Some(question) = strip_bypass(input) {
            return Ok(if question.is_empty() {
                self.move_to(Stage::AwaitingQuestion);
                Transition::AskQuestion
            } else {
                self.move_to(Stage::Fallback);
                Transition::Fallback(question.to_string())
            });
        }

        if input == NONE_TOKEN {
            self.move_to(Stage::NoMatch);
            return Ok(Transition::NoMatch);
        }

        match self.stage {
            Stage::AwaitingCategory => {
                if taxonomy.category(input).is_some() {
                    self.category = Some(input.to_string());
                    self.move_to(Stage::AwaitingSymptom);
                    Ok(Transition::SymptomMenu {
                        category: input.to_string(),
                    })
                } else if free_text_fallback && is_free_text(input) {
                    self.move_to(Stage::Fallback);
                    Ok(Transition::Fallback(input.to_string()))
                } else {
                    Ok(Transition::Reprompt)
                }
            }
            Stage::AwaitingSymptom => {
                let Some(category) = self.category.as_deref() else {
                    *self = Session::new();
                    return Ok(Transition::Reprompt);
                };
                let Some(symptom) = taxonomy.symptom_in(category, input) else {
                    return Ok(Transition::Reprompt);
                };

                self.symptom = Some(symptom.name.clone());
                match &symptom.kind {
                    SymptomKind::Direct(_) => {
                        let remedy = taxonomy
                            .resolve(&symptom.name, None)
                            .cloned()
                            .ok_or_else(|| TaxonomyError::UnmappedSymptom(symptom.name.clone()))?;
                        self.move_to(Stage::Matched);
                        Ok(Transition::Matched(remedy))
                    }
                    SymptomKind::Variants(_) => {
                        self.move_to(Stage::AwaitingVariant);
                        Ok(Transition::VariantMenu {
                            symptom: symptom.name.clone(),
                        })
                    }
                }
            }
            Stage::AwaitingVariant => {
                let Some(name) = self.symptom.as_deref() else {
                    *self = Session::new();
                    return Ok(Transition::Reprompt);
                };
                let Some(symptom) = taxonomy.symptom(name) else {
                    return Err(TaxonomyError::UndeclaredSymptom(name.to_string()));
                };
                if symptom.variant(input).is_none() {
                    return Ok(Transition::Reprompt);
                }

                let remedy = taxonomy.resolve(name, Some(input)).cloned().ok_or_else(|| {
                    TaxonomyError::VariantWithoutRemedy {
                        symptom: name.to_string(),
                        code: input.to_string(),
                    }
                })?;
                self.move_to(Stage::Matched);
                Ok(Transition::Matched(remedy))
            }
            // Handled above.
            Stage::AwaitingQuestion | Stage::Matched | Stage::NoMatch | Stage::Fallback => {
                Ok(Transition::Reprompt)
            }
        }
    }

    fn move_to(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal triage transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
    }
}

/// `X` alone, or `X` followed by whitespace and a question.
fn strip_bypass(input: &str) -> Option<&str> {
    let rest = input.strip_prefix(BYPASS_TOKEN)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Anything other than a lone ASCII character counts as free text, so a
/// mistyped menu letter still gets the menu back.
fn is_free_text(input: &str) -> bool {
    let mut chars = input.chars();
    !matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;

    fn taxonomy() -> Taxonomy {
        let kb = KnowledgeBase::builtin().unwrap();
        Taxonomy::builtin(&kb).unwrap()
    }

    fn run(session: &mut Session, inputs: &[&str]) -> Transition {
        let taxonomy = taxonomy();
        let mut last = Transition::Reprompt;
        for input in inputs {
            last = session.apply(&taxonomy, input, false).unwrap();
        }
        last
    }

    #[test]
    fn valid_transitions() {
        use Stage::*;
        let transitions = [
            (AwaitingCategory, AwaitingSymptom),
            (AwaitingSymptom, AwaitingVariant),
            (AwaitingSymptom, Matched),
            (AwaitingVariant, Matched),
            (AwaitingCategory, NoMatch),
            (AwaitingVariant, NoMatch),
            (AwaitingSymptom, AwaitingQuestion),
            (AwaitingQuestion, Fallback),
            (AwaitingCategory, Fallback),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use Stage::*;
        assert!(!AwaitingCategory.can_transition_to(AwaitingVariant));
        assert!(!AwaitingCategory.can_transition_to(Matched));
        assert!(!AwaitingVariant.can_transition_to(AwaitingSymptom));
        assert!(!AwaitingQuestion.can_transition_to(Matched));
        assert!(!Matched.can_transition_to(AwaitingCategory));
        assert!(!AwaitingSymptom.can_transition_to(AwaitingSymptom));
    }

    #[test]
    fn terminal_stages() {
        use Stage::*;
        assert!(Matched.is_terminal());
        assert!(NoMatch.is_terminal());
        assert!(Fallback.is_terminal());
        assert!(!AwaitingCategory.is_terminal());
        assert!(!AwaitingQuestion.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        use Stage::*;
        for stage in [
            AwaitingCategory,
            AwaitingSymptom,
            AwaitingVariant,
            AwaitingQuestion,
            Matched,
            NoMatch,
            Fallback,
        ] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(format!("\"{stage}\""), json);
        }
    }

    #[test]
    fn variant_path_resolves_mint() {
        let mut session = Session::new();
        let t = run(&mut session, &["A", "感冒"]);
        assert_eq!(t, Transition::VariantMenu { symptom: "感冒".to_string() });
        assert_eq!(session.stage, Stage::AwaitingVariant);

        let t = run(&mut session, &["B"]);
        assert_eq!(t, Transition::Matched(RemedyKey::new("薄荷")));
        assert_eq!(session.stage, Stage::Matched);
    }

    #[test]
    fn direct_symptom_skips_variant_stage() {
        let mut session = Session::new();
        let t = run(&mut session, &["B", "便秘"]);
        assert_eq!(t, Transition::Matched(RemedyKey::new("蘆薈")));
    }

    #[test]
    fn none_token_ends_without_match() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["B", "無"]), Transition::NoMatch);
        assert_eq!(session.stage, Stage::NoMatch);

        let mut session = Session::new();
        assert_eq!(run(&mut session, &["A", "感冒", "無"]), Transition::NoMatch);
    }

    #[test]
    fn invalid_category_stays_put() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["Z"]), Transition::Reprompt);
        assert_eq!(session, Session::new());
        // Lowercase letters are not category tokens.
        assert_eq!(run(&mut session, &["a"]), Transition::Reprompt);
        assert_eq!(session.stage, Stage::AwaitingCategory);
    }

    #[test]
    fn symptom_from_other_category_is_rejected() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["B", "感冒"]), Transition::Reprompt);
        assert_eq!(session.stage, Stage::AwaitingSymptom);
        assert_eq!(session.category.as_deref(), Some("B"));
    }

    #[test]
    fn unknown_variant_code_stays_put() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["A", "咳嗽", "E"]), Transition::Reprompt);
        assert_eq!(session.stage, Stage::AwaitingVariant);
        assert_eq!(session.symptom.as_deref(), Some("咳嗽"));
    }

    #[test]
    fn repeated_selection_has_no_hidden_effect() {
        let mut once = Session::new();
        run(&mut once, &["A"]);
        let mut twice = Session::new();
        // The second "A" is not a symptom name, so it only re-prompts.
        assert_eq!(run(&mut twice, &["A", "A"]), Transition::Reprompt);
        assert_eq!(once, twice);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let mut session = Session::new();
        let t = run(&mut session, &["  A ", "\t感冒\n", " E "]);
        assert_eq!(t, Transition::Matched(RemedyKey::new("蚌蘭")));
    }

    #[test]
    fn bypass_from_any_stage() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["X"]), Transition::AskQuestion);
        assert_eq!(session.stage, Stage::AwaitingQuestion);
        assert_eq!(
            run(&mut session, &["我最近常頭暈"]),
            Transition::Fallback("我最近常頭暈".to_string())
        );
        assert_eq!(session.stage, Stage::Fallback);

        let mut session = Session::new();
        assert_eq!(
            run(&mut session, &["A", "感冒", "X 喉嚨有異物感"]),
            Transition::Fallback("喉嚨有異物感".to_string())
        );
    }

    #[test]
    fn bypass_prefix_requires_separator() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["XY"]), Transition::Reprompt);
        assert_eq!(session.stage, Stage::AwaitingCategory);
    }

    #[test]
    fn restart_discards_progress() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["A", "感冒", RESTART_TOKEN]), Transition::Restart);
        assert_eq!(session, Session::new());
    }

    #[test]
    fn input_after_terminal_starts_fresh() {
        let mut session = Session::new();
        run(&mut session, &["B", "無"]);
        let t = run(&mut session, &["C"]);
        assert_eq!(t, Transition::SymptomMenu { category: "C".to_string() });
        assert_eq!(session.symptom, None);
    }

    #[test]
    fn free_text_policy() {
        let taxonomy = taxonomy();

        let mut session = Session::new();
        let t = session.apply(&taxonomy, "我肚子痛", true).unwrap();
        assert_eq!(t, Transition::Fallback("我肚子痛".to_string()));

        // A lone letter is still a mistyped menu choice.
        let mut session = Session::new();
        assert_eq!(session.apply(&taxonomy, "Z", true).unwrap(), Transition::Reprompt);

        // Policy off: free text re-prompts.
        let mut session = Session::new();
        assert_eq!(session.apply(&taxonomy, "我肚子痛", false).unwrap(), Transition::Reprompt);
    }

    #[test]
    fn empty_input_reprompts() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, &["A", "   "]), Transition::Reprompt);
        assert_eq!(session.stage, Stage::AwaitingSymptom);
    }
}
