//! # Predicate Library
//!
//! Leaf evaluation for condition trees. Every predicate resolves to a
//! plain boolean plus a short human-readable claim used in run traces;
//! none of them can fail. An unresolved list, unknown derived key, or
//! missing memory slot takes the documented safe default instead.

use rand::Rng;
use tracing::trace;

use super::EvalContext;
use crate::ast::{CountOp, ListEntry, MatchSource, Predicate};
use crate::matching;

/// Result of one predicate evaluation: the truth value and the claim the
/// trace prints alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateOutcome {
    pub value: bool,
    pub detail: String,
}

pub struct PredicateEvaluator;

impl Default for PredicateEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl PredicateEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn eval(&self, predicate: &Predicate, ctx: &mut EvalContext) -> PredicateOutcome {
        let outcome = match predicate {
            Predicate::AnyInList {
                list_id,
                source,
                negation_guard,
            } => self.eval_any_in_list(list_id, *source, *negation_guard, ctx),
            Predicate::NoneInList { list_id } => self.eval_none_in_list(list_id, ctx),
            Predicate::CountInHistory {
                list_id,
                window,
                op,
                threshold,
            } => {
                let count = match ctx.spec.find_list(list_id) {
                    Some(list) => {
                        matching::count_in_window(&list.entries, ctx.history.entries(), *window)
                    }
                    None => 0,
                };
                PredicateOutcome {
                    value: op.compare(count as f64, *threshold),
                    detail: format!(
                        "'{}' in last {} messages: count {} {} {}",
                        list_id, window, count, op, threshold
                    ),
                }
            }
            Predicate::MessageCount { op, threshold } => {
                let count = ctx.history.message_count();
                let value = match op {
                    CountOp::Every => every_nth(count, *threshold),
                    CountOp::Compare(op) => op.compare(count as f64, *threshold),
                };
                PredicateOutcome {
                    value,
                    detail: format!("message count {} {} {}", count, op, threshold),
                }
            }
            Predicate::MemoryNumber { key, op, threshold } => {
                let current = ctx.profile.memory_number(key);
                PredicateOutcome {
                    value: op.compare(current, *threshold),
                    detail: format!("memory '{}' {} {} {}", key, current, op, threshold),
                }
            }
            Predicate::MemoryText {
                key,
                needle,
                case_insensitive,
            } => {
                let haystack = ctx.profile.memory_text(key);
                PredicateOutcome {
                    value: contains(&haystack, needle, *case_insensitive),
                    detail: format!("memory '{}' contains {:?}", key, needle),
                }
            }
            Predicate::FieldContains {
                field,
                needle,
                case_insensitive,
            } => PredicateOutcome {
                value: contains(ctx.profile.field(*field), needle, *case_insensitive),
                detail: format!("{} contains {:?}", field, needle),
            },
            Predicate::DerivedNumber { key, op, threshold } => {
                let current = ctx.derived.get(key);
                PredicateOutcome {
                    value: op.compare(current, *threshold),
                    detail: format!("derived '{}' {} {} {}", key, current, op, threshold),
                }
            }
            Predicate::RandomChance { percent } => {
                let roll = ctx.rng.gen::<f64>() * 100.0;
                PredicateOutcome {
                    value: roll < *percent,
                    detail: format!("chance {}% (rolled {:.1})", percent, roll),
                }
            }
        };
        trace!("{} => {}", outcome.detail, outcome.value);
        outcome
    }

    fn eval_any_in_list(
        &self,
        list_id: &str,
        source: MatchSource,
        guarded: bool,
        ctx: &mut EvalContext,
    ) -> PredicateOutcome {
        let Some(list) = ctx.spec.find_list(list_id) else {
            return PredicateOutcome {
                value: false,
                detail: format!("any of '{}' (unknown list)", list_id),
            };
        };

        let place = match source {
            MatchSource::LastMessage => "last message",
            MatchSource::History => "history",
        };
        let matched = match source {
            MatchSource::LastMessage => scan(&list.entries, ctx.history.last(), guarded),
            MatchSource::History => ctx
                .history
                .entries()
                .iter()
                .find_map(|entry| scan(&list.entries, entry, guarded)),
        };

        match matched {
            Some(needle) => PredicateOutcome {
                value: true,
                detail: format!("any of '{}' in {} (matched {:?})", list_id, place, needle),
            },
            None => {
                // Distinguish a clean miss from a guard-suppressed one.
                let suppressed = if guarded {
                    match source {
                        MatchSource::LastMessage => {
                            matching::find_any(&list.entries, ctx.history.last())
                        }
                        MatchSource::History => ctx
                            .history
                            .entries()
                            .iter()
                            .find_map(|entry| matching::find_any(&list.entries, entry)),
                    }
                } else {
                    None
                };
                let detail = match suppressed {
                    Some(needle) => format!(
                        "any of '{}' in {} (only negated {:?})",
                        list_id, place, needle
                    ),
                    None => format!("any of '{}' in {}", list_id, place),
                };
                PredicateOutcome {
                    value: false,
                    detail,
                }
            }
        }
    }

    fn eval_none_in_list(&self, list_id: &str, ctx: &mut EvalContext) -> PredicateOutcome {
        let Some(list) = ctx.spec.find_list(list_id) else {
            return PredicateOutcome {
                value: true,
                detail: format!("none of '{}' (unknown list)", list_id),
            };
        };
        match matching::find_any(&list.entries, ctx.history.last()) {
            Some(needle) => PredicateOutcome {
                value: false,
                detail: format!("none of '{}' in last message (matched {:?})", list_id, needle),
            },
            None => PredicateOutcome {
                value: true,
                detail: format!("none of '{}' in last message", list_id),
            },
        }
    }
}

fn scan(entries: &[ListEntry], haystack: &str, guarded: bool) -> Option<String> {
    if guarded {
        matching::find_any_guarded(entries, haystack)
    } else {
        matching::find_any(entries, haystack)
    }
}

fn contains(haystack: &str, needle: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        matching::normalize(haystack).contains(&matching::normalize(needle))
    } else {
        haystack.contains(needle)
    }
}

/// The `every` counter test: the count is positive and divisible by the
/// (floored) threshold. A threshold at or below zero never holds.
fn every_nth(count: u64, threshold: f64) -> bool {
    let step = threshold.floor();
    count > 0 && step > 0.0 && (count as f64) % step == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{KeywordList, ListEntry, NumericOp, RuleSpec, TextField};
    use crate::context::{HistoryView, ProfileState};
    use crate::derived::DerivedValues;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        spec: RuleSpec,
        history: HistoryView,
        derived: DerivedValues,
        profile: ProfileState,
        rng: StdRng,
    }

    impl Fixture {
        fn new(messages: &[&str]) -> Self {
            let spec = RuleSpec::new(
                vec![KeywordList::new(
                    "cats",
                    "Cats",
                    vec![ListEntry::new("cat"), ListEntry::new("kitten")],
                )],
                vec![],
                vec![],
            );
            let raw: Vec<String> = messages.iter().map(|m| m.to_string()).collect();
            let history = HistoryView::new(&raw, None);
            let derived = DerivedValues::compute(&spec, &history);
            Self {
                spec,
                history,
                derived,
                profile: ProfileState::default(),
                rng: StdRng::seed_from_u64(7),
            }
        }

        fn eval(&mut self, predicate: &Predicate) -> bool {
            let mut ctx = EvalContext {
                spec: &self.spec,
                history: &self.history,
                derived: &self.derived,
                profile: &self.profile,
                rng: &mut self.rng,
            };
            PredicateEvaluator::new().eval(predicate, &mut ctx).value
        }
    }

    #[test]
    fn test_any_in_list_last_message() {
        let mut fx = Fixture::new(&["I saw a KITTEN today"]);
        assert!(fx.eval(&Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: false,
        }));
        assert!(!fx.eval(&Predicate::AnyInList {
            list_id: "unknown".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: false,
        }));
    }

    #[test]
    fn test_any_in_list_respects_guard() {
        let mut fx = Fixture::new(&["i want no cat"]);
        assert!(fx.eval(&Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: false,
        }));
        assert!(!fx.eval(&Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: true,
        }));
    }

    #[test]
    fn test_any_in_list_over_history() {
        let mut fx = Fixture::new(&["a cat long ago", "nothing recent"]);
        assert!(fx.eval(&Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::History,
            negation_guard: false,
        }));
        assert!(!fx.eval(&Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: false,
        }));
    }

    #[test]
    fn test_none_in_list() {
        let mut fx = Fixture::new(&["just dogs here"]);
        assert!(fx.eval(&Predicate::NoneInList {
            list_id: "cats".to_string(),
        }));
        assert!(fx.eval(&Predicate::NoneInList {
            list_id: "unknown".to_string(),
        }));

        let mut fx = Fixture::new(&["a cat"]);
        assert!(!fx.eval(&Predicate::NoneInList {
            list_id: "cats".to_string(),
        }));
    }

    #[test]
    fn test_count_in_history_compares() {
        let mut fx = Fixture::new(&["cat one", "no pets", "cat two"]);
        assert!(fx.eval(&Predicate::CountInHistory {
            list_id: "cats".to_string(),
            window: 8,
            op: NumericOp::Ge,
            threshold: 2.0,
        }));
        assert!(!fx.eval(&Predicate::CountInHistory {
            list_id: "cats".to_string(),
            window: 1,
            op: NumericOp::Ge,
            threshold: 2.0,
        }));
        // Unknown list counts zero but still compares.
        assert!(fx.eval(&Predicate::CountInHistory {
            list_id: "unknown".to_string(),
            window: 8,
            op: NumericOp::Lt,
            threshold: 1.0,
        }));
    }

    #[test]
    fn test_message_count_every() {
        for (count, expected) in [
            (0, false),
            (1, false),
            (2, false),
            (3, true),
            (4, false),
            (5, false),
            (6, true),
            (9, true),
        ] {
            assert_eq!(every_nth(count, 3.0), expected, "count {}", count);
        }
        assert!(!every_nth(6, 0.0));
        assert!(!every_nth(6, -3.0));
    }

    #[test]
    fn test_memory_predicates() {
        let mut fx = Fixture::new(&["hi"]);
        fx.profile.memory.insert("affection".to_string(), 4.0.into());
        fx.profile
            .memory
            .insert("notes".to_string(), "Made a Promise".into());

        assert!(fx.eval(&Predicate::MemoryNumber {
            key: "affection".to_string(),
            op: NumericOp::Lt,
            threshold: 5.0,
        }));
        // Missing slots read as zero.
        assert!(fx.eval(&Predicate::MemoryNumber {
            key: "missing".to_string(),
            op: NumericOp::Eq,
            threshold: 0.0,
        }));
        assert!(fx.eval(&Predicate::MemoryText {
            key: "notes".to_string(),
            needle: "promise".to_string(),
            case_insensitive: true,
        }));
        assert!(!fx.eval(&Predicate::MemoryText {
            key: "notes".to_string(),
            needle: "promise".to_string(),
            case_insensitive: false,
        }));
    }

    #[test]
    fn test_field_contains() {
        let mut fx = Fixture::new(&["hi"]);
        fx.profile.personality = "Shy but curious".to_string();
        assert!(fx.eval(&Predicate::FieldContains {
            field: TextField::Personality,
            needle: "SHY".to_string(),
            case_insensitive: true,
        }));
        assert!(!fx.eval(&Predicate::FieldContains {
            field: TextField::Scenario,
            needle: "shy".to_string(),
            case_insensitive: true,
        }));
    }

    #[test]
    fn test_random_chance_extremes() {
        let mut fx = Fixture::new(&["hi"]);
        for _ in 0..50 {
            assert!(!fx.eval(&Predicate::RandomChance { percent: 0.0 }));
            assert!(fx.eval(&Predicate::RandomChance { percent: 100.0 }));
        }
    }
}
