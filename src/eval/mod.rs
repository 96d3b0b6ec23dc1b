//! # Rule Evaluation
//!
//! The in-process interpreter. It exists so authors can preview exactly
//! what a rule set will do before the generated script is deployed: a run
//! takes a profile, recent history, and a message counter, and returns the
//! mutated profile together with a full trace of every branch decision.
//!
//! # Core Components
//!
//! ## Chain Structuring
//! Groups the flat block sequence into `if` chains; shared with the
//! script generator so both backends agree on chain shape.
//!
//! ## Condition Evaluator
//! Walks condition trees with short-circuiting and collects one
//! explanation line per inspected node.
//!
//! ## Predicate Evaluator
//! The fixed leaf catalog. Total over its inputs; unresolved references
//! degrade to documented defaults.
//!
//! ## Action Applier
//! Mutates the profile for each fired block, in authored order.
//!
//! # Run Pipeline
//!
//! 1. Normalize history once and compute derived metrics.
//! 2. Structure blocks into chains.
//! 3. Walk chains in order; within a chain, at most one arm fires.
//! 4. Apply the fired arm's actions before the next arm is considered,
//!    so later blocks observe earlier blocks' writes.

pub mod action;
pub mod chain;
pub mod condition;
pub mod predicate;

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::ast::{BlockKind, RuleSpec};
use crate::context::{HistoryView, ProfileState};
use crate::derived::DerivedValues;

use self::action::ActionApplier;
use self::chain::ArmRole;
use self::condition::ConditionEvaluator;

/// Everything a predicate may read during one block evaluation. The
/// profile is read-only here; only the action applier writes it, between
/// block evaluations.
pub struct EvalContext<'a> {
    pub spec: &'a RuleSpec,
    pub history: &'a HistoryView,
    pub derived: &'a DerivedValues,
    pub profile: &'a ProfileState,
    pub rng: &'a mut StdRng,
}

/// Input of one run. The profile may carry state left by earlier runs;
/// `message_count` overrides the counter when the passed history is only
/// the tail of a longer transcript.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub profile: ProfileState,
    pub history: Vec<String>,
    pub message_count: Option<u64>,
}

/// Decision record for one block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockTrace {
    /// Position in the authored block sequence.
    pub index: usize,
    pub kind: BlockKind,
    pub label: Option<String>,
    /// Condition result, when conditions were evaluated at all.
    pub condition: Option<bool>,
    pub fired: bool,
    /// One line per inspected condition node, or the skip reason.
    pub explanation: Vec<String>,
    /// One line per applied action.
    pub actions: Vec<String>,
}

/// Full decision record of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTrace {
    pub derived: BTreeMap<String, f64>,
    pub blocks: Vec<BlockTrace>,
}

impl fmt::Display for RunTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.derived {
            writeln!(f, "derived '{}' = {}", key, value)?;
        }
        for block in &self.blocks {
            write!(f, "[{}] {}", block.index, block.kind)?;
            if let Some(label) = &block.label {
                write!(f, " '{}'", label)?;
            }
            writeln!(f, " ({})", if block.fired { "fired" } else { "skipped" })?;
            for line in &block.explanation {
                writeln!(f, "    {}", line)?;
            }
            for action in &block.actions {
                writeln!(f, "    -> {}", action)?;
            }
        }
        Ok(())
    }
}

/// What a run returns: the mutated profile and the trace. Feeding the
/// profile into the next run's input chains rule sets.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub profile: ProfileState,
    pub trace: RunTrace,
}

/// The rule interpreter. Owns the random stream so previews can be made
/// reproducible with [`Interpreter::seeded`].
pub struct Interpreter {
    rng: StdRng,
    conditions: ConditionEvaluator,
    actions: ActionApplier,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic interpreter for tests and reproducible previews.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            conditions: ConditionEvaluator::new(),
            actions: ActionApplier::new(),
        }
    }

    /// Executes the rule set once over the given input.
    pub fn run(&mut self, spec: &RuleSpec, input: RunInput) -> RunOutcome {
        debug!(
            "run: {} blocks over {} messages",
            spec.blocks.len(),
            input.history.len()
        );

        let history = HistoryView::new(&input.history, input.message_count);
        let derived = DerivedValues::compute(spec, &history);
        let mut profile = input.profile;
        let mut blocks = Vec::with_capacity(spec.blocks.len());

        for chain in chain::structure(&spec.blocks) {
            let mut satisfied = false;
            for arm in &chain.arms {
                let block = arm.block;
                let mut explanation = Vec::new();
                let mut condition = None;
                let mut fired = false;

                if satisfied {
                    explanation.push("chain already satisfied".to_string());
                } else {
                    match arm.role {
                        ArmRole::Branch => {
                            let mut ctx = EvalContext {
                                spec,
                                history: &history,
                                derived: &derived,
                                profile: &profile,
                                rng: &mut self.rng,
                            };
                            let value = self.conditions.eval_conditions(
                                block.join,
                                &block.conditions,
                                &mut ctx,
                                &mut explanation,
                            );
                            condition = Some(value);
                            fired = value;
                        }
                        ArmRole::Fallback => {
                            fired = true;
                        }
                    }
                }

                let mut actions = Vec::new();
                if fired {
                    satisfied = true;
                    debug!("block {} fired", arm.index);
                    for action in &block.actions {
                        actions.push(self.actions.apply(action, spec, &mut profile, &mut self.rng));
                    }
                }

                blocks.push(BlockTrace {
                    index: arm.index,
                    kind: block.kind,
                    label: block.label.clone(),
                    condition,
                    fired,
                    explanation,
                    actions,
                });
            }
        }

        RunOutcome {
            profile,
            trace: RunTrace {
                derived: derived.snapshot(),
                blocks,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Action, Block, BlockKind, ConditionNode, Join, KeywordList, ListEntry, Predicate,
        TextField, TextMode,
    };
    use pretty_assertions::assert_eq;

    fn cats_spec(blocks: Vec<Block>) -> RuleSpec {
        RuleSpec::new(
            vec![KeywordList::new(
                "cats",
                "Cats",
                vec![ListEntry::new("cat")],
            )],
            vec![],
            blocks,
        )
    }

    fn any_cats() -> ConditionNode {
        ConditionNode::leaf(Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: Default::default(),
            negation_guard: false,
        })
    }

    fn say(text: &str) -> Action {
        Action::AppendText {
            field: TextField::Personality,
            mode: TextMode::Append,
            text: text.to_string(),
        }
    }

    fn input(message: &str) -> RunInput {
        RunInput {
            profile: ProfileState::default(),
            history: vec![message.to_string()],
            message_count: None,
        }
    }

    #[test]
    fn test_exactly_one_arm_fires() {
        let spec = cats_spec(vec![
            Block::new(BlockKind::If, Join::All, vec![any_cats().negated()], vec![say("one")]),
            Block::new(BlockKind::ElseIf, Join::All, vec![any_cats()], vec![say("two")]),
            Block::else_block(vec![say("three")]),
        ]);
        let outcome = Interpreter::seeded(1).run(&spec, input("a cat appears"));
        assert_eq!(outcome.profile.personality, "two");
        let fired: Vec<bool> = outcome.trace.blocks.iter().map(|b| b.fired).collect();
        assert_eq!(fired, vec![false, true, false]);
    }

    #[test]
    fn test_else_fires_when_nothing_matched() {
        let spec = cats_spec(vec![
            Block::new(BlockKind::If, Join::All, vec![any_cats()], vec![say("one")]),
            Block::else_block(vec![say("fallback")]),
        ]);
        let outcome = Interpreter::seeded(1).run(&spec, input("just dogs"));
        assert_eq!(outcome.profile.personality, "fallback");
    }

    #[test]
    fn test_independent_chains_fire_independently() {
        let spec = cats_spec(vec![
            Block::new(BlockKind::If, Join::All, vec![any_cats()], vec![say("first")]),
            Block::new(BlockKind::If, Join::All, vec![any_cats()], vec![say("second")]),
        ]);
        let outcome = Interpreter::seeded(1).run(&spec, input("a cat"));
        assert_eq!(outcome.profile.personality, "first\nsecond");
    }

    #[test]
    fn test_later_blocks_see_earlier_writes() {
        let spec = cats_spec(vec![
            Block::new(
                BlockKind::If,
                Join::All,
                vec![],
                vec![Action::MemoryNumber {
                    key: "mood".to_string(),
                    mode: crate::ast::NumberMode::Set,
                    value: 3.0,
                }],
            ),
            Block::new(
                BlockKind::If,
                Join::All,
                vec![ConditionNode::leaf(Predicate::MemoryNumber {
                    key: "mood".to_string(),
                    op: crate::ast::NumericOp::Eq,
                    threshold: 3.0,
                })],
                vec![say("saw it")],
            ),
        ]);
        let outcome = Interpreter::seeded(1).run(&spec, input("hi"));
        assert_eq!(outcome.profile.personality, "saw it");
    }

    #[test]
    fn test_orphan_else_fires_unconditionally() {
        let spec = cats_spec(vec![Block::else_block(vec![say("always")])]);
        let outcome = Interpreter::seeded(1).run(&spec, input("anything"));
        assert_eq!(outcome.profile.personality, "always");
    }

    #[test]
    fn test_trace_preserves_block_order() {
        let spec = cats_spec(vec![
            Block::new(BlockKind::If, Join::All, vec![any_cats()], vec![]),
            Block::else_block(vec![]),
            Block::new(BlockKind::If, Join::All, vec![], vec![]),
        ]);
        let outcome = Interpreter::seeded(1).run(&spec, input("a cat"));
        let indices: Vec<usize> = outcome.trace.blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(outcome.trace.blocks[1].explanation, vec![
            "chain already satisfied".to_string()
        ]);
    }

    #[test]
    fn test_profile_chains_across_runs() {
        let spec = cats_spec(vec![Block::new(
            BlockKind::If,
            Join::All,
            vec![],
            vec![say("again")],
        )]);
        let mut interpreter = Interpreter::seeded(1);
        let first = interpreter.run(&spec, input("hi"));
        let second = interpreter.run(
            &spec,
            RunInput {
                profile: first.profile,
                history: vec!["hi".to_string()],
                message_count: None,
            },
        );
        assert_eq!(second.profile.personality, "again\nagain");
    }
}
