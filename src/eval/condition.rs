//! # Condition Tree Evaluation
//!
//! Walks a block's condition tree, producing the truth value and one
//! explanation line per inspected node. `all` stops at the first false
//! child and `any` at the first true one, so children after the decisive
//! one leave no line and draw no randomness. Negation is applied after a
//! node's own value is known.
//!
//! The script generator compiles condition trees with the same walk order
//! and the same short-circuit shape (`and` / `or` in the target), which
//! keeps random-draw sequences aligned between backends.

use super::predicate::PredicateEvaluator;
use super::EvalContext;
use crate::ast::{ConditionNode, Join};

pub struct ConditionEvaluator {
    predicates: PredicateEvaluator,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            predicates: PredicateEvaluator::new(),
        }
    }

    /// Evaluates a block's condition list as one implicit group. An empty
    /// list is vacuously true.
    pub fn eval_conditions(
        &self,
        join: Join,
        conditions: &[ConditionNode],
        ctx: &mut EvalContext,
        lines: &mut Vec<String>,
    ) -> bool {
        if conditions.is_empty() {
            lines.push("no conditions => true".to_string());
            return true;
        }
        self.eval_children(join, conditions, ctx, 0, lines)
    }

    fn eval_node(
        &self,
        node: &ConditionNode,
        ctx: &mut EvalContext,
        depth: usize,
        lines: &mut Vec<String>,
    ) -> bool {
        match node {
            ConditionNode::Leaf { predicate, negate } => {
                let outcome = self.predicates.eval(predicate, ctx);
                let value = outcome.value != *negate;
                let prefix = if *negate { "not " } else { "" };
                lines.push(format!(
                    "{}{}{} => {}",
                    indent(depth),
                    prefix,
                    outcome.detail,
                    value
                ));
                value
            }
            ConditionNode::Group {
                join,
                negate,
                children,
            } => {
                let prefix = if *negate { "not " } else { "" };
                if children.is_empty() {
                    // Vacuously true before negation.
                    let value = !*negate;
                    lines.push(format!("{}{}empty group => {}", indent(depth), prefix, value));
                    return value;
                }
                let mut child_lines = Vec::new();
                let inner = self.eval_children(*join, children, ctx, depth + 1, &mut child_lines);
                let value = inner != *negate;
                lines.push(format!("{}{}{} => {}", indent(depth), prefix, join, value));
                lines.append(&mut child_lines);
                value
            }
        }
    }

    fn eval_children(
        &self,
        join: Join,
        children: &[ConditionNode],
        ctx: &mut EvalContext,
        depth: usize,
        lines: &mut Vec<String>,
    ) -> bool {
        match join {
            Join::All => {
                for child in children {
                    if !self.eval_node(child, ctx, depth, lines) {
                        return false;
                    }
                }
                true
            }
            Join::Any => {
                for child in children {
                    if self.eval_node(child, ctx, depth, lines) {
                        return true;
                    }
                }
                false
            }
        }
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{KeywordList, ListEntry, Predicate, RuleSpec};
    use crate::context::{HistoryView, ProfileState};
    use crate::derived::DerivedValues;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spec() -> RuleSpec {
        RuleSpec::new(
            vec![
                KeywordList::new("cats", "Cats", vec![ListEntry::new("cat")]),
                KeywordList::new("dogs", "Dogs", vec![ListEntry::new("dog")]),
            ],
            vec![],
            vec![],
        )
    }

    fn eval(
        join: Join,
        conditions: &[ConditionNode],
        last_message: &str,
    ) -> (bool, Vec<String>) {
        let spec = spec();
        let history = HistoryView::new(&[last_message.to_string()], None);
        let derived = DerivedValues::compute(&spec, &history);
        let profile = ProfileState::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut ctx = EvalContext {
            spec: &spec,
            history: &history,
            derived: &derived,
            profile: &profile,
            rng: &mut rng,
        };
        let mut lines = Vec::new();
        let value =
            ConditionEvaluator::new().eval_conditions(join, conditions, &mut ctx, &mut lines);
        (value, lines)
    }

    fn any_of(list_id: &str) -> ConditionNode {
        ConditionNode::leaf(Predicate::AnyInList {
            list_id: list_id.to_string(),
            source: Default::default(),
            negation_guard: false,
        })
    }

    #[test]
    fn test_all_requires_every_child() {
        let (value, _) = eval(Join::All, &[any_of("cats"), any_of("dogs")], "cat and dog");
        assert!(value);
        let (value, _) = eval(Join::All, &[any_of("cats"), any_of("dogs")], "cat only");
        assert!(!value);
    }

    #[test]
    fn test_any_requires_one_child() {
        let (value, _) = eval(Join::Any, &[any_of("cats"), any_of("dogs")], "dog only");
        assert!(value);
        let (value, _) = eval(Join::Any, &[any_of("cats"), any_of("dogs")], "neither");
        assert!(!value);
    }

    #[test]
    fn test_all_short_circuits_on_false() {
        let (value, lines) = eval(Join::All, &[any_of("cats"), any_of("dogs")], "dog only");
        assert!(!value);
        // The first child already decided; the second leaves no line.
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("'cats'"));
    }

    #[test]
    fn test_any_short_circuits_on_true() {
        let (value, lines) = eval(Join::Any, &[any_of("cats"), any_of("dogs")], "cat only");
        assert!(value);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_negated_leaf() {
        let (value, lines) = eval(Join::All, &[any_of("cats").negated()], "no pets");
        assert!(value);
        assert!(lines[0].starts_with("not "));
    }

    #[test]
    fn test_empty_conditions_vacuously_true() {
        let (value, lines) = eval(Join::All, &[], "anything");
        assert!(value);
        assert_eq!(lines, vec!["no conditions => true".to_string()]);
    }

    #[test]
    fn test_empty_group_true_before_negate() {
        let empty = ConditionNode::group(Join::All, vec![]);
        let (value, _) = eval(Join::All, &[empty.clone()], "anything");
        assert!(value);
        let (value, _) = eval(Join::All, &[empty.negated()], "anything");
        assert!(!value);
    }

    #[test]
    fn test_nested_groups() {
        // cats AND (dogs OR NOT dogs) is just cats.
        let tree = vec![
            any_of("cats"),
            ConditionNode::group(Join::Any, vec![any_of("dogs"), any_of("dogs").negated()]),
        ];
        let (value, _) = eval(Join::All, &tree, "a cat");
        assert!(value);
        let (value, _) = eval(Join::All, &tree, "a dog");
        assert!(!value);
    }

    #[test]
    fn test_double_negation_restores_value() {
        let plain = eval(Join::All, &[any_of("cats")], "a cat").0;
        let doubled = eval(
            Join::All,
            &[ConditionNode::group(Join::All, vec![any_of("cats").negated()]).negated()],
            "a cat",
        )
        .0;
        assert_eq!(plain, doubled);
    }
}
