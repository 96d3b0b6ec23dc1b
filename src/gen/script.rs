//! # Rule Compiler
//!
//! Turns a [`RuleSpec`] into deployable script text. Generation is
//! infallible: unresolved list references compile to lookups that miss at
//! runtime and take the same safe defaults the interpreter takes, so a
//! rule set that previews cleanly deploys cleanly.
//!
//! Condition trees are compiled by a walk isomorphic to the condition
//! evaluator's: same node order, one helper call per predicate kind,
//! `not (...)` for negation, and a constant for empty groups. Target-side
//! `and`/`or` short-circuit exactly where the evaluator short-circuits,
//! which keeps random-draw sequences aligned between backends.

use tracing::debug;

use super::prelude::emit_helpers;
use super::writer::LuaWriter;
use super::{lua_number, lua_quote, GeneratorConfig};
use crate::ast::{
    Action, Block, ConditionNode, CountOp, Join, MatchSource, NumberMode, Predicate, RuleSpec,
    TextMode,
};
use crate::context::HISTORY_RETENTION;
use crate::eval::chain::{self, ArmRole, Chain};

pub struct ScriptGenerator {
    config: GeneratorConfig,
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl ScriptGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Emits the complete script for a rule set.
    pub fn generate(&self, spec: &RuleSpec) -> String {
        debug!(
            "generate: {} lists, {} derived, {} blocks",
            spec.lists.len(),
            spec.derived.len(),
            spec.blocks.len()
        );

        let mut w = LuaWriter::new(self.config.indent_spaces);
        self.emit_header(&mut w);
        self.emit_data(&mut w, spec);
        emit_helpers(&mut w, &self.config);
        w.blank();
        self.emit_init(&mut w);
        self.emit_derived(&mut w, spec);
        self.emit_chains(&mut w, spec);
        w.finish()
    }

    fn emit_header(&self, w: &mut LuaWriter) {
        w.line("-- Generated rule script; runs once per conversational turn.");
        w.line(&format!(
            "-- Host contract: `{}` is a table with text fields and a `memory` table;",
            self.config.profile_global
        ));
        w.line(&format!(
            "-- `{}` is an array of recent message strings, oldest first.",
            self.config.chat_global
        ));
        w.blank();
    }

    fn emit_data(&self, w: &mut LuaWriter, spec: &RuleSpec) {
        if spec.lists.is_empty() {
            w.line("local __km_lists = {}");
        } else {
            w.line("local __km_lists = {");
            w.indent();
            for list in &spec.lists {
                w.line(&format!("[{}] = {{", lua_quote(&list.id)));
                w.indent();
                for entry in &list.entries {
                    w.line(&format!(
                        "{{ t = {}, w = {} }},",
                        lua_quote(&entry.text),
                        entry.weight
                    ));
                }
                w.dedent();
                w.line("},");
            }
            w.dedent();
            w.line("}");
        }
        w.line("local __km_hist = {}");
        w.line("local __km_count = 0");
        w.line("local __km_last = \"\"");
        w.line("local __km_derived = {}");
        w.blank();
    }

    fn emit_init(&self, w: &mut LuaWriter) {
        let profile = &self.config.profile_global;
        w.line(&format!("{}.memory = {}.memory or {{}}", profile, profile));
        w.blank();
        w.line(&format!(
            "local __km_chat = {} or {{}}",
            self.config.chat_global
        ));
        w.line("__km_count = #__km_chat");
        w.line("do");
        w.indent();
        w.line(&format!(
            "local first = __km_count - {} + 1",
            HISTORY_RETENTION
        ));
        w.line("if first < 1 then first = 1 end");
        w.line("for i = first, __km_count do");
        w.indent();
        w.line("__km_hist[#__km_hist + 1] = __km_norm(__km_chat[i])");
        w.dedent();
        w.line("end");
        w.dedent();
        w.line("end");
        w.line("__km_last = __km_hist[#__km_hist] or \"\"");
        w.blank();
    }

    fn emit_derived(&self, w: &mut LuaWriter, spec: &RuleSpec) {
        if spec.derived.is_empty() {
            return;
        }
        for def in &spec.derived {
            w.line(&format!(
                "__km_derived[{}] = __km_count_window(__km_lists[{}], {})",
                lua_quote(&def.key),
                lua_quote(&def.list_id),
                def.window
            ));
        }
        w.blank();
    }

    fn emit_chains(&self, w: &mut LuaWriter, spec: &RuleSpec) {
        for chain in chain::structure(&spec.blocks) {
            self.emit_chain(w, &chain);
            w.blank();
        }
    }

    fn emit_chain(&self, w: &mut LuaWriter, chain: &Chain) {
        let has_branch = chain.arms.iter().any(|arm| arm.role == ArmRole::Branch);

        // A lone fallback runs unconditionally.
        if !has_branch {
            for arm in &chain.arms {
                self.emit_label(w, arm.block);
                w.line("do");
                self.emit_actions(w, arm.block);
                w.line("end");
            }
            return;
        }

        let mut first = true;
        for arm in &chain.arms {
            self.emit_label(w, arm.block);
            match arm.role {
                ArmRole::Branch => {
                    let keyword = if first { "if" } else { "elseif" };
                    first = false;
                    w.line(&format!(
                        "{} {} then",
                        keyword,
                        self.block_condition(arm.block)
                    ));
                }
                ArmRole::Fallback => {
                    w.line("else");
                }
            }
            self.emit_actions(w, arm.block);
        }
        w.line("end");
    }

    fn emit_label(&self, w: &mut LuaWriter, block: &Block) {
        if let Some(label) = &block.label {
            // Comment only; newlines in a label would break out of it.
            w.line(&format!("-- {}", label.replace(['\n', '\r'], " ")));
        }
    }

    fn emit_actions(&self, w: &mut LuaWriter, block: &Block) {
        w.indent();
        for action in &block.actions {
            w.line(&self.action_stmt(action));
        }
        w.dedent();
    }

    /// A block's condition list compiles as one implicit group; an empty
    /// list is the constant `true`.
    fn block_condition(&self, block: &Block) -> String {
        if block.conditions.is_empty() {
            return "true".to_string();
        }
        self.join_expr(block.join, &block.conditions)
    }

    fn join_expr(&self, join: Join, children: &[ConditionNode]) -> String {
        let op = match join {
            Join::All => " and ",
            Join::Any => " or ",
        };
        children
            .iter()
            .map(|child| self.node_expr(child))
            .collect::<Vec<_>>()
            .join(op)
    }

    fn node_expr(&self, node: &ConditionNode) -> String {
        match node {
            ConditionNode::Leaf { predicate, negate } => {
                let expr = self.predicate_expr(predicate);
                if *negate {
                    format!("not ({})", expr)
                } else {
                    expr
                }
            }
            ConditionNode::Group {
                join,
                negate,
                children,
            } => {
                if children.is_empty() {
                    // Vacuously true before negation.
                    return if *negate { "false" } else { "true" }.to_string();
                }
                let inner = self.join_expr(*join, children);
                if *negate {
                    format!("not ({})", inner)
                } else {
                    format!("({})", inner)
                }
            }
        }
    }

    fn predicate_expr(&self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::AnyInList {
                list_id,
                source,
                negation_guard,
            } => {
                let guarded = if *negation_guard { "true" } else { "false" };
                match source {
                    MatchSource::LastMessage => format!(
                        "__km_any(__km_lists[{}], __km_last, {})",
                        lua_quote(list_id),
                        guarded
                    ),
                    MatchSource::History => format!(
                        "__km_any_hist(__km_lists[{}], {})",
                        lua_quote(list_id),
                        guarded
                    ),
                }
            }
            Predicate::NoneInList { list_id } => format!(
                "not __km_any(__km_lists[{}], __km_last, false)",
                lua_quote(list_id)
            ),
            Predicate::CountInHistory {
                list_id,
                window,
                op,
                threshold,
            } => format!(
                "__km_cmp({}, __km_count_window(__km_lists[{}], {}), {})",
                lua_quote(&op.to_string()),
                lua_quote(list_id),
                window,
                lua_number(*threshold)
            ),
            Predicate::MessageCount { op, threshold } => match op {
                CountOp::Every => {
                    format!("__km_every(__km_count, {})", lua_number(*threshold))
                }
                CountOp::Compare(op) => format!(
                    "__km_cmp({}, __km_count, {})",
                    lua_quote(&op.to_string()),
                    lua_number(*threshold)
                ),
            },
            Predicate::MemoryNumber { key, op, threshold } => format!(
                "__km_cmp({}, __km_mem_num({}), {})",
                lua_quote(&op.to_string()),
                lua_quote(key),
                lua_number(*threshold)
            ),
            Predicate::MemoryText {
                key,
                needle,
                case_insensitive,
            } => format!(
                "__km_has(__km_mem_str({}), {}, {})",
                lua_quote(key),
                lua_quote(needle),
                case_insensitive
            ),
            Predicate::FieldContains {
                field,
                needle,
                case_insensitive,
            } => format!(
                "__km_has(__km_field({}), {}, {})",
                lua_quote(field.key()),
                lua_quote(needle),
                case_insensitive
            ),
            Predicate::DerivedNumber { key, op, threshold } => format!(
                "__km_cmp({}, __km_derived[{}] or 0, {})",
                lua_quote(&op.to_string()),
                lua_quote(key),
                lua_number(*threshold)
            ),
            Predicate::RandomChance { percent } => {
                format!("__km_chance({})", lua_number(*percent))
            }
        }
    }

    fn action_stmt(&self, action: &Action) -> String {
        match action {
            Action::AppendText { field, mode, text } => match mode {
                TextMode::Set => format!(
                    "__km_set({}, {})",
                    lua_quote(field.key()),
                    lua_quote(text)
                ),
                TextMode::Append => format!(
                    "__km_append({}, {})",
                    lua_quote(field.key()),
                    lua_quote(text)
                ),
            },
            Action::AppendRandomFromList { field, list_id } => format!(
                "__km_append({}, __km_pick(__km_lists[{}]))",
                lua_quote(field.key()),
                lua_quote(list_id)
            ),
            Action::AppendWeightedFromList { field, list_id } => format!(
                "__km_append({}, __km_pick_weighted(__km_lists[{}]))",
                lua_quote(field.key()),
                lua_quote(list_id)
            ),
            Action::MemoryNumber { key, mode, value } => match mode {
                NumberMode::Set => {
                    format!("__km_mem_set({}, {})", lua_quote(key), lua_number(*value))
                }
                NumberMode::Add => {
                    format!("__km_mem_add({}, {})", lua_quote(key), lua_number(*value))
                }
                NumberMode::Subtract => {
                    format!("__km_mem_add({}, {})", lua_quote(key), lua_number(-*value))
                }
            },
            Action::MemoryText { key, mode, value } => match mode {
                TextMode::Set => {
                    format!("__km_mem_set({}, {})", lua_quote(key), lua_quote(value))
                }
                TextMode::Append => {
                    format!("__km_mem_cat({}, {})", lua_quote(key), lua_quote(value))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BlockKind, KeywordList, ListEntry, NumericOp, TextField};
    use pretty_assertions::assert_eq;

    fn generator() -> ScriptGenerator {
        ScriptGenerator::default()
    }

    fn any_cats() -> ConditionNode {
        ConditionNode::leaf(Predicate::AnyInList {
            list_id: "cats".to_string(),
            source: MatchSource::LastMessage,
            negation_guard: false,
        })
    }

    #[test]
    fn test_predicate_expressions() {
        let g = generator();
        assert_eq!(
            g.predicate_expr(&Predicate::AnyInList {
                list_id: "cats".to_string(),
                source: MatchSource::LastMessage,
                negation_guard: true,
            }),
            r#"__km_any(__km_lists["cats"], __km_last, true)"#
        );
        assert_eq!(
            g.predicate_expr(&Predicate::MessageCount {
                op: CountOp::Every,
                threshold: 3.0,
            }),
            "__km_every(__km_count, 3)"
        );
        assert_eq!(
            g.predicate_expr(&Predicate::MemoryNumber {
                key: "affection".to_string(),
                op: NumericOp::Lt,
                threshold: 5.0,
            }),
            r#"__km_cmp("<", __km_mem_num("affection"), 5)"#
        );
        assert_eq!(
            g.predicate_expr(&Predicate::DerivedNumber {
                key: "mentions".to_string(),
                op: NumericOp::Ge,
                threshold: 2.0,
            }),
            r#"__km_cmp(">=", __km_derived["mentions"] or 0, 2)"#
        );
    }

    #[test]
    fn test_node_expr_negation_and_groups() {
        let g = generator();
        assert_eq!(
            g.node_expr(&any_cats().negated()),
            r#"not (__km_any(__km_lists["cats"], __km_last, false))"#
        );
        assert_eq!(
            g.node_expr(&ConditionNode::group(Join::Any, vec![])),
            "true"
        );
        assert_eq!(
            g.node_expr(&ConditionNode::group(Join::Any, vec![]).negated()),
            "false"
        );
        let group = ConditionNode::group(Join::Any, vec![any_cats(), any_cats()]);
        assert!(g.node_expr(&group).starts_with("(__km_any"));
        assert!(g.node_expr(&group).contains(" or "));
    }

    #[test]
    fn test_subtract_emits_negated_add() {
        let g = generator();
        assert_eq!(
            g.action_stmt(&Action::MemoryNumber {
                key: "affection".to_string(),
                mode: NumberMode::Subtract,
                value: 5.0,
            }),
            r#"__km_mem_add("affection", -5)"#
        );
    }

    #[test]
    fn test_generate_full_chain_shape() {
        let spec = RuleSpec::new(
            vec![KeywordList::new(
                "cats",
                "Cats",
                vec![ListEntry::new("cat")],
            )],
            vec![],
            vec![
                Block::new(BlockKind::If, Join::All, vec![any_cats()], vec![
                    Action::AppendText {
                        field: TextField::Personality,
                        mode: TextMode::Append,
                        text: "Cat person.".to_string(),
                    },
                ])
                .with_label("Cat reaction"),
                Block::new(BlockKind::ElseIf, Join::All, vec![], vec![]),
                Block::else_block(vec![]),
            ],
        );
        let script = generator().generate(&spec);

        assert!(script.contains(
            r#"if __km_any(__km_lists["cats"], __km_last, false) then"#
        ));
        assert!(script.contains("elseif true then"));
        assert!(script.contains("\nelse\n"));
        assert!(script.contains("-- Cat reaction"));
        assert!(script.contains(r#"__km_append("personality", "Cat person.")"#));
        // Balanced: chain end plus every helper end.
        assert!(script.ends_with("end\n\n") || script.ends_with("end\n"));
    }

    #[test]
    fn test_orphan_else_compiles_to_do_block() {
        let spec = RuleSpec::new(
            vec![],
            vec![],
            vec![Block::else_block(vec![Action::AppendText {
                field: TextField::Scenario,
                mode: TextMode::Set,
                text: "always".to_string(),
            }])],
        );
        let script = generator().generate(&spec);
        assert!(script.contains("do\n"));
        assert!(script.contains(r#"__km_set("scenario", "always")"#));
    }

    #[test]
    fn test_custom_globals() {
        let spec = RuleSpec::default();
        let config = GeneratorConfig {
            profile_global: "card".to_string(),
            chat_global: "messages".to_string(),
            indent_spaces: 2,
        };
        let script = ScriptGenerator::new(config).generate(&spec);
        assert!(script.contains("card.memory = card.memory or {}"));
        assert!(script.contains("local __km_chat = messages or {}"));
        assert!(!script.contains("\nprofile"));
    }

    #[test]
    fn test_derived_emission() {
        let spec = RuleSpec::new(
            vec![KeywordList::new("cats", "Cats", vec![ListEntry::new("cat")])],
            vec![crate::ast::DerivedDef::new("mentions", "cats", 8)],
            vec![],
        );
        let script = generator().generate(&spec);
        assert!(script.contains(
            r#"__km_derived["mentions"] = __km_count_window(__km_lists["cats"], 8)"#
        ));
    }
}
