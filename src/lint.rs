//! # Structural Lint
//!
//! Advisory checks over a parsed [`RuleSpec`]. Every finding is a warning:
//! evaluation and generation accept any rule set, recover from the shapes
//! reported here, and never consult the lint pass. The walk collects all
//! findings instead of stopping at the first, so an author sees the whole
//! picture in one run.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Action, Block, BlockKind, ConditionNode, Predicate, RuleSpec};

/// One advisory finding, with enough context to locate it in the authored
/// rule set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LintWarning {
    #[error("{block}: conditional branch has no conditions and always fires")]
    AlwaysTrue { block: String },

    #[error("{block}: no open chain to extend; branch starts a chain of its own")]
    OrphanBranch { block: String },

    #[error("{block}: no open chain to close; fallback fires unconditionally")]
    OrphanFallback { block: String },

    #[error("{block}: chain already closed by a fallback; this one fires unconditionally")]
    ExtraFallback { block: String },

    #[error("{block}: no actions; firing has no effect")]
    NoActions { block: String },

    #[error("{context}: unknown list '{id}'")]
    UnknownList { context: String, id: String },

    #[error("{block}: unknown derived key '{key}'")]
    UnknownDerived { block: String, key: String },

    #[error("duplicate list id '{id}'; the last definition wins")]
    DuplicateListId { id: String },

    #[error("duplicate derived key '{key}'; the last definition wins")]
    DuplicateDerivedKey { key: String },

    #[error("derived '{key}': window of zero never counts anything")]
    ZeroWindow { key: String },
}

/// Checks a rule set and returns every finding, in authoring order.
pub fn lint(spec: &RuleSpec) -> Vec<LintWarning> {
    let mut warnings = Vec::new();
    check_lists(spec, &mut warnings);
    check_derived(spec, &mut warnings);
    check_blocks(spec, &mut warnings);
    debug!("lint: {} warnings", warnings.len());
    warnings
}

fn check_lists(spec: &RuleSpec, warnings: &mut Vec<LintWarning>) {
    let mut seen = HashSet::new();
    for list in &spec.lists {
        if !seen.insert(list.id.as_str()) {
            warnings.push(LintWarning::DuplicateListId {
                id: list.id.clone(),
            });
        }
    }
}

fn check_derived(spec: &RuleSpec, warnings: &mut Vec<LintWarning>) {
    let mut seen = HashSet::new();
    for def in &spec.derived {
        if !seen.insert(def.key.as_str()) {
            warnings.push(LintWarning::DuplicateDerivedKey {
                key: def.key.clone(),
            });
        }
        if def.window == 0 {
            warnings.push(LintWarning::ZeroWindow {
                key: def.key.clone(),
            });
        }
        if spec.find_list(&def.list_id).is_none() {
            warnings.push(LintWarning::UnknownList {
                context: format!("derived '{}'", def.key),
                id: def.list_id.clone(),
            });
        }
    }
}

fn check_blocks(spec: &RuleSpec, warnings: &mut Vec<LintWarning>) {
    // Mirrors the chain builder's bookkeeping so the warnings describe
    // exactly the recoveries execution will apply.
    let mut open = false;
    let mut closed_by_fallback = false;

    for (index, block) in spec.blocks.iter().enumerate() {
        let ctx = block_context(index, block);

        match block.kind {
            BlockKind::If => {
                open = true;
                closed_by_fallback = false;
            }
            BlockKind::ElseIf => {
                if !open {
                    warnings.push(LintWarning::OrphanBranch { block: ctx.clone() });
                    open = true;
                }
                closed_by_fallback = false;
            }
            BlockKind::Else => {
                if !open {
                    if closed_by_fallback {
                        warnings.push(LintWarning::ExtraFallback { block: ctx.clone() });
                    } else {
                        warnings.push(LintWarning::OrphanFallback { block: ctx.clone() });
                    }
                }
                open = false;
                closed_by_fallback = true;
            }
        }

        if block.kind != BlockKind::Else && block.conditions.is_empty() {
            warnings.push(LintWarning::AlwaysTrue { block: ctx.clone() });
        }
        if block.actions.is_empty() {
            warnings.push(LintWarning::NoActions { block: ctx.clone() });
        }

        for node in &block.conditions {
            check_node(spec, node, &ctx, warnings);
        }
        for action in &block.actions {
            check_action(spec, action, &ctx, warnings);
        }
    }
}

fn check_node(
    spec: &RuleSpec,
    node: &ConditionNode,
    ctx: &str,
    warnings: &mut Vec<LintWarning>,
) {
    match node {
        ConditionNode::Leaf { predicate, .. } => check_predicate(spec, predicate, ctx, warnings),
        ConditionNode::Group { children, .. } => {
            for child in children {
                check_node(spec, child, ctx, warnings);
            }
        }
    }
}

fn check_predicate(
    spec: &RuleSpec,
    predicate: &Predicate,
    ctx: &str,
    warnings: &mut Vec<LintWarning>,
) {
    match predicate {
        Predicate::AnyInList { list_id, .. }
        | Predicate::NoneInList { list_id }
        | Predicate::CountInHistory { list_id, .. } => {
            check_list_ref(spec, list_id, ctx, warnings);
        }
        Predicate::DerivedNumber { key, .. } => {
            if !spec.derived.iter().any(|def| def.key == *key) {
                warnings.push(LintWarning::UnknownDerived {
                    block: ctx.to_string(),
                    key: key.clone(),
                });
            }
        }
        _ => {}
    }
}

fn check_action(spec: &RuleSpec, action: &Action, ctx: &str, warnings: &mut Vec<LintWarning>) {
    match action {
        Action::AppendRandomFromList { list_id, .. }
        | Action::AppendWeightedFromList { list_id, .. } => {
            check_list_ref(spec, list_id, ctx, warnings);
        }
        _ => {}
    }
}

fn check_list_ref(spec: &RuleSpec, list_id: &str, ctx: &str, warnings: &mut Vec<LintWarning>) {
    if spec.find_list(list_id).is_none() {
        warnings.push(LintWarning::UnknownList {
            context: ctx.to_string(),
            id: list_id.to_string(),
        });
    }
}

fn block_context(index: usize, block: &Block) -> String {
    match &block.label {
        Some(label) => format!("block {} ({} '{}')", index, block.kind, label),
        None => format!("block {} ({})", index, block.kind),
    }
}
