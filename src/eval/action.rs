//! # Action Application
//!
//! Applies a fired block's actions to the profile state, in authored
//! order. Actions are total: an unresolved list or a zero-weight list
//! makes the injection actions do nothing, and numeric memory writes
//! coerce whatever is currently stored to a number first. Each application
//! returns a one-line description for the run trace.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::ast::{Action, KeywordList, NumberMode, RuleSpec, TextField, TextMode};
use crate::context::{MemoryValue, ProfileState};

pub struct ActionApplier;

impl Default for ActionApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionApplier {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        action: &Action,
        spec: &RuleSpec,
        profile: &mut ProfileState,
        rng: &mut StdRng,
    ) -> String {
        let description = match action {
            Action::AppendText { field, mode, text } => {
                write_field(profile, *field, *mode, text);
                match mode {
                    TextMode::Set => format!("set {} = {:?}", field, text),
                    TextMode::Append => format!("append {} {:?}", field, text),
                }
            }
            Action::AppendRandomFromList { field, list_id } => {
                match spec.find_list(list_id).and_then(|list| pick(list, rng)) {
                    Some(text) => {
                        write_field(profile, *field, TextMode::Append, &text);
                        format!("append {} from '{}': {:?}", field, list_id, text)
                    }
                    None => format!("skip append from '{}' (nothing to pick)", list_id),
                }
            }
            Action::AppendWeightedFromList { field, list_id } => {
                match spec
                    .find_list(list_id)
                    .and_then(|list| pick_weighted(list, rng))
                {
                    Some(text) => {
                        write_field(profile, *field, TextMode::Append, &text);
                        format!("append {} from '{}' (weighted): {:?}", field, list_id, text)
                    }
                    None => format!("skip append from '{}' (nothing to pick)", list_id),
                }
            }
            Action::MemoryNumber { key, mode, value } => {
                let current = profile.memory_number(key);
                let next = match mode {
                    NumberMode::Set => *value,
                    NumberMode::Add => current + value,
                    NumberMode::Subtract => current - value,
                };
                profile.memory.insert(key.clone(), MemoryValue::Number(next));
                format!("memory '{}' = {}", key, next)
            }
            Action::MemoryText { key, mode, value } => {
                let next = match mode {
                    TextMode::Set => value.clone(),
                    TextMode::Append => {
                        let mut text = profile.memory_text(key);
                        text.push_str(value);
                        text
                    }
                };
                let description = format!("memory '{}' = {:?}", key, next);
                profile.memory.insert(key.clone(), MemoryValue::Text(next));
                description
            }
        };
        debug!("action: {}", description);
        description
    }
}

/// Appends with a newline separator when the target already has content;
/// `set` replaces outright.
fn write_field(profile: &mut ProfileState, field: TextField, mode: TextMode, text: &str) {
    let target = profile.field_mut(field);
    match mode {
        TextMode::Set => {
            target.clear();
            target.push_str(text);
        }
        TextMode::Append => {
            if !target.is_empty() {
                target.push('\n');
            }
            target.push_str(text);
        }
    }
}

/// Uniform pick over all entries; weights are ignored here.
fn pick(list: &KeywordList, rng: &mut StdRng) -> Option<String> {
    let len = list.entries.len();
    if len == 0 {
        return None;
    }
    let index = ((rng.gen::<f64>() * len as f64).floor() as usize).min(len - 1);
    Some(list.entries[index].text.clone())
}

/// Weighted pick: one roll over the cumulative weights. A list whose
/// weights sum to zero yields nothing; float fall-through takes the last
/// entry.
fn pick_weighted(list: &KeywordList, rng: &mut StdRng) -> Option<String> {
    let total: u64 = list.entries.iter().map(|e| e.weight as u64).sum();
    if total == 0 {
        return None;
    }
    let roll = rng.gen::<f64>() * total as f64;
    let mut acc = 0.0;
    for entry in &list.entries {
        acc += entry.weight as f64;
        if roll < acc {
            return Some(entry.text.clone());
        }
    }
    list.entries.last().map(|e| e.text.clone())
}
