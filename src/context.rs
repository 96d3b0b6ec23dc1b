//! # Profile State and Run Context
//!
//! The mutable subject of every run is a [`ProfileState`]: the character's
//! text fields plus a persistent memory map. The caller owns it, hands it to
//! a run, and receives the mutated copy back. Nothing in this crate retains
//! state between runs, so chaining runs is simply feeding one outcome's
//! profile into the next run's input.
//!
//! [`HistoryView`] is the read-only side: recent chat messages, normalized
//! once up front, plus the total message counter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::TextField;
use crate::matching;

/// Maximum number of history entries retained for matching. The message
/// counter is not capped; only the text window is.
pub const HISTORY_RETENTION: usize = 50;

/// One memory slot. Authoring and the host runtime both treat memory as
/// loosely typed, so a slot is whichever of the two shapes was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemoryValue {
    Number(f64),
    Text(String),
}

impl MemoryValue {
    /// Numeric reading of the slot. Text parses leniently; anything that is
    /// not a finite number reads as zero.
    pub fn as_number(&self) -> f64 {
        match self {
            MemoryValue::Number(n) => *n,
            MemoryValue::Text(s) => s
                .trim()
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .unwrap_or(0.0),
        }
    }

    /// Text reading of the slot.
    pub fn as_text(&self) -> String {
        match self {
            MemoryValue::Number(n) => format!("{}", n),
            MemoryValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for MemoryValue {
    fn from(value: f64) -> Self {
        MemoryValue::Number(value)
    }
}

impl From<&str> for MemoryValue {
    fn from(value: &str) -> Self {
        MemoryValue::Text(value.to_string())
    }
}

impl From<String> for MemoryValue {
    fn from(value: String) -> Self {
        MemoryValue::Text(value)
    }
}

/// The character profile a rule set reads and mutates.
///
/// An ordered map keeps serialized output stable, which matters for the
/// preview command and for comparing outcomes across backends.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileState {
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub example_dialogs: String,
    #[serde(default)]
    pub memory: BTreeMap<String, MemoryValue>,
}

impl ProfileState {
    pub fn from_json(content: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn field(&self, field: TextField) -> &str {
        match field {
            TextField::Personality => &self.personality,
            TextField::Scenario => &self.scenario,
            TextField::ExampleDialogs => &self.example_dialogs,
        }
    }

    pub fn field_mut(&mut self, field: TextField) -> &mut String {
        match field {
            TextField::Personality => &mut self.personality,
            TextField::Scenario => &mut self.scenario,
            TextField::ExampleDialogs => &mut self.example_dialogs,
        }
    }

    /// Numeric reading of a memory slot; missing slots read as zero.
    pub fn memory_number(&self, key: &str) -> f64 {
        self.memory.get(key).map(|v| v.as_number()).unwrap_or(0.0)
    }

    /// Text reading of a memory slot; missing slots read as empty.
    pub fn memory_text(&self, key: &str) -> String {
        self.memory.get(key).map(|v| v.as_text()).unwrap_or_default()
    }
}

/// Recent chat history as the predicates see it: normalized entries, oldest
/// to newest, capped at [`HISTORY_RETENTION`].
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    entries: Vec<String>,
    last: String,
    message_count: u64,
}

impl HistoryView {
    /// Builds the view from raw messages. `message_count` overrides the
    /// total counter for callers whose full transcript is longer than the
    /// slice they pass in; when absent the slice length is the count.
    pub fn new(history: &[String], message_count: Option<u64>) -> Self {
        let skip = history.len().saturating_sub(HISTORY_RETENTION);
        let entries: Vec<String> = history[skip..].iter().map(|m| matching::normalize(m)).collect();
        let last = entries.last().cloned().unwrap_or_default();
        Self {
            entries,
            last,
            message_count: message_count.unwrap_or(history.len() as u64),
        }
    }

    /// Normalized retained entries, oldest to newest.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Normalized text of the most recent message, empty when there is none.
    pub fn last(&self) -> &str {
        &self.last
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}
