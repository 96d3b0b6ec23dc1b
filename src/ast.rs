//! # Rule Model
//!
//! This module defines the data model for injection rules: keyword lists,
//! derived metric definitions, condition trees, and the ordered block
//! sequence that makes up a rule set.
//!
//! ## Structure
//!
//! A [`RuleSpec`] is the unit of authoring and execution. It carries:
//!
//! * **Keyword lists**: named collections of text entries used by matching
//!   predicates and by the random/weighted injection actions.
//! * **Derived definitions**: sliding-window counters computed from recent
//!   history before any block runs.
//! * **Blocks**: an ordered sequence of `if` / `else_if` / `else` branches,
//!   each with a condition tree and a list of actions.
//!
//! ## Tolerant input
//!
//! Rule sets are produced by an authoring UI and arrive as JSON. The model
//! is deliberately forgiving at that edge: list entries may be bare strings,
//! numeric fields accept numbers or numeric strings (anything else becomes
//! zero), and an unrecognized comparison operator falls back to `>=`. None
//! of these degrade into errors; evaluation over a parsed [`RuleSpec`] is
//! total.

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};

/// A complete rule set: keyword lists, derived metric definitions, and the
/// ordered branch blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub lists: Vec<KeywordList>,
    #[serde(default)]
    pub derived: Vec<DerivedDef>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl RuleSpec {
    pub fn new(lists: Vec<KeywordList>, derived: Vec<DerivedDef>, blocks: Vec<Block>) -> Self {
        Self {
            lists,
            derived,
            blocks,
        }
    }

    /// Parses a rule set from its JSON authoring form.
    pub fn from_json(content: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolves a list id. Later definitions shadow earlier ones, which
    /// keeps in-process lookup consistent with the generated script, where
    /// a duplicated table key also takes the last value.
    pub fn find_list(&self, id: &str) -> Option<&KeywordList> {
        self.lists.iter().rev().find(|list| list.id == id)
    }
}

/// A named collection of text entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordList {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub entries: Vec<ListEntry>,
}

impl KeywordList {
    pub fn new(id: impl Into<String>, label: impl Into<String>, entries: Vec<ListEntry>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            entries,
        }
    }
}

/// One entry of a keyword list. The weight only matters to the weighted
/// injection action; matching predicates ignore it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    pub text: String,
    pub weight: u32,
}

impl ListEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weight: 1,
        }
    }

    pub fn weighted(text: impl Into<String>, weight: u32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

// Authoring UIs send either a bare string or the full {text, weight} form.
impl<'de> Deserialize<'de> for ListEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Full {
                text: String,
                #[serde(default = "default_weight", deserialize_with = "lenient_u32")]
                weight: u32,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => ListEntry { text, weight: 1 },
            Repr::Full { text, weight } => ListEntry { text, weight },
        })
    }
}

/// A sliding-window counter over recent history: how many of the last
/// `window` messages contain any entry of the referenced list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDef {
    pub key: String,
    pub list_id: String,
    #[serde(default = "default_window", deserialize_with = "lenient_u32")]
    pub window: u32,
}

impl DerivedDef {
    pub fn new(key: impl Into<String>, list_id: impl Into<String>, window: u32) -> Self {
        Self {
            key: key.into(),
            list_id: list_id.into(),
            window,
        }
    }
}

/// How sibling conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Join {
    /// Every child must hold.
    #[default]
    All,
    /// At least one child must hold.
    Any,
}

/// A node of a condition tree.
///
/// Groups nest arbitrarily. A group with no children is vacuously true
/// before its own negation is applied, so an empty `all` group holds and an
/// empty negated group does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Leaf {
        predicate: Predicate,
        #[serde(default)]
        negate: bool,
    },
    Group {
        #[serde(default)]
        join: Join,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        children: Vec<ConditionNode>,
    },
}

impl ConditionNode {
    pub fn leaf(predicate: Predicate) -> Self {
        ConditionNode::Leaf {
            predicate,
            negate: false,
        }
    }

    pub fn group(join: Join, children: Vec<ConditionNode>) -> Self {
        ConditionNode::Group {
            join,
            negate: false,
            children,
        }
    }

    /// Returns the same node with its negation flag flipped.
    pub fn negated(self) -> Self {
        match self {
            ConditionNode::Leaf { predicate, negate } => ConditionNode::Leaf {
                predicate,
                negate: !negate,
            },
            ConditionNode::Group {
                join,
                negate,
                children,
            } => ConditionNode::Group {
                join,
                negate: !negate,
                children,
            },
        }
    }
}

/// Which text a matching predicate inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchSource {
    /// The most recent message only.
    #[default]
    LastMessage,
    /// Any retained history entry.
    History,
}

/// A text field of the character profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TextField {
    Personality,
    Scenario,
    ExampleDialogs,
}

impl TextField {
    /// Stable key used both for serialization and for field access in the
    /// generated script.
    pub fn key(&self) -> &'static str {
        match self {
            TextField::Personality => "personality",
            TextField::Scenario => "scenario",
            TextField::ExampleDialogs => "example_dialogs",
        }
    }
}

/// The fixed predicate catalog.
///
/// Every predicate evaluates to a plain boolean and never fails: an
/// unresolved list, a missing memory key, or a malformed number degrades to
/// the conservative default documented on each variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// True when any entry of the list occurs in the source text. With the
    /// negation guard enabled, only occurrences that are not preceded by a
    /// negation cue count. Unresolved list: false.
    AnyInList {
        list_id: String,
        #[serde(default)]
        source: MatchSource,
        #[serde(default)]
        negation_guard: bool,
    },
    /// True when no entry of the list occurs in the last message.
    /// Unresolved list: true.
    NoneInList { list_id: String },
    /// Compares how many of the last `window` history entries contain any
    /// entry of the list. Unresolved list counts zero.
    CountInHistory {
        list_id: String,
        #[serde(default = "default_window", deserialize_with = "lenient_u32")]
        window: u32,
        #[serde(default)]
        op: NumericOp,
        #[serde(default, deserialize_with = "lenient_f64")]
        threshold: f64,
    },
    /// Compares the total message count. The `every` operator fires on
    /// every n-th message: count positive and divisible by the threshold.
    MessageCount {
        #[serde(default)]
        op: CountOp,
        #[serde(default, deserialize_with = "lenient_f64")]
        threshold: f64,
    },
    /// Numeric comparison against a memory slot. Missing or non-numeric
    /// values read as zero.
    MemoryNumber {
        key: String,
        #[serde(default)]
        op: NumericOp,
        #[serde(default, deserialize_with = "lenient_f64")]
        threshold: f64,
    },
    /// Substring test against a memory slot. A missing slot reads as the
    /// empty string.
    MemoryText {
        key: String,
        needle: String,
        #[serde(default = "default_true")]
        case_insensitive: bool,
    },
    /// Substring test against a profile text field.
    FieldContains {
        field: TextField,
        needle: String,
        #[serde(default = "default_true")]
        case_insensitive: bool,
    },
    /// Compares a derived sliding-window counter. Unknown keys read as
    /// zero.
    DerivedNumber {
        key: String,
        #[serde(default)]
        op: NumericOp,
        #[serde(default, deserialize_with = "lenient_f64")]
        threshold: f64,
    },
    /// True with the given probability, drawn independently on every
    /// evaluation. Values at or below zero never hold, values at or above
    /// one hundred always do.
    RandomChance {
        #[serde(default, deserialize_with = "lenient_f64")]
        percent: f64,
    },
}

/// Numeric comparison operators in their authoring form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
pub enum NumericOp {
    #[default]
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "<")]
    Lt,
}

impl NumericOp {
    /// Applies the comparison. Equality on floats is exact; counters and
    /// thresholds are small integers in practice.
    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            NumericOp::Ge => lhs >= rhs,
            NumericOp::Gt => lhs > rhs,
            NumericOp::Eq => lhs == rhs,
            NumericOp::Ne => lhs != rhs,
            NumericOp::Le => lhs <= rhs,
            NumericOp::Lt => lhs < rhs,
        }
    }
}

impl Serialize for NumericOp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// 不明な演算子は >= に落とす
impl<'de> Deserialize<'de> for NumericOp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.trim().parse().unwrap_or_default())
    }
}

/// Comparison operators for the message counter: the numeric set plus
/// `every`, which holds on every n-th message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    Compare(NumericOp),
    Every,
}

impl Default for CountOp {
    fn default() -> Self {
        CountOp::Compare(NumericOp::Ge)
    }
}

impl std::fmt::Display for CountOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountOp::Compare(op) => write!(f, "{}", op),
            CountOp::Every => write!(f, "every"),
        }
    }
}

impl Serialize for CountOp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CountOp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();
        if s.eq_ignore_ascii_case("every") {
            Ok(CountOp::Every)
        } else {
            Ok(CountOp::Compare(s.parse().unwrap_or_default()))
        }
    }
}

/// Branch role of a block within its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[strum(serialize = "IF")]
    If,
    #[strum(serialize = "ELSEIF")]
    ElseIf,
    #[strum(serialize = "ELSE")]
    Else,
}

/// One authored branch: a condition tree plus the actions applied when the
/// branch fires. `else` branches carry no conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub join: Join,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Block {
    pub fn new(
        kind: BlockKind,
        join: Join,
        conditions: Vec<ConditionNode>,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            kind,
            label: None,
            join,
            conditions,
            actions,
        }
    }

    pub fn else_block(actions: Vec<Action>) -> Self {
        Self {
            kind: BlockKind::Else,
            label: None,
            join: Join::All,
            conditions: Vec::new(),
            actions,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Write mode for profile text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TextMode {
    /// Append with a newline separator when the target is not empty.
    #[default]
    Append,
    /// Replace the target outright.
    Set,
}

/// Write mode for numeric memory slots. The authoring form treats
/// `append` and `add` as the same operation on numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NumberMode {
    #[default]
    Set,
    #[serde(alias = "append")]
    Add,
    Subtract,
}

/// The fixed action catalog. Actions are total over the profile state;
/// an unresolved list makes the injection actions do nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Writes fixed text into a profile field.
    AppendText {
        field: TextField,
        #[serde(default)]
        mode: TextMode,
        text: String,
    },
    /// Appends one uniformly chosen entry of a list.
    AppendRandomFromList { field: TextField, list_id: String },
    /// Appends one entry chosen proportionally to entry weights. A list
    /// whose weights sum to zero yields nothing.
    AppendWeightedFromList { field: TextField, list_id: String },
    /// Writes or adjusts a numeric memory slot. Unset slots start from
    /// zero, so subtracting five from an unset slot leaves minus five.
    MemoryNumber {
        key: String,
        #[serde(default)]
        mode: NumberMode,
        #[serde(default, deserialize_with = "lenient_f64")]
        value: f64,
    },
    /// Writes or extends a text memory slot. Append adds no separator.
    MemoryText {
        key: String,
        #[serde(default)]
        mode: TextMode,
        value: String,
    },
}

fn default_weight() -> u32 {
    1
}

fn default_window() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Accepts a number, a numeric string, or a boolean; everything else
/// (including nothing at all) reads as zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .unwrap_or(0.0),
        serde_json::Value::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    })
}

/// Same leniency for window and weight fields; negative input clamps to
/// zero rather than wrapping.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_f64(deserializer)?;
    if value.is_nan() || value <= 0.0 {
        Ok(0)
    } else if value >= u32::MAX as f64 {
        Ok(u32::MAX)
    } else {
        Ok(value as u32)
    }
}
