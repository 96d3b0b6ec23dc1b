//! # Script Generation
//!
//! Compiles a rule set into standalone Lua source text for deployment to
//! an external host runtime. The emitted script has no dependencies
//! beyond the Lua base library and is plain Lua 5.1-compatible text.
//!
//! # Host Contract
//!
//! The host executes the script once per conversational turn and provides
//! exactly two globals (names configurable via [`GeneratorConfig`]):
//!
//! * `profile`: a table with the text fields `personality`, `scenario`,
//!   and `example_dialogs`, plus a `memory` table of loosely typed slots.
//!   The script creates `memory` when the host omits it.
//! * `chat`: an array-like table of recent message strings, oldest first.
//!   The script derives the message counter from its length.
//!
//! The script performs its own normalization and derived-metric
//! computation, mirroring the in-process interpreter. For rule sets
//! without random predicates or actions, executing the script over the
//! same inputs leaves the profile exactly as an interpreter run would.
//!
//! # Emission Layout
//!
//! 1. Embedded keyword lists and data locals.
//! 2. Runtime helpers (one per matching/evaluation routine).
//! 3. History normalization and derived-metric computation.
//! 4. One `if`/`elseif`/`else` construct per chain, with condition
//!    expressions compiled by the same tree walk the evaluator uses.

mod prelude;
pub mod script;
pub mod writer;

pub use script::ScriptGenerator;

/// Emission settings: the two host global names and the indent width.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Name of the host's profile global. Must be a Lua identifier.
    pub profile_global: String,
    /// Name of the host's chat-history global. Must be a Lua identifier.
    pub chat_global: String,
    pub indent_spaces: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            profile_global: "profile".to_string(),
            chat_global: "chat".to_string(),
            indent_spaces: 2,
        }
    }
}

/// Quotes a string as a Lua literal. Control characters use padded
/// decimal escapes so a following digit cannot extend them.
pub(crate) fn lua_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Formats a number as a Lua literal. Plain decimal formatting round-trips
/// through the host's parser to the same double. Non-finite values become
/// `0`, the same coercion the rule parser applies to them.
pub(crate) fn lua_number(value: f64) -> String {
    if value.is_finite() {
        format!("{}", value)
    } else {
        "0".to_string()
    }
}
