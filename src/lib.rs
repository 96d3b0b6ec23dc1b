//! # KOTODAMA: Keyword Rule Engine for Character Profiles
//!
//! KOTODAMA evaluates authored keyword rules against a conversation and
//! injects text into a character profile, either directly in process or
//! through generated standalone script text.
//!
//! ## Rule Processing Pipeline
//!
//! ```text
//! Rule JSON → RuleSpec → Lint (advisory)
//!                      → Interpreter      → mutated profile + trace
//!                      → ScriptGenerator  → Lua script text
//! ```
//!
//! ### Stage 1: Parsing
//!
//! The [`ast`] module defines the rule model and its tolerant JSON form:
//! keyword lists, derived metric definitions, condition trees over a fixed
//! predicate catalog, and ordered `if` / `else_if` / `else` blocks.
//! Authoring mistakes degrade to documented defaults instead of errors.
//!
//! ### Stage 2: Context
//!
//! The [`context`] module holds what rules run against: the profile state
//! with its text fields and memory slots, and a normalized view of recent
//! history capped at [`context::HISTORY_RETENTION`] messages.
//!
//! ### Stage 3: Matching and Derived Metrics
//!
//! The [`matching`] module implements keyword scanning with the optional
//! negation guard; [`derived`] computes sliding-window counters from it
//! before any block runs.
//!
//! ### Stage 4: Execution
//!
//! The [`eval`] module walks the block sequence chain by chain, evaluates
//! condition trees, applies actions, and records an explain trace for every
//! block. At most one arm per chain fires.
//!
//! ### Stage 5: Generation
//!
//! The [`gen`] module compiles the same rule set to self-contained script
//! text for hosts that cannot embed the interpreter. Its condition walk is
//! isomorphic to the evaluator's, so both backends agree.
//!
//! ## Advisory Checks
//!
//! The [`lint`] module reports structural problems (orphan branches, unknown
//! references, dead blocks) without ever blocking execution; [`error`]
//! covers the fallible edges, which are parsing and file handling only.

pub mod ast;
pub mod context;
pub mod derived;
pub mod error;
pub mod eval;
pub mod gen;
pub mod lint;
pub mod matching;

// Re-exports
pub use ast::*;
pub use context::{HistoryView, MemoryValue, ProfileState};
pub use error::*;
pub use eval::{BlockTrace, Interpreter, RunInput, RunOutcome, RunTrace};
pub use gen::{GeneratorConfig, ScriptGenerator};
pub use lint::{lint, LintWarning};
