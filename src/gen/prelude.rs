//! # Script Runtime Helpers
//!
//! Emits the helper functions embedded at the top of every generated
//! script. Each helper mirrors one routine of [`crate::matching`] or of
//! the in-process evaluators, and the cue list, negation window, and
//! history retention are emitted from the same constants the interpreter
//! uses, so the two backends cannot drift apart on those values.
//!
//! Helpers close over the data locals (`__km_lists`, `__km_hist`, and
//! friends), which the generator declares before this prelude runs.

use super::writer::LuaWriter;
use super::{lua_quote, GeneratorConfig};
use crate::matching::{NEGATION_CUES, NEGATION_WINDOW};

/// Emits the cue table and every helper function.
pub(crate) fn emit_helpers(w: &mut LuaWriter, config: &GeneratorConfig) {
    let profile = &config.profile_global;

    let cues = NEGATION_CUES
        .iter()
        .map(|cue| lua_quote(cue))
        .collect::<Vec<_>>()
        .join(", ");
    w.line(&format!("local __km_cues = {{ {} }}", cues));
    w.blank();

    // Matching.
    w.line("local function __km_norm(s)");
    w.indent();
    w.line("return string.lower(s or \"\")");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_is_cue_tail(win)");
    w.indent();
    // Same four trim characters as the interpreter, not Lua's %s class.
    w.line("win = string.gsub(win, \"[ \\t\\n\\r]+$\", \"\")");
    w.line("for i = 1, #__km_cues do");
    w.indent();
    w.line("local cue = __km_cues[i]");
    w.line("if #win >= #cue and string.sub(win, -#cue) == cue then");
    w.indent();
    w.line("local before = string.sub(win, -#cue - 1, -#cue - 1)");
    w.line("if before == \"\" or not string.find(before, \"^[a-z]$\") then");
    w.indent();
    w.line("return true");
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.line("return false");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_negated_at(hay, at)");
    w.indent();
    w.line(&format!("local first = at - {}", NEGATION_WINDOW));
    w.line("if first < 1 then first = 1 end");
    w.line("return __km_is_cue_tail(string.sub(hay, first, at - 1))");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_has_unnegated(hay, needle)");
    w.indent();
    w.line("local from = 1");
    w.line("while true do");
    w.indent();
    w.line("local s = string.find(hay, needle, from, true)");
    w.line("if not s then return false end");
    w.line("if not __km_negated_at(hay, s) then return true end");
    w.line("from = s + 1");
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_scan(list, hay, guarded)");
    w.indent();
    w.line("if not list then return nil end");
    w.line("for i = 1, #list do");
    w.indent();
    w.line("local needle = __km_norm(list[i].t)");
    w.line("if #needle > 0 then");
    w.indent();
    w.line("if guarded then");
    w.indent();
    w.line("if __km_has_unnegated(hay, needle) then return needle end");
    w.dedent();
    w.line("elseif string.find(hay, needle, 1, true) then");
    w.indent();
    w.line("return needle");
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.line("return nil");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_any(list, hay, guarded)");
    w.indent();
    w.line("return __km_scan(list, hay, guarded) ~= nil");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_any_hist(list, guarded)");
    w.indent();
    w.line("for i = 1, #__km_hist do");
    w.indent();
    w.line("if __km_any(list, __km_hist[i], guarded) then return true end");
    w.dedent();
    w.line("end");
    w.line("return false");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_count_window(list, win)");
    w.indent();
    w.line("if not list or win <= 0 then return 0 end");
    w.line("local n = #__km_hist");
    w.line("local take = win");
    w.line("if take > n then take = n end");
    w.line("local count = 0");
    w.line("for i = n - take + 1, n do");
    w.indent();
    w.line("if __km_any(list, __km_hist[i], false) then count = count + 1 end");
    w.dedent();
    w.line("end");
    w.line("return count");
    w.dedent();
    w.line("end");
    w.blank();

    // Comparison and counters.
    w.line("local function __km_cmp(op, a, b)");
    w.indent();
    w.line("if op == \">=\" then return a >= b end");
    w.line("if op == \">\" then return a > b end");
    w.line("if op == \"==\" then return a == b end");
    w.line("if op == \"!=\" then return a ~= b end");
    w.line("if op == \"<=\" then return a <= b end");
    w.line("if op == \"<\" then return a < b end");
    w.line("return a >= b");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_every(count, step)");
    w.indent();
    w.line("step = math.floor(step)");
    w.line("return count > 0 and step > 0 and count % step == 0");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_chance(p)");
    w.indent();
    w.line("return math.random() * 100 < p");
    w.dedent();
    w.line("end");
    w.blank();

    // Profile access.
    w.line("local function __km_field(f)");
    w.indent();
    w.line(&format!("return {}[f] or \"\"", profile));
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_has(hay, needle, ci)");
    w.indent();
    w.line("if ci then");
    w.indent();
    w.line("return string.find(__km_norm(hay), __km_norm(needle), 1, true) ~= nil");
    w.dedent();
    w.line("end");
    w.line("return string.find(hay, needle, 1, true) ~= nil");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_mem_num(k)");
    w.indent();
    w.line(&format!("local v = {}.memory[k]", profile));
    w.line("if type(v) == \"number\" then return v end");
    w.line("return tonumber(v) or 0");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_mem_str(k)");
    w.indent();
    w.line(&format!("local v = {}.memory[k]", profile));
    w.line("if v == nil then return \"\" end");
    w.line("if type(v) == \"string\" then return v end");
    w.line("return tostring(v)");
    w.dedent();
    w.line("end");
    w.blank();

    // Writes.
    w.line("local function __km_set(f, v)");
    w.indent();
    w.line(&format!("{}[f] = v", profile));
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_append(f, v)");
    w.indent();
    w.line("if v == nil then return end");
    w.line(&format!("local cur = {}[f] or \"\"", profile));
    w.line("if cur == \"\" then");
    w.indent();
    w.line(&format!("{}[f] = v", profile));
    w.dedent();
    w.line("else");
    w.indent();
    w.line(&format!("{}[f] = cur .. \"\\n\" .. v", profile));
    w.dedent();
    w.line("end");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_pick(list)");
    w.indent();
    w.line("if not list or #list == 0 then return nil end");
    w.line("local i = math.floor(math.random() * #list) + 1");
    w.line("if i > #list then i = #list end");
    w.line("return list[i].t");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_pick_weighted(list)");
    w.indent();
    w.line("if not list then return nil end");
    w.line("local total = 0");
    w.line("for i = 1, #list do total = total + list[i].w end");
    w.line("if total <= 0 then return nil end");
    w.line("local roll = math.random() * total");
    w.line("local acc = 0");
    w.line("for i = 1, #list do");
    w.indent();
    w.line("acc = acc + list[i].w");
    w.line("if roll < acc then return list[i].t end");
    w.dedent();
    w.line("end");
    w.line("return list[#list].t");
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_mem_set(k, v)");
    w.indent();
    w.line(&format!("{}.memory[k] = v", profile));
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_mem_add(k, v)");
    w.indent();
    w.line(&format!("{}.memory[k] = __km_mem_num(k) + v", profile));
    w.dedent();
    w.line("end");
    w.blank();

    w.line("local function __km_mem_cat(k, v)");
    w.indent();
    w.line(&format!("{}.memory[k] = __km_mem_str(k) .. v", profile));
    w.dedent();
    w.line("end");
}
