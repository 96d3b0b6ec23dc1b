//! Indent-aware text writer for script emission.

/// Accumulates generated script text line by line. Emission cannot fail;
/// the writer is consumed by [`LuaWriter::finish`].
pub struct LuaWriter {
    indent_spaces: usize,
    indent_level: usize,
    output: String,
}

impl LuaWriter {
    pub fn new(indent_spaces: usize) -> Self {
        Self {
            indent_spaces,
            indent_level: 0,
            output: String::new(),
        }
    }

    /// Writes one line at the current indent level.
    pub fn line(&mut self, text: &str) {
        if !text.is_empty() {
            self.output
                .push_str(&" ".repeat(self.indent_level * self.indent_spaces));
            self.output.push_str(text);
        }
        self.output.push('\n');
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn finish(self) -> String {
        self.output
    }
}
