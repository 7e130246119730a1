//! Line-oriented output buffer with indentation tracking.

pub(crate) struct CodeWriter {
    out: String,
    depth: usize,
    unit: &'static str,
}

impl CodeWriter {
    pub(crate) fn new(unit: &'static str) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            unit,
        }
    }

    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write a line and indent what follows
    pub(crate) fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent and write a closing line
    pub(crate) fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Close the current block and open the next one on the same line (`} else {`)
    pub(crate) fn reopen(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
        self.depth += 1;
    }

    /// Write user-supplied code, one indented line per source line
    pub(crate) fn verbatim(&mut self, code: &str) {
        for line in code.lines() {
            self.line(line.trim_end());
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Make text safe for a single-line comment
pub(crate) fn comment_text(text: &str) -> String {
    text.replace(['\n', '\r'], " ").replace("*/", "* /")
}
