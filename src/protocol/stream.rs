use std::collections::HashSet;

use super::scanner::{scan, Document, RawBlock};

/// Assistant text that grows as tokens stream in.
///
/// Every `push` rescans from scratch. Closed blocks keep their offsets across
/// appends, so the start offset identifies a block for the whole stream.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    text: String,
    doc: Document,
    handed_out: HashSet<usize>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.doc = scan(&self.text);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Closed, unresolved action blocks not returned by an earlier call.
    pub fn take_ready(&mut self) -> Vec<RawBlock> {
        let ready: Vec<RawBlock> = self
            .doc
            .pending_actions()
            .into_iter()
            .filter(|b| !self.handed_out.contains(&b.start))
            .cloned()
            .collect();
        self.handed_out.extend(ready.iter().map(|b| b.start));
        ready
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
