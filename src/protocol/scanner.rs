use regex::{Captures, Regex};
use tracing::trace;

use super::registry::{self, TagKind, TagSpec};

// ── Located blocks ────────────────────────────────────────────────────────────

/// One `[Tag]...[/Tag]` occurrence, with byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub spec: &'static TagSpec,
    /// Offset of the opening `[`.
    pub start: usize,
    /// Offset just past the closing marker, or the end of text when unclosed.
    pub end: usize,
    pub body_start: usize,
    pub body: String,
    pub closed: bool,
}

impl RawBlock {
    pub fn tag(&self) -> &'static str {
        self.spec.name
    }

    pub fn closing_marker(&self) -> String {
        closing_marker(self.spec.name)
    }

    /// Body for display while the block is still streaming in. A partially
    /// received closing marker at the tail (`[/Crea`) is hidden.
    pub fn pending_body(&self) -> &str {
        if self.closed {
            return &self.body;
        }
        let marker = self.closing_marker();
        for len in (1..marker.len()).rev() {
            if let Some(stripped) = self.body.strip_suffix(&marker[..len]) {
                return stripped;
            }
        }
        &self.body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text { start: usize, text: String },
    Block(RawBlock),
    /// A closing marker of a registered tag with no opener before it.
    Stray { tag: &'static str, start: usize, end: usize },
}

impl Segment {
    pub fn range(&self) -> (usize, usize) {
        match self {
            Segment::Text { start, text } => (*start, start + text.len()),
            Segment::Block(block) => (block.start, block.end),
            Segment::Stray { start, end, .. } => (*start, *end),
        }
    }
}

// ── Document ──────────────────────────────────────────────────────────────────

/// Scanned text as an ordered run of segments covering every byte once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub segments: Vec<Segment>,
}

impl Document {
    pub fn blocks(&self) -> impl Iterator<Item = &RawBlock> {
        self.segments.iter().filter_map(|seg| match seg {
            Segment::Block(block) => Some(block),
            _ => None,
        })
    }

    pub fn action_blocks(&self) -> impl Iterator<Item = &RawBlock> {
        self.blocks().filter(|b| b.spec.kind == TagKind::Action)
    }

    /// Pair every block of `action`'s tag with the result answering it.
    ///
    /// A result answers the nearest earlier block of the same tag that has
    /// no result yet. Results with no such block answer the earliest
    /// unanswered blocks in textual order, so a result written before its
    /// action still counts.
    fn pairings(&self, action: &TagSpec) -> Vec<(&RawBlock, Option<&RawBlock>)> {
        let Some(result_tag) = action.result_tag else {
            return Vec::new();
        };
        let mut pairs: Vec<(&RawBlock, Option<&RawBlock>)> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut early: Vec<&RawBlock> = Vec::new();
        for block in self.blocks() {
            if block.spec.name == action.name {
                open.push(pairs.len());
                pairs.push((block, None));
            } else if block.spec.name == result_tag {
                match open.pop() {
                    Some(i) => pairs[i].1 = Some(block),
                    None => early.push(block),
                }
            }
        }
        let mut early = early.into_iter();
        for pair in pairs.iter_mut().filter(|(_, result)| result.is_none()) {
            match early.next() {
                Some(result) => pair.1 = Some(result),
                None => break,
            }
        }
        pairs
    }

    /// The result block answering `action`, if the text already holds one.
    pub fn result_for(&self, action: &RawBlock) -> Option<&RawBlock> {
        self.pairings(action.spec)
            .into_iter()
            .find(|(block, _)| block.start == action.start)
            .and_then(|(_, result)| result)
    }

    pub fn is_resolved(&self, action: &RawBlock) -> bool {
        self.result_for(action).is_some()
    }

    /// Closed action blocks with no result yet, in textual order.
    pub fn pending_actions(&self) -> Vec<&RawBlock> {
        self.action_blocks()
            .filter(|b| b.closed && !self.is_resolved(b))
            .collect()
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

pub fn closing_marker(tag: &str) -> String {
    format!("[/{tag}]")
}

fn closer_pattern(tag: &str, extra: &str) -> Regex {
    // `tag` is escaped, so the pattern is always valid.
    Regex::new(&format!(r"\[{extra}(\\*)/{}\]", regex::escape(tag))).expect("closer pattern")
}

/// Make `text` safe to place inside a `[tag]` block: every `[/tag]`, and
/// every already escaped `[\/tag]`, gains one backslash.
pub fn escape_closer(text: &str, tag: &str) -> String {
    closer_pattern(tag, "")
        .replace_all(text, |caps: &Captures| format!("[\\{}/{tag}]", &caps[1]))
        .into_owned()
}

/// Inverse of [`escape_closer`].
pub fn unescape_closer(text: &str, tag: &str) -> String {
    closer_pattern(tag, r"\\")
        .replace_all(text, |caps: &Captures| format!("[{}/{tag}]", &caps[1]))
        .into_owned()
}

enum Marker {
    Open(&'static TagSpec, usize),
    Close(&'static TagSpec, usize),
}

/// Read a `[Name]` or `[/Name]` marker at `at`, which must point at `[`.
/// Only registered names count; anything else is prose.
fn read_marker(text: &str, at: usize) -> Option<Marker> {
    let bytes = text.as_bytes();
    let mut i = at + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    let ident_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == ident_start || bytes.get(i) != Some(&b']') {
        return None;
    }
    let spec = registry::lookup(&text[ident_start..i])?;
    let after = i + 1;
    Some(if closing {
        Marker::Close(spec, after)
    } else {
        Marker::Open(spec, after)
    })
}

fn push_text(segments: &mut Vec<Segment>, text: &str, from: usize, to: usize) {
    if from < to {
        segments.push(Segment::Text {
            start: from,
            text: text[from..to].to_string(),
        });
    }
}

/// Split `text` into plain text and tagged blocks in one left-to-right pass.
///
/// Each opener pairs with the nearest following closer of the same name.
/// Block bodies are opaque: markers inside them are not interpreted. An opener
/// without a closer yields an unclosed block running to the end of text.
pub fn scan(text: &str) -> Document {
    let mut segments = Vec::new();
    let mut plain_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('[') {
        let at = cursor + offset;
        match read_marker(text, at) {
            Some(Marker::Open(spec, body_start)) => {
                push_text(&mut segments, text, plain_start, at);
                let marker = closing_marker(spec.name);
                let (body_end, end, closed) = match text[body_start..].find(&marker) {
                    Some(rel) => {
                        let body_end = body_start + rel;
                        (body_end, body_end + marker.len(), true)
                    }
                    None => (text.len(), text.len(), false),
                };
                trace!(tag = spec.name, start = at, end, closed, "scanned block");
                segments.push(Segment::Block(RawBlock {
                    spec,
                    start: at,
                    end,
                    body_start,
                    body: text[body_start..body_end].to_string(),
                    closed,
                }));
                cursor = end;
                plain_start = end;
            }
            Some(Marker::Close(spec, end)) => {
                push_text(&mut segments, text, plain_start, at);
                trace!(tag = spec.name, start = at, "stray closing marker");
                segments.push(Segment::Stray {
                    tag: spec.name,
                    start: at,
                    end,
                });
                cursor = end;
                plain_start = end;
            }
            None => cursor = at + 1,
        }
    }
    push_text(&mut segments, text, plain_start, text.len());

    Document { segments }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_block(doc: &Document) -> &RawBlock {
        let blocks: Vec<_> = doc.blocks().collect();
        assert_eq!(blocks.len(), 1, "segments: {:?}", doc.segments);
        blocks[0]
    }

    #[test]
    fn single_closed_block() {
        let doc = scan("[PATH]src/main.rs[/PATH]");
        let block = only_block(&doc);
        assert_eq!(block.body, "src/main.rs");
        assert!(block.closed);
        assert_eq!((block.start, block.end), (0, 24));
        assert_eq!(block.body_start, 6);
    }

    #[test]
    fn segments_cover_every_byte() {
        let text = "see [PATH]a[/PATH] and [x] then [/PATH] end";
        let doc = scan(text);
        let mut next = 0;
        for seg in &doc.segments {
            let (start, end) = seg.range();
            assert_eq!(start, next);
            next = end;
        }
        assert_eq!(next, text.len());
    }

    #[test]
    fn unknown_brackets_stay_text() {
        let doc = scan("arr[0] and [Foo]bar[/Foo] and [ PATH ]");
        assert_eq!(doc.blocks().count(), 0);
        assert_eq!(doc.segments.len(), 1);
    }

    #[test]
    fn unclosed_block_runs_to_end() {
        let doc = scan("intro [CreateFile]\nname: a.rs\ncontent: fn");
        let block = only_block(&doc);
        assert!(!block.closed);
        assert_eq!(block.end, doc.segments.last().unwrap().range().1);
        assert_eq!(block.body, "\nname: a.rs\ncontent: fn");
    }

    #[test]
    fn nearest_closer_wins() {
        let doc = scan("[PATH]a[/PATH][PATH]b[/PATH]");
        let bodies: Vec<_> = doc.blocks().map(|b| b.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "b"]);
    }

    #[test]
    fn bodies_are_opaque() {
        let doc = scan("[CreateFile]content: [PATH]x[/PATH][/CreateFile]");
        let block = only_block(&doc);
        assert_eq!(block.tag(), "CreateFile");
        assert_eq!(block.body, "content: [PATH]x[/PATH]");
    }

    #[test]
    fn stray_closer_is_its_own_segment() {
        let doc = scan("done[/DeleteFile]");
        assert!(matches!(
            doc.segments[1],
            Segment::Stray { tag: "DeleteFile", start: 4, end: 17 }
        ));
    }

    #[test]
    fn pending_body_hides_partial_closer() {
        let doc = scan("[SEARCH_RESULT]hello[/SEARCH_RE");
        assert_eq!(only_block(&doc).pending_body(), "hello");
        let doc = scan("[SEARCH_RESULT]hello[");
        assert_eq!(only_block(&doc).pending_body(), "hello");
    }

    #[test]
    fn result_answers_nearest_earlier_action() {
        let doc = scan("[DeleteFile][/DeleteFile] [DeleteFile]b[/DeleteFile]\n[DeleteFile_RESULT]status: ok[/DeleteFile_RESULT]");
        let actions: Vec<_> = doc.action_blocks().collect();
        assert!(!doc.is_resolved(actions[0]));
        assert!(doc.is_resolved(actions[1]));
        assert_eq!(doc.pending_actions().len(), 1);
        assert_eq!(doc.pending_actions()[0].start, 0);
    }

    #[test]
    fn leading_result_answers_first_action() {
        let doc = scan("[PATH]x[/PATH][OpenCode_RESULT]status: ok[/OpenCode_RESULT] [OpenCode]a[/OpenCode] [OpenCode]b[/OpenCode]");
        let pending: Vec<_> = doc.pending_actions().into_iter().map(|b| b.body.as_str()).collect();
        assert_eq!(pending, vec!["b"]);
    }

    #[test]
    fn closer_escaping_round_trips() {
        let text = r"a [/X_RESULT] b [\/X_RESULT] c [/Y]";
        let escaped = escape_closer(text, "X_RESULT");
        assert_eq!(escaped, r"a [\/X_RESULT] b [\\/X_RESULT] c [/Y]");
        assert!(!escaped.contains("[/X_RESULT]"));
        assert_eq!(unescape_closer(&escaped, "X_RESULT"), text);
    }

    #[test]
    fn multibyte_text_around_blocks() {
        let doc = scan("Lịch học: [PATH]tài liệu[/PATH] xong");
        assert_eq!(only_block(&doc).body, "tài liệu");
    }
}
