use super::command::build_block;
use super::registry::{self, TagKind};
use super::scanner::{closing_marker, unescape_closer, Document, RawBlock, Segment};

/// Escape text for use inside an element or a quoted attribute. Square
/// brackets are escaped too, so escaped output never rescans as a block.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '[' => out.push_str("&#91;"),
            ']' => out.push_str("&#93;"),
            c => out.push(c),
        }
    }
    out
}

fn element(name: &str, attrs: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("<{name}");
    for (key, value) in attrs {
        out.push_str(&format!(" {key}=\"{}\"", escape_html(value)));
    }
    out.push('>');
    out.push_str(&escape_html(body));
    out.push_str(&format!("</{name}>"));
    out
}

/// Display markup for a scanned document.
///
/// Plain text passes through byte for byte. Tag syntax never does: render-only
/// blocks become elements named after the tag, action blocks become
/// `action-block` placeholders, and result blocks become `action-result`.
/// A closing marker with no opener is shown as escaped text.
pub fn render(doc: &Document) -> String {
    let mut out = String::new();
    for segment in &doc.segments {
        match segment {
            Segment::Text { text, .. } => out.push_str(text),
            Segment::Stray { tag, .. } => out.push_str(&escape_html(&closing_marker(tag))),
            Segment::Block(block) => out.push_str(&render_block(doc, block)),
        }
    }
    out
}

fn render_block(doc: &Document, block: &RawBlock) -> String {
    match block.spec.kind {
        TagKind::Render => {
            let name = block.spec.element_name();
            if block.closed {
                element(&name, &[], block.body.trim())
            } else {
                element(&name, &[("data-state", "pending")], block.pending_body().trim())
            }
        }
        TagKind::Action => render_action(doc, block),
        TagKind::Result => render_result(block),
    }
}

fn render_action(doc: &Document, block: &RawBlock) -> String {
    let tag = block.tag();
    if !block.closed {
        return element("action-block", &[("tag", tag), ("state", "pending")], "");
    }
    match build_block(block) {
        Err(err) => element("action-block", &[("tag", tag), ("state", "invalid")], &err.to_string()),
        Ok(command) => {
            let state = if doc.is_resolved(block) { "done" } else { "pending" };
            element("action-block", &[("tag", tag), ("state", state)], &command.summary())
        }
    }
}

fn render_result(block: &RawBlock) -> String {
    let action = registry::action_for_result(block.tag()).map_or(block.tag(), |spec| spec.name);
    if !block.closed {
        return element("action-result", &[("tag", action), ("status", "pending")], "");
    }
    let fields = block.spec.parse_fields(&block.body);
    let status = fields.non_empty("status").map_or("ok", str::trim);
    let output = unescape_closer(fields.get("output").unwrap_or_default(), block.tag());
    element("action-result", &[("tag", action), ("status", status)], &output)
}
