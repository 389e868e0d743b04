use super::registry::{self, TagKind, TagSpec};

fn example(spec: &TagSpec) -> String {
    let mut out = format!("[{}]\n", spec.name);
    match spec.implicit {
        Some(field) if spec.required == [field] => out.push_str(&format!("<{field}>\n")),
        _ => {
            for field in spec.required.iter().chain(spec.optional.iter()) {
                out.push_str(&format!("{field}: <{field}>\n"));
            }
        }
    }
    out.push_str(&format!("[/{}]", spec.name));
    out
}

fn field_notes(spec: &TagSpec) -> String {
    let mut notes = Vec::new();
    if !spec.required.is_empty() {
        notes.push(format!("required: {}", spec.required.join(", ")));
    }
    if !spec.optional.is_empty() {
        notes.push(format!("optional: {}", spec.optional.join(", ")));
    }
    if let Some(field) = spec.absorbing {
        notes.push(format!("`{field}` must come last and runs to the closing tag verbatim"));
    }
    notes.join("; ")
}

/// Markdown guide to the block protocol, for the assistant's system prompt.
pub fn system_prompt() -> String {
    let mut guide = String::from("## ACTION BLOCKS\n\n");
    guide.push_str("Emit an action block to act on the user's workspace or university account. ");
    guide.push_str("Tags are case-sensitive. Put each `key: value` field on its own line. ");
    guide.push_str("Always close the block; unclosed blocks are never executed. ");
    guide.push_str("Never write a `_RESULT` block yourself, the application adds it.\n\n");

    for spec in registry::all().iter().filter(|s| s.kind == TagKind::Action) {
        guide.push_str(&format!("### {}\n{}\n", spec.name, spec.summary));
        let notes = field_notes(spec);
        if !notes.is_empty() {
            guide.push_str(&format!("- Fields: {notes}\n"));
        }
        guide.push_str(&format!("```\n{}\n```\n\n", example(spec)));
    }

    guide.push_str("## DISPLAY BLOCKS\n\n");
    for spec in registry::all().iter().filter(|s| s.kind == TagKind::Render) {
        guide.push_str(&format!("- `[{0}]...[/{0}]`: {1}\n", spec.name, spec.summary));
    }
    guide
}
