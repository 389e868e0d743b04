use chrono::NaiveDate;
use thiserror::Error;

use super::fields::FieldMap;
use super::registry::{TagKind, TagSpec};
use super::scanner::RawBlock;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Command vocabulary ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Today,
    Tomorrow,
    ByDate,
    Exams,
}

impl ScheduleAction {
    pub fn all() -> [ScheduleAction; 4] {
        [
            ScheduleAction::Today,
            ScheduleAction::Tomorrow,
            ScheduleAction::ByDate,
            ScheduleAction::Exams,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleAction::Today    => "xem_hom_nay",
            ScheduleAction::Tomorrow => "xem_ngay_mai",
            ScheduleAction::ByDate   => "xem_theo_ngay",
            ScheduleAction::Exams    => "xem_lich_thi",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::all().into_iter().find(|a| a.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    CodeManager,
    CodeEditor,
    MediaView,
}

impl View {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CodeManager" => Some(View::CodeManager),
            "CodeEditor"  => Some(View::CodeEditor),
            "MediaView"   => Some(View::MediaView),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            View::CodeManager => "code manager",
            View::CodeEditor  => "code editor",
            View::MediaView   => "media viewer",
        }
    }
}

/// A validated action. Every variant but `Unrecognized` carries its required
/// fields, already checked non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateFile { name: String, path: Option<String>, content: String },
    CreateFolder { name: String, path: Option<String> },
    RenameFile { path: String, new_name: String },
    RenameFolder { path: String, new_name: String },
    DeleteFile { path: String },
    DeleteFolder { path: String },
    OpenMedia { path: String },
    OpenCode { path: String },
    ScheduleQuery { action: ScheduleAction, date: Option<NaiveDate> },
    ScoreQuery { term: Option<String> },
    ToggleView { view: View, value: String },
    Unrecognized(RawBlock),
}

impl Command {
    /// One-line description for logs and result messages.
    pub fn summary(&self) -> String {
        match self {
            Command::CreateFile { name, path, .. } => format!("create file {}", join(path, name)),
            Command::CreateFolder { name, path } => format!("create folder {}", join(path, name)),
            Command::RenameFile { path, new_name } => format!("rename file {path} to {new_name}"),
            Command::RenameFolder { path, new_name } => format!("rename folder {path} to {new_name}"),
            Command::DeleteFile { path } => format!("delete file {path}"),
            Command::DeleteFolder { path } => format!("delete folder {path}"),
            Command::OpenMedia { path } => format!("open media {path}"),
            Command::OpenCode { path } => format!("open code {path}"),
            Command::ScheduleQuery { action, date } => match date {
                Some(date) => format!("schedule {} {}", action.as_str(), date.format(DATE_FORMAT)),
                None => format!("schedule {}", action.as_str()),
            },
            Command::ScoreQuery { term: Some(term) } => format!("scores for term {term}"),
            Command::ScoreQuery { term: None } => "scores".to_string(),
            Command::ToggleView { view, value } => format!("{} <- {value}", view.label()),
            Command::Unrecognized(raw) => format!("unrecognized [{}] block", raw.tag()),
        }
    }
}

fn join(dir: &Option<String>, name: &str) -> String {
    match dir.as_deref().map(|d| d.trim_end_matches('/')) {
        Some(dir) if !dir.is_empty() => format!("{dir}/{name}"),
        _ => name.to_string(),
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("[{tag}] missing required field(s): {}", .fields.join(", "))]
    MissingFields { tag: &'static str, fields: Vec<&'static str> },
    #[error("[{tag}] invalid {field} '{value}': expected {expected}")]
    InvalidValue {
        tag: &'static str,
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("[{tag}] block is not closed yet")]
    Unterminated { tag: &'static str },
}

impl ValidationError {
    pub fn tag(&self) -> &'static str {
        match self {
            ValidationError::MissingFields { tag, .. }
            | ValidationError::InvalidValue { tag, .. }
            | ValidationError::Unterminated { tag } => tag,
        }
    }
}

fn required<'a>(spec: &TagSpec, fields: &'a FieldMap, key: &'static str) -> Result<&'a str, ValidationError> {
    fields.non_empty(key).ok_or(ValidationError::MissingFields {
        tag: spec.name,
        fields: vec![key],
    })
}

fn optional(fields: &FieldMap, key: &str) -> Option<String> {
    fields.non_empty(key).map(|v| v.trim().to_string())
}

/// Trimmed single-line identifier. Paths are passed through untouched otherwise.
fn ident(value: &str) -> String {
    value.trim().to_string()
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Turn a parsed block into a command, checking the tag's required fields.
pub fn build(spec: &'static TagSpec, fields: &FieldMap, raw: &RawBlock) -> Result<Command, ValidationError> {
    if spec.kind != TagKind::Action {
        return Ok(Command::Unrecognized(raw.clone()));
    }
    if !raw.closed {
        return Err(ValidationError::Unterminated { tag: spec.name });
    }

    let missing: Vec<&'static str> = spec
        .required
        .iter()
        .copied()
        .filter(|key| fields.non_empty(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { tag: spec.name, fields: missing });
    }

    let command = match spec.name {
        "CreateFile" => Command::CreateFile {
            name: ident(required(spec, fields, "name")?),
            path: optional(fields, "path"),
            content: required(spec, fields, "content")?.to_string(),
        },
        "CreateFolder" => Command::CreateFolder {
            name: ident(required(spec, fields, "name")?),
            path: optional(fields, "path"),
        },
        "RenameFile" => Command::RenameFile {
            path: ident(required(spec, fields, "path")?),
            new_name: ident(required(spec, fields, "newName")?),
        },
        "RenameFolder" => Command::RenameFolder {
            path: ident(required(spec, fields, "path")?),
            new_name: ident(required(spec, fields, "newName")?),
        },
        "DeleteFile" => Command::DeleteFile { path: ident(required(spec, fields, "path")?) },
        "DeleteFolder" => Command::DeleteFolder { path: ident(required(spec, fields, "path")?) },
        "OpenMedia" => Command::OpenMedia { path: ident(required(spec, fields, "path")?) },
        "OpenCode" => Command::OpenCode { path: ident(required(spec, fields, "path")?) },
        "TVU_SCHEDULE" => build_schedule(spec, fields)?,
        "TVU_SCORE" => Command::ScoreQuery { term: optional(fields, "TERM") },
        name => match View::from_tag(name) {
            Some(view) => Command::ToggleView {
                view,
                value: ident(required(spec, fields, "value")?),
            },
            None => Command::Unrecognized(raw.clone()),
        },
    };
    Ok(command)
}

fn build_schedule(spec: &'static TagSpec, fields: &FieldMap) -> Result<Command, ValidationError> {
    let raw_action = required(spec, fields, "ACTION")?.trim();
    let action = ScheduleAction::parse(raw_action).ok_or_else(|| ValidationError::InvalidValue {
        tag: spec.name,
        field: "ACTION",
        value: raw_action.to_string(),
        expected: ScheduleAction::all().map(|a| a.as_str()).join(" | "),
    })?;

    let date = match fields.non_empty("DATE").map(str::trim) {
        Some(value) => Some(NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
            ValidationError::InvalidValue {
                tag: spec.name,
                field: "DATE",
                value: value.to_string(),
                expected: "a date formatted yyyy-MM-dd".to_string(),
            }
        })?),
        None if action == ScheduleAction::ByDate => {
            return Err(ValidationError::MissingFields { tag: spec.name, fields: vec!["DATE"] });
        }
        None => None,
    };

    Ok(Command::ScheduleQuery { action, date })
}

/// Parse and build in one step.
pub fn build_block(raw: &RawBlock) -> Result<Command, ValidationError> {
    let fields = raw.spec.parse_fields(&raw.body);
    build(raw.spec, &fields, raw)
}
