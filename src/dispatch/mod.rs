pub mod error;
pub mod sandbox;
pub mod university;
pub mod workspace;

use chrono::{Days, Local, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::protocol::command::{build_block, Command, ScheduleAction, ValidationError, View, DATE_FORMAT};
use crate::protocol::registry;
use crate::protocol::scanner::{escape_closer, scan, RawBlock, Segment};

pub use error::{DispatchError, ServiceError, WorkspaceError};
pub use university::University;
pub use workspace::{EntryKind, Workspace};

/// Longest file body echoed back by `OpenCode`.
pub const MAX_OPEN_BYTES: usize = 64 * 1024;

// ── Result blocks ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Ok,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok    => "ok",
            ResultStatus::Error => "error",
        }
    }
}

/// Outcome of one dispatch, serialized as a `[<Tag>_RESULT]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBlock {
    pub tag: &'static str,
    pub status: ResultStatus,
    pub output: String,
}

impl ResultBlock {
    pub fn ok(tag: &'static str, output: impl Into<String>) -> Self {
        Self { tag, status: ResultStatus::Ok, output: output.into() }
    }

    pub fn error(tag: &'static str, output: impl Into<String>) -> Self {
        Self { tag, status: ResultStatus::Error, output: output.into() }
    }

    /// Protocol text for this result. Copies of the closing marker inside the
    /// output are escaped so the block cannot end early.
    pub fn to_markup(&self) -> String {
        format!(
            "[{tag}]\nstatus: {}\noutput: {}\n[/{tag}]",
            self.status.as_str(),
            escape_closer(&self.output, self.tag),
            tag = self.tag
        )
    }
}

fn result_tag(command: &Command) -> &'static str {
    registry::lookup(action_tag(command))
        .and_then(|spec| spec.result_tag)
        .unwrap_or("UNRECOGNIZED_RESULT")
}

fn action_tag(command: &Command) -> &'static str {
    match command {
        Command::CreateFile { .. } => "CreateFile",
        Command::CreateFolder { .. } => "CreateFolder",
        Command::RenameFile { .. } => "RenameFile",
        Command::RenameFolder { .. } => "RenameFolder",
        Command::DeleteFile { .. } => "DeleteFile",
        Command::DeleteFolder { .. } => "DeleteFolder",
        Command::OpenMedia { .. } => "OpenMedia",
        Command::OpenCode { .. } => "OpenCode",
        Command::ScheduleQuery { .. } => "TVU_SCHEDULE",
        Command::ScoreQuery { .. } => "TVU_SCORE",
        Command::ToggleView { view, .. } => match view {
            View::CodeManager => "CodeManager",
            View::CodeEditor => "CodeEditor",
            View::MediaView => "MediaView",
        },
        Command::Unrecognized(raw) => raw.tag(),
    }
}

// ── Collaborator wiring ───────────────────────────────────────────────────────

/// University API plus the student's stored credentials.
pub struct UniversityAccess {
    pub service: Arc<dyn University>,
    pub username: String,
    pub password: String,
    pub term: Option<String>,
}

const WORKSPACE_HINT: &str =
    "Pass --workspace <DIR>, or set sandbox.url and sandbox.api_key with `tvu-chat config set <KEY> <VALUE>` and use --sandbox.";
const UNIVERSITY_HINT: &str =
    "Set tvu.url, tvu.username and tvu.password with `tvu-chat config set <KEY> <VALUE>`.";

fn join_path(dir: Option<&str>, name: &str) -> String {
    match dir.map(|d| d.trim_matches('/')) {
        Some(dir) if !dir.is_empty() => format!("{dir}/{name}"),
        _ => name.to_string(),
    }
}

/// Path of `new_name` next to `path`.
fn sibling(path: &str, new_name: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/{new_name}"),
        None => new_name.to_string(),
    }
}

fn media_kind(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" => Some("image"),
        "mp3" | "wav" | "ogg" | "flac" | "m4a" => Some("audio"),
        "mp4" | "webm" | "mov" | "mkv" | "avi" => Some("video"),
        _ => None,
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// What happened to one action block during [`Dispatcher::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Dispatched { start: usize, command: Command, result: ResultBlock },
    Invalid { start: usize, error: ValidationError },
    AlreadyResolved { tag: &'static str, start: usize },
    Unclosed { tag: &'static str, start: usize },
}

/// Resolved text plus a per-block account of what the dispatcher did.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub text: String,
    pub outcomes: Vec<Outcome>,
}

impl Resolution {
    pub fn dispatched(&self) -> impl Iterator<Item = &ResultBlock> {
        self.outcomes.iter().filter_map(|o| match o {
            Outcome::Dispatched { result, .. } => Some(result),
            _ => None,
        })
    }
}

/// Insert `(offset, text)` pairs into `source`. Offsets must be ascending char
/// boundaries; each insertion starts on its own line.
pub fn splice(source: &str, inserts: &[(usize, String)]) -> String {
    let mut out = String::with_capacity(source.len() + inserts.iter().map(|(_, t)| t.len() + 1).sum::<usize>());
    let mut last = 0;
    for (offset, text) in inserts {
        out.push_str(&source[last..*offset]);
        out.push('\n');
        out.push_str(text);
        last = *offset;
    }
    out.push_str(&source[last..]);
    out
}

#[derive(Default)]
pub struct Dispatcher {
    workspace: Option<Arc<dyn Workspace>>,
    university: Option<UniversityAccess>,
    today: Option<NaiveDate>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_university(mut self, access: UniversityAccess) -> Self {
        self.university = Some(access);
        self
    }

    /// Pin "today" for schedule lookups instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn workspace(&self) -> Result<&dyn Workspace, DispatchError> {
        self.workspace.as_deref().ok_or(DispatchError::ConfigurationMissing {
            tool: "The file workspace",
            hint: WORKSPACE_HINT,
        })
    }

    fn university(&self) -> Result<&UniversityAccess, DispatchError> {
        self.university.as_ref().ok_or(DispatchError::ConfigurationMissing {
            tool: "The university account",
            hint: UNIVERSITY_HINT,
        })
    }

    /// Run one command. Always yields a result block; failures become
    /// `status: error` with a readable message.
    pub async fn dispatch(&self, command: &Command) -> ResultBlock {
        let tag = result_tag(command);
        info!(action = action_tag(command), "dispatching {}", command.summary());
        match self.execute(command).await {
            Ok(output) => ResultBlock::ok(tag, output),
            Err(err) => {
                warn!(action = action_tag(command), "dispatch failed: {err}");
                ResultBlock::error(tag, err.to_string())
            }
        }
    }

    async fn execute(&self, command: &Command) -> Result<String, DispatchError> {
        match command {
            Command::CreateFile { name, path, content } => {
                let target = join_path(path.as_deref(), name);
                let ws = self.workspace()?;
                if ws.exists(&target, EntryKind::Folder).await? {
                    return Err(WorkspaceError::AlreadyExists(target).into());
                }
                ws.create_file(&target, content).await?;
                Ok(format!("Created file {target} ({} bytes)", content.len()))
            }
            Command::CreateFolder { name, path } => {
                let target = join_path(path.as_deref(), name);
                let ws = self.workspace()?;
                if ws.exists(&target, EntryKind::Folder).await? {
                    return Err(WorkspaceError::AlreadyExists(target).into());
                }
                ws.create_folder(&target).await?;
                Ok(format!("Created folder {target}"))
            }
            Command::RenameFile { path, new_name } => self.rename(path, new_name, EntryKind::File).await,
            Command::RenameFolder { path, new_name } => self.rename(path, new_name, EntryKind::Folder).await,
            Command::DeleteFile { path } => self.delete(path, EntryKind::File).await,
            Command::DeleteFolder { path } => self.delete(path, EntryKind::Folder).await,
            Command::OpenCode { path } => {
                let ws = self.workspace()?;
                if !ws.exists(path, EntryKind::File).await? {
                    return Err(WorkspaceError::NotFound(path.clone()).into());
                }
                let mut content = ws.read_file(path).await?;
                if content.len() > MAX_OPEN_BYTES {
                    let mut cut = MAX_OPEN_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("\n… (truncated)");
                }
                Ok(format!("Opened {path} in the code editor\n{content}"))
            }
            Command::OpenMedia { path } => {
                let kind = media_kind(path).unwrap_or("file");
                if !self.workspace()?.exists(path, EntryKind::File).await? {
                    return Err(WorkspaceError::NotFound(path.clone()).into());
                }
                Ok(format!("Opened {kind} {path} in the media viewer"))
            }
            Command::ScheduleQuery { action, date } => self.schedule(*action, *date).await,
            Command::ScoreQuery { term } => {
                let access = self.university()?;
                let token = access.service.login(&access.username, &access.password).await?;
                let scores = access.service.fetch_scores(&token).await?;
                Ok(university::format_scores(&scores, term.as_deref()))
            }
            Command::ToggleView { view, value } => {
                if value == "0" {
                    Ok(format!("Closed the {}", view.label()))
                } else {
                    Ok(format!("Opened the {}", view.label()))
                }
            }
            Command::Unrecognized(raw) => Err(DispatchError::Unhandled(raw.tag().to_string())),
        }
    }

    async fn rename(&self, path: &str, new_name: &str, kind: EntryKind) -> Result<String, DispatchError> {
        let ws = self.workspace()?;
        if !ws.exists(path, kind).await? {
            return Err(WorkspaceError::NotFound(path.to_string()).into());
        }
        let target = sibling(path, new_name);
        if ws.exists(&target, EntryKind::File).await? || ws.exists(&target, EntryKind::Folder).await? {
            return Err(WorkspaceError::AlreadyExists(target).into());
        }
        ws.rename(path, &target).await?;
        Ok(format!("Renamed {} {path} to {target}", kind.label()))
    }

    async fn delete(&self, path: &str, kind: EntryKind) -> Result<String, DispatchError> {
        let ws = self.workspace()?;
        if !ws.exists(path, kind).await? {
            return Err(WorkspaceError::NotFound(path.to_string()).into());
        }
        ws.delete(path, kind).await?;
        Ok(format!("Deleted {} {path}", kind.label()))
    }

    async fn schedule(&self, action: ScheduleAction, date: Option<NaiveDate>) -> Result<String, DispatchError> {
        let access = self.university()?;
        let today = self.today();
        let token = access.service.login(&access.username, &access.password).await?;
        let term = access.term.as_deref();
        if action == ScheduleAction::Exams {
            let exams = access.service.fetch_exams(&token, term).await?;
            return Ok(university::format_exams(&exams, date.unwrap_or(today)));
        }
        let day = match action {
            ScheduleAction::Tomorrow => today.checked_add_days(Days::new(1)).unwrap_or(today),
            ScheduleAction::ByDate => date.unwrap_or(today),
            _ => today,
        };
        debug!(day = %day.format(DATE_FORMAT), "fetching schedule");
        let sessions = access.service.fetch_schedule(&token, term).await?;
        Ok(university::format_day(&sessions, day))
    }

    /// Dispatch a block the scanner found. Unclosed or invalid blocks never
    /// reach a collaborator.
    pub async fn dispatch_block(&self, block: &RawBlock) -> Result<(Command, ResultBlock), ValidationError> {
        let command = build_block(block)?;
        let result = self.dispatch(&command).await;
        Ok((command, result))
    }

    /// Dispatch every unresolved, closed action block in textual order and
    /// splice each result right after its block.
    ///
    /// Blocks that already have a result are skipped, so resolving the output
    /// again calls no collaborator. A failed block does not stop the rest.
    pub async fn resolve(&self, text: &str) -> Resolution {
        let doc = scan(text);
        let mut outcomes = Vec::new();
        let mut inserts = Vec::new();

        for segment in &doc.segments {
            let Segment::Block(block) = segment else { continue };
            if !block.spec.is_action() {
                continue;
            }
            if !block.closed {
                outcomes.push(Outcome::Unclosed { tag: block.tag(), start: block.start });
                continue;
            }
            if doc.is_resolved(block) {
                debug!(tag = block.tag(), start = block.start, "already resolved");
                outcomes.push(Outcome::AlreadyResolved { tag: block.tag(), start: block.start });
                continue;
            }
            match self.dispatch_block(block).await {
                Ok((command, result)) => {
                    inserts.push((block.end, result.to_markup()));
                    outcomes.push(Outcome::Dispatched { start: block.start, command, result });
                }
                Err(error) => {
                    warn!(start = block.start, "{error}");
                    outcomes.push(Outcome::Invalid { start: block.start, error });
                }
            }
        }

        Resolution {
            text: splice(text, &inserts),
            outcomes,
        }
    }
}
