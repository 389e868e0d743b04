pub mod config;
pub mod dispatch;
pub mod logging;
pub mod protocol;

pub use config::ConfigStore;
pub use dispatch::{Dispatcher, Outcome, Resolution, ResultBlock};
pub use protocol::{Command, Document, StreamBuffer};

use anyhow::{bail, Context, Result};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use dispatch::sandbox::{HttpSandbox, SandboxService};
use dispatch::university::TvuClient;
use dispatch::workspace::{LocalWorkspace, SandboxWorkspace};
use dispatch::UniversityAccess;
use protocol::{registry, Segment, TagKind};

/// Read a file, or stdin when `input` is `-`.
pub fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input at {}", input.display()))
}

fn preview(text: &str) -> String {
    let flat: String = text.chars().take(48).collect();
    let flat = flat.replace('\n', "\\n");
    if text.chars().count() > 48 {
        format!("{flat}…")
    } else {
        flat
    }
}

/// One line per segment: byte range, kind and a short preview.
pub fn segment_report(doc: &Document) -> String {
    let mut out = String::new();
    for segment in &doc.segments {
        let (start, end) = segment.range();
        let line = match segment {
            Segment::Text { text, .. } => format!("{start:>6}..{end:<6} text     \"{}\"", preview(text)),
            Segment::Stray { tag, .. } => format!("{start:>6}..{end:<6} stray    [/{tag}]"),
            Segment::Block(block) => format!(
                "{start:>6}..{end:<6} {:<8} [{}]{} \"{}\"",
                match block.spec.kind {
                    TagKind::Action => "action",
                    TagKind::Render => "render",
                    TagKind::Result => "result",
                },
                block.tag(),
                if block.closed { "" } else { " (unclosed)" },
                preview(block.body.trim())
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn segments(input: &Path) -> Result<()> {
    let text = read_input(input)?;
    print!("{}", segment_report(&protocol::scan(&text)));
    Ok(())
}

pub fn render(input: &Path) -> Result<()> {
    let text = read_input(input)?;
    print!("{}", protocol::render(&protocol::scan(&text)));
    io::stdout().flush().ok();
    Ok(())
}

/// Fail when any closed action block would be rejected by the builder.
pub fn check(input: &Path) -> Result<()> {
    let text = read_input(input)?;
    let doc = protocol::scan(&text);
    let mut problems = Vec::new();
    let mut total = 0;
    for block in doc.action_blocks() {
        total += 1;
        if !block.closed {
            problems.push(format!("offset {}: [{}] is not closed", block.start, block.tag()));
        } else if let Err(err) = protocol::build_block(block) {
            problems.push(format!("offset {}: {err}", block.start));
        }
    }

    if problems.is_empty() {
        println!("All {total} action block(s) are valid.");
        Ok(())
    } else {
        bail!(
            "Found {} problem(s) in {total} action block(s):\n{}",
            problems.len(),
            problems.join("\n")
        )
    }
}

pub fn tag_table() -> String {
    let mut out = String::new();
    for spec in registry::all() {
        let kind = match spec.kind {
            TagKind::Action => "action",
            TagKind::Render => "render",
            TagKind::Result => "result",
        };
        let mut fields: Vec<String> = spec.required.iter().map(|f| f.to_string()).collect();
        fields.extend(spec.optional.iter().map(|f| format!("{f}?")));
        out.push_str(&format!("{:<22} {kind:<7} {}\n", spec.name, fields.join(", ")));
    }
    out
}

pub fn tags() -> Result<()> {
    print!("{}", tag_table());
    Ok(())
}

pub fn prompt() -> Result<()> {
    print!("{}", protocol::guide::system_prompt());
    io::stdout().flush().ok();
    Ok(())
}

// ── Config commands ───────────────────────────────────────────────────────────

pub fn config_get(store: &ConfigStore, key: &str) -> Result<()> {
    match store.value(key) {
        Some(value) => println!("{value}"),
        None => bail!("{key} is not set in {}", store.path().display()),
    }
    Ok(())
}

pub fn config_set(store: &mut ConfigStore, key: &str, value: &str) -> Result<()> {
    store.set(key, value);
    store.save()?;
    println!("Saved {key} to {}", store.path().display());
    Ok(())
}

pub fn config_list(store: &ConfigStore) -> Result<()> {
    for (key, value) in store.entries() {
        let shown = if config::is_secret(key) { config::mask(value) } else { value.to_string() };
        println!("{key} = {shown}");
    }
    Ok(())
}

// ── Dispatch wiring ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Local directory serving as the file workspace.
    pub workspace: Option<PathBuf>,
    /// Run file blocks in a fresh hosted sandbox instead.
    pub sandbox: bool,
    /// Dispatch blocks as they close while input streams in.
    pub follow: bool,
}

async fn connect_sandbox(store: &ConfigStore) -> Result<Option<(Arc<dyn SandboxService>, dispatch::sandbox::SandboxHandle)>> {
    let (Some(url), Some(key)) = (store.value(config::SANDBOX_URL), store.value(config::SANDBOX_API_KEY)) else {
        warn!("sandbox.url or sandbox.api_key not set; file blocks will report it");
        return Ok(None);
    };
    let service: Arc<dyn SandboxService> = Arc::new(HttpSandbox::new(url, key)?);
    let handle = service
        .create_sandbox()
        .await
        .context("Failed to create sandbox")?;
    info!(sandbox = %handle.id, "sandbox ready");
    Ok(Some((service, handle)))
}

/// Build a dispatcher from stored settings. Anything unconfigured is left out
/// and reported per block at dispatch time.
pub async fn build_dispatcher(store: &ConfigStore, opts: &ResolveOptions) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();

    if let Some(dir) = &opts.workspace {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create workspace {}", dir.display()))?;
        dispatcher = dispatcher.with_workspace(Arc::new(LocalWorkspace::new(dir)));
    } else if opts.sandbox {
        if let Some((service, handle)) = connect_sandbox(store).await? {
            let workspace = SandboxWorkspace::new(service, handle, SandboxWorkspace::DEFAULT_ROOT);
            dispatcher = dispatcher.with_workspace(Arc::new(workspace));
        }
    }

    if let (Some(url), Some(username), Some(password)) = (
        store.value(config::TVU_URL),
        store.value(config::TVU_USERNAME),
        store.value(config::TVU_PASSWORD),
    ) {
        dispatcher = dispatcher.with_university(UniversityAccess {
            service: Arc::new(TvuClient::new(url)?),
            username: username.to_string(),
            password: password.to_string(),
            term: store.value(config::TVU_TERM).map(str::to_string),
        });
    }

    Ok(dispatcher)
}

/// Feed streamed text through a [`StreamBuffer`], dispatching each action
/// block as soon as its closing tag arrives.
pub async fn resolve_stream<R: AsyncBufRead + Unpin>(mut reader: R, dispatcher: &Dispatcher) -> Result<Resolution> {
    let mut buffer = StreamBuffer::new();
    let mut inserts = Vec::new();
    let mut outcomes = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await.context("Failed to read input")? == 0 {
            break;
        }
        buffer.push(&line);
        for block in buffer.take_ready() {
            match dispatcher.dispatch_block(&block).await {
                Ok((command, result)) => {
                    inserts.push((block.end, result.to_markup()));
                    outcomes.push(Outcome::Dispatched { start: block.start, command, result });
                }
                Err(error) => outcomes.push(Outcome::Invalid { start: block.start, error }),
            }
        }
    }

    for block in buffer.document().action_blocks().filter(|b| !b.closed) {
        outcomes.push(Outcome::Unclosed { tag: block.tag(), start: block.start });
    }
    inserts.sort_by_key(|(offset, _)| *offset);
    Ok(Resolution {
        text: dispatch::splice(buffer.text(), &inserts),
        outcomes,
    })
}

fn report(resolution: &Resolution) {
    for outcome in &resolution.outcomes {
        match outcome {
            Outcome::Dispatched { start, result, .. } => {
                eprintln!("offset {start}: [{}] {}", result.tag, result.status.as_str())
            }
            Outcome::Invalid { start, error } => eprintln!("offset {start}: {error}"),
            Outcome::AlreadyResolved { tag, start } => eprintln!("offset {start}: [{tag}] already resolved"),
            Outcome::Unclosed { tag, start } => eprintln!("offset {start}: [{tag}] not closed, skipped"),
        }
    }
}

pub async fn resolve(input: &Path, store: &ConfigStore, opts: &ResolveOptions) -> Result<()> {
    let dispatcher = build_dispatcher(store, opts).await?;
    let resolution = if opts.follow {
        if input == Path::new("-") {
            resolve_stream(tokio::io::BufReader::new(tokio::io::stdin()), &dispatcher).await?
        } else {
            let file = tokio::fs::File::open(input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            resolve_stream(tokio::io::BufReader::new(file), &dispatcher).await?
        }
    } else {
        dispatcher.resolve(&read_input(input)?).await
    };
    print!("{}", resolution.text);
    io::stdout().flush().ok();
    report(&resolution);
    Ok(())
}

/// Run a source file in a fresh sandbox and print what it produced.
pub async fn sandbox_run(store: &ConfigStore, file: &Path, language: &str) -> Result<()> {
    let code = read_input(file)?;
    let Some((service, handle)) = connect_sandbox(store).await? else {
        bail!("Sandbox is not configured. Set sandbox.url and sandbox.api_key with `tvu-chat config set <KEY> <VALUE>`.");
    };
    let output = service
        .run_code(&handle, &code, language)
        .await
        .context("Sandbox run failed")?;
    for line in &output.stdout {
        println!("{}", line.trim_end_matches('\n'));
    }
    for line in &output.stderr {
        eprintln!("{}", line.trim_end_matches('\n'));
    }
    for result in &output.results {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    if let Some(error) = output.error {
        bail!("Code raised an error: {error}");
    }
    Ok(())
}
