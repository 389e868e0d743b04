use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::error::{ServiceError, WorkspaceError};
use super::sandbox::{shell_quote, SandboxHandle, SandboxService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::File   => "file",
            EntryKind::Folder => "folder",
        }
    }
}

/// File operations the dispatcher needs. Paths are relative to the
/// workspace root; each implementation rejects paths that escape it.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn exists(&self, path: &str, kind: EntryKind) -> Result<bool, WorkspaceError>;
    async fn create_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;
    async fn create_folder(&self, path: &str) -> Result<(), WorkspaceError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError>;
    async fn delete(&self, path: &str, kind: EntryKind) -> Result<(), WorkspaceError>;
    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError>;
}

/// Validate a relative workspace path and return its normal components.
fn safe_components(path: &str) -> Result<Vec<&str>, WorkspaceError> {
    if path.chars().any(char::is_control) {
        return Err(WorkspaceError::UnsafePath(path.escape_default().to_string()));
    }
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(WorkspaceError::UnsafePath(path.to_string())),
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::UnsafePath(path.to_string()));
            }
        }
    }
    if parts.is_empty() {
        return Err(WorkspaceError::UnsafePath(path.to_string()));
    }
    Ok(parts)
}

// ── Local directory ───────────────────────────────────────────────────────────

/// A workspace backed by a directory on this machine.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a validated path onto the root. The deepest existing ancestor is
    /// canonicalized and must stay under the canonical root, so a symlink
    /// inside the workspace cannot lead outside it. A dangling symlink on the
    /// way is rejected too, since writing through it would create its target.
    async fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let mut full = self.root.clone();
        full.extend(safe_components(path)?);
        let root = tokio::fs::canonicalize(&self.root).await?;

        let mut probe = full.as_path();
        loop {
            match tokio::fs::canonicalize(probe).await {
                Ok(real) if real.starts_with(&root) => break,
                Ok(real) => {
                    debug!(path, real = %real.display(), "path leaves the workspace");
                    return Err(WorkspaceError::UnsafePath(path.to_string()));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    if tokio::fs::symlink_metadata(probe).await.is_ok() {
                        return Err(WorkspaceError::UnsafePath(path.to_string()));
                    }
                    match probe.parent() {
                        Some(parent) => probe = parent,
                        None => break,
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(full)
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn exists(&self, path: &str, kind: EntryKind) -> Result<bool, WorkspaceError> {
        let full = self.resolve(path).await?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(match kind {
                EntryKind::File => meta.is_file(),
                EntryKind::Folder => meta.is_dir(),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve(path).await?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        debug!(path = %full.display(), bytes = content.len(), "wrote file");
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<(), WorkspaceError> {
        tokio::fs::create_dir_all(self.resolve(path).await?).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        tokio::fs::rename(self.resolve(from).await?, self.resolve(to).await?).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, kind: EntryKind) -> Result<(), WorkspaceError> {
        let full = self.resolve(path).await?;
        match kind {
            EntryKind::File => tokio::fs::remove_file(full).await?,
            EntryKind::Folder => tokio::fs::remove_dir_all(full).await?,
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        Ok(tokio::fs::read_to_string(self.resolve(path).await?).await?)
    }
}

// ── Sandbox bridge ────────────────────────────────────────────────────────────

/// A workspace inside a hosted sandbox, driven through shell commands.
/// Every path is validated and single-quoted before it reaches the shell.
pub struct SandboxWorkspace {
    service: Arc<dyn SandboxService>,
    handle: SandboxHandle,
    root: String,
}

impl SandboxWorkspace {
    pub const DEFAULT_ROOT: &'static str = "/home/user";

    pub fn new(service: Arc<dyn SandboxService>, handle: SandboxHandle, root: &str) -> Self {
        Self {
            service,
            handle,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    fn quoted(&self, path: &str) -> Result<String, WorkspaceError> {
        let parts = safe_components(path)?;
        Ok(shell_quote(&format!("{}/{}", self.root, parts.join("/"))))
    }

    async fn probe(&self, command: &str) -> Result<bool, WorkspaceError> {
        Ok(self.service.run_shell(&self.handle, command).await?.success())
    }

    async fn run(&self, command: &str) -> Result<String, WorkspaceError> {
        debug!(command, "sandbox shell");
        let out = self.service.run_shell(&self.handle, command).await?;
        if out.success() {
            Ok(out.stdout)
        } else {
            let detail = if out.stderr.trim().is_empty() { out.stdout } else { out.stderr };
            Err(ServiceError::Failed(format!("exit {}: {}", out.exit_code, detail.trim())).into())
        }
    }
}

#[async_trait]
impl Workspace for SandboxWorkspace {
    async fn exists(&self, path: &str, kind: EntryKind) -> Result<bool, WorkspaceError> {
        let flag = match kind {
            EntryKind::File => "-f",
            EntryKind::Folder => "-d",
        };
        self.probe(&format!("test {flag} {}", self.quoted(path)?)).await
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        if content.contains('\0') {
            return Err(WorkspaceError::UnsafePath(format!("{path} (content holds NUL)")));
        }
        let target = self.quoted(path)?;
        self.run(&format!(
            "mkdir -p -- \"$(dirname -- {target})\" && printf '%s' {} > {target}",
            shell_quote(content)
        ))
        .await
        .map(drop)
    }

    async fn create_folder(&self, path: &str) -> Result<(), WorkspaceError> {
        self.run(&format!("mkdir -p -- {}", self.quoted(path)?)).await.map(drop)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        self.run(&format!("mv -- {} {}", self.quoted(from)?, self.quoted(to)?))
            .await
            .map(drop)
    }

    async fn delete(&self, path: &str, kind: EntryKind) -> Result<(), WorkspaceError> {
        let flags = match kind {
            EntryKind::File => "-f",
            EntryKind::Folder => "-rf",
        };
        self.run(&format!("rm {flags} -- {}", self.quoted(path)?)).await.map(drop)
    }

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        self.run(&format!("cat -- {}", self.quoted(path)?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        for bad in ["../x", "a/../../b", "/etc/passwd", "a\nb", "", "."] {
            assert!(
                matches!(safe_components(bad), Err(WorkspaceError::UnsafePath(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn accepts_nested_relative_paths() {
        assert_eq!(safe_components("./src//main.rs").unwrap(), vec!["src", "main.rs"]);
    }
}
