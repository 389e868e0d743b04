use thiserror::Error;

/// Failure talking to a remote collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("unsafe path '{0}'")]
    UnsafePath(String),
    #[error("'{0}' does not exist")]
    NotFound(String),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Everything that can go wrong inside a dispatch. Never crosses the
/// dispatcher boundary; it is folded into an error result block.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{tool} is not configured. {hint}")]
    ConfigurationMissing { tool: &'static str, hint: &'static str },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no handler for [{0}] blocks")]
    Unhandled(String),
}
