use thiserror::Error;

/// Errors surfaced by host-provided collaborators.
///
/// Whether a variant is worth retrying is decided by
/// [`PlayerClient::is_recoverable_err`](crate::instance::PlayerClient::is_recoverable_err),
/// not by the variant alone.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The player process exited on its own. Not a failure.
    #[error("Instance finished")]
    InstanceFinished,

    #[error("Instance failed: {0}")]
    InstanceFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
