use bridge_traits::{BridgeError, InstanceId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The sample's window starts before the previous sample's window ended.
    #[error("Status sample is older than the last applied one")]
    StaleSample,

    #[error("Already waiting for players")]
    AlreadyWaiting,

    #[error("All instances finished")]
    AllInstancesFinished,

    /// The player process exited on its own.
    #[error("Instance {instance_id} finished")]
    InstanceFinished { instance_id: InstanceId },

    #[error("Instance {instance_id} failed: {message}")]
    InstanceFailed {
        instance_id: InstanceId,
        message: String,
    },

    #[error("Instance {instance_id} request failed: {source}")]
    Command {
        instance_id: InstanceId,
        recoverable: bool,
        #[source]
        source: BridgeError,
    },

    #[error("Failed to launch instance {instance_id}: {source}")]
    Launch {
        instance_id: InstanceId,
        #[source]
        source: BridgeError,
    },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Transient request failure worth another attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Command {
                recoverable: true,
                ..
            }
        )
    }

    /// Ends a session without being a failure: shutdown was requested or
    /// every player was closed by the user.
    pub fn is_normal_shutdown(&self) -> bool {
        matches!(self, SyncError::Cancelled | SyncError::AllInstancesFinished)
    }

    pub fn is_instance_finished(&self) -> bool {
        matches!(self, SyncError::InstanceFinished { .. })
    }
}

impl From<core_async::time::Cancelled> for SyncError {
    fn from(_: core_async::time::Cancelled) -> Self {
        SyncError::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
