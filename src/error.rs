use thiserror::Error;

/// Failure of a single transfer job, or of the controller itself.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Malformed notification payload: {0}")]
    MalformedPayload(String),

    #[error("Failed to fetch {container}::{key}: {source}")]
    SourceFetch {
        container: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to push {path}: {source}")]
    DestinationPush {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("Remote connection unusable: {0}")]
    ConnectionFatal(#[source] RemoteError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to create staging directory: {0}")]
    Staging(#[from] std::io::Error),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },
}

impl TransferError {
    /// Only a dead remote connection stops the controller. Everything else
    /// stays local to the job that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::ConnectionFatal(_))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object {container}::{key} not found")]
    NotFound { container: String, key: String },

    #[error("Access denied to {container}::{key}")]
    AccessDenied { container: String, key: String },

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Remote operation failed: {0}")]
    Operation(String),

    #[error("Upload of {path} not confirmed: expected {expected} bytes, found {actual}")]
    Unconfirmed {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection lost: {0}")]
    Disconnected(String),
}

impl RemoteError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, RemoteError::Disconnected(_))
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to resolve queue: {0}")]
    Resolve(String),

    #[error("Failed to receive messages: {0}")]
    Receive(String),

    #[error("Failed to change message visibility: {0}")]
    ChangeVisibility(String),

    #[error("Failed to delete message: {0}")]
    Delete(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_fatal() {
        let fatal = TransferError::ConnectionFatal(RemoteError::Disconnected("eof".into()));
        assert!(fatal.is_fatal());

        let push = TransferError::DestinationPush {
            path: "/upload/a.txt".into(),
            source: RemoteError::Operation("permission denied".into()),
        };
        assert!(!push.is_fatal());
        assert!(!TransferError::MalformedPayload("no Records".into()).is_fatal());
        assert!(
            !TransferError::Timeout {
                stage: "push",
                seconds: 30
            }
            .is_fatal()
        );
    }
}
