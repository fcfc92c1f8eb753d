use crate::error::RemoteError;
use async_trait::async_trait;
use std::path::Path;

/// Destination side of the pipeline: an already-connected file-transfer
/// session. Paths are `/`-delimited remote paths.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, RemoteError>;

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError>;

    /// Checks that `path` exists and is a directory. Nothing on the
    /// session changes; later calls still take full paths.
    async fn chdir(&self, path: &str) -> Result<(), RemoteError>;

    /// Uploads `local` to `remote`. With `confirm`, the remote file is
    /// checked against the local size after the write.
    async fn put(&self, local: &Path, remote: &str, confirm: bool) -> Result<u64, RemoteError>;

    /// Closes the session. Later calls return [`RemoteError::Disconnected`].
    async fn close(&self) -> Result<(), RemoteError>;
}
