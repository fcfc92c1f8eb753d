use crate::error::{RemoteError, TransferError};
use crate::models::{FailureStage, FileDescriptor, TransferRecord};
use crate::services::remote::RemoteEndpoint;
use crate::services::storage::BlobStore;
use crate::utils::path::{dirname, normalize_prefix, remote_destination};
use async_recursion::async_recursion;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Moves one record's file from the blob store to the remote endpoint,
/// updating the record's status along the way.
pub struct RemoteFileHandler {
    store: Arc<dyn BlobStore>,
    path_prefix: String,
}

impl RemoteFileHandler {
    pub fn new(store: Arc<dyn BlobStore>, default_path: Option<&str>) -> Self {
        Self {
            store,
            path_prefix: normalize_prefix(default_path),
        }
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn remote_path(&self, descriptor: &FileDescriptor) -> String {
        remote_destination(&self.path_prefix, descriptor.object_key())
    }

    /// Fetches the object into the record's staging path.
    pub async fn pull(&self, record: &mut TransferRecord) -> Result<u64, TransferError> {
        let destination = record.local_staging_path();
        let descriptor = record.descriptor().clone();
        info!(
            "Downloading {}::{} to {}",
            descriptor.container(),
            descriptor.object_key(),
            destination.display()
        );

        match self
            .store
            .download(descriptor.container(), descriptor.object_key(), &destination)
            .await
        {
            Ok(bytes) => {
                record.mark_source_complete();
                info!("Downloaded {} ({} bytes)", destination.display(), bytes);
                Ok(bytes)
            }
            Err(source) => {
                record.mark_transfer_failure(FailureStage::Source);
                error!(
                    container = %descriptor.container(),
                    key = %descriptor.object_key(),
                    status = %record.status(),
                    "Failed to pull from source: {}",
                    source
                );
                Err(TransferError::SourceFetch {
                    container: descriptor.container().to_string(),
                    key: descriptor.object_key().to_string(),
                    source,
                })
            }
        }
    }

    /// Uploads the staged file, creating remote directories as needed.
    ///
    /// A lost connection is reported as [`TransferError::ConnectionFatal`];
    /// every other failure as [`TransferError::DestinationPush`].
    pub async fn push(
        &self,
        record: &mut TransferRecord,
        remote: &dyn RemoteEndpoint,
    ) -> Result<(), TransferError> {
        let local = record.local_staging_path();
        let remote_path = self.remote_path(record.descriptor());

        if !tokio::fs::try_exists(&local).await.unwrap_or(false) {
            let missing = std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found, aborting transfer", local.display()),
            );
            return Err(push_failed(record, remote_path, missing.into()));
        }

        if let Err(source) = ensure_remote_dir(remote, dirname(&remote_path)).await {
            return Err(push_failed(record, remote_path, source));
        }

        debug!("Uploading {} to {}", local.display(), remote_path);
        record.mark_transfer_start();
        match remote.put(&local, &remote_path, true).await {
            Ok(bytes) => {
                record.mark_transfer_success();
                info!(
                    "Uploaded {} to {} ({} bytes in {:.3}s)",
                    local.display(),
                    remote_path,
                    bytes,
                    record.duration_secs()
                );
                Ok(())
            }
            Err(source) => Err(push_failed(record, remote_path, source)),
        }
    }
}

fn push_failed(record: &mut TransferRecord, path: String, source: RemoteError) -> TransferError {
    record.mark_transfer_failure(FailureStage::Destination);
    error!(
        key = %record.descriptor().object_key(),
        status = %record.status(),
        "Failed to push to {}: {}",
        path,
        source
    );
    if source.is_disconnect() {
        TransferError::ConnectionFatal(source)
    } else {
        TransferError::DestinationPush { path, source }
    }
}

/// Makes sure `dir` and all its parents exist on the remote side.
///
/// Each level is probed first and only created when the probe fails. A
/// `mkdir` that loses a race with another worker is accepted as long as the
/// directory exists afterwards.
#[async_recursion]
pub async fn ensure_remote_dir(remote: &dyn RemoteEndpoint, dir: &str) -> Result<(), RemoteError> {
    if dir.is_empty() || dir == "." {
        return Ok(());
    }
    if dir == "/" {
        return remote.chdir("/").await;
    }

    match remote.chdir(dir).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_disconnect() => return Err(e),
        Err(_) => {}
    }

    ensure_remote_dir(remote, dirname(dir)).await?;

    if let Err(e) = remote.mkdir(dir).await {
        if e.is_disconnect() || !remote.exists(dir).await? {
            error!("Failed to create {}: {}", dir, e);
            return Err(e);
        }
        debug!("{} was created concurrently", dir);
    } else {
        info!("Created {}", dir);
    }

    remote.chdir(dir).await
}
