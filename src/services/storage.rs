use crate::error::StorageError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Source side of the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Streams `container/key` into `destination`, returning the bytes written.
    async fn download(
        &self,
        container: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, StorageError>;
}

pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn download(
        &self,
        container: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(e, container, key))?;

        let mut reader = output.body.into_async_read();
        let mut file = tokio::fs::File::create(destination).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}

fn classify_get_error(
    err: SdkError<GetObjectError>,
    container: &str,
    key: &str,
) -> StorageError {
    let service_error = err.into_service_error();
    if service_error.is_no_such_key() || service_error.code() == Some("NoSuchBucket") {
        return StorageError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        };
    }
    if service_error.code() == Some("AccessDenied") {
        return StorageError::AccessDenied {
            container: container.to_string(),
            key: key.to_string(),
        };
    }
    StorageError::Backend(DisplayErrorContext(&service_error).to_string())
}
