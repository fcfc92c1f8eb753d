use crate::services::storage::S3BlobStore;
use aws_config::SdkConfig;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Shared AWS configuration. `S3_ENDPOINT_URL` points the blob store at an
/// S3-compatible service (MinIO, LocalStack) instead of AWS.
pub async fn load_aws_config() -> SdkConfig {
    aws_config::load_from_env().await
}

pub fn setup_storage(aws_config: &SdkConfig) -> Arc<S3BlobStore> {
    let mut builder = aws_sdk_s3::config::Builder::from(aws_config);
    if let Ok(endpoint_url) = env::var("S3_ENDPOINT_URL") {
        info!("☁️  S3 Storage: {}", endpoint_url);
        builder = builder.endpoint_url(endpoint_url).force_path_style(true);
    } else {
        info!("☁️  S3 Storage: AWS default endpoint");
    }

    let s3_client = aws_sdk_s3::Client::from_conf(builder.build());
    Arc::new(S3BlobStore::new(s3_client))
}
