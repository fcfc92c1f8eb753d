use crate::config::WorkerConfig;
use crate::error::ConfigError;
use crate::services::queue::{JobQueue, SqsJobQueue};
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

pub async fn setup_queue(
    aws_config: &SdkConfig,
    config: &WorkerConfig,
) -> anyhow::Result<Arc<SqsJobQueue>> {
    let client = aws_sdk_sqs::Client::new(aws_config);

    let queue_url = match (&config.queue_url, &config.queue_name) {
        (Some(url), _) => url.clone(),
        (None, Some(name)) => SqsJobQueue::url_for_name(&client, name).await?,
        (None, None) => return Err(ConfigError::Missing("QUEUE_URL or QUEUE_NAME").into()),
    };

    let queue = SqsJobQueue::connect(client, queue_url).await;
    info!("📬 Queue: {} ({})", queue.url(), queue.name());
    Ok(Arc::new(queue))
}
