use crate::error::QueueError;
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::QueueAttributeName;
use tracing::warn;

/// One job as delivered by the queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub body: String,
}

/// Durable job queue with lease (visibility timeout) semantics.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn receive(
        &self,
        max_messages: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    async fn change_visibility(&self, receipt_handle: &str, seconds: i32)
    -> Result<(), QueueError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Queue identity used as the metrics dimension.
    fn name(&self) -> &str;
}

pub struct SqsJobQueue {
    client: Client,
    queue_url: String,
    queue_name: String,
}

impl SqsJobQueue {
    pub fn new(client: Client, queue_url: String, queue_name: String) -> Self {
        Self {
            client,
            queue_url,
            queue_name,
        }
    }

    /// Builds the queue, looking up its name from the `QueueArn` attribute.
    pub async fn connect(client: Client, queue_url: String) -> Self {
        let queue_name = resolve_queue_name(&client, &queue_url).await;
        Self::new(client, queue_url, queue_name)
    }

    pub async fn url_for_name(client: &Client, queue_name: &str) -> Result<String, QueueError> {
        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve(DisplayErrorContext(&e).to_string()))?;
        output
            .queue_url
            .ok_or_else(|| QueueError::Resolve(format!("no URL returned for {}", queue_name)))
    }

    pub fn url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn receive(
        &self,
        max_messages: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let receipt_handle = message.receipt_handle?;
                Some(QueueMessage {
                    message_id: message.message_id,
                    receipt_handle,
                    body: message.body.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        seconds: i32,
    ) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds)
            .send()
            .await
            .map_err(|e| QueueError::ChangeVisibility(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.queue_name
    }
}

async fn resolve_queue_name(client: &Client, queue_url: &str) -> String {
    let arn = client
        .get_queue_attributes()
        .queue_url(queue_url)
        .attribute_names(QueueAttributeName::QueueArn)
        .send()
        .await
        .map(|output| {
            output
                .attributes
                .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn).cloned())
        });

    match arn {
        Ok(Some(arn)) => queue_name_from_arn(&arn).to_string(),
        Ok(None) => queue_name_from_url(queue_url).to_string(),
        Err(e) => {
            warn!(
                "Failed to get QueueArn ({}), deducing queue name from URL",
                DisplayErrorContext(&e)
            );
            queue_name_from_url(queue_url).to_string()
        }
    }
}

pub fn queue_name_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or(arn)
}

pub fn queue_name_from_url(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}
