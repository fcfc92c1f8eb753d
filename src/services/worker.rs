use crate::config::{MAX_BATCH_SIZE, SftpTarget, WorkerConfig};
use crate::error::{RemoteError, TransferError};
use crate::models::{FailureStage, FileDescriptor, TransferRecord};
use crate::services::estimator::TransferEstimator;
use crate::services::file_handler::RemoteFileHandler;
use crate::services::metrics::{BatchMetrics, EndpointIdentity, MetricsSink};
use crate::services::queue::{JobQueue, QueueMessage};
use crate::services::remote::RemoteEndpoint;
use crate::services::storage::BlobStore;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

/// Lease requested on receive; long enough to compute and apply the real one.
pub const BASE_VISIBILITY_TIMEOUT: i32 = 20;

/// Longest visibility timeout the queue accepts (12 hours).
pub const MAX_VISIBILITY_TIMEOUT: u64 = 43_200;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub batch_size: i32,
    pub poll_interval: Duration,
    pub operation_timeout: Option<Duration>,
    pub metrics_namespace: String,
    pub estimator: TransferEstimator,
    pub default_path: Option<String>,
    pub endpoint: EndpointIdentity,
    /// Parent of the per-job staging directories; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
}

impl ControllerSettings {
    pub fn new(config: &WorkerConfig, target: &SftpTarget) -> Self {
        Self {
            batch_size: config.batch_size,
            poll_interval: config.poll_interval(),
            operation_timeout: config.operation_timeout(),
            metrics_namespace: config.metrics_namespace.clone(),
            estimator: config.estimator(),
            default_path: target.default_path.clone(),
            endpoint: EndpointIdentity {
                host: target.host.clone(),
                username: target.username.clone(),
                port: target.port,
            },
            staging_root: None,
        }
    }
}

/// How one message ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// No records in the notification; left untouched on the queue.
    Skipped,
    /// Transferred and deleted from the queue.
    Acknowledged(TransferRecord),
    /// Left on the queue for redelivery once its lease expires.
    Failed {
        size_bytes: u64,
        error: TransferError,
    },
}

/// Polls the queue and runs each job through pull, push and acknowledge.
///
/// Owns the remote connection and closes it exactly once when [`run`]
/// returns, whether on shutdown or on a fatal connection error.
///
/// [`run`]: JobController::run
pub struct JobController {
    queue: Arc<dyn JobQueue>,
    remote: Arc<dyn RemoteEndpoint>,
    metrics: Arc<dyn MetricsSink>,
    handler: RemoteFileHandler,
    settings: ControllerSettings,
    shutdown: watch::Receiver<bool>,
}

impl JobController {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn BlobStore>,
        remote: Arc<dyn RemoteEndpoint>,
        metrics: Arc<dyn MetricsSink>,
        settings: ControllerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let handler = RemoteFileHandler::new(store, settings.default_path.as_deref());
        Self {
            queue,
            remote,
            metrics,
            handler,
            settings,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), TransferError> {
        info!("🚀 Pulling messages from {}", self.queue.name());

        let result = self.poll_loop().await;

        match self.remote.close().await {
            Ok(()) => info!("🔌 Remote connection closed"),
            Err(e) => warn!("Failed to close remote connection cleanly: {}", e),
        }
        if let Err(e) = &result {
            error!("🛑 Controller stopped: {}", e);
        } else {
            info!("🛑 Controller shut down gracefully");
        }
        result
    }

    async fn poll_loop(&mut self) -> Result<(), TransferError> {
        loop {
            if self.stop_requested() {
                return Ok(());
            }

            self.run_once().await?;

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed, stopping");
                        return Ok(());
                    }
                }
                _ = sleep(self.settings.poll_interval) => {}
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One polling cycle. Metrics are flushed once for the whole batch.
    /// Only a fatal error is returned; job failures are counted instead.
    pub async fn run_once(&mut self) -> Result<BatchMetrics, TransferError> {
        let max_messages = self.settings.batch_size.clamp(1, MAX_BATCH_SIZE);
        let messages = match self
            .queue
            .receive(max_messages, BASE_VISIBILITY_TIMEOUT)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("Failed to poll {}: {}", self.queue.name(), e);
                return Ok(BatchMetrics::default());
            }
        };
        if messages.is_empty() {
            debug!("No messages received");
            return Ok(BatchMetrics::default());
        }

        let mut batch = BatchMetrics::default();
        let mut fatal = None;
        for (index, message) in messages.iter().enumerate() {
            if self.stop_requested() {
                info!(
                    "Stop requested, leaving {} message(s) for redelivery",
                    messages.len() - index
                );
                break;
            }
            match self.process_message(message).await {
                JobOutcome::Skipped => {}
                JobOutcome::Acknowledged(record) => batch.record_success(&record),
                JobOutcome::Failed { size_bytes, error } => {
                    batch.record_failure(size_bytes);
                    if error.is_fatal() {
                        fatal = Some(error);
                        break;
                    }
                }
            }
        }

        self.flush_metrics(&batch);
        match fatal {
            Some(error) => Err(error),
            None => Ok(batch),
        }
    }

    /// Runs one message through its lifecycle. The record, and with it the
    /// staging directory, is released before the next message starts.
    pub async fn process_message(&self, message: &QueueMessage) -> JobOutcome {
        let descriptor = match FileDescriptor::from_notification(&message.body) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                debug!(message_id = ?message.message_id, "Notification has no records, skipping");
                return JobOutcome::Skipped;
            }
            Err(error) => {
                warn!(message_id = ?message.message_id, "Skipping message: {}", error);
                return JobOutcome::Failed {
                    size_bytes: 0,
                    error,
                };
            }
        };

        let size_bytes = descriptor.size_bytes();
        info!(
            container = %descriptor.container(),
            key = %descriptor.object_key(),
            size = size_bytes,
            "Processing file"
        );

        let staged = match &self.settings.staging_root {
            Some(root) => TransferRecord::new_in(descriptor, root),
            None => TransferRecord::new(descriptor),
        };
        let mut record = match staged {
            Ok(record) => record,
            Err(e) => {
                return JobOutcome::Failed {
                    size_bytes,
                    error: e.into(),
                };
            }
        };

        if size_bytes > 0 {
            self.extend_lease(message, size_bytes).await;
        }

        let pulled = self.bounded("pull", self.handler.pull(&mut record)).await;
        if let Err(error) = pulled {
            record.mark_transfer_failure(FailureStage::Source);
            return JobOutcome::Failed { size_bytes, error };
        }

        let pushed = match self
            .bounded("push", self.handler.push(&mut record, self.remote.as_ref()))
            .await
        {
            // The abandoned remote call may still hold the session, so the
            // connection can no longer be trusted.
            Err(TransferError::Timeout { seconds, .. }) => Err(TransferError::ConnectionFatal(
                RemoteError::Disconnected(format!("push stalled for {}s", seconds)),
            )),
            other => other,
        };
        if let Err(error) = pushed {
            record.mark_transfer_failure(FailureStage::Destination);
            return JobOutcome::Failed { size_bytes, error };
        }

        if let Err(e) = self.queue.delete(&message.receipt_handle).await {
            error!(
                key = %record.descriptor().object_key(),
                "Transferred but failed to acknowledge: {}",
                e
            );
            return JobOutcome::Failed {
                size_bytes,
                error: e.into(),
            };
        }

        info!(
            key = %record.descriptor().object_key(),
            status = %record.status(),
            duration_secs = record.duration_secs(),
            bytes_per_sec = record.speed(),
            "✅ Transfer complete"
        );
        JobOutcome::Acknowledged(record)
    }

    /// Extends the lease to cover the estimated transfer time. A failure
    /// here is not fatal to the job; the base lease still applies.
    async fn extend_lease(&self, message: &QueueMessage, size_bytes: u64) {
        let estimator = &self.settings.estimator;
        let seconds = estimator.estimate(size_bytes).min(MAX_VISIBILITY_TIMEOUT);
        info!(
            "Message is {}B, transfer at {}MB/s with {}% margin, extending visibility to {}s",
            size_bytes, estimator.throughput_mbps, estimator.margin_percent, seconds
        );
        if let Err(e) = self
            .queue
            .change_visibility(&message.receipt_handle, seconds as i32)
            .await
        {
            warn!("Failed to change message visibility: {}", e);
        }
    }

    async fn bounded<T, F>(&self, stage: &'static str, operation: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        match self.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| TransferError::Timeout {
                    stage,
                    seconds: limit.as_secs(),
                })?,
            None => operation.await,
        }
    }

    /// Emits one flush per received batch, even when every message was skipped.
    fn flush_metrics(&self, batch: &BatchMetrics) {
        let flush = batch.to_flush(
            &self.settings.metrics_namespace,
            self.queue.name(),
            &self.settings.endpoint,
        );
        if let Err(e) = self.metrics.emit(&flush) {
            warn!("Failed to emit metrics: {}", e);
        }
    }
}
