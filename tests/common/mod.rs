#![allow(dead_code)]

use async_trait::async_trait;
use s3_to_sftp::error::{QueueError, RemoteError, StorageError};
use s3_to_sftp::services::metrics::{MetricsFlush, MetricsSink};
use s3_to_sftp::services::queue::{JobQueue, QueueMessage};
use s3_to_sftp::services::remote::RemoteEndpoint;
use s3_to_sftp::services::storage::BlobStore;
use s3_to_sftp::utils::path::{dirname, normalize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("s3_to_sftp=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

pub fn notification(bucket: &str, key: &str, size: Option<u64>) -> String {
    let object = match size {
        Some(size) => serde_json::json!({ "key": key, "size": size }),
        None => serde_json::json!({ "key": key }),
    };
    serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": { "bucket": { "name": bucket }, "object": object }
        }]
    })
    .to_string()
}

pub fn message(receipt: &str, body: String) -> QueueMessage {
    QueueMessage {
        message_id: Some(format!("id-{}", receipt)),
        receipt_handle: receipt.to_string(),
        body,
    }
}

// --- Queue ---

#[derive(Default)]
pub struct MockQueue {
    batches: Mutex<VecDeque<Vec<QueueMessage>>>,
    pub receive_calls: Mutex<Vec<(i32, i32)>>,
    pub visibility_changes: Mutex<Vec<(String, i32)>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_delete: AtomicBool,
}

impl MockQueue {
    pub fn with_batches(batches: Vec<Vec<QueueMessage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn visibility_changes(&self) -> Vec<(String, i32)> {
        self.visibility_changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MockQueue {
    async fn receive(
        &self,
        max_messages: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.receive_calls
            .lock()
            .unwrap()
            .push((max_messages, visibility_timeout));
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        seconds: i32,
    ) -> Result<(), QueueError> {
        self.visibility_changes
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), seconds));
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(QueueError::Delete("receipt handle expired".to_string()));
        }
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "file-drops"
    }
}

// --- Blob store ---

#[derive(Default)]
pub struct MockBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MockBlobStore {
    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn download(
        &self,
        container: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, StorageError> {
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })?;
        tokio::fs::write(destination, &data).await?;
        Ok(data.len() as u64)
    }
}

// --- Remote endpoint ---

pub struct MockRemote {
    dirs: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub mkdir_calls: Mutex<Vec<String>>,
    pub close_calls: AtomicUsize,
    pub fail_put: AtomicBool,
    /// Makes `put` hang like a write on a half-open connection.
    pub stall_put: AtomicBool,
    pub put_confirms: Mutex<Vec<bool>>,
    pub disconnected: AtomicBool,
    /// Directories another worker creates between our chdir and mkdir.
    racing_dirs: Mutex<HashSet<String>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            dirs: Mutex::new(HashSet::from(["/".to_string()])),
            files: Mutex::new(HashMap::new()),
            mkdir_calls: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            fail_put: AtomicBool::new(false),
            stall_put: AtomicBool::new(false),
            put_confirms: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            racing_dirs: Mutex::new(HashSet::new()),
        }
    }
}

impl MockRemote {
    pub fn with_dir(self, dir: &str) -> Self {
        self.dirs.lock().unwrap().insert(normalize(dir));
        self
    }

    pub fn with_racing_dir(self, dir: &str) -> Self {
        self.racing_dirs.lock().unwrap().insert(normalize(dir));
        self
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn has_dir(&self, dir: &str) -> bool {
        self.dirs.lock().unwrap().contains(&normalize(dir))
    }

    pub fn mkdir_calls(&self) -> Vec<String> {
        self.mkdir_calls.lock().unwrap().clone()
    }

    pub fn put_confirms(&self) -> Vec<bool> {
        self.put_confirms.lock().unwrap().clone()
    }

    fn check_connected(&self) -> Result<(), RemoteError> {
        if self.disconnected.load(Ordering::SeqCst) {
            Err(RemoteError::Disconnected("socket closed by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteEndpoint for MockRemote {
    async fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.check_connected()?;
        let path = normalize(path);
        Ok(self.dirs.lock().unwrap().contains(&path)
            || self.files.lock().unwrap().contains_key(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.check_connected()?;
        let path = normalize(path);
        self.mkdir_calls.lock().unwrap().push(path.clone());

        if self.racing_dirs.lock().unwrap().remove(&path) {
            self.dirs.lock().unwrap().insert(path.clone());
            return Err(RemoteError::Operation(format!("{} already exists", path)));
        }

        let parent = dirname(&path);
        let mut dirs = self.dirs.lock().unwrap();
        if !parent.is_empty() && !dirs.contains(parent) {
            return Err(RemoteError::NotFound(parent.to_string()));
        }
        if !dirs.insert(path.clone()) {
            return Err(RemoteError::Operation(format!("{} already exists", path)));
        }
        Ok(())
    }

    async fn chdir(&self, path: &str) -> Result<(), RemoteError> {
        self.check_connected()?;
        let path = normalize(path);
        if self.dirs.lock().unwrap().contains(&path) {
            Ok(())
        } else {
            Err(RemoteError::NotFound(path))
        }
    }

    async fn put(&self, local: &Path, remote: &str, confirm: bool) -> Result<u64, RemoteError> {
        self.check_connected()?;
        self.put_confirms.lock().unwrap().push(confirm);
        if self.stall_put.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(RemoteError::Operation("permission denied".to_string()));
        }
        let remote = normalize(remote);
        let parent = dirname(&remote);
        if !parent.is_empty() && !self.dirs.lock().unwrap().contains(parent) {
            return Err(RemoteError::NotFound(parent.to_string()));
        }
        let data = tokio::fs::read(local).await?;
        let len = data.len() as u64;
        self.files.lock().unwrap().insert(remote, data);
        Ok(len)
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// --- Metrics ---

#[derive(Default)]
pub struct MockMetricsSink {
    pub flushes: Mutex<Vec<MetricsFlush>>,
}

impl MockMetricsSink {
    pub fn flushes(&self) -> Vec<MetricsFlush> {
        self.flushes.lock().unwrap().clone()
    }
}

impl MetricsSink for MockMetricsSink {
    fn emit(&self, flush: &MetricsFlush) -> std::io::Result<()> {
        self.flushes.lock().unwrap().push(flush.clone());
        Ok(())
    }
}
