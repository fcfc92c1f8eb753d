use crate::models::descriptor::FileDescriptor;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    SourceComplete,
    SourceFailed,
    DestinationFailed,
    DestinationComplete,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::SourceComplete => "S3_COMPLETE",
            TransferStatus::SourceFailed => "S3_FAILED",
            TransferStatus::DestinationFailed => "SFTP_FAILED",
            TransferStatus::DestinationComplete => "SFTP_COMPLETE",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Source,
    Destination,
}

/// Per-job transfer state. Owns the job's staging directory, which is
/// removed when the record is dropped.
#[derive(Debug)]
pub struct TransferRecord {
    descriptor: FileDescriptor,
    status: TransferStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    staging: TempDir,
}

impl TransferRecord {
    pub fn new(descriptor: FileDescriptor) -> std::io::Result<Self> {
        let staging = tempfile::Builder::new().prefix("s3-to-sftp-").tempdir()?;
        Ok(Self::with_staging(descriptor, staging))
    }

    /// Same as [`TransferRecord::new`] with the staging directory created under `root`.
    pub fn new_in(descriptor: FileDescriptor, root: &Path) -> std::io::Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("s3-to-sftp-")
            .tempdir_in(root)?;
        Ok(Self::with_staging(descriptor, staging))
    }

    fn with_staging(descriptor: FileDescriptor, staging: TempDir) -> Self {
        Self {
            descriptor,
            status: TransferStatus::Pending,
            started_at: None,
            ended_at: None,
            staging,
        }
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    pub fn local_staging_path(&self) -> PathBuf {
        self.staging.path().join(self.descriptor.file_name())
    }

    pub fn mark_source_complete(&mut self) {
        self.status = TransferStatus::SourceComplete;
    }

    /// Called right before the destination write begins.
    pub fn mark_transfer_start(&mut self) {
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    pub fn mark_transfer_success(&mut self) {
        if self.started_at.is_some() {
            self.ended_at = Some(Utc::now());
        }
        self.status = TransferStatus::DestinationComplete;
    }

    /// A failed transfer has no meaningful duration, so the start time is cleared.
    pub fn mark_transfer_failure(&mut self, stage: FailureStage) {
        self.status = match stage {
            FailureStage::Source => TransferStatus::SourceFailed,
            FailureStage::Destination => TransferStatus::DestinationFailed,
        };
        self.started_at = None;
        self.ended_at = None;
    }

    /// Seconds spent writing to the destination, or `-1.0` when unknown.
    pub fn duration_secs(&self) -> f64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                let elapsed = end - start;
                elapsed
                    .num_microseconds()
                    .map(|us| us as f64 / 1_000_000.0)
                    .unwrap_or_else(|| elapsed.num_milliseconds() as f64 / 1_000.0)
            }
            _ => -1.0,
        }
    }

    /// Bytes per second, or `-1.0` when the duration is unknown.
    pub fn speed(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 {
            self.descriptor.size_bytes() as f64 / duration
        } else {
            -1.0
        }
    }
}
