use crate::models::TransferRecord;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::io::Write;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Bytes,
    BytesPerSecond,
    Count,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Bytes => "Bytes",
            MetricUnit::BytesPerSecond => "Bytes/Second",
            MetricUnit::Count => "Count",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: &'static str,
    pub value: f64,
    pub unit: MetricUnit,
}

/// Remote endpoint identity attached to every flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointIdentity {
    pub host: String,
    pub username: String,
    pub port: u16,
}

/// Everything emitted for one polling cycle, scoped to a single namespace.
#[derive(Debug, Clone)]
pub struct MetricsFlush {
    pub namespace: String,
    pub dimensions: Vec<(String, String)>,
    pub metrics: Vec<Metric>,
    pub properties: Map<String, Value>,
}

impl MetricsFlush {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }

    /// CloudWatch Embedded Metric Format document.
    pub fn to_emf(&self) -> Value {
        let mut document = Map::new();
        document.insert(
            "_aws".to_string(),
            json!({
                "Timestamp": Utc::now().timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": self.namespace,
                    "Dimensions": [self.dimensions.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()],
                    "Metrics": self.metrics.iter().map(|m| json!({
                        "Name": m.name,
                        "Unit": m.unit.as_str(),
                    })).collect::<Vec<_>>(),
                }],
            }),
        );
        for (key, value) in &self.dimensions {
            document.insert(key.clone(), Value::String(value.clone()));
        }
        for metric in &self.metrics {
            document.insert(metric.name.to_string(), json!(metric.value));
        }
        for (key, value) in &self.properties {
            document.insert(key.clone(), value.clone());
        }
        Value::Object(document)
    }
}

/// Per-cycle counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetrics {
    pub total_bytes: u64,
    pub successful_seconds: f64,
    pub processed: u64,
    pub failed: u64,
}

impl BatchMetrics {
    pub fn record_success(&mut self, record: &TransferRecord) {
        self.processed += 1;
        self.total_bytes += record.descriptor().size_bytes();
        let duration = record.duration_secs();
        if duration > 0.0 {
            self.successful_seconds += duration;
        }
    }

    pub fn record_failure(&mut self, size_bytes: u64) {
        self.processed += 1;
        self.failed += 1;
        self.total_bytes += size_bytes;
    }

    /// Total bytes over the summed duration of successful transfers only.
    ///
    /// The numerator includes bytes of failed jobs, which have no duration,
    /// so a batch mixing a quick success with a large failure reports a rate
    /// far above the real link speed. Read it next to `FilesFailed`.
    pub fn transfer_rate(&self) -> f64 {
        if self.successful_seconds > 0.0 {
            self.total_bytes as f64 / self.successful_seconds
        } else {
            0.0
        }
    }

    pub fn to_flush(
        &self,
        namespace: &str,
        queue_name: &str,
        endpoint: &EndpointIdentity,
    ) -> MetricsFlush {
        let mut properties = Map::new();
        properties.insert(
            "SftpServer".to_string(),
            serde_json::to_value(endpoint).unwrap_or(Value::Null),
        );
        MetricsFlush {
            namespace: namespace.to_string(),
            dimensions: vec![("Queue".to_string(), queue_name.to_string())],
            metrics: vec![
                Metric {
                    name: "TotalFilesSize",
                    value: self.total_bytes as f64,
                    unit: MetricUnit::Bytes,
                },
                Metric {
                    name: "TransferRate",
                    value: self.transfer_rate(),
                    unit: MetricUnit::BytesPerSecond,
                },
                Metric {
                    name: "FilesProcessed",
                    value: self.processed as f64,
                    unit: MetricUnit::Count,
                },
                Metric {
                    name: "FilesFailed",
                    value: self.failed as f64,
                    unit: MetricUnit::Count,
                },
            ],
            properties,
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn emit(&self, flush: &MetricsFlush) -> std::io::Result<()>;
}

/// Writes one EMF JSON line per flush to stdout, where the log agent picks
/// it up.
pub struct EmfMetricsSink;

impl MetricsSink for EmfMetricsSink {
    fn emit(&self, flush: &MetricsFlush) -> std::io::Result<()> {
        let document = flush.to_emf();
        info!(
            target: "metrics",
            namespace = %flush.namespace,
            processed = flush.metric("FilesProcessed").unwrap_or_default(),
            failed = flush.metric("FilesFailed").unwrap_or_default(),
            "metrics_flushed"
        );
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", document)?;
        stdout.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointIdentity {
        EndpointIdentity {
            host: "sftp.example.com".to_string(),
            username: "drop".to_string(),
            port: 22,
        }
    }

    #[test]
    fn test_rate_ignores_undefined_durations() {
        let mut batch = BatchMetrics::default();
        batch.record_failure(1_000);
        assert_eq!(batch.transfer_rate(), 0.0);

        batch.successful_seconds = 4.0;
        batch.total_bytes = 2_000;
        assert_eq!(batch.transfer_rate(), 500.0);
        assert_eq!(batch.processed, 1);
        assert_eq!(batch.failed, 1);
    }

    #[test]
    fn test_rate_counts_failed_bytes_over_successful_time() {
        let mut batch = BatchMetrics::default();
        batch.record_failure(1024 * 1024 * 1024);
        batch.total_bytes += 1;
        batch.processed += 1;
        batch.successful_seconds = 0.5;
        assert_eq!(batch.transfer_rate(), (1024.0 * 1024.0 * 1024.0 + 1.0) / 0.5);
    }

    #[test]
    fn test_flush_contents() {
        let batch = BatchMetrics {
            total_bytes: 300,
            successful_seconds: 3.0,
            processed: 3,
            failed: 1,
        };
        let flush = batch.to_flush("S3ToSFTP", "file-drops", &endpoint());
        assert_eq!(flush.metric("TotalFilesSize"), Some(300.0));
        assert_eq!(flush.metric("TransferRate"), Some(100.0));
        assert_eq!(flush.metric("FilesProcessed"), Some(3.0));
        assert_eq!(flush.metric("FilesFailed"), Some(1.0));
        assert_eq!(
            flush.dimensions,
            vec![("Queue".to_string(), "file-drops".to_string())]
        );
    }

    #[test]
    fn test_emf_document() {
        let flush = BatchMetrics::default().to_flush("S3ToSFTP", "file-drops", &endpoint());
        let emf = flush.to_emf();
        let directive = &emf["_aws"]["CloudWatchMetrics"][0];
        assert_eq!(directive["Namespace"], "S3ToSFTP");
        assert_eq!(directive["Dimensions"][0][0], "Queue");
        assert_eq!(directive["Metrics"][1]["Unit"], "Bytes/Second");
        assert_eq!(emf["Queue"], "file-drops");
        assert_eq!(emf["FilesFailed"], 0.0);
        assert_eq!(emf["SftpServer"]["host"], "sftp.example.com");
        assert_eq!(emf["SftpServer"]["port"], 22);
    }
}
