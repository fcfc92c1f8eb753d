use crate::error::TransferError;
use crate::utils::path::basename;
use percent_encoding::percent_decode_str;
use serde_json::Value;

/// The object a transfer job concerns. Built once from a notification and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    container: String,
    object_key: String,
    size_bytes: u64,
}

impl FileDescriptor {
    pub fn new(
        container: impl Into<String>,
        object_key: impl Into<String>,
        size_bytes: u64,
    ) -> Result<Self, TransferError> {
        let container = container.into();
        let object_key = object_key.into();
        if container.is_empty() {
            return Err(TransferError::MalformedPayload(
                "bucket name is empty".to_string(),
            ));
        }
        if object_key.is_empty() {
            return Err(TransferError::MalformedPayload(
                "object key is empty".to_string(),
            ));
        }
        if basename(&object_key).is_empty() {
            return Err(TransferError::MalformedPayload(format!(
                "object key {} names a folder, not a file",
                object_key
            )));
        }
        Ok(Self {
            container,
            object_key,
            size_bytes,
        })
    }

    /// Parses a storage event notification body.
    ///
    /// Only the first record is used; a message carries a single file.
    /// Returns `Ok(None)` when the record list is empty, in which case the
    /// message must be skipped without being acknowledged.
    pub fn from_notification(body: &str) -> Result<Option<Self>, TransferError> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| TransferError::MalformedPayload(format!("body is not JSON: {}", e)))?;

        let records = payload
            .get("Records")
            .ok_or_else(|| TransferError::MalformedPayload("Records missing".to_string()))?
            .as_array()
            .ok_or_else(|| TransferError::MalformedPayload("Records must be a list".to_string()))?;

        let Some(record) = records.first() else {
            return Ok(None);
        };

        let container = required_str(record, "/s3/bucket/name")?;
        let raw_key = required_str(record, "/s3/object/key")?;
        let size_bytes = object_size(record.pointer("/s3/object/size"))?;

        Self::new(container, decode_object_key(raw_key)?, size_bytes).map(Some)
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn file_name(&self) -> &str {
        basename(&self.object_key)
    }
}

fn required_str<'a>(record: &'a Value, pointer: &str) -> Result<&'a str, TransferError> {
    record
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| TransferError::MalformedPayload(format!("{} missing", pointer)))
}

fn object_size(value: Option<&Value>) -> Result<u64, TransferError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            TransferError::MalformedPayload(format!("object size {} is not a byte count", n))
        }),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| {
            TransferError::MalformedPayload(format!("object size {:?} is not a byte count", s))
        }),
        Some(other) => Err(TransferError::MalformedPayload(format!(
            "object size has unexpected type: {}",
            other
        ))),
    }
}

/// Event notifications URL-encode keys, with `+` standing in for spaces.
fn decode_object_key(raw: &str) -> Result<String, TransferError> {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| TransferError::MalformedPayload(format!("object key is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(records: &str) -> String {
        format!(r#"{{"Records": {}}}"#, records)
    }

    fn record(bucket: &str, key: &str, size: &str) -> String {
        format!(
            r#"{{"eventName": "ObjectCreated:Put", "s3": {{"bucket": {{"name": "{}"}}, "object": {{"key": "{}"{}}}}}}}"#,
            bucket, key, size
        )
    }

    #[test]
    fn test_first_record_only() {
        let body = event(&format!(
            "[{}, {}]",
            record("inbox", "a/first.csv", r#", "size": 42"#),
            record("inbox", "a/second.csv", r#", "size": 7"#)
        ));
        let descriptor = FileDescriptor::from_notification(&body).unwrap().unwrap();
        assert_eq!(descriptor.container(), "inbox");
        assert_eq!(descriptor.object_key(), "a/first.csv");
        assert_eq!(descriptor.size_bytes(), 42);
        assert_eq!(descriptor.file_name(), "first.csv");
    }

    #[test]
    fn test_zero_records_is_absent() {
        assert!(FileDescriptor::from_notification(&event("[]")).unwrap().is_none());
    }

    #[test]
    fn test_missing_size_defaults_to_zero() {
        let body = event(&format!("[{}]", record("inbox", "report.csv", "")));
        let descriptor = FileDescriptor::from_notification(&body).unwrap().unwrap();
        assert_eq!(descriptor.size_bytes(), 0);
    }

    #[test]
    fn test_size_as_string() {
        let body = event(&format!("[{}]", record("inbox", "report.csv", r#", "size": "1024""#)));
        let descriptor = FileDescriptor::from_notification(&body).unwrap().unwrap();
        assert_eq!(descriptor.size_bytes(), 1024);
    }

    #[test]
    fn test_malformed_payloads() {
        let cases = [
            "not json".to_string(),
            r#"{"Event": "s3:TestEvent"}"#.to_string(),
            r#"{"Records": {"s3": {}}}"#.to_string(),
            event(r#"[{"s3": {"bucket": {"name": "inbox"}}}]"#),
            event(r#"[{"s3": {"object": {"key": "a.txt"}}}]"#),
            event(&format!("[{}]", record("inbox", "a.txt", r#", "size": -1"#))),
            event(&format!("[{}]", record("inbox", "folder/", ""))),
        ];
        for body in cases {
            let err = FileDescriptor::from_notification(&body).unwrap_err();
            assert!(
                matches!(err, TransferError::MalformedPayload(_)),
                "expected malformed payload for {}",
                body
            );
        }
    }

    #[test]
    fn test_key_is_url_decoded() {
        let body = event(&format!(
            "[{}]",
            record("inbox", "daily+reports/caf%C3%A9%2Bbar.csv", r#", "size": 1"#)
        ));
        let descriptor = FileDescriptor::from_notification(&body).unwrap().unwrap();
        assert_eq!(descriptor.object_key(), "daily reports/café+bar.csv");
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(FileDescriptor::new("", "a.txt", 0).is_err());
        assert!(FileDescriptor::new("inbox", "", 0).is_err());
        assert!(FileDescriptor::new("inbox", "a.txt", 0).is_ok());
    }
}
