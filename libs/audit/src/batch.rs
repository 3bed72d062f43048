use std::io::Read;

use flate2::read::GzDecoder;

use crate::classify::{classify, Classification};
use crate::entry::{DownloadRecord, RawAuditEntry};
use crate::AuditError;

/// One CloudTrail delivery file, still undecoded per entry.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AuditBatch {
    #[serde(rename = "Records")]
    pub records: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub downloads: Vec<DownloadRecord>,
    pub filtered: usize,
    /// entries that did not decode as an audit entry at all
    pub undecodable: usize,
    pub total: usize,
}

impl BatchOutcome {
    pub fn processed(&self) -> usize {
        self.downloads.len()
    }

    /// Every entry of the batch was either reported or explicitly filtered out.
    pub fn is_consistent(&self) -> bool {
        self.processed() + self.filtered == self.total
    }
}

/// Unpack a gzipped CloudTrail delivery.
pub fn decode_batch(compressed: &[u8]) -> Result<AuditBatch, AuditError> {
    let mut json = Vec::new();
    GzDecoder::new(compressed).read_to_end(&mut json)?;

    Ok(serde_json::from_slice(&json)?)
}

pub fn classify_batch(batch: &AuditBatch) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        total: batch.records.len(),
        ..Default::default()
    };

    for record in &batch.records {
        let entry: RawAuditEntry = match serde_json::from_value(record.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping audit entry that failed to decode: {}", err);
                outcome.undecodable += 1;
                continue;
            }
        };

        match classify(&entry) {
            Classification::Download(download) => outcome.downloads.push(download),
            Classification::Filtered(reason) => {
                tracing::debug!("Filtered audit entry {}: {:?}", entry.event_name, reason);
                outcome.filtered += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(value: &serde_json::Value) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(value.to_string().as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_delivery() -> serde_json::Value {
        serde_json::json!({
            "Records": [
                {
                    "eventName": "GetObject",
                    "eventTime": "2021-08-26T02:30:00Z",
                    "sourceIPAddress": "10.1.1.1",
                    "userAgent": "signin.amazonaws.com",
                    "userIdentity": { "principalId": "AIDAEXAMPLE" },
                    "requestParameters": { "bucketName": "demo-bucket", "key": "reports/q1.csv" }
                },
                {
                    "eventName": "PutObject",
                    "userIdentity": { "principalId": "AIDAEXAMPLE" },
                    "requestParameters": { "bucketName": "demo-bucket", "key": "reports/q2.csv" }
                },
                {
                    "eventName": "ListBuckets",
                    "requestParameters": null
                }
            ]
        })
    }

    #[test]
    fn test_decode_and_classify_batch() {
        let batch = decode_batch(&gzip(&sample_delivery())).unwrap();
        assert_eq!(batch.records.len(), 3);

        let outcome = classify_batch(&batch);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.processed(), 1);
        assert_eq!(outcome.filtered, 2);
        assert_eq!(outcome.undecodable, 0);
        assert!(outcome.is_consistent());
        assert_eq!(outcome.downloads[0].method, "AWS console");
    }

    #[test]
    fn test_undecodable_entry_breaks_consistency() {
        let batch = AuditBatch {
            records: vec![
                serde_json::json!({ "eventName": 42 }),
                serde_json::json!({ "eventName": "GetObject", "requestParameters": null }),
            ],
        };

        let outcome = classify_batch(&batch);
        assert_eq!(outcome.undecodable, 1);
        assert_eq!(outcome.filtered, 1);
        assert!(!outcome.is_consistent());
    }

    #[test]
    fn test_decode_rejects_plain_json() {
        let err = decode_batch(sample_delivery().to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, AuditError::Io(_)));
    }

    #[test]
    fn test_decode_rejects_non_batch_json() {
        let err = decode_batch(&gzip(&serde_json::json!({ "digest": true }))).unwrap_err();
        assert!(matches!(err, AuditError::Json(_)));
    }
}
