use std::error::Error;

use aws_sdk_s3::error::DisplayErrorContext;


#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("identity error: {0}")]
    Identity(String),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("scan error: {0}")]
    Scan(String),
    #[error(transparent)]
    Audit(#[from] audit::AuditError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NotifierError {
    /// Storage failure for one object, keeping the full SDK error chain in the message.
    pub fn storage<E: Error>(operation: &str, bucket: &str, key: &str, err: E) -> Self {
        NotifierError::Storage(format!("{} {}:{} failed: {}", operation, bucket, key, DisplayErrorContext(err)))
    }
}
