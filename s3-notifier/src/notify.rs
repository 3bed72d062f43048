use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;

use audit::DownloadRecord;

use crate::config::{Config, DOWNLOAD_TOPIC, UPLOAD_TOPIC};
use crate::error::NotifierError;
use crate::event::{UploadRecord, VirusState};
use crate::storage::{presigned_url_or_none, ObjectStore};

const UPLOAD_SUBJECT: &str = "File arrival notification";
const DOWNLOAD_SUBJECT: &str = "File received notification";

/// Marker set on a record whose notification could not be published.
pub const NOTIFY_FAILED: &str = "failed";

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifierError>;
}

pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    config: Config,
}

impl SnsPublisher {
    pub fn new(client: aws_sdk_sns::Client, config: Config) -> Self {
        SnsPublisher { client, config }
    }
}

#[async_trait]
impl Publisher for SnsPublisher {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifierError> {
        let arn = self.config.topic_arn(topic)
            .ok_or_else(|| NotifierError::Publish("account id unknown, cannot address topic".to_string()))?;

        tracing::info!("Publish to {}", arn);
        self.client.publish()
            .topic_arn(&arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|err| NotifierError::Publish(format!("{}: {}", arn, DisplayErrorContext(err))))?;

        Ok(())
    }
}

/// Logs what would have been published. Used when running outside the hosted queue.
pub struct DryRunPublisher;

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifierError> {
        tracing::info!("[dry run] {} / {}: {}", topic, subject, message);
        Ok(())
    }
}

/// Publish an upload. Clean files get a time-limited download link attached first.
pub async fn send_upload_notification(
    store: &dyn ObjectStore,
    publisher: &dyn Publisher,
    config: &Config,
    record: &mut UploadRecord,
) {
    if record.virus_state == VirusState::Clean {
        record.presigned_url = presigned_url_or_none(store, &record.bucket, &record.key, config.presigned_url_expiry).await;
    }

    let message = match serde_json::to_string(record) {
        Ok(message) => message,
        Err(err) => {
            tracing::error!("Failed to serialize upload notification: {}", err);
            record.notified = Some(NOTIFY_FAILED.to_string());
            return;
        }
    };

    if let Err(err) = publisher.publish(UPLOAD_TOPIC, UPLOAD_SUBJECT, &message).await {
        tracing::warn!("Upload notification for {}:{} not sent: {}", record.bucket, record.key, err);
        record.notified = Some(NOTIFY_FAILED.to_string());
    }
}

pub async fn send_download_notification(publisher: &dyn Publisher, record: &mut DownloadRecord) {
    let message = record.to_message().to_string();

    if let Err(err) = publisher.publish(DOWNLOAD_TOPIC, DOWNLOAD_SUBJECT, &message).await {
        tracing::warn!("Download notification for {}:{} not sent: {}", record.bucket, record.key, err);
        record.notified = Some(NOTIFY_FAILED.to_string());
    }
}
