use std::path::Path;

use audit::{classify_batch, decode_batch};

use crate::config::Config;
use crate::error::NotifierError;
use crate::event::{EventBatch, Notification, RawEvent, UploadMethod, UploadRecord, VirusState};
use crate::notify::{send_download_notification, send_upload_notification, Publisher};
use crate::scan::{ScanVerdict, VirusScanner};
use crate::storage::{tags_or_empty, ObjectStore};

const COPY_EVENT: &str = "ObjectCreated:Copy";
const DIGEST_MARKER: &str = "CloudTrail-Digest";
const SCAN_RESULT_TAG: &str = "virus-scan";

/// Processing path selected by the notification configuration that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingPath {
    Upload,
    Audit,
    Ignored,
}

impl HandlingPath {
    pub fn from_configuration_id(id: &str) -> Self {
        match id {
            "file-upload" => HandlingPath::Upload,
            "audit-create" => HandlingPath::Audit,
            _ => HandlingPath::Ignored,
        }
    }
}

pub struct Router<'a> {
    config: &'a Config,
    store: &'a dyn ObjectStore,
    publisher: &'a dyn Publisher,
    scanner: Option<&'a dyn VirusScanner>,
}

impl<'a> Router<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn ObjectStore,
        publisher: &'a dyn Publisher,
        scanner: Option<&'a dyn VirusScanner>,
    ) -> Self {
        Router { config, store, publisher, scanner }
    }

    /// Process one delivered batch of storage events, one record at a time.
    ///
    /// A record that fails is logged and skipped; the rest of the batch is still processed.
    /// Returns every notification produced, whether or not publishing it succeeded.
    pub async fn route(&self, batch: &EventBatch) -> Vec<Notification> {
        let mut results = Vec::new();

        for record in &batch.records {
            let event: RawEvent = match serde_json::from_value(record.clone()) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!("Skipping malformed event record: {}", err);
                    continue;
                }
            };

            match self.route_event(&event).await {
                Ok(mut notifications) => results.append(&mut notifications),
                Err(err) => {
                    tracing::warn!("Skipping {}:{}: {}", event.bucket(), event.key(), err);
                }
            }

            tracing::info!("completed record");
        }

        results
    }

    async fn route_event(&self, event: &RawEvent) -> Result<Vec<Notification>, NotifierError> {
        let bucket = event.bucket();
        let key = event.key();

        // directories aren't interesting
        if key.ends_with('/') {
            return Ok(Vec::new());
        }

        if event.size() == 0 {
            tracing::info!("{}:{} EMPTY {}", bucket, key, event.configuration_id());
            return Ok(Vec::new());
        }

        if event.event_name == COPY_EVENT {
            tracing::info!("Processing copied object {}:{}", bucket, key);
        }

        tracing::info!("{}:{} {}", bucket, key, event.configuration_id());
        tracing::debug!("etag {:?} at {:?}", event.s3.object.e_tag, event.event_time);

        match HandlingPath::from_configuration_id(event.configuration_id()) {
            HandlingPath::Upload => {
                let upload = self.handle_upload(event, &key).await;
                Ok(vec![Notification::Upload(upload)])
            }
            HandlingPath::Audit => self.handle_audit(bucket, &key).await,
            HandlingPath::Ignored => {
                tracing::debug!("No handling for configuration {}", event.configuration_id());
                Ok(Vec::new())
            }
        }
    }

    async fn handle_upload(&self, event: &RawEvent, key: &str) -> UploadRecord {
        let bucket = event.bucket();

        let virus_state = match self.scanner {
            Some(scanner) => self.scan_object(scanner, bucket, key).await,
            None => VirusState::Skipped,
        };
        tracing::info!("scan state {}", virus_state.as_str());

        if self.config.tag_scan_result && virus_state != VirusState::Skipped {
            self.tag_scan_result(bucket, key, virus_state).await;
        }

        let mut upload = UploadRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source_ip: event.source_ip().to_string(),
            size: event.size(),
            method: UploadMethod::from_principal(event.principal_id()),
            virus_state,
            presigned_url: None,
            notified: None,
        };

        send_upload_notification(self.store, self.publisher, self.config, &mut upload).await;
        upload
    }

    /// Fetch the object into a scratch file and scan it. The scratch file is gone when this returns.
    async fn scan_object(&self, scanner: &dyn VirusScanner, bucket: &str, key: &str) -> VirusState {
        let download = match tempfile::Builder::new()
            .prefix("scan-")
            .tempfile_in(&self.config.scan_work_dir)
        {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!("Cannot create scratch file in {}: {}", self.config.scan_work_dir.display(), err);
                return VirusState::Failed;
            }
        };

        tracing::info!("retrieving object to submit for scan");
        let virus_state = match self.download_and_scan(scanner, bucket, key, download.path()).await {
            Ok(ScanVerdict::Clean) => VirusState::Clean,
            Ok(ScanVerdict::Tainted) => VirusState::Tainted,
            Err(err) => {
                tracing::warn!("clamdscan/retrieve failed: {}", err);
                VirusState::Failed
            }
        };

        if let Err(err) = download.close() {
            tracing::warn!("Failed to remove scratch file: {}", err);
        }

        virus_state
    }

    async fn download_and_scan(
        &self,
        scanner: &dyn VirusScanner,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<ScanVerdict, NotifierError> {
        self.store.download_file(bucket, key, path).await?;
        scanner.scan(path).await
    }

    async fn tag_scan_result(&self, bucket: &str, key: &str, virus_state: VirusState) {
        // tagging replaces the whole set
        let mut tags = tags_or_empty(self.store, bucket, key).await;
        tags.insert(SCAN_RESULT_TAG.to_string(), virus_state.as_str().to_string());

        if let Err(err) = self.store.put_tags(bucket, key, &tags).await {
            tracing::warn!("put_tags failed: {}", err);
        }
    }

    async fn handle_audit(&self, bucket: &str, key: &str) -> Result<Vec<Notification>, NotifierError> {
        if key.contains(DIGEST_MARKER) {
            return Ok(Vec::new());
        }

        let compressed = self.store.get_object(bucket, key).await?;
        let batch = decode_batch(&compressed)?;
        let outcome = classify_batch(&batch);
        tracing::info!("Cloudtrail: {} in {}", outcome.total, key);

        let consistent = outcome.is_consistent();
        let (processed, filtered, undecodable, total) =
            (outcome.processed(), outcome.filtered, outcome.undecodable, outcome.total);

        let mut notifications = Vec::with_capacity(processed);
        for mut download in outcome.downloads {
            download.tags = tags_or_empty(self.store, &download.bucket, &download.key).await;
            send_download_notification(self.publisher, &mut download).await;
            notifications.push(Notification::Download(download));
        }

        if !consistent {
            tracing::warn!(
                "Cloudtrail: {} processed + {} filtered != {} entries in {} ({} undecodable)",
                processed, filtered, total, key, undecodable
            );
        }

        Ok(notifications)
    }
}
