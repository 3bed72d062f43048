//! In-memory stand-ins for the collaborators, shared by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotifierError;
use crate::notify::Publisher;
use crate::scan::{ScanVerdict, VirusScanner};
use crate::storage::ObjectStore;


#[derive(Default)]
pub struct MemoryStore {
    pub objects: HashMap<(String, String), Vec<u8>>,
    pub tags: Mutex<HashMap<(String, String), BTreeMap<String, String>>>,
    pub fail_tags: bool,
    pub fail_presign: bool,
}

impl MemoryStore {
    pub fn with_object(mut self, bucket: &str, key: &str, data: Vec<u8>) -> Self {
        self.objects.insert((bucket.to_string(), key.to_string()), data);
        self
    }

    pub fn with_tag(self, bucket: &str, key: &str, tag: &str, value: &str) -> Self {
        self.tags.lock().unwrap()
            .entry((bucket.to_string(), key.to_string()))
            .or_default()
            .insert(tag.to_string(), value.to_string());
        self
    }

    pub fn tags_of(&self, bucket: &str, key: &str) -> BTreeMap<String, String> {
        self.tags.lock().unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn object(&self, bucket: &str, key: &str) -> Result<&Vec<u8>, NotifierError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| NotifierError::Storage(format!("NoSuchKey {}:{}", bucket, key)))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, NotifierError> {
        self.object(bucket, key).cloned()
    }

    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), NotifierError> {
        let data = self.object(bucket, key)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> Result<BTreeMap<String, String>, NotifierError> {
        if self.fail_tags {
            return Err(NotifierError::Storage("AccessDenied".to_string()));
        }
        Ok(self.tags_of(bucket, key))
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &BTreeMap<String, String>) -> Result<(), NotifierError> {
        self.tags.lock().unwrap().insert((bucket.to_string(), key.to_string()), tags.clone());
        Ok(())
    }

    async fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, NotifierError> {
        if self.fail_presign {
            return Err(NotifierError::Storage("presign failed".to_string()));
        }
        Ok(format!("https://{}.s3.amazonaws.com/{}?X-Amz-Expires={}", bucket, key, expires_in.as_secs()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub subject: String,
    pub message: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<Published>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        RecordingPublisher { fail: true, ..Default::default() }
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Publish("AuthorizationError".to_string()));
        }

        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            subject: subject.to_string(),
            message: serde_json::from_str(message)?,
        });
        Ok(())
    }
}

/// Returns a fixed verdict and remembers which files it was handed.
pub struct FixedScanner {
    pub verdict: Option<ScanVerdict>,
    pub scanned: Mutex<Vec<(PathBuf, bool)>>,
}

impl FixedScanner {
    pub fn new(verdict: Option<ScanVerdict>) -> Self {
        FixedScanner { verdict, scanned: Mutex::new(Vec::new()) }
    }

    /// Paths handed to the scanner, and whether each existed at scan time.
    pub fn scanned(&self) -> Vec<(PathBuf, bool)> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl VirusScanner for FixedScanner {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, NotifierError> {
        self.scanned.lock().unwrap().push((path.to_path_buf(), path.exists()));
        self.verdict.ok_or_else(|| NotifierError::Scan("clamd unavailable".to_string()))
    }
}
