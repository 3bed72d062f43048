use audit::DownloadRecord;

use crate::error::NotifierError;

/// Body of an S3 event notification. Records stay undecoded so that one bad record
/// does not take the rest of the batch down with it.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EventBatch {
    #[serde(rename = "Records")]
    pub records: Vec<serde_json::Value>,
}

impl EventBatch {
    pub fn from_json(body: &str) -> Result<Self, NotifierError> {
        Ok(serde_json::from_str(body)?)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub event_name: String,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub user_identity: Option<EventIdentity>,
    #[serde(default)]
    pub request_parameters: Option<EventRequestParameters>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventIdentity {
    pub principal_id: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EventRequestParameters {
    #[serde(default, rename = "sourceIPAddress")]
    pub source_ip_address: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Entity {
    pub configuration_id: String,
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    pub key: String,
    // absent on delete events
    #[serde(default)]
    pub size: u64,
    // absent on Glacier restores
    #[serde(default)]
    pub e_tag: Option<String>,
}

impl RawEvent {
    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    /// Object key with the notification's form-encoding undone.
    pub fn key(&self) -> String {
        decode_key(&self.s3.object.key)
    }

    pub fn size(&self) -> u64 {
        self.s3.object.size
    }

    pub fn configuration_id(&self) -> &str {
        &self.s3.configuration_id
    }

    pub fn principal_id(&self) -> &str {
        self.user_identity
            .as_ref()
            .map(|identity| identity.principal_id.as_str())
            .unwrap_or("N/A")
    }

    pub fn source_ip(&self) -> &str {
        self.request_parameters
            .as_ref()
            .and_then(|params| params.source_ip_address.as_deref())
            .unwrap_or("N/A")
    }
}

/// Keys arrive URL-encoded with `+` standing in for spaces.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(err) => {
            tracing::warn!("Key {} is not valid UTF-8 once decoded ({}), using it as is", raw, err);
            spaced
        }
    }
}

/// How an object reached the bucket, told apart by the uploading principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum UploadMethod {
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "S3-SFTP")]
    Sftp,
    #[serde(rename = "S3-GWay")]
    StorageGateway,
}

impl UploadMethod {
    pub fn from_principal(principal_id: &str) -> Self {
        if principal_id.contains("aws-transfer") {
            UploadMethod::Sftp
        } else if principal_id.contains("StorageGateway") {
            UploadMethod::StorageGateway
        } else {
            UploadMethod::S3
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VirusState {
    Skipped,
    Clean,
    Tainted,
    Failed,
}

impl VirusState {
    pub fn as_str(&self) -> &str {
        match self {
            VirusState::Skipped => "skipped",
            VirusState::Clean => "clean",
            VirusState::Tainted => "tainted",
            VirusState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UploadRecord {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "IP")]
    pub source_ip: String,
    pub size: u64,
    pub method: UploadMethod,
    #[serde(rename = "virus")]
    pub virus_state: VirusState,
    #[serde(rename = "url", skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Upload(UploadRecord),
    Download(DownloadRecord),
}

impl Notification {
    pub fn to_message(&self) -> serde_json::Value {
        match self {
            Notification::Upload(upload) => serde_json::to_value(upload).unwrap_or_default(),
            Notification::Download(download) => download.to_message(),
        }
    }
}
