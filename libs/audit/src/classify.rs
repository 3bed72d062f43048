use std::collections::BTreeMap;

use crate::entry::{DownloadRecord, RawAuditEntry, READ_OBJECT_EVENT};

/// Why an audit entry was not reported as a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NoRequestParameters,
    NoBucketName,
    AuditStorageBucket,
    NotObjectRead,
    MissingKey,
    AuditTrailOutput,
    OwnActivity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Download(DownloadRecord),
    Filtered(FilterReason),
}

/// What the retrieval rules get to look at.
#[derive(Debug, Clone, Copy)]
pub struct Signature<'a> {
    /// user agent, or the authentication method when it overrides the agent
    pub method: &'a str,
    pub principal_id: &'a str,
}

pub struct RetrievalRule {
    pub name: &'static str,
    pub matches: fn(&Signature) -> bool,
    pub label: &'static str,
}

/// Retrieval rules, first match wins. Order matters: a principal-based rule placed
/// before an agent-based one takes precedence even when the agent is more specific.
pub const RETRIEVAL_RULES: &[RetrievalRule] = &[
    RetrievalRule {
        name: "console",
        matches: |sig| sig.method == "signin.amazonaws.com",
        label: "AWS console",
    },
    RetrievalRule {
        name: "s3fs",
        matches: |sig| sig.method.contains("s3fs"),
        label: "S3FS FUSE",
    },
    RetrievalRule {
        name: "storage-gateway",
        matches: |sig| sig.principal_id.contains("storage-gateway"),
        label: "S3 Gateway",
    },
    RetrievalRule {
        name: "sftp",
        matches: |sig| sig.principal_id.contains("aws-transfer"),
        label: "SFTP Pull",
    },
    RetrievalRule {
        name: "browser",
        matches: |sig| sig.method.contains("Mozilla/5"),
        label: "JS Browser",
    },
    RetrievalRule {
        name: "presigned-url",
        matches: |sig| sig.method == "QueryString",
        label: "Pre-signed URL",
    },
];

const AUDIT_STORAGE_BUCKET_MARKER: &str = "-cloudtrail-";
const AUDIT_TRAIL_KEY_PREFIX: &str = "Audit";
const OWN_PRINCIPAL_MARKER: &str = "S3Notifier";
const SIGNED_HEADER_AUTH: &str = "AuthHeader";

/// Decide whether `entry` is a download worth reporting and, if so, how it was retrieved.
///
/// Object tags are not looked up here; the returned record has an empty tag map.
pub fn classify(entry: &RawAuditEntry) -> Classification {
    let params = match entry.request_parameters.as_ref() {
        Some(params) => params,
        None => return Classification::Filtered(FilterReason::NoRequestParameters),
    };

    let bucket = match params.bucket_name.as_deref() {
        Some(bucket) => bucket,
        None => return Classification::Filtered(FilterReason::NoBucketName),
    };

    if bucket.contains(AUDIT_STORAGE_BUCKET_MARKER) {
        return Classification::Filtered(FilterReason::AuditStorageBucket);
    }

    if entry.event_name != READ_OBJECT_EVENT {
        return Classification::Filtered(FilterReason::NotObjectRead);
    }

    let key = match params.key.as_deref() {
        Some(key) => key,
        None => return Classification::Filtered(FilterReason::MissingKey),
    };

    if key.starts_with(AUDIT_TRAIL_KEY_PREFIX) {
        return Classification::Filtered(FilterReason::AuditTrailOutput);
    }

    let principal_id = entry.principal_id();
    if principal_id.contains(OWN_PRINCIPAL_MARKER) {
        return Classification::Filtered(FilterReason::OwnActivity);
    }

    let signature = Signature {
        method: working_method(entry),
        principal_id,
    };

    Classification::Download(DownloadRecord {
        source_ip: entry.source_ip_address.clone().unwrap_or_default(),
        method: retrieval_method(&signature),
        size: entry.bytes_transferred(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        time: entry.event_time.clone().unwrap_or_default(),
        recipient: entry.arn().map(str::to_string),
        tags: BTreeMap::new(),
        notified: None,
    })
}

/// Pre-signed URL and query string requests carry their real origin in the
/// authentication method, not the user agent.
fn working_method(entry: &RawAuditEntry) -> &str {
    match entry.authentication_method() {
        Some(auth) if auth != SIGNED_HEADER_AUTH => auth,
        _ => entry.user_agent(),
    }
}

pub fn retrieval_method(signature: &Signature) -> String {
    RETRIEVAL_RULES
        .iter()
        .find(|rule| (rule.matches)(signature))
        .map(|rule| rule.label.to_string())
        .unwrap_or_else(|| fallback_label(signature.method))
}

// e.g. "[Boto3/1.10.44 Python/3.8.8 ...]" -> "Boto3/1.10.44"
fn fallback_label(method: &str) -> String {
    match method.split_whitespace().next() {
        Some(token) => {
            let token = token.strip_prefix('[').unwrap_or(token);
            if token.is_empty() {
                "unknown".to_string()
            } else {
                token.to_string()
            }
        }
        None => "unknown".to_string(),
    }
}
