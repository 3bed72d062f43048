use std::collections::BTreeMap;

/// Event name CloudTrail uses for an object read.
pub const READ_OBJECT_EVENT: &str = "GetObject";

/// One decoded entry of a CloudTrail delivery.
///
/// Only the fields the classifier looks at are modelled, everything else in the
/// record is ignored. CloudTrail leaves out (or nulls) whatever does not apply to
/// the operation, so nearly every field is optional.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuditEntry {
    pub event_name: String,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default, rename = "sourceIPAddress")]
    pub source_ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_parameters: Option<RequestParameters>,
    #[serde(default)]
    pub user_identity: Option<UserIdentity>,
    #[serde(default)]
    pub additional_event_data: Option<AdditionalEventData>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct AdditionalEventData {
    // "AuthHeader" for signed requests, "QueryString" for pre-signed URLs
    #[serde(default, rename = "AuthenticationMethod")]
    pub authentication_method: Option<String>,
    #[serde(default, rename = "bytesTransferredOut")]
    pub bytes_transferred_out: Option<f64>,
}

impl RawAuditEntry {
    pub fn principal_id(&self) -> &str {
        self.user_identity
            .as_ref()
            .and_then(|identity| identity.principal_id.as_deref())
            .unwrap_or_default()
    }

    pub fn arn(&self) -> Option<&str> {
        self.user_identity
            .as_ref()
            .and_then(|identity| identity.arn.as_deref())
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("unknown")
    }

    pub fn authentication_method(&self) -> Option<&str> {
        self.additional_event_data
            .as_ref()
            .and_then(|data| data.authentication_method.as_deref())
    }

    pub fn bytes_transferred(&self) -> Option<u64> {
        self.additional_event_data
            .as_ref()
            .and_then(|data| data.bytes_transferred_out)
            .map(|bytes| bytes as u64)
    }
}

/// How a download was reported: what was fetched, by whom and how.
///
/// `tags` holds any object tags found at report time. They are merged into the
/// published message rather than nested under their own key, see [`DownloadRecord::to_message`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DownloadRecord {
    #[serde(rename = "IP")]
    pub source_ip: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub bucket: String,
    pub key: String,
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip)]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified: Option<String>,
}

impl DownloadRecord {
    /// Flat JSON object for the download notification. A tag whose key collides
    /// with a record field replaces that field.
    pub fn to_message(&self) -> serde_json::Value {
        let mut message = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        for (key, value) in &self.tags {
            message.insert(key.clone(), serde_json::Value::String(value.clone()));
        }

        serde_json::Value::Object(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_cloudtrail_get_object() {
        let entry: RawAuditEntry = serde_json::from_value(serde_json::json!({
            "eventVersion": "1.08",
            "eventName": "GetObject",
            "eventTime": "2021-08-26T02:30:00Z",
            "sourceIPAddress": "3.238.162.81",
            "userAgent": "[aws-cli/2.2.5 Python/3.8.8]",
            "userIdentity": {
                "type": "IAMUser",
                "principalId": "AIDAEXAMPLE",
                "arn": "arn:aws:iam::123456789012:user/alice"
            },
            "requestParameters": {
                "bucketName": "demo-bucket",
                "key": "reports/q1.csv",
                "Host": "demo-bucket.s3.amazonaws.com"
            },
            "additionalEventData": {
                "AuthenticationMethod": "AuthHeader",
                "bytesTransferredOut": 2048.0
            }
        })).unwrap();

        assert_eq!(entry.event_name, READ_OBJECT_EVENT);
        assert_eq!(entry.principal_id(), "AIDAEXAMPLE");
        assert_eq!(entry.arn(), Some("arn:aws:iam::123456789012:user/alice"));
        assert_eq!(entry.authentication_method(), Some("AuthHeader"));
        assert_eq!(entry.bytes_transferred(), Some(2048));
        assert_eq!(
            entry.request_parameters.unwrap().bucket_name.as_deref(),
            Some("demo-bucket")
        );
    }

    #[test]
    fn test_null_request_parameters_and_missing_agent() {
        let entry: RawAuditEntry = serde_json::from_value(serde_json::json!({
            "eventName": "ListBuckets",
            "requestParameters": null
        })).unwrap();

        assert!(entry.request_parameters.is_none());
        assert_eq!(entry.user_agent(), "unknown");
        assert_eq!(entry.principal_id(), "");
        assert_eq!(entry.arn(), None);
    }

    #[test]
    fn test_message_merges_tags_over_fields() {
        let mut tags = BTreeMap::new();
        tags.insert("project".to_string(), "apollo".to_string());
        tags.insert("method".to_string(), "tagged".to_string());

        let record = DownloadRecord {
            source_ip: "10.0.0.1".to_string(),
            method: "AWS console".to_string(),
            size: None,
            bucket: "demo-bucket".to_string(),
            key: "a.txt".to_string(),
            time: "2021-08-26T02:30:00Z".to_string(),
            recipient: None,
            tags,
            notified: None,
        };

        let message = record.to_message();
        assert_eq!(message["project"], "apollo");
        assert_eq!(message["method"], "tagged");
        assert_eq!(message["IP"], "10.0.0.1");
        assert!(message.get("recipient").is_none());
        assert!(message.get("tags").is_none());
    }
}
