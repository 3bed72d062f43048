use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::NotifierError;

pub const REGION: &str = "us-east-1";

pub const UPLOAD_TOPIC: &str = "obj-upload";
pub const DOWNLOAD_TOPIC: &str = "obj-download";

/// Scan host value that turns virus scanning off.
pub const SCAN_DISABLED_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanBackend {
    /// run the clamdscan client against a rendered config file
    Clamdscan,
    /// stream the file to clamd over TCP
    Clamd,
}

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub account_id: Option<String>,
    pub scan_host: String,
    pub scan_backend: ScanBackend,
    pub clamd_port: u16,
    pub clamdscan_path: PathBuf,
    pub scan_config_template: PathBuf,
    pub scan_work_dir: PathBuf,
    pub tag_scan_result: bool,
    pub presigned_url_expiry: Duration,
    pub event_queue_url: Option<String>,
    pub force_path_style: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            region: REGION.to_string(),
            account_id: None,
            scan_host: SCAN_DISABLED_HOST.to_string(),
            scan_backend: ScanBackend::Clamdscan,
            clamd_port: 3310,
            clamdscan_path: PathBuf::from("./clamdscan"),
            scan_config_template: PathBuf::from("scan.conf"),
            scan_work_dir: env::temp_dir(),
            tag_scan_result: false,
            presigned_url_expiry: Duration::from_secs(3600),
            event_queue_url: None,
            force_path_style: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, NotifierError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source, missing variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotifierError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("VIRUSSCANHOST") {
            config.scan_host = host.trim().to_string();
        }

        if let Some(backend) = lookup("SCAN_BACKEND") {
            config.scan_backend = match backend.to_lowercase().as_str() {
                "clamdscan" => ScanBackend::Clamdscan,
                "clamd" => ScanBackend::Clamd,
                other => return Err(NotifierError::Config(format!("unknown SCAN_BACKEND {}", other))),
            };
        }

        if let Some(port) = lookup("CLAMD_PORT") {
            config.clamd_port = port.parse()
                .map_err(|_| NotifierError::Config(format!("CLAMD_PORT is not a port number: {}", port)))?;
        }

        if let Some(path) = lookup("CLAMDSCAN_PATH") {
            config.clamdscan_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("SCAN_CONFIG_TEMPLATE") {
            config.scan_config_template = PathBuf::from(path);
        }

        if let Some(dir) = lookup("SCAN_WORK_DIR") {
            config.scan_work_dir = PathBuf::from(dir);
        }

        if let Some(var) = lookup("TAG_SCAN_RESULT") {
            config.tag_scan_result = var.to_lowercase() == "true";
        }

        if let Some(secs) = lookup("PRESIGNED_URL_EXPIRY_SECONDS") {
            let secs = secs.parse::<u64>()
                .map_err(|_| NotifierError::Config(format!("PRESIGNED_URL_EXPIRY_SECONDS is not a number: {}", secs)))?;
            config.presigned_url_expiry = Duration::from_secs(secs);
        }

        config.event_queue_url = lookup("EVENT_QUEUE_URL");

        if let Some(var) = lookup("USE_PATH_STYLE_BUCKETS") {
            config.force_path_style = var.to_lowercase() == "true";
        }

        Ok(config)
    }

    pub fn scan_enabled(&self) -> bool {
        !self.scan_host.is_empty() && self.scan_host != SCAN_DISABLED_HOST
    }

    pub fn clamd_address(&self) -> String {
        format!("{}:{}", self.scan_host, self.clamd_port)
    }

    pub fn topic_arn(&self, topic: &str) -> Option<String> {
        self.account_id
            .as_ref()
            .map(|account| format!("arn:aws:sns:{}:{}:{}", self.region, account, topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_disable_scanning() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.scan_host, SCAN_DISABLED_HOST);
        assert!(!config.scan_enabled());
        assert_eq!(config.region, REGION);
        assert_eq!(config.presigned_url_expiry, Duration::from_secs(3600));
        assert_eq!(config.scan_backend, ScanBackend::Clamdscan);
    }

    #[test]
    fn test_scan_host_enables_scanning() {
        let config = Config::from_lookup(lookup_from(&[
            ("VIRUSSCANHOST", "10.0.0.7"),
            ("SCAN_BACKEND", "clamd"),
            ("CLAMD_PORT", "3311"),
            ("TAG_SCAN_RESULT", "TRUE"),
        ])).unwrap();

        assert!(config.scan_enabled());
        assert_eq!(config.scan_backend, ScanBackend::Clamd);
        assert_eq!(config.clamd_address(), "10.0.0.7:3311");
        assert!(config.tag_scan_result);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("SCAN_BACKEND", "sophos")])),
            Err(NotifierError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("CLAMD_PORT", "not-a-port")])),
            Err(NotifierError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("PRESIGNED_URL_EXPIRY_SECONDS", "-1")])),
            Err(NotifierError::Config(_))
        ));
    }

    #[test]
    fn test_topic_arn_needs_account() {
        let mut config = Config::default();
        assert_eq!(config.topic_arn(UPLOAD_TOPIC), None);

        config.account_id = Some("123456789012".to_string());
        assert_eq!(
            config.topic_arn(DOWNLOAD_TOPIC).as_deref(),
            Some("arn:aws:sns:us-east-1:123456789012:obj-download")
        );
    }
}
