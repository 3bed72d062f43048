use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{Config, ScanBackend};
use crate::error::NotifierError;

/// Scan host written into the template config, replaced by the configured one.
pub const TEMPLATE_SCAN_HOST: &str = "18.222.126.212";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Tainted,
}

#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, NotifierError>;
}

/// Build the configured scanner, `None` when scanning is turned off.
pub fn scanner_from_config(config: &Config) -> Option<Box<dyn VirusScanner>> {
    if !config.scan_enabled() {
        tracing::info!("Virus scanning disabled");
        return None;
    }

    match config.scan_backend {
        ScanBackend::Clamdscan => Some(Box::new(ClamdScanProcess {
            binary: config.clamdscan_path.clone(),
            config_template: config.scan_config_template.clone(),
            rendered_config: config.scan_work_dir.join("scan.conf"),
            scan_host: config.scan_host.clone(),
        })),
        ScanBackend::Clamd => Some(Box::new(ClamdStream {
            host_address: config.clamd_address(),
        })),
    }
}

/// Runs the `clamdscan` client against a config file pointing at the scan host.
pub struct ClamdScanProcess {
    pub binary: PathBuf,
    pub config_template: PathBuf,
    pub rendered_config: PathBuf,
    pub scan_host: String,
}

pub fn render_scan_config(template: &str, scan_host: &str) -> String {
    template.replace(TEMPLATE_SCAN_HOST, scan_host)
}

impl ClamdScanProcess {
    async fn write_config(&self) -> Result<(), NotifierError> {
        let template = tokio::fs::read_to_string(&self.config_template).await
            .map_err(|err| NotifierError::Scan(format!("cannot read {}: {}", self.config_template.display(), err)))?;

        tokio::fs::write(&self.rendered_config, render_scan_config(&template, &self.scan_host)).await?;
        Ok(())
    }
}

#[async_trait]
impl VirusScanner for ClamdScanProcess {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, NotifierError> {
        self.write_config().await?;

        let output = Command::new(&self.binary)
            .arg(format!("--config-file={}", self.rendered_config.display()))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| NotifierError::Scan(format!("failed to run {}: {}", self.binary.display(), err)))?;

        if output.status.success() {
            Ok(ScanVerdict::Clean)
        } else {
            tracing::warn!(
                "clamdscan exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(ScanVerdict::Tainted)
        }
    }
}

/// Streams the file to a clamd daemon over TCP.
pub struct ClamdStream {
    pub host_address: String,
}

#[async_trait]
impl VirusScanner for ClamdStream {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, NotifierError> {
        let clamd_tcp = clamav_client::tokio::Tcp { host_address: self.host_address.as_str() };

        clamav_client::tokio::ping(clamd_tcp).await
            .map_err(|err| NotifierError::Scan(format!("ClamAV at {} is not available: {}", self.host_address, err)))?;

        let scan_response = clamav_client::tokio::scan_file(path, clamd_tcp, None).await
            .map_err(|err| NotifierError::Scan(format!("virus scan failed: {}", err)))?;

        let is_file_clean = clamav_client::clean(&scan_response)
            .map_err(|err| NotifierError::Scan(format!("failed to parse scan result: {}", err)))?;

        if is_file_clean {
            Ok(ScanVerdict::Clean)
        } else {
            // in practice this is ASCII, lossy just in case
            tracing::warn!("clamd reported: {}", String::from_utf8_lossy(&scan_response).trim());
            Ok(ScanVerdict::Tainted)
        }
    }
}
