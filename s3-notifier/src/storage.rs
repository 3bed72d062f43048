use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use s3::types::{Tag, Tagging};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::NotifierError;


/// The object storage calls the notifier makes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, NotifierError>;

    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), NotifierError>;

    async fn get_tags(&self, bucket: &str, key: &str) -> Result<BTreeMap<String, String>, NotifierError>;

    async fn put_tags(&self, bucket: &str, key: &str, tags: &BTreeMap<String, String>) -> Result<(), NotifierError>;

    async fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, NotifierError>;
}

pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    pub fn new(client: s3::Client) -> Self {
        S3Store { client }
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, config: &Config) -> Self {
        let client = s3::Client::new(sdk_config);

        if config.force_path_style {
            tracing::info!("Using path-style buckets");
            let config_builder = client.config().clone().to_builder();
            S3Store::new(s3::Client::from_conf(config_builder.force_path_style(true).build()))
        } else {
            S3Store::new(client)
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, NotifierError> {
        let output = self.client.get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| NotifierError::storage("get_object", bucket, key, err))?;

        let data = output.body
            .collect()
            .await
            .map_err(|err| NotifierError::storage("read body", bucket, key, err))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), NotifierError> {
        let mut output = self.client.get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| NotifierError::storage("get_object", bucket, key, err))?;

        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = output.body
            .try_next()
            .await
            .map_err(|err| NotifierError::storage("read body", bucket, key, err))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!("Downloaded {}:{} to {}", bucket, key, path.display());
        Ok(())
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> Result<BTreeMap<String, String>, NotifierError> {
        let output = self.client.get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| NotifierError::storage("get_object_tagging", bucket, key, err))?;

        Ok(output.tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &BTreeMap<String, String>) -> Result<(), NotifierError> {
        let tag_set = tags.iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| NotifierError::storage("build tag", bucket, key, err))?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|err| NotifierError::storage("build tagging", bucket, key, err))?;

        self.client.put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|err| NotifierError::storage("put_object_tagging", bucket, key, err))?;

        Ok(())
    }

    async fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, NotifierError> {
        let presigning_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|err| NotifierError::storage("presigning config", bucket, key, err))?;

        let request = self.client.get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|err| NotifierError::storage("presign get_object", bucket, key, err))?;

        Ok(request.uri().to_string())
    }
}

/// Object tags, or none at all when they cannot be read.
pub async fn tags_or_empty(store: &dyn ObjectStore, bucket: &str, key: &str) -> BTreeMap<String, String> {
    store.get_tags(bucket, key).await.unwrap_or_else(|err| {
        tracing::warn!("get_tags failed: {}", err);
        BTreeMap::new()
    })
}

pub async fn presigned_url_or_none(store: &dyn ObjectStore, bucket: &str, key: &str, expires_in: Duration) -> Option<String> {
    store.presigned_url(bucket, key, expires_in).await
        .map_err(|err| {
            tracing::warn!("pre-sign url failed: {}", err);
            err
        })
        .ok()
}
