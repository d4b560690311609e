use std::io::Cursor;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use serde::Deserialize;

use super::error::StorageError;
use super::key::StorageKey;
use super::traits::{BoxReader, ObjectStore};

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Uses the AWS endpoint for `region` when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub path_style: bool,
}

fn default_region() -> String {
    "us-east-1".into()
}

/// Object store backed by an S3-compatible bucket.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    public_base_url: String,
}

fn backend(err: S3Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

impl S3ObjectStore {
    pub fn new(config: &S3Config, public_base_url: impl Into<String>) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(backend)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        data: &[u8],
        key: &StorageKey,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key.to_string(), data, content_type)
            .await
            .map_err(backend)?;
        if !is_success(response.status_code()) {
            return Err(StorageError::Backend(format!(
                "put {key} returned status {}",
                response.status_code()
            )));
        }
        Ok(self.url(key))
    }

    async fn move_object(
        &self,
        src: &StorageKey,
        dst: &StorageKey,
    ) -> Result<String, StorageError> {
        if self.exists(dst).await? {
            if src != dst {
                self.delete(src).await?;
            }
            return Ok(self.url(dst));
        }
        if !self.exists(src).await? {
            return Err(StorageError::NotFound(src.to_string()));
        }

        let status = self
            .bucket
            .copy_object_internal(src.to_string(), dst.to_string())
            .await
            .map_err(backend)?;
        if !is_success(status) {
            return Err(StorageError::Backend(format!(
                "copy {src} -> {dst} returned status {status}"
            )));
        }
        self.delete(src).await?;
        Ok(self.url(dst))
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        // S3 answers 204 whether or not the key existed.
        let existed = self.exists(key).await?;
        if !existed {
            return Ok(false);
        }
        let response = self
            .bucket
            .delete_object(key.to_string())
            .await
            .map_err(backend)?;
        if !is_success(response.status_code()) {
            return Err(StorageError::Backend(format!(
                "delete {key} returned status {}",
                response.status_code()
            )));
        }
        Ok(true)
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        match self.bucket.head_object(key.to_string()).await {
            Ok((_, status)) if is_success(status) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => Err(StorageError::Backend(format!(
                "head {key} returned status {status}"
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let response = self
            .bucket
            .get_object(key.to_string())
            .await
            .map_err(backend)?;
        match response.status_code() {
            404 => Err(StorageError::NotFound(key.to_string())),
            status if is_success(status) => {
                Ok(Box::new(Cursor::new(response.bytes().to_vec())))
            }
            status => Err(StorageError::Backend(format!(
                "get {key} returned status {status}"
            ))),
        }
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        let (head, status) = self
            .bucket
            .head_object(key.to_string())
            .await
            .map_err(backend)?;
        if status == 404 {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(head.content_length.unwrap_or(0).max(0) as u64)
    }

    fn url(&self, key: &StorageKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
