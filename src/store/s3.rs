//! Amazon S3 (and S3-compatible) object store.
//!
//! # Requirements
//!
//! - Credentials and region discoverable by `aws-config`
//!   (environment, profile, or instance role)
//! - `s3:GetObject`, `s3:GetObjectTagging`, `s3:PutObjectTagging`,
//!   `s3:ListBucket`, `s3:PutObject` and `s3:DeleteObject`

use crate::core::{ListPage, ObjectHead, ObjectSummary, StoreError, StoreResult, Tag};
use crate::store::ObjectStore;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier, Tagging};
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Maximum keys per `DeleteObjects` request.
const DELETE_BATCH: usize = 1000;

/// S3 client configuration.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Region override.
    pub region: Option<String>,
    /// Custom endpoint, for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Use path-style addressing.
    pub force_path_style: bool,
}

impl S3Config {
    /// Creates a configuration using SDK defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Enables or disables path-style addressing.
    pub fn with_force_path_style(mut self, enabled: bool) -> Self {
        self.force_path_style = enabled;
        self
    }
}

/// S3-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the environment and `config`.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = config.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        Self::new(Client::from_conf(builder.build()))
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .map(|response| response.status().as_u16() == 404)
        .unwrap_or(false)
}

fn map_sdk_error<E>(operation: &'static str, bucket: &str, key: &str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if is_not_found(&err) {
        return StoreError::not_found(bucket, key);
    }
    StoreError::backend(
        operation,
        aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
    )
}

fn size_from(length: Option<i64>) -> Option<u64> {
    length.and_then(|n| u64::try_from(n).ok())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("head_object", bucket, key, e))?;

        Ok(ObjectHead {
            size: size_from(output.content_length()),
            content_type: output.content_type().map(str::to_string),
            content_disposition: output.content_disposition().map(str::to_string),
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> StoreResult<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|e| map_sdk_error("list_objects_v2", bucket, prefix.unwrap_or(""), e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(ObjectSummary::new(key, size_from(obj.size())))
            })
            .collect();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_object", bucket, key, e))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = output.body;
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StoreError::backend("get_object", e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(bucket, key, bytes = written, path = %local_path.display(), "Object downloaded");
        Ok(())
    }

    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Vec<Tag>> {
        let output = self
            .client
            .get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_object_tagging", bucket, key, e))?;

        Ok(output
            .tag_set()
            .iter()
            .map(|t| Tag::new(t.key(), t.value()))
            .collect())
    }

    async fn tag_object(&self, bucket: &str, key: &str, tags: Vec<Tag>) -> StoreResult<()> {
        let tag_set = tags
            .into_iter()
            .map(|t| {
                aws_sdk_s3::types::Tag::builder()
                    .key(t.key)
                    .value(t.value)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::backend("put_object_tagging", e.to_string()))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| StoreError::backend("put_object_tagging", e.to_string()))?;

        self.client
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object_tagging", bucket, key, e))?;
        Ok(())
    }

    async fn upload_object(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::backend("put_object", e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", bucket, key, e))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()> {
        for batch in keys.chunks(DELETE_BATCH) {
            let ids = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::backend("delete_objects", e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(ids))
                .quiet(true)
                .build()
                .map_err(|e| StoreError::backend("delete_objects", e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_sdk_error("delete_objects", bucket, "", e))?;

            if let Some(first) = output.errors().first() {
                return Err(StoreError::backend(
                    "delete_objects",
                    format!(
                        "{} key(s) not deleted, first {:?}: {:?}",
                        output.errors().len(),
                        first.key(),
                        first.message()
                    ),
                ));
            }
        }
        Ok(())
    }
}
