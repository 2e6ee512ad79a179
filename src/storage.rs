use crate::{
    domain::{FileStorage, StoredObject},
    errors::StorageError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    error::SdkError,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client as S3Client,
};

// DeleteObjects accepts at most 1000 keys per call.
const DELETE_BATCH_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String, public_base_url: String) -> Self {
        let public_base_url = public_base_url.trim_end_matches('/').to_string();
        tracing::info!(bucket = %bucket_name, %public_base_url, "Initializing S3FileStorage");
        Self { client, bucket_name, public_base_url }
    }

    async fn remove_batch(&self, keys: &[String]) -> anyhow::Result<()> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .context("S3: Failed to build object identifier")?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .context("S3: Failed to build delete request")?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket_name)
            .delete(delete)
            .send()
            .await
            .context(format!("S3: Failed to delete {} objects from bucket '{}'", keys.len(), self.bucket_name))?;

        // Per-key failures come back in a successful response.
        if let Some(first) = output.errors().first() {
            anyhow::bail!(
                "S3: {} of {} objects could not be deleted, first '{}': {}",
                output.errors().len(),
                keys.len(),
                first.key().unwrap_or("?"),
                first.message().unwrap_or("no message")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data to S3 using PutObject. Sets Content-Type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, "S3: Uploading file");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(())
    }

    /// Removes objects with DeleteObjects. Keys that do not exist are skipped by S3.
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        tracing::debug!(count = keys.len(), bucket = %self.bucket_name, "S3: Removing objects");
        for chunk in keys.chunks(DELETE_BATCH_LIMIT) {
            self.remove_batch(chunk).await.map_err(|e| {
                tracing::error!(bucket = %self.bucket_name, error = %e, "S3: Error removing objects");
                StorageError::BackendError(e)
            })?;
        }
        Ok(())
    }

    /// Downloads file data and its content type from S3 using GetObject.
    async fn download(&self, key: &str) -> Result<StoredObject, StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Downloading file");

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_no_such_key() {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: NoSuchKey error downloading file");
                        return StorageError::NotFound(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error downloading file");
                StorageError::BackendError(
                    anyhow::Error::new(sdk_err).context(format!("S3: Failed to download object with key '{}'", key)),
                )
            })?;

        let content_type = output.content_type().map(|s| s.to_string());
        let data = output
            .body
            .collect()
            .await
            .context(format!("S3: Failed to read body of object '{}'", key))?
            .into_bytes()
            .to_vec();

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, ?content_type, size = data.len(), "S3: Download successful");
        Ok(StoredObject { data, content_type })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
