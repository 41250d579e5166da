use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

pub const META_USER_ID: &str = "userid";
pub const META_ORIGINAL_FILENAME: &str = "originalfilename";
pub const META_UPLOADED_AT: &str = "uploadedat";

/// A single object as seen by a listing: key, size, timestamps and the
/// per-object metadata written at upload time.
#[derive(Debug, Clone)]
pub struct BlobObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl BlobObject {
    /// Metadata lookup, case-insensitive on the key. S3-compatible
    /// stores fold metadata names to lowercase on the wire.
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn object_exists(&self, key: &str) -> Result<bool>;
    /// Enumerate every object in the bucket, following pagination
    /// until the provider reports no more pages.
    async fn list_all(&self) -> Result<Vec<BlobObject>>;
}

pub struct S3BlobStorage {
    client: Client,
    bucket: String,
}

impl S3BlobStorage {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<BlobObject>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token.clone())
                .send()
                .await?;

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };

                // The listing carries no metadata; one HEAD per object
                // fetches content type and the upload-time tags.
                let head = self
                    .client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await?;

                let last_modified = obj
                    .last_modified()
                    .and_then(|t| Utc.timestamp_opt(t.secs(), t.subsec_nanos()).single())
                    .unwrap_or_else(Utc::now);

                objects.push(BlobObject {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified,
                    content_type: head.content_type().map(|s| s.to_string()),
                    metadata: head.metadata().cloned().unwrap_or_default(),
                });
            }

            continuation_token = response
                .next_continuation_token()
                .map(|t| t.to_string())
                .filter(|_| response.is_truncated().unwrap_or(false));

            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }
}

/// In-memory blob store used by tests and storage-less local runs.
#[derive(Default)]
pub struct MemoryBlobStorage {
    objects: std::sync::Mutex<HashMap<String, BlobObject>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing `put_object`, e.g. to mimic
    /// blobs written by an external tool.
    pub fn insert_raw(&self, object: BlobObject) {
        self.objects
            .lock()
            .unwrap()
            .insert(object.key.clone(), object);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            BlobObject {
                key: key.to_string(),
                size: data.len() as i64,
                last_modified: Utc::now(),
                content_type: Some(content_type.to_string()),
                metadata,
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn list_all(&self) -> Result<Vec<BlobObject>> {
        let mut objects: Vec<BlobObject> =
            self.objects.lock().unwrap().values().cloned().collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryBlobStorage::new();
        let mut meta = HashMap::new();
        meta.insert(META_USER_ID.to_string(), "user_1".to_string());

        storage
            .put_object("abc.jpeg", vec![1, 2, 3], "image/jpeg", meta)
            .await
            .unwrap();

        assert!(storage.object_exists("abc.jpeg").await.unwrap());
        let listed = storage.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 3);
        assert_eq!(listed[0].meta("userId"), Some("user_1"));

        storage.delete_object("abc.jpeg").await.unwrap();
        assert!(!storage.object_exists("abc.jpeg").await.unwrap());
    }

    #[test]
    fn test_meta_lookup_is_case_insensitive() {
        let mut metadata = HashMap::new();
        metadata.insert("originalFilename".to_string(), "cat.png".to_string());
        let obj = BlobObject {
            key: "k".to_string(),
            size: 0,
            last_modified: Utc::now(),
            content_type: None,
            metadata,
        };
        assert_eq!(obj.meta("originalfilename"), Some("cat.png"));
        assert_eq!(obj.meta("ORIGINALFILENAME"), Some("cat.png"));
        assert_eq!(obj.meta("missing"), None);
    }
}
