//! Google Cloud Storage object store
//!
//! Talks to the GCS JSON API directly with synchronous HTTP (ureq).

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{ObjectNotFound, ObjectStore};
use crate::gmail::TokenProvider;

/// Object store backed by a single GCS bucket
pub struct GcsObjectStore {
    bucket: String,
    auth: Arc<dyn TokenProvider>,
}

impl GcsObjectStore {
    const API_URL: &'static str = "https://storage.googleapis.com/storage/v1";
    const UPLOAD_URL: &'static str = "https://storage.googleapis.com/upload/storage/v1";

    pub fn new(bucket: impl Into<String>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            bucket: bucket.into(),
            auth,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            Self::API_URL,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&name={}",
            Self::UPLOAD_URL,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }
}

impl ObjectStore for GcsObjectStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let access_token = self.auth.access_token()?;

        let response = ureq::get(&self.object_url(key))
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check object gs://{}/{}: {}",
                self.bucket,
                key,
                e
            )),
        }
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let access_token = self.auth.access_token()?;
        let url = format!("{}?alt=media", self.object_url(key));

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_to_vec()
                .with_context(|| format!("Failed to download gs://{}/{}", self.bucket, key)),
            Err(ureq::Error::StatusCode(404)) => Err(ObjectNotFound::new(key).into()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to download gs://{}/{}: {}",
                self.bucket,
                key,
                e
            )),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let access_token = self.auth.access_token()?;

        ureq::post(&self.upload_url(key))
            .header("Authorization", &format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .send(data)
            .with_context(|| format!("Failed to upload gs://{}/{}", self.bucket, key))?;

        Ok(())
    }
}
