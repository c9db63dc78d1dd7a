//! REST client for Supabase Storage

use crate::error::{Result, ScanError};
use crate::storage::BlobStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const LIST_PAGE_SIZE: u32 = 100;

/// Storage client authenticated with the service-role key
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: Url,
    service_key: String,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

impl SupabaseStorage {
    /// Create a client for the project at `supabase_url`
    pub fn new(supabase_url: &str, service_key: &str) -> Result<Self> {
        let base_url = Url::parse(supabase_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ScanError::ConfigError(format!(
                "SUPABASE_URL is not a base URL: {}",
                supabase_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ScanError::TransferError {
                context: "Failed to build HTTP client".to_string(),
                source: e,
            })?;

        Ok(Self {
            base_url,
            service_key: service_key.to_string(),
            client,
        })
    }

    /// `{base}/storage/v1/{route...}/{bucket}/{path...}` with every segment percent-encoded
    fn object_url(&self, route: &[&str], bucket: &str, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ScanError::ConfigError(format!("Invalid storage base URL: {}", self.base_url))
            })?;
            segments.pop_if_empty().extend(["storage", "v1"]);
            segments.extend(route.iter().copied());
            segments.push(bucket);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ScanError::TransferError {
                context: format!("{} failed", action),
                source: e.without_url(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScanError::StorageError(format!(
                "{} failed with status {}: {}",
                action, status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let url = self.object_url(&["object", "sign"], bucket, path)?;
        let body = SignRequest {
            expires_in: expires_in.as_secs(),
        };

        let response = self
            .send(self.client.post(url).json(&body), "Create signed URL")
            .await?;
        let signed = response
            .json::<SignResponse>()
            .await
            .map_err(|e| ScanError::StorageError(format!("Failed to parse signed URL: {}", e)))?;

        // The API answers with a path relative to /storage/v1
        Ok(format!(
            "{}/storage/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            signed.signed_url.trim_start_matches('/')
        ))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.object_url(&["object"], bucket, path)?;
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes);

        self.send(request, "Upload").await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, folder: &str) -> Result<Vec<String>> {
        let url = self.object_url(&["object", "list"], bucket, "")?;
        let body = ListRequest {
            prefix: folder,
            limit: LIST_PAGE_SIZE,
            offset: 0,
        };

        let response = self.send(self.client.post(url).json(&body), "List").await?;
        let objects = response
            .json::<Vec<ListedObject>>()
            .await
            .map_err(|e| ScanError::StorageError(format!("Failed to parse listing: {}", e)))?;

        Ok(objects.into_iter().map(|o| o.name).collect())
    }
}
