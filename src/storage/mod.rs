//! Object storage client
//!
//! Thin wrapper over the Supabase storage REST API. Only the two calls the
//! API needs are implemented: signing a download URL and removing objects.

use crate::config::StorageConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

pub const VEHICLE_DOCUMENTS_BUCKET: &str = "vehicle-documents";
pub const EQUIPMENT_DOCUMENTS_BUCKET: &str = "equipment-documents";

/// Supabase storage client sharing one connection pool
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }

    fn object_url(&self, action: &str, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}/{}",
            self.base_url,
            action,
            bucket,
            path.trim_start_matches('/')
        )
    }

    /// Absolute URL that grants read access for `expires_in` seconds
    pub async fn create_signed_url(&self, bucket: &str, path: &str, expires_in: u64) -> Result<String> {
        let response = self
            .http
            .post(self.object_url("sign", bucket, path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "expiresIn": expires_in }))
            .send()
            .await
            .context("storage sign request failed")?
            .error_for_status()
            .context("storage refused to sign object")?;

        let body: SignedUrlResponse = response.json().await?;
        Ok(self.absolute(&body.signed_url))
    }

    /// Remove objects from a bucket
    pub async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        self.http
            .delete(format!("{}/storage/v1/object/{}", self.base_url, bucket))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .context("storage delete request failed")?
            .error_for_status()
            .context("storage refused to delete objects")?;
        Ok(())
    }

    /// Signed paths come back relative to `/storage/v1`
    fn absolute(&self, signed_path: &str) -> String {
        if signed_path.starts_with("http") {
            signed_path.to_string()
        } else {
            format!("{}/storage/v1{}", self.base_url, signed_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StorageClient {
        StorageClient::new(&StorageConfig {
            supabase_url: "https://demo.supabase.co/".into(),
            service_key: "key".into(),
        })
    }

    #[test]
    fn object_url_joins_bucket_and_path() {
        assert_eq!(
            client().object_url("sign", "documents", "/p1/plan.pdf"),
            "https://demo.supabase.co/storage/v1/object/sign/documents/p1/plan.pdf"
        );
    }

    #[test]
    fn relative_signed_paths_are_made_absolute() {
        assert_eq!(
            client().absolute("/object/sign/documents/a.pdf?token=x"),
            "https://demo.supabase.co/storage/v1/object/sign/documents/a.pdf?token=x"
        );
        assert_eq!(client().absolute("https://cdn/x"), "https://cdn/x");
    }
}
