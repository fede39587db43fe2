// service/document_storage.rs
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{config::Config, service::error::ServiceError};

const DEPENDENCY: &str = "document storage";

/// Opaque blob store for verification uploads. Only the returned URL is
/// persisted.
#[async_trait]
pub trait DocumentStorage: Send + Sync + std::fmt::Debug {
    async fn store(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, ServiceError>;
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Hex sha256 of a document's bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Deserialize)]
struct StoredObject {
    url: String,
}

#[derive(Debug, Clone)]
pub struct HttpDocumentStorage {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
}

impl HttpDocumentStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: config.storage_api_url.clone(),
            api_key: config.storage_api_key.clone(),
        }
    }
}

#[async_trait]
impl DocumentStorage for HttpDocumentStorage {
    async fn store(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(&self.upload_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::dependency(
                DEPENDENCY,
                format!("upload answered {}", response.status()),
            ));
        }

        let stored: StoredObject = response
            .json()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        Ok(stored.url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::dependency(
                DEPENDENCY,
                format!("fetch answered {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
