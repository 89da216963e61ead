use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::{
    location::Location,
    store::{DocumentStore, RemoteDocument, StoreError},
};

/// How to reach and authenticate with Vault.
#[derive(Debug)]
pub struct VaultConfig {
    /// The URL of the Vault server, e.g. `https://vault.example.com`
    pub address: String,
    pub role_id: SecretString,
    pub secret_id: SecretString,
    pub timeout: Duration,
}

impl VaultConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
}

#[derive(Debug)]
pub struct VaultClient {
    address: String,
    token: SecretString,
    http: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct ReadResponse {
    data: ReadData,
}

#[derive(serde::Deserialize)]
struct ReadData {
    /// `null` for a deleted version
    data: Option<RemoteDocument>,
}

impl VaultClient {
    /// Log in with AppRole and return a client carrying the resulting token.
    pub async fn login(config: &VaultConfig) -> Result<VaultClient, StoreError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let token = super::login(&http, &config.address, &config.role_id, &config.secret_id).await?;
        tracing::debug!(address = %config.address, "Authenticated with Vault");
        Ok(VaultClient {
            address: config.address.clone(),
            token,
            http,
        })
    }

    /// A client for an already obtained token.
    pub fn with_token(
        address: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<VaultClient, StoreError> {
        Ok(VaultClient {
            address: address.into(),
            token,
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait::async_trait]
impl DocumentStore for VaultClient {
    async fn fetch(&self, location: &Location) -> Result<Option<RemoteDocument>, StoreError> {
        let url = location.data_url(&self.address);
        tracing::trace!(%url, "GET secret");

        let response = self
            .http
            .get(url)
            .header("X-Vault-Token", self.token.expose_secret())
            .header("X-Vault-Request", "true")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ReadResponse = serde_json::from_str(&body).map_err(StoreError::Decode)?;
        Ok(Some(parsed.data.data.unwrap_or_default()))
    }

    async fn store(
        &self,
        location: &Location,
        document: &RemoteDocument,
    ) -> Result<(), StoreError> {
        let url = location.data_url(&self.address);
        tracing::trace!(%url, "POST secret");

        let response = self
            .http
            .post(url)
            .header("X-Vault-Token", self.token.expose_secret())
            .json(&json!({ "data": document }))
            .send()
            .await?;
        let status = response.status();

        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
