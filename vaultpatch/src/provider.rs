//! Connecting the `kv_keys` provider to a Vault server.
use anyhow::{Context, Result};
use secrecy::SecretString;
use vaultpatch_resources_kv::{KvKeysProvider, VaultClient, VaultConfig};

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct VaultOptions {
    /// The URL of the Vault server
    #[arg(long, global = true, env = "VAULT_ADDR")]
    pub address: Option<String>,

    /// The AppRole role ID to log in with
    #[arg(long, global = true, env = "VAULT_ROLE_ID", hide_env_values = true)]
    pub role_id: Option<String>,

    /// The AppRole secret ID to log in with
    #[arg(long, global = true, env = "VAULT_SECRET_ID", hide_env_values = true)]
    pub secret_id: Option<String>,
}

impl VaultOptions {
    pub(crate) fn to_config(&self) -> Result<VaultConfig> {
        let address = self
            .address
            .clone()
            .context("The Vault address is not set; pass --address or set VAULT_ADDR")?;
        let role_id = self
            .role_id
            .clone()
            .context("The AppRole role ID is not set; pass --role-id or set VAULT_ROLE_ID")?;
        let secret_id = self
            .secret_id
            .clone()
            .context("The AppRole secret ID is not set; pass --secret-id or set VAULT_SECRET_ID")?;
        Ok(VaultConfig {
            address,
            role_id: SecretString::from(role_id),
            secret_id: SecretString::from(secret_id),
            timeout: VaultConfig::DEFAULT_TIMEOUT,
        })
    }
}

/// Log in to Vault and return a provider that operates on it.
pub(crate) async fn connect(options: &VaultOptions) -> Result<KvKeysProvider<VaultClient>> {
    let config = options.to_config()?;
    let client = VaultClient::login(&config)
        .await
        .with_context(|| format!("Failed to log in to Vault at {}", config.address))?;
    Ok(KvKeysProvider::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_are_reported() {
        let options = VaultOptions {
            address: Some("http://127.0.0.1:8200".to_string()),
            role_id: None,
            secret_id: Some("s".to_string()),
        };
        let err = options.to_config().unwrap_err();
        assert!(err.to_string().contains("VAULT_ROLE_ID"));
    }

    #[test]
    fn complete_settings() {
        let options = VaultOptions {
            address: Some("http://127.0.0.1:8200".to_string()),
            role_id: Some("r".to_string()),
            secret_id: Some("s".to_string()),
        };
        let config = options.to_config().unwrap();
        assert_eq!(config.address, "http://127.0.0.1:8200");
        assert_eq!(config.timeout, VaultConfig::DEFAULT_TIMEOUT);
    }
}
