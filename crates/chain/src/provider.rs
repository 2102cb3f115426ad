//! Provider management for the node connection.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use anyhow::{Context, Result};
use tracing::info;

use crate::error::ChainReadError;

/// Provider manager for the single node endpoint the keeper talks to.
#[derive(Clone)]
pub struct ProviderManager {
    /// HTTP JSON-RPC endpoint
    url: Url,
}

impl ProviderManager {
    /// Create a provider manager and verify the node is reachable.
    pub async fn new(http_url: &str) -> Result<Self> {
        let url: Url = http_url
            .parse()
            .with_context(|| format!("Invalid node URL: {http_url}"))?;

        info!(http = %url, "Initializing provider manager");

        let manager = Self { url };

        // Test connection
        let block = manager
            .block_number()
            .await
            .context("Node unreachable at startup")?;
        info!(block = block, "Provider connection verified");

        Ok(manager)
    }

    /// Create without probing the node.
    #[cfg(test)]
    pub(crate) fn new_unchecked(url: Url) -> Self {
        Self { url }
    }

    /// Get the node URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build a read-only provider for the endpoint.
    pub fn http(&self) -> impl Provider {
        ProviderBuilder::new().on_http(self.url.clone())
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64, ChainReadError> {
        self.http()
            .get_block_number()
            .await
            .map_err(|e| ChainReadError::rpc("eth_blockNumber", e))
    }

    /// Get chain ID.
    pub async fn chain_id(&self) -> Result<u64, ChainReadError> {
        self.http()
            .get_chain_id()
            .await
            .map_err(|e| ChainReadError::rpc("eth_chainId", e))
    }

    /// Timestamp of the latest block.
    pub async fn latest_block_timestamp(&self) -> Result<u64, ChainReadError> {
        let block = self
            .http()
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainReadError::rpc("eth_getBlockByNumber", e))?
            .ok_or_else(|| ChainReadError::malformed("eth_getBlockByNumber", "no latest block"))?;
        Ok(block.header.timestamp)
    }

    /// Native balance of an account.
    pub async fn native_balance(&self, account: Address) -> Result<U256, ChainReadError> {
        self.http()
            .get_balance(account)
            .await
            .map_err(|e| ChainReadError::rpc("eth_getBalance", e))
    }
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("url", &self.url.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = ProviderManager::new("not a url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_provider_creation() {
        let provider = ProviderManager::new("https://arb1.arbitrum.io/rpc").await;
        assert!(provider.is_ok());
        assert!(provider.unwrap().chain_id().await.is_ok());
    }
}
