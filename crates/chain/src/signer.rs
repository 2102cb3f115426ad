//! Transaction signing and submission for keeper calls.
//!
//! One [`TransactionSender`] owns the keeper account. Nonces are tracked
//! locally and resynced from the node after any failed submission, so only
//! one sender per account may exist in a process. A broadcast transaction
//! whose receipt is lost is reported as unconfirmed and never resent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::gas::{GasParams, GasStrategy, LegacyGasStrategy};
use crate::provider::ProviderManager;

/// Gas limit used when `ethOptions.gasLimit` is not set.
pub const DEFAULT_KEEPER_GAS_LIMIT: u64 = 1_500_000;

/// Local nonce counter for the keeper account.
#[derive(Debug)]
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Take the next nonce.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Force the chain's value (after a failed submission).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Which transaction count to resync the nonce from.
#[derive(Debug, Clone, Copy)]
enum BlockTag {
    /// Mined transactions only
    Latest,
    /// Includes transactions still in the node's pool
    Pending,
}

/// What a confirmed transaction cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSummary {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl TxSummary {
    /// Native currency spent on gas, in wei.
    pub fn gas_spent(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

/// Builder for [`TransactionSender`].
pub struct TransactionSenderBuilder {
    provider: Arc<ProviderManager>,
    gas_strategy: Option<Box<dyn GasStrategy>>,
    gas_limit: Option<u64>,
}

impl TransactionSenderBuilder {
    pub fn new(provider: Arc<ProviderManager>) -> Self {
        Self {
            provider,
            gas_strategy: None,
            gas_limit: None,
        }
    }

    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// Parse the key, fetch chain id and starting nonce.
    pub async fn build(self, private_key: &str) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("PRIVATE_KEY is not a valid secp256k1 key")?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let chain_id = self.provider.chain_id().await?;
        let initial_nonce = self
            .provider
            .http()
            .get_transaction_count(address)
            .await
            .context("Failed to fetch keeper account nonce")?;

        let gas_strategy = self
            .gas_strategy
            .unwrap_or_else(|| Box::new(LegacyGasStrategy::new(1_000_000_000, 100_000_000_000)));

        info!(
            address = %address,
            chain_id = chain_id,
            initial_nonce = initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            provider: self.provider,
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_limit: self.gas_limit.unwrap_or(DEFAULT_KEEPER_GAS_LIMIT),
            gas_strategy,
            last_gas_params: RwLock::new(None),
        })
    }
}

/// Signs and submits keeper transactions, waiting for each receipt.
pub struct TransactionSender {
    provider: Arc<ProviderManager>,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    gas_limit: u64,
    gas_strategy: Box<dyn GasStrategy>,
    last_gas_params: RwLock<Option<GasParams>>,
}

impl TransactionSender {
    /// The keeper account.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn gas_strategy_name(&self) -> &'static str {
        self.gas_strategy.strategy_name()
    }

    /// Sign, submit and wait for the receipt of a call to `to`.
    ///
    /// A receipt with failed status becomes [`ExecutionError::Reverted`].
    /// Submission errors are classified by
    /// [`ExecutionError::from_submission`]. Once broadcast, a failed receipt
    /// wait becomes [`ExecutionError::Unconfirmed`].
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<TxSummary, ExecutionError> {
        let started = Instant::now();

        let gas_params = match self.gas_strategy.fetch_params(&self.provider).await {
            Ok(params) => {
                *self.last_gas_params.write() = Some(params.clone());
                params
            }
            Err(e) => {
                let cached = self.last_gas_params.read().clone();
                match cached {
                    Some(params) => {
                        warn!(error = %e, "Gas price fetch failed, reusing last known params");
                        params
                    }
                    None => return Err(e.into()),
                }
            }
        };

        let nonce = self.nonce_manager.next();
        let mut tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_chain_id(self.chain_id);
        self.gas_strategy.apply_gas(&mut tx, &gas_params);

        debug!(
            to = %to,
            nonce = nonce,
            gas_limit = self.gas_limit,
            gas_price = gas_params.effective_gas_price(),
            "Sending transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.provider.url().clone());

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce(BlockTag::Latest).await;
                return Err(ExecutionError::from_submission(e.to_string()));
            }
        };
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, nonce = nonce, "Transaction submitted");

        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                // pending count still includes the tx while the node holds it
                self.sync_nonce(BlockTag::Pending).await;
                warn!(tx_hash = %tx_hash, nonce = nonce, error = %e, "Receipt unavailable");
                return Err(ExecutionError::Unconfirmed {
                    tx_hash,
                    reason: e.to_string(),
                });
            }
        };

        if !receipt.status() {
            warn!(
                tx_hash = %tx_hash,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Transaction reverted"
            );
            return Err(ExecutionError::Reverted {
                tx_hash: Some(tx_hash),
                context: format!("mined revert in {tx_hash}"),
            });
        }

        let summary = TxSummary {
            tx_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        };

        info!(
            tx_hash = %tx_hash,
            block = summary.block_number,
            gas_used = summary.gas_used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transaction confirmed"
        );

        Ok(summary)
    }

    /// Reload the nonce from the node at `tag`.
    async fn sync_nonce(&self, tag: BlockTag) {
        let http = self.provider.http();
        let count = http.get_transaction_count(self.address);
        let count = match tag {
            BlockTag::Latest => count.latest(),
            BlockTag::Pending => count.pending(),
        };
        match count.await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, ?tag, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_limit", &self.gas_limit)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}
