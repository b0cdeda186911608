// src/client.rs
use std::sync::Arc;

use ethers::prelude::*;
use ethers::utils::format_ether;
use tracing::{debug, warn};

use crate::chain::ChainDescriptor;
use crate::error::{GaslessError, Result};

/// Read-only connection to the chain's default RPC endpoint.
pub struct ChainClient<P = Http> {
    provider: Provider<P>,
    chain: Arc<ChainDescriptor>,
}

impl ChainClient<Http> {
    pub fn new(chain: Arc<ChainDescriptor>) -> Result<Self> {
        let provider = http_provider(&chain)?;
        Ok(Self { provider, chain })
    }
}

impl<P: JsonRpcClient> ChainClient<P> {
    pub fn with_provider(provider: Provider<P>, chain: Arc<ChainDescriptor>) -> Self {
        Self { provider, chain }
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Native balance of `address` formatted in whole-currency units.
    ///
    /// Never fails: any RPC error is logged and reported as `"0"`.
    pub async fn get_balance(&self, address: Address) -> String {
        match self.provider.get_balance(address, None).await {
            Ok(balance) => {
                debug!("Balance of {:?}: {} wei", address, balance);
                format_ether(balance)
            }
            Err(e) => {
                warn!("Error fetching balance for {:?}: {}", address, e);
                "0".to_string()
            }
        }
    }
}

/// Builds an HTTP provider for the chain's default RPC endpoint.
pub(crate) fn http_provider(chain: &ChainDescriptor) -> Result<Provider<Http>> {
    let url = chain.default_rpc_url().ok_or_else(|| {
        GaslessError::InvalidParameters(format!("chain {} has no RPC endpoint", chain.id))
    })?;
    Provider::<Http>::try_from(url)
        .map_err(|e| GaslessError::InvalidParameters(format!("invalid RPC url {}: {}", url, e)))
}
