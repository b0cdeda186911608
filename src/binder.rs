// src/binder.rs
use std::fmt;
use std::sync::Arc;

use ethers::types::Address;
use tracing::{error, info};

use crate::account::{AccountService, BundlerAccountService, ChainTransport, SmartAccount};
use crate::chain::ChainDescriptor;
use crate::error::{GaslessError, Result};
use crate::signer::Signer;
use crate::sponsor::{SponsorApiKey, SponsorConfig, SponsorEndpoints};

/// Signer bound to its smart account on one chain.
#[derive(Clone)]
pub struct SmartAccountSession {
    signer_address: Address,
    smart_account_address: Address,
    endpoints: SponsorEndpoints,
    chain: Arc<ChainDescriptor>,
    pub(crate) account: Arc<dyn SmartAccount>,
}

impl SmartAccountSession {
    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    pub fn smart_account_address(&self) -> Address {
        self.smart_account_address
    }

    pub fn endpoints(&self) -> &SponsorEndpoints {
        &self.endpoints
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }
}

impl fmt::Debug for SmartAccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartAccountSession")
            .field("signer_address", &self.signer_address)
            .field("smart_account_address", &self.smart_account_address)
            .field("chain_id", &self.chain.id)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

pub struct SmartAccountBinder<S = BundlerAccountService> {
    chain: Arc<ChainDescriptor>,
    sponsor: SponsorConfig,
    service: S,
}

impl SmartAccountBinder<BundlerAccountService> {
    /// Binder for the default bundler service, configured from the environment.
    pub fn from_env(chain: Arc<ChainDescriptor>) -> Self {
        Self::new(chain, SponsorConfig::from_env(), BundlerAccountService::default())
    }
}

impl<S: AccountService> SmartAccountBinder<S> {
    pub fn new(chain: Arc<ChainDescriptor>, sponsor: SponsorConfig, service: S) -> Self {
        Self {
            chain,
            sponsor,
            service,
        }
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Resolves the smart account for `signer` and returns a session that can
    /// submit sponsored operations.
    pub async fn bind_smart_account(&self, signer: Signer) -> Result<SmartAccountSession> {
        let api_key = self
            .sponsor
            .api_key
            .clone()
            .ok_or(GaslessError::MissingSponsorCredential)?;

        self.bind(signer, &api_key).await.map_err(|e| {
            error!("Error creating smart account on chain {}: {}", self.chain.id, e);
            GaslessError::binding(e)
        })
    }

    async fn bind(&self, signer: Signer, api_key: &SponsorApiKey) -> Result<SmartAccountSession> {
        let signer_address = signer.address();
        let transport = ChainTransport::new(self.chain.clone(), signer)?;
        let endpoints = self.sponsor.endpoints(self.chain.id, api_key);

        let account = self
            .service
            .create_smart_account(transport, endpoints.clone())
            .await?;
        let smart_account_address = account.account_address().await?;

        info!(
            "Bound signer {:?} to smart account {:?} on chain {}",
            signer_address, smart_account_address, self.chain.id
        );
        Ok(SmartAccountSession {
            signer_address,
            smart_account_address,
            endpoints,
            chain: self.chain.clone(),
            account,
        })
    }
}
