// src/signer.rs
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Provider, ProviderError, RpcError};
use ethers::signers::{LocalWallet, Signer as EthersSigner};
use ethers::types::{Address, Bytes, Signature};
use tracing::{debug, info, warn};

use crate::error::{GaslessError, Result};

/// EIP-1193 error code for a request the user declined.
pub const USER_REJECTED_CODE: i64 = 4001;

/// An injected wallet: something that can grant account access and sign
/// on behalf of the accounts it authorized.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet for account access (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// EIP-191 `personal_sign` of `message` by `account`.
    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature>;
}

/// Signing capability bound to one EOA.
#[derive(Clone)]
pub struct Signer {
    address: Address,
    provider: Arc<dyn WalletProvider>,
}

impl Signer {
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.provider.sign_message(self.address, message).await
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("address", &self.address).finish()
    }
}

/// Requests account access from the injected wallet and binds the first
/// authorized account.
pub async fn acquire_signer(provider: Option<Arc<dyn WalletProvider>>) -> Result<Signer> {
    let provider = provider.ok_or(GaslessError::ProviderUnavailable)?;

    let accounts = provider.request_accounts().await?;
    let address = *accounts
        .first()
        .ok_or_else(|| GaslessError::UserRejected("wallet authorized no accounts".to_string()))?;

    info!("Acquired signer for {:?}", address);
    Ok(Signer { address, provider })
}

/// Wallet backed by a locally held private key.
pub struct LocalWalletProvider {
    wallet: LocalWallet,
}

impl LocalWalletProvider {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| GaslessError::WalletProviderError(format!("invalid private key: {}", e)))?;
        Ok(Self::new(wallet))
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(vec![self.wallet.address()])
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature> {
        if account != self.wallet.address() {
            return Err(GaslessError::WalletProviderError(format!(
                "account {:?} is not managed by this wallet",
                account
            )));
        }
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| GaslessError::WalletProviderError(e.to_string()))
    }
}

/// Wallet reached over JSON-RPC, speaking the EIP-1193 request methods.
pub struct Eip1193Wallet<P = Http> {
    provider: Provider<P>,
}

impl Eip1193Wallet<Http> {
    pub fn connect(url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| GaslessError::InvalidParameters(format!("invalid wallet url: {}", e)))?;
        Ok(Self::new(provider))
    }
}

impl<P: JsonRpcClient> Eip1193Wallet<P> {
    pub fn new(provider: Provider<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> WalletProvider for Eip1193Wallet<P> {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        debug!("Requesting account access from wallet");
        self.provider
            .request::<_, Vec<Address>>("eth_requestAccounts", ())
            .await
            .map_err(wallet_error)
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature> {
        let signature: Bytes = self
            .provider
            .request("personal_sign", (Bytes::from(message.to_vec()), account))
            .await
            .map_err(wallet_error)?;

        Signature::try_from(signature.as_ref())
            .map_err(|e| GaslessError::WalletProviderError(format!("malformed signature: {}", e)))
    }
}

fn wallet_error(err: ProviderError) -> GaslessError {
    match err.as_error_response() {
        Some(response) if response.code == USER_REJECTED_CODE => {
            warn!("Wallet request rejected by user: {}", response.message);
            GaslessError::UserRejected(response.message.clone())
        }
        _ => GaslessError::WalletProviderError(err.to_string()),
    }
}
