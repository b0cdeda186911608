// src/account.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use jsonrpsee::http_client::HttpClient;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::chain::ChainDescriptor;
use crate::client::http_provider;
use crate::error::{GaslessError, Result};
use crate::rpc::{http_client, BundlerRpcClient, PaymasterRpcClient};
use crate::signer::Signer;
use crate::sponsor::SponsorEndpoints;
use crate::types::{
    GasOverrides, SponsorContext, SponsorOptions, TransactionRequest, UserOperation,
    UserOperationReceipt,
};
use crate::user_op;

/// ERC-4337 EntryPoint v0.6.
pub const ENTRY_POINT_V06: Address = H160([
    0x5f, 0xf1, 0x37, 0xd4, 0xb0, 0xfd, 0xcd, 0x49, 0xdc, 0xa3, 0x0c, 0x7c, 0xf5, 0x7e, 0x57, 0x8a,
    0x02, 0x6d, 0x27, 0x89,
]);

/// Smart account factory deployed at the same address on every supported chain.
pub const ACCOUNT_FACTORY: Address = H160([
    0x00, 0x00, 0x00, 0xa5, 0x6a, 0xac, 0xa3, 0xe9, 0xa4, 0xc4, 0x79, 0xea, 0x6b, 0x6c, 0xd0, 0xdb,
    0xcb, 0x66, 0x34, 0xf5,
]);

/// ECDSA ownership validation module.
pub const ECDSA_OWNERSHIP_MODULE: Address = H160([
    0x00, 0x00, 0x00, 0x1c, 0x5b, 0x32, 0xf3, 0x7f, 0x5b, 0xea, 0x87, 0xbd, 0xd5, 0x37, 0x4e, 0xb2,
    0xac, 0x54, 0xea, 0x8e,
]);

const SPONSOR_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Contracts and salt that determine the smart account's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDeployment {
    pub entry_point: Address,
    pub factory: Address,
    pub ownership_module: Address,
    pub index: U256,
}

impl Default for AccountDeployment {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT_V06,
            factory: ACCOUNT_FACTORY,
            ownership_module: ECDSA_OWNERSHIP_MODULE,
            index: U256::zero(),
        }
    }
}

/// How long the bundler is polled for hashes and receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

/// Chain connection acting on behalf of one signer.
#[derive(Clone)]
pub struct ChainTransport {
    chain: Arc<ChainDescriptor>,
    provider: Provider<Http>,
    signer: Signer,
}

impl ChainTransport {
    pub fn new(chain: Arc<ChainDescriptor>, signer: Signer) -> Result<Self> {
        let provider = http_provider(&chain)?;
        Ok(Self {
            chain,
            provider,
            signer,
        })
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn account(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn provider(&self) -> &Provider<Http> {
        &self.provider
    }
}

/// Sponsor-side smart account: resolves its address and moves user
/// operations through the bundler.
#[async_trait]
pub trait SmartAccount: Send + Sync {
    /// Counterfactual address of the account; stable for the account's lifetime.
    async fn account_address(&self) -> Result<Address>;

    /// Builds, sponsors, signs and submits one user operation for `calls`.
    async fn send_user_operation(
        &self,
        calls: &[TransactionRequest],
        options: &SponsorOptions,
    ) -> Result<H256>;

    /// Transaction hash that included the operation, once known.
    async fn transaction_hash(&self, user_op_hash: H256) -> Result<Option<H256>>;

    async fn receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>>;

    fn poll_policy(&self) -> PollPolicy;
}

/// Creates smart accounts for a signer on a chain.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create_smart_account(
        &self,
        transport: ChainTransport,
        endpoints: SponsorEndpoints,
    ) -> Result<Arc<dyn SmartAccount>>;
}

/// Account service backed by an ERC-4337 bundler and a sponsoring paymaster.
#[derive(Debug, Clone, Default)]
pub struct BundlerAccountService {
    deployment: AccountDeployment,
    poll: PollPolicy,
}

impl BundlerAccountService {
    pub fn new(deployment: AccountDeployment, poll: PollPolicy) -> Self {
        Self { deployment, poll }
    }
}

#[async_trait]
impl AccountService for BundlerAccountService {
    async fn create_smart_account(
        &self,
        transport: ChainTransport,
        endpoints: SponsorEndpoints,
    ) -> Result<Arc<dyn SmartAccount>> {
        let expected = transport.chain().id;
        let actual = transport
            .provider()
            .get_chainid()
            .await
            .map_err(|e| GaslessError::EthereumProviderError(e.to_string()))?
            .as_u64();
        if actual != expected {
            return Err(GaslessError::ChainMismatch { expected, actual });
        }

        let bundler = http_client(endpoints.bundler_url(), "bundler", SPONSOR_REQUEST_TIMEOUT)?;
        let paymaster = http_client(&endpoints.paymaster_url(), "paymaster", SPONSOR_REQUEST_TIMEOUT)?;
        debug!("Connected sponsor endpoints: {}", endpoints);

        Ok(Arc::new(BundlerSmartAccount {
            transport,
            deployment: self.deployment.clone(),
            poll: self.poll,
            bundler,
            paymaster,
            address: OnceCell::new(),
        }))
    }
}

pub struct BundlerSmartAccount {
    transport: ChainTransport,
    deployment: AccountDeployment,
    poll: PollPolicy,
    bundler: HttpClient,
    paymaster: HttpClient,
    address: OnceCell<Address>,
}

impl BundlerSmartAccount {
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = ethers::types::TransactionRequest::new().to(to).data(data).into();
        self.transport
            .provider()
            .call(&tx, None)
            .await
            .map_err(|e| GaslessError::EthereumProviderError(e.to_string()))
    }

    async fn resolve_address(&self) -> Result<Address> {
        let owner = self.transport.account();
        let data = user_op::counterfactual_address_call(
            self.deployment.ownership_module,
            owner,
            self.deployment.index,
        );
        let output = self.eth_call(self.deployment.factory, data).await?;
        let address = user_op::decode_address(&output)?;
        info!("Resolved smart account {:?} for owner {:?}", address, owner);
        Ok(address)
    }

    async fn nonce(&self, sender: Address, key: U256) -> Result<U256> {
        let output = self
            .eth_call(self.deployment.entry_point, user_op::get_nonce_call(sender, key))
            .await?;
        user_op::decode_uint(&output)
    }

    async fn init_code(&self, sender: Address) -> Result<Bytes> {
        let code = self
            .transport
            .provider()
            .get_code(sender, None)
            .await
            .map_err(|e| GaslessError::EthereumProviderError(e.to_string()))?;
        if !code.is_empty() {
            return Ok(Bytes::default());
        }
        debug!("Smart account {:?} not deployed yet, attaching init code", sender);
        Ok(user_op::init_code(
            self.deployment.factory,
            self.deployment.ownership_module,
            self.transport.account(),
            self.deployment.index,
        ))
    }

    async fn fees(&self, overrides: &GasOverrides) -> Result<(U256, U256)> {
        if let (Some(max_fee), Some(priority)) =
            (overrides.max_fee_per_gas, overrides.max_priority_fee_per_gas)
        {
            return Ok((max_fee, priority));
        }
        let gas_price = self
            .transport
            .provider()
            .get_gas_price()
            .await
            .map_err(|e| GaslessError::EthereumProviderError(e.to_string()))?;
        let max_fee = overrides.max_fee_per_gas.unwrap_or(gas_price);
        let priority = match overrides.max_priority_fee_per_gas {
            Some(priority) => priority,
            None => self.priority_fee(gas_price).await,
        };
        Ok((max_fee, priority.min(max_fee)))
    }

    /// Node-suggested tip; nodes without `eth_maxPriorityFeePerGas` get the
    /// legacy gas price.
    async fn priority_fee(&self, gas_price: U256) -> U256 {
        match self
            .transport
            .provider()
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
        {
            Ok(tip) => tip,
            Err(e) => {
                debug!("eth_maxPriorityFeePerGas unavailable, using gas price: {}", e);
                gas_price
            }
        }
    }
}

fn apply_overrides(user_op: &mut UserOperation, overrides: &GasOverrides) {
    if let Some(gas) = overrides.call_gas_limit {
        user_op.call_gas_limit = gas;
    }
    if let Some(gas) = overrides.verification_gas_limit {
        user_op.verification_gas_limit = gas;
    }
    if let Some(gas) = overrides.pre_verification_gas {
        user_op.pre_verification_gas = gas;
    }
}

#[async_trait]
impl SmartAccount for BundlerSmartAccount {
    async fn account_address(&self) -> Result<Address> {
        self.address
            .get_or_try_init(|| self.resolve_address())
            .await
            .copied()
    }

    async fn send_user_operation(
        &self,
        calls: &[TransactionRequest],
        options: &SponsorOptions,
    ) -> Result<H256> {
        let sender = self.account_address().await?;
        let entry_point = self.deployment.entry_point;
        let module = self.deployment.ownership_module;

        let nonce = match options.nonce_override {
            Some(nonce) => nonce,
            None => self.nonce(sender, options.nonce_key.unwrap_or_default()).await?,
        };
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fees(&options.gas_overrides).await?;

        let mut user_op = UserOperation {
            sender,
            nonce,
            init_code: self.init_code(sender).await?,
            call_data: user_op::encode_calls(calls)?,
            call_gas_limit: U256::zero(),
            verification_gas_limit: U256::zero(),
            pre_verification_gas: U256::zero(),
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data: Bytes::default(),
            signature: user_op::dummy_signature(module),
        };

        if !options.skip_bundler_gas_estimation {
            let estimate = self
                .bundler
                .estimate_user_operation_gas(user_op.clone(), entry_point)
                .await
                .map_err(|e| GaslessError::BundlerError(format!("gas estimation failed: {}", e)))?;
            user_op.call_gas_limit = estimate.call_gas_limit;
            user_op.verification_gas_limit = estimate.verification_gas_limit;
            user_op.pre_verification_gas = estimate.pre_verification_gas;
        }
        apply_overrides(&mut user_op, &options.gas_overrides);

        let context = SponsorContext::new(&options.mode, options.skip_bundler_gas_estimation);
        let sponsored = self
            .paymaster
            .sponsor_user_operation(user_op.clone(), context)
            .await
            .map_err(|e| GaslessError::PaymasterError(e.to_string()))?;
        user_op.paymaster_and_data = sponsored.paymaster_and_data;
        if let Some(gas) = sponsored.call_gas_limit {
            user_op.call_gas_limit = gas;
        }
        if let Some(gas) = sponsored.verification_gas_limit {
            user_op.verification_gas_limit = gas;
        }
        if let Some(gas) = sponsored.pre_verification_gas {
            user_op.pre_verification_gas = gas;
        }
        // Explicit values win over anything the paymaster recalculated.
        apply_overrides(&mut user_op, &options.gas_overrides);

        let local_hash = user_op.hash(entry_point, self.transport.chain().id);
        let signature = self.transport.signer().sign_message(local_hash.as_bytes()).await?;
        user_op.signature = user_op::module_signature(&signature, module);

        let user_op_hash = self
            .bundler
            .send_user_operation(user_op, entry_point)
            .await
            .map_err(|e| GaslessError::SubmissionFailed(e.to_string()))?;
        if user_op_hash != local_hash {
            debug!(
                "Bundler hash {:?} differs from local hash {:?}",
                user_op_hash, local_hash
            );
        }
        info!("Submitted user operation {:?} from {:?}", user_op_hash, sender);
        Ok(user_op_hash)
    }

    async fn transaction_hash(&self, user_op_hash: H256) -> Result<Option<H256>> {
        let found = self
            .bundler
            .get_user_operation_by_hash(user_op_hash)
            .await
            .map_err(|e| GaslessError::BundlerError(e.to_string()))?;
        let hash = found
            .and_then(|op| op.get("transactionHash").cloned())
            .filter(|hash| !hash.is_null())
            .map(serde_json::from_value::<H256>)
            .transpose()
            .map_err(|e| GaslessError::BundlerError(format!("bad transaction hash: {}", e)))?;
        Ok(hash)
    }

    async fn receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>> {
        let raw = self
            .bundler
            .get_user_operation_receipt(user_op_hash)
            .await
            .map_err(|e| GaslessError::BundlerError(e.to_string()))?;
        raw.map(|raw| UserOperationReceipt::from_raw(user_op_hash, raw))
            .transpose()
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll
    }
}
