// src/rpc.rs
use std::time::Duration;

use ethers::types::{Address, H256};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use serde_json::Value;

use crate::error::{GaslessError, Result};
use crate::types::{GasEstimate, PaymasterResponse, SponsorContext, UserOperation};

// ERC-4337 bundler methods
#[rpc(client, namespace = "eth")]
pub trait BundlerRpc {
    #[method(name = "estimateUserOperationGas")]
    async fn estimate_user_operation_gas(
        &self,
        user_op: UserOperation,
        entry_point: Address,
    ) -> RpcResult<GasEstimate>;

    /// Returns the user operation hash once the bundler accepts it.
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(&self, user_op: UserOperation, entry_point: Address) -> RpcResult<H256>;

    #[method(name = "getUserOperationByHash")]
    async fn get_user_operation_by_hash(&self, user_op_hash: H256) -> RpcResult<Option<Value>>;

    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(&self, user_op_hash: H256) -> RpcResult<Option<Value>>;
}

// Sponsoring paymaster
#[rpc(client, namespace = "pm")]
pub trait PaymasterRpc {
    /// Requests the paymaster to sponsor a user operation
    #[method(name = "sponsorUserOperation")]
    async fn sponsor_user_operation(
        &self,
        user_op: UserOperation,
        context: SponsorContext,
    ) -> RpcResult<PaymasterResponse>;
}

/// HTTP JSON-RPC client for a sponsor endpoint. `label` is what appears in
/// errors instead of the URL, which may carry the API key.
pub fn http_client(url: &str, label: &str, timeout: Duration) -> Result<HttpClient> {
    HttpClientBuilder::default()
        .request_timeout(timeout)
        .build(url)
        .map_err(|e| GaslessError::InvalidParameters(format!("cannot build {} client: {}", label, e)))
}
