// tests/gasless_flow.rs
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Signature, H256, U256, U64};
use ethers::utils::id;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::{json, Value};

use gasless_account::{
    acquire_signer, AccountDeployment, BundlerAccountService, ChainClient, ChainDescriptor,
    GaslessError, LocalWalletProvider, PollPolicy, SmartAccountBinder, SponsorConfig,
    TransactionRequest, UserOperationStatus,
};
use gasless_account::account::{ECDSA_OWNERSHIP_MODULE, ENTRY_POINT_V06};
use gasless_account::types::UserOperation;

const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const SMART_ACCOUNT: Address = Address::repeat_byte(0x5a);
const USER_OP_HASH: H256 = H256([0x0a; 32]);
const TX_HASH: H256 = H256([0x0b; 32]);

#[rpc(server, namespace = "eth")]
pub trait FakeNode {
    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<U64>;

    #[method(name = "getBalance")]
    async fn get_balance(&self, address: Address, block: Option<Value>) -> RpcResult<U256>;

    #[method(name = "getCode")]
    async fn get_code(&self, address: Address, block: Option<Value>) -> RpcResult<Bytes>;

    #[method(name = "call")]
    async fn call(&self, tx: Value, block: Option<Value>) -> RpcResult<Bytes>;

    #[method(name = "gasPrice")]
    async fn gas_price(&self) -> RpcResult<U256>;

    #[method(name = "maxPriorityFeePerGas")]
    async fn max_priority_fee_per_gas(&self) -> RpcResult<U256>;

    #[method(name = "estimateUserOperationGas")]
    async fn estimate_user_operation_gas(&self, user_op: Value, entry_point: Address) -> RpcResult<Value>;

    #[method(name = "sendUserOperation")]
    async fn send_user_operation(&self, user_op: Value, entry_point: Address) -> RpcResult<H256>;

    #[method(name = "getUserOperationByHash")]
    async fn get_user_operation_by_hash(&self, hash: H256) -> RpcResult<Option<Value>>;

    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(&self, hash: H256) -> RpcResult<Option<Value>>;
}

#[rpc(server, namespace = "pm")]
pub trait FakePaymaster {
    #[method(name = "sponsorUserOperation")]
    async fn sponsor_user_operation(&self, user_op: Value, sponsor_context: Value) -> RpcResult<Value>;
}

#[derive(Default)]
struct State {
    chain_id: u64,
    balance_fails: bool,
    deny_sponsorship: bool,
    factory_calls: usize,
    estimates: usize,
    sponsored: Vec<(Value, Value)>,
    submitted: Vec<(Value, Address)>,
    hash_polls: usize,
    receipt_polls: usize,
}

#[derive(Clone)]
struct FakeSponsor {
    state: Arc<Mutex<State>>,
}

fn paymaster_and_data() -> Bytes {
    Bytes::from(vec![0xcc; 20])
}

#[async_trait]
impl FakeNodeServer for FakeSponsor {
    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(U64::from(self.state.lock().unwrap().chain_id))
    }

    async fn get_balance(&self, _address: Address, _block: Option<Value>) -> RpcResult<U256> {
        if self.state.lock().unwrap().balance_fails {
            return Err(ErrorObjectOwned::owned(-32603, "node unavailable", None::<()>).into());
        }
        Ok(U256::exp10(18) * 3)
    }

    async fn get_code(&self, _address: Address, _block: Option<Value>) -> RpcResult<Bytes> {
        Ok(Bytes::default())
    }

    async fn call(&self, tx: Value, _block: Option<Value>) -> RpcResult<Bytes> {
        let data = tx
            .get("data")
            .or_else(|| tx.get("input"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let selector = |signature: &str| format!("0x{}", hex::encode(id(signature)));

        if data.starts_with(&selector("getAddressForCounterFactualAccount(address,bytes,uint256)")) {
            self.state.lock().unwrap().factory_calls += 1;
            return Ok(Bytes::from(abi::encode(&[Token::Address(SMART_ACCOUNT)])));
        }
        if data.starts_with(&selector("getNonce(address,uint192)")) {
            return Ok(Bytes::from(abi::encode(&[Token::Uint(U256::zero())])));
        }
        Err(ErrorObjectOwned::owned(-32000, "execution reverted", None::<()>).into())
    }

    async fn gas_price(&self) -> RpcResult<U256> {
        Ok(U256::from(25_000_000_000u64))
    }

    async fn max_priority_fee_per_gas(&self) -> RpcResult<U256> {
        Ok(U256::from(1_500_000_000u64))
    }

    async fn estimate_user_operation_gas(&self, _user_op: Value, _entry_point: Address) -> RpcResult<Value> {
        self.state.lock().unwrap().estimates += 1;
        Ok(json!({
            "callGasLimit": "0x186a0",
            "verificationGasLimit": "0x30d40",
            "preVerificationGas": "0xc350"
        }))
    }

    async fn send_user_operation(&self, user_op: Value, entry_point: Address) -> RpcResult<H256> {
        self.state.lock().unwrap().submitted.push((user_op, entry_point));
        Ok(USER_OP_HASH)
    }

    async fn get_user_operation_by_hash(&self, hash: H256) -> RpcResult<Option<Value>> {
        let mut state = self.state.lock().unwrap();
        state.hash_polls += 1;
        if hash != USER_OP_HASH || state.hash_polls < 2 {
            return Ok(None);
        }
        Ok(Some(json!({ "userOperation": {}, "transactionHash": TX_HASH })))
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> RpcResult<Option<Value>> {
        let mut state = self.state.lock().unwrap();
        state.receipt_polls += 1;
        if hash != USER_OP_HASH || state.receipt_polls < 2 {
            return Ok(None);
        }
        Ok(Some(json!({
            "userOpHash": USER_OP_HASH,
            "success": false,
            "reason": "0x",
            "receipt": { "transactionHash": TX_HASH, "status": "0x1" }
        })))
    }
}

#[async_trait]
impl FakePaymasterServer for FakeSponsor {
    async fn sponsor_user_operation(&self, user_op: Value, sponsor_context: Value) -> RpcResult<Value> {
        let mut state = self.state.lock().unwrap();
        if state.deny_sponsorship {
            return Err(ErrorObjectOwned::owned(-32000, "sponsorship denied", None::<()>).into());
        }
        state.sponsored.push((user_op, sponsor_context));
        Ok(json!({ "paymasterAndData": paymaster_and_data() }))
    }
}

async fn start_fake(state: State) -> anyhow::Result<(SocketAddr, ServerHandle, Arc<Mutex<State>>)> {
    let state = Arc::new(Mutex::new(state));
    let fake = FakeSponsor { state: state.clone() };

    let mut module = FakeNodeServer::into_rpc(fake.clone());
    module.merge(FakePaymasterServer::into_rpc(fake))?;

    let server = ServerBuilder::default().build("127.0.0.1:0").await?;
    let addr = server.local_addr()?;
    let handle = server.start(module);
    Ok((addr, handle, state))
}

fn local_chain(addr: SocketAddr, id: u64) -> Arc<ChainDescriptor> {
    let mut chain = ChainDescriptor::avalanche();
    chain.id = id;
    chain.rpc_urls.default = vec![format!("http://{}", addr)];
    Arc::new(chain)
}

fn binder(addr: SocketAddr, chain: Arc<ChainDescriptor>) -> SmartAccountBinder {
    let base = format!("http://{}", addr);
    let sponsor = SponsorConfig::new(Some("KEY1".to_string())).with_base_urls(base.clone(), base);
    let service = BundlerAccountService::new(
        AccountDeployment::default(),
        PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts: 20,
        },
    );
    SmartAccountBinder::new(chain, sponsor, service)
}

async fn signer() -> gasless_account::Signer {
    let wallet = LocalWalletProvider::from_private_key(KEY).unwrap();
    acquire_signer(Some(Arc::new(wallet))).await.unwrap()
}

/// The submitted signature is `abi.encode(ownerSignature, module)` over the
/// v0.6 hash of the operation as sent.
fn assert_owner_signed(user_op: &UserOperation, owner: Address) {
    let tokens = abi::decode(&[ParamType::Bytes, ParamType::Address], &user_op.signature).unwrap();
    let (raw, module) = match tokens.as_slice() {
        [Token::Bytes(raw), Token::Address(module)] => (raw.clone(), *module),
        other => panic!("unexpected signature layout: {:?}", other),
    };
    assert_eq!(module, ECDSA_OWNERSHIP_MODULE);

    let signature = Signature::try_from(raw.as_slice()).unwrap();
    let hash = user_op.hash(ENTRY_POINT_V06, 43114);
    signature.verify(hash.as_bytes(), owner).unwrap();

    let other_chain = user_op.hash(ENTRY_POINT_V06, 1);
    assert!(signature.verify(other_chain.as_bytes(), owner).is_err());
}

#[tokio::test]
async fn sponsored_transfer_end_to_end() {
    let (addr, _server, state) = start_fake(State {
        chain_id: 43114,
        ..Default::default()
    })
    .await
    .unwrap();
    let chain = local_chain(addr, 43114);
    let binder = binder(addr, chain.clone());

    let session = binder.bind_smart_account(signer().await).await.unwrap();
    assert_eq!(session.smart_account_address(), SMART_ACCOUNT);

    let again = binder.bind_smart_account(signer().await).await.unwrap();
    assert_eq!(again.smart_account_address(), SMART_ACCOUNT);
    assert_eq!(state.lock().unwrap().factory_calls, 2);

    let transfer = TransactionRequest::parse(
        "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        "1000000000000000000",
        None,
    )
    .unwrap();
    let mut handle = session.submit(transfer, None).await.unwrap();
    assert_eq!(handle.user_op_hash(), USER_OP_HASH);
    assert_eq!(handle.status(), &UserOperationStatus::Submitted);

    {
        let state = state.lock().unwrap();
        // The session reuses the address resolved while binding.
        assert_eq!(state.factory_calls, 2);
        assert_eq!(state.estimates, 1);

        let (_, context) = &state.sponsored[0];
        assert_eq!(context["mode"], "SPONSORED");
        assert_eq!(context["calculateGasLimits"], false);

        let (user_op, entry_point) = &state.submitted[0];
        assert_eq!(*entry_point, AccountDeployment::default().entry_point);
        assert_eq!(user_op["sender"], json!(SMART_ACCOUNT));
        assert_eq!(user_op["nonce"], "0x0");
        assert_eq!(user_op["callGasLimit"], "0x186a0");
        assert_eq!(user_op["maxFeePerGas"], json!(U256::from(25_000_000_000u64)));
        assert_eq!(user_op["maxPriorityFeePerGas"], json!(U256::from(1_500_000_000u64)));
        assert_eq!(user_op["paymasterAndData"], json!(paymaster_and_data()));
        assert!(user_op["callData"].as_str().unwrap().starts_with("0x0000189a"));
        // Undeployed account: init code carries the factory address.
        assert!(user_op["initCode"]
            .as_str()
            .unwrap()
            .starts_with("0x000000a56aaca3e9a4c479ea6b6cd0dbcb6634f5"));
    }

    let owner = session.signer_address();
    let submitted = state.lock().unwrap().submitted[0].0.clone();
    let submitted: UserOperation = serde_json::from_value(submitted).unwrap();
    assert_owner_signed(&submitted, owner);

    assert_eq!(handle.wait_for_tx_hash().await.unwrap(), TX_HASH);
    let result = handle.wait().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.hash, TX_HASH);
    assert_eq!(result.receipt["receipt"]["transactionHash"], json!(TX_HASH));

    let polls = state.lock().unwrap().receipt_polls;
    assert_eq!(handle.wait().await.unwrap(), result);
    assert_eq!(state.lock().unwrap().receipt_polls, polls);
}

#[tokio::test]
async fn batch_uses_execute_batch() {
    let (addr, _server, state) = start_fake(State {
        chain_id: 43114,
        ..Default::default()
    })
    .await
    .unwrap();
    let session = binder(addr, local_chain(addr, 43114))
        .bind_smart_account(signer().await)
        .await
        .unwrap();

    let batch: Vec<TransactionRequest> = serde_json::from_value(json!([
        { "to": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "value": "1" },
        { "to": "0xcccccccccccccccccccccccccccccccccccccccc", "value": 0, "data": "0x1234" }
    ]))
    .unwrap();
    session.submit(batch, None).await.unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.submitted.len(), 1);
    assert!(state.submitted[0].0["callData"]
        .as_str()
        .unwrap()
        .starts_with("0x00004680"));
}

#[tokio::test]
async fn paymaster_refusal_fails_submission() {
    let (addr, _server, state) = start_fake(State {
        chain_id: 43114,
        deny_sponsorship: true,
        ..Default::default()
    })
    .await
    .unwrap();
    let session = binder(addr, local_chain(addr, 43114))
        .bind_smart_account(signer().await)
        .await
        .unwrap();

    let request = TransactionRequest::new(Address::repeat_byte(0xbb), U256::one());
    let err = session.submit(request, None).await.unwrap_err();

    assert!(matches!(err, GaslessError::PaymasterError(msg) if msg.contains("sponsorship denied")));
    assert!(state.lock().unwrap().submitted.is_empty());
}

#[tokio::test]
async fn wrong_chain_fails_binding() {
    let (addr, _server, _state) = start_fake(State {
        chain_id: 1,
        ..Default::default()
    })
    .await
    .unwrap();

    let err = binder(addr, local_chain(addr, 43114))
        .bind_smart_account(signer().await)
        .await
        .unwrap_err();

    match err {
        GaslessError::SmartAccountBindingFailed(cause) => assert!(matches!(
            *cause,
            GaslessError::ChainMismatch { expected: 43114, actual: 1 }
        )),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn balance_reads_and_degrades() {
    let (addr, _server, state) = start_fake(State {
        chain_id: 43114,
        ..Default::default()
    })
    .await
    .unwrap();
    let client = ChainClient::new(local_chain(addr, 43114)).unwrap();

    let balance = client.get_balance(SMART_ACCOUNT).await;
    assert!(balance.starts_with("3."), "unexpected balance {}", balance);

    state.lock().unwrap().balance_fails = true;
    assert_eq!(client.get_balance(SMART_ACCOUNT).await, "0");
}
