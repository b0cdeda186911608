// src/types.rs
use std::str::FromStr;

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{GaslessError, Result};

/// ERC-4337 v0.6 user operation as sent to the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Second parameter of `pm_sponsorUserOperation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorContext {
    pub mode: String,
    pub calculate_gas_limits: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_token_address: Option<Address>,
}

impl SponsorContext {
    pub fn new(mode: &PaymasterMode, calculate_gas_limits: bool) -> Self {
        let (mode, fee_token_address) = match mode {
            PaymasterMode::Sponsored => ("SPONSORED", None),
            PaymasterMode::Erc20 { fee_token } => ("ERC20", Some(*fee_token)),
        };
        Self {
            mode: mode.to_string(),
            calculate_gas_limits,
            fee_token_address,
        }
    }
}

/// Paymaster answer: the signed `paymasterAndData` plus any gas limits the
/// paymaster recalculated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    pub paymaster_and_data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_verification_gas: Option<U256>,
}

/// Result of `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

/// One call executed by the smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: Address,
    #[serde(deserialize_with = "deserialize_value")]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl TransactionRequest {
    pub fn new(to: Address, value: U256) -> Self {
        Self { to, value, data: None }
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Builds a request from user-supplied strings. `value` is a decimal or
    /// `0x` hex amount in the native currency's smallest unit.
    pub fn parse(to: &str, value: &str, data: Option<&str>) -> Result<Self> {
        let to = Address::from_str(to.trim())
            .map_err(|e| GaslessError::InvalidTransaction(format!("invalid recipient {}: {}", to, e)))?;
        let value = parse_amount(value)?;
        let data = data.map(parse_hex_data).transpose()?;
        Ok(Self { to, value, data })
    }

    pub fn data_or_empty(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }
}

/// Parses a non-negative integer amount, rejecting signs, fractions and junk.
pub fn parse_amount(value: &str) -> Result<U256> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(GaslessError::InvalidTransaction(format!(
            "value must be non-negative, got {}",
            value
        )));
    }
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex_digits) if !hex_digits.is_empty() => U256::from_str_radix(hex_digits, 16).ok(),
        Some(_) => None,
        None if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
            U256::from_dec_str(value).ok()
        }
        None => None,
    };
    parsed.ok_or_else(|| {
        GaslessError::InvalidTransaction(format!("value is not a non-negative integer: {:?}", value))
    })
}

fn parse_hex_data(data: &str) -> Result<Bytes> {
    let data = data.trim();
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| GaslessError::InvalidTransaction(format!("invalid call data: {}", e)))
}

fn deserialize_value<'de, D>(deserializer: D) -> std::result::Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Text(String),
        Number(serde_json::Number),
    }

    let amount = match RawAmount::deserialize(deserializer)? {
        RawAmount::Text(text) => parse_amount(&text),
        RawAmount::Number(number) => match number.as_u64() {
            Some(n) => Ok(U256::from(n)),
            None => Err(GaslessError::InvalidTransaction(format!(
                "value must be a non-negative integer, got {}",
                number
            ))),
        },
    };
    amount.map_err(serde::de::Error::custom)
}

/// One or more calls submitted as a single user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch(Vec<TransactionRequest>);

impl Batch {
    pub fn calls(&self) -> &[TransactionRequest] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<TransactionRequest> for Batch {
    fn from(request: TransactionRequest) -> Self {
        Batch(vec![request])
    }
}

impl From<Vec<TransactionRequest>> for Batch {
    fn from(requests: Vec<TransactionRequest>) -> Self {
        Batch(requests)
    }
}

impl From<&[TransactionRequest]> for Batch {
    fn from(requests: &[TransactionRequest]) -> Self {
        Batch(requests.to_vec())
    }
}

/// How the paymaster pays for the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaymasterMode {
    #[default]
    Sponsored,
    /// Gas is paid in an ERC-20 token the paymaster accepts.
    Erc20 { fee_token: Address },
}

/// Explicit gas values that take precedence over estimates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasOverrides {
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// Options for building a sponsored user operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SponsorOptions {
    pub mode: PaymasterMode,
    /// EntryPoint nonce key (2D nonces). Defaults to key 0.
    pub nonce_key: Option<U256>,
    /// Use this nonce instead of asking the EntryPoint.
    pub nonce_override: Option<U256>,
    pub gas_overrides: GasOverrides,
    /// Trust the paymaster's gas limits instead of asking the bundler.
    pub skip_bundler_gas_estimation: bool,
}

/// Receipt reported by `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub transaction_hash: H256,
    pub success: bool,
    pub raw: Value,
}

impl UserOperationReceipt {
    pub fn from_raw(user_op_hash: H256, raw: Value) -> Result<Self> {
        let success = raw
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| GaslessError::BundlerError("receipt has no success flag".to_string()))?;
        let transaction_hash = raw
            .get("receipt")
            .and_then(|receipt| receipt.get("transactionHash"))
            .cloned()
            .ok_or_else(|| GaslessError::BundlerError("receipt has no transaction hash".to_string()))
            .and_then(|hash| {
                serde_json::from_value::<H256>(hash)
                    .map_err(|e| GaslessError::BundlerError(format!("bad transaction hash: {}", e)))
            })?;

        Ok(Self {
            user_op_hash,
            transaction_hash,
            success,
            raw,
        })
    }
}

/// Terminal outcome of a user operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOpResult {
    /// On-chain transaction hash.
    pub hash: H256,
    pub receipt: Value,
    pub success: bool,
}

impl UserOpResult {
    pub fn is_reverted(&self) -> bool {
        !self.success
    }
}

impl From<UserOperationReceipt> for UserOpResult {
    fn from(receipt: UserOperationReceipt) -> Self {
        Self {
            hash: receipt.transaction_hash,
            receipt: receipt.raw,
            success: receipt.success,
        }
    }
}
