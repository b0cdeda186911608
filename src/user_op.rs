// src/user_op.rs
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::{id, keccak256};

use crate::error::{GaslessError, Result};
use crate::types::{TransactionRequest, UserOperation};

// Smart account entry points. The suffixes give gas-cheap zero-prefixed selectors.
const EXECUTE: &str = "execute_ncC(address,uint256,bytes)";
const EXECUTE_BATCH: &str = "executeBatch_y6U(address[],uint256[],bytes[])";

const GET_NONCE: &str = "getNonce(address,uint192)";
const GET_COUNTERFACTUAL_ADDRESS: &str =
    "getAddressForCounterFactualAccount(address,bytes,uint256)";
const DEPLOY_COUNTERFACTUAL_ACCOUNT: &str = "deployCounterFactualAccount(address,bytes,uint256)";
const INIT_FOR_SMART_ACCOUNT: &str = "initForSmartAccount(address)";

// Well-formed ECDSA signature used while the operation is still being priced.
const DUMMY_ECDSA_SIGNATURE: &str = "73c3ac716c487ca34bb858247b5ccf1dc354fbaabdd089af3b2ac8e78ba85a4959a2d76250325bd67c11771c31fccda87c33ceec17cc0de912690521bb95ffcb1b";

fn call(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend_from_slice(&abi::encode(tokens));
    Bytes::from(data)
}

impl UserOperation {
    /// ERC-4337 v0.6 user operation hash, bound to the entry point and chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        let outer = abi::encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);
        H256::from(keccak256(outer))
    }
}

/// Call data for the smart account: a single `execute` or an `executeBatch`.
pub fn encode_calls(calls: &[TransactionRequest]) -> Result<Bytes> {
    match calls {
        [] => Err(GaslessError::InvalidTransaction("empty batch".to_string())),
        [single] => Ok(call(
            EXECUTE,
            &[
                Token::Address(single.to),
                Token::Uint(single.value),
                Token::Bytes(single.data_or_empty().to_vec()),
            ],
        )),
        many => {
            let targets = many.iter().map(|c| Token::Address(c.to)).collect();
            let values = many.iter().map(|c| Token::Uint(c.value)).collect();
            let data = many.iter().map(|c| Token::Bytes(c.data_or_empty().to_vec())).collect();
            Ok(call(
                EXECUTE_BATCH,
                &[Token::Array(targets), Token::Array(values), Token::Array(data)],
            ))
        }
    }
}

/// `initForSmartAccount(owner)`: setup data for the ECDSA ownership module.
pub fn module_setup_data(owner: Address) -> Bytes {
    call(INIT_FOR_SMART_ACCOUNT, &[Token::Address(owner)])
}

pub fn counterfactual_address_call(module: Address, owner: Address, index: U256) -> Bytes {
    call(
        GET_COUNTERFACTUAL_ADDRESS,
        &[
            Token::Address(module),
            Token::Bytes(module_setup_data(owner).to_vec()),
            Token::Uint(index),
        ],
    )
}

/// Factory address followed by the deployment call, as the entry point expects.
pub fn init_code(factory: Address, module: Address, owner: Address, index: U256) -> Bytes {
    let deploy = call(
        DEPLOY_COUNTERFACTUAL_ACCOUNT,
        &[
            Token::Address(module),
            Token::Bytes(module_setup_data(owner).to_vec()),
            Token::Uint(index),
        ],
    );
    let mut code = factory.as_bytes().to_vec();
    code.extend_from_slice(&deploy);
    Bytes::from(code)
}

pub fn get_nonce_call(sender: Address, key: U256) -> Bytes {
    call(GET_NONCE, &[Token::Address(sender), Token::Uint(key)])
}

/// Validation modules expect `abi.encode(signature, moduleAddress)`.
pub fn module_signature(signature: &Signature, module: Address) -> Bytes {
    Bytes::from(abi::encode(&[
        Token::Bytes(signature.to_vec()),
        Token::Address(module),
    ]))
}

pub fn dummy_signature(module: Address) -> Bytes {
    let raw = hex::decode(DUMMY_ECDSA_SIGNATURE).unwrap_or_default();
    Bytes::from(abi::encode(&[Token::Bytes(raw), Token::Address(module)]))
}

pub fn decode_address(output: &[u8]) -> Result<Address> {
    match abi::decode(&[ParamType::Address], output) {
        Ok(tokens) => match tokens.into_iter().next() {
            Some(Token::Address(address)) => Ok(address),
            _ => Err(GaslessError::EthereumProviderError("expected an address".to_string())),
        },
        Err(e) => Err(GaslessError::EthereumProviderError(format!(
            "cannot decode address: {}",
            e
        ))),
    }
}

pub fn decode_uint(output: &[u8]) -> Result<U256> {
    match abi::decode(&[ParamType::Uint(256)], output) {
        Ok(tokens) => match tokens.into_iter().next() {
            Some(Token::Uint(value)) => Ok(value),
            _ => Err(GaslessError::EthereumProviderError("expected a uint".to_string())),
        },
        Err(e) => Err(GaslessError::EthereumProviderError(format!(
            "cannot decode uint: {}",
            e
        ))),
    }
}
