// src/lib.rs
//! Sponsored ("gasless") transactions through an ERC-4337 smart account.
//!
//! A [`Signer`] obtained from an injected wallet is bound to its smart
//! account by [`SmartAccountBinder`]. The resulting [`SmartAccountSession`]
//! submits batches as one user operation whose gas is paid by the sponsor's
//! paymaster, and returns a [`UserOperationHandle`] to follow it on chain.

pub mod account;
pub mod binder;
pub mod chain;
pub mod client;
pub mod error;
pub mod executor;
pub mod rpc;
pub mod signer;
pub mod sponsor;
pub mod types;
pub mod user_op;

pub use account::{
    AccountDeployment, AccountService, BundlerAccountService, ChainTransport, PollPolicy,
    SmartAccount,
};
pub use binder::{SmartAccountBinder, SmartAccountSession};
pub use chain::ChainDescriptor;
pub use client::ChainClient;
pub use error::{GaslessError, Result};
pub use executor::{UserOperationHandle, UserOperationStatus};
pub use signer::{acquire_signer, Eip1193Wallet, LocalWalletProvider, Signer, WalletProvider};
pub use sponsor::{SponsorConfig, SponsorEndpoints};
pub use types::{Batch, GasOverrides, PaymasterMode, SponsorOptions, TransactionRequest, UserOpResult};
