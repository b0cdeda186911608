// src/executor.rs
use std::fmt;
use std::sync::Arc;

use ethers::types::H256;
use tracing::{debug, error, info, warn};

use crate::account::SmartAccount;
use crate::binder::SmartAccountSession;
use crate::error::{GaslessError, Result};
use crate::types::{Batch, SponsorOptions, UserOpResult};

/// Lifecycle of a submitted user operation. Only ever moves forward.
#[derive(Debug, Clone, PartialEq)]
pub enum UserOperationStatus {
    /// Accepted by the bundler, not yet included.
    Submitted,
    /// Included in the given transaction; receipt not fetched yet.
    HashKnown { transaction_hash: H256 },
    /// Terminal. `UserOpResult::success` tells success from revert.
    Confirmed(UserOpResult),
}

impl UserOperationStatus {
    fn rank(&self) -> u8 {
        match self {
            UserOperationStatus::Submitted => 0,
            UserOperationStatus::HashKnown { .. } => 1,
            UserOperationStatus::Confirmed(_) => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UserOperationStatus::Confirmed(_))
    }
}

/// Caller-owned tracker for one submitted user operation.
pub struct UserOperationHandle {
    user_op_hash: H256,
    account: Arc<dyn SmartAccount>,
    status: UserOperationStatus,
}

impl fmt::Debug for UserOperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserOperationHandle")
            .field("user_op_hash", &self.user_op_hash)
            .field("status", &self.status)
            .finish()
    }
}

impl UserOperationHandle {
    pub(crate) fn new(user_op_hash: H256, account: Arc<dyn SmartAccount>) -> Self {
        Self {
            user_op_hash,
            account,
            status: UserOperationStatus::Submitted,
        }
    }

    pub fn user_op_hash(&self) -> H256 {
        self.user_op_hash
    }

    pub fn status(&self) -> &UserOperationStatus {
        &self.status
    }

    fn advance(&mut self, next: UserOperationStatus) {
        if next.rank() > self.status.rank() {
            debug!("User operation {:?}: {:?} -> {:?}", self.user_op_hash, self.status, next);
            self.status = next;
        }
    }

    /// Waits until the bundler reports the transaction that included the
    /// operation.
    pub async fn wait_for_tx_hash(&mut self) -> Result<H256> {
        match &self.status {
            UserOperationStatus::HashKnown { transaction_hash } => return Ok(*transaction_hash),
            UserOperationStatus::Confirmed(result) => return Ok(result.hash),
            UserOperationStatus::Submitted => {}
        }

        let policy = self.account.poll_policy();
        for attempt in 1..=policy.max_attempts {
            if let Some(transaction_hash) = self.account.transaction_hash(self.user_op_hash).await? {
                self.advance(UserOperationStatus::HashKnown { transaction_hash });
                return Ok(transaction_hash);
            }
            debug!(
                "Transaction hash for {:?} not known yet (attempt {}/{})",
                self.user_op_hash, attempt, policy.max_attempts
            );
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(GaslessError::WaitTimedOut(format!(
            "transaction hash of user operation {:?}",
            self.user_op_hash
        )))
    }

    /// Waits for the receipt. Once confirmed, returns the same result on every
    /// call without asking the bundler again.
    pub async fn wait(&mut self) -> Result<UserOpResult> {
        if let UserOperationStatus::Confirmed(result) = &self.status {
            return Ok(result.clone());
        }

        let policy = self.account.poll_policy();
        for attempt in 1..=policy.max_attempts {
            if let Some(receipt) = self.account.receipt(self.user_op_hash).await? {
                self.advance(UserOperationStatus::HashKnown {
                    transaction_hash: receipt.transaction_hash,
                });
                let result = UserOpResult::from(receipt);
                if result.is_reverted() {
                    warn!("User operation {:?} reverted in {:?}", self.user_op_hash, result.hash);
                } else {
                    info!("User operation {:?} confirmed in {:?}", self.user_op_hash, result.hash);
                }
                self.advance(UserOperationStatus::Confirmed(result.clone()));
                return Ok(result);
            }
            debug!(
                "Receipt for {:?} not ready (attempt {}/{})",
                self.user_op_hash, attempt, policy.max_attempts
            );
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(GaslessError::WaitTimedOut(format!(
            "receipt of user operation {:?}",
            self.user_op_hash
        )))
    }
}

impl SmartAccountSession {
    /// Sends one or many transactions as a single sponsored user operation.
    pub async fn submit(
        &self,
        requests: impl Into<Batch>,
        options: Option<SponsorOptions>,
    ) -> Result<UserOperationHandle> {
        let batch = requests.into();
        if batch.is_empty() {
            return Err(GaslessError::InvalidTransaction("empty batch".to_string()));
        }
        let options = options.unwrap_or_default();

        debug!(
            "Submitting {} call(s) from smart account {:?}",
            batch.len(),
            self.smart_account_address()
        );
        let user_op_hash = self
            .account
            .send_user_operation(batch.calls(), &options)
            .await
            .map_err(|e| {
                error!("Failed to submit user operation: {}", e);
                e
            })?;

        Ok(UserOperationHandle::new(user_op_hash, self.account.clone()))
    }
}
