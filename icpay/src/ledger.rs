//! Ledger access: balance queries and transfer submission.
//!
//! The SDK does not speak the ledger's binary protocol itself. It consumes a
//! [`LedgerActor`], typically backed by an agent that already carries the
//! connected wallet's identity, and only shapes the calls made through it.
//!
//! A transfer accepted by the ledger is final. [`submit_transfer`] never
//! retries, and everything after it treats the transfer as possibly
//! succeeded.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::error::IcpayError;
use crate::principal::Principal;

/// Position of a transfer in a ledger's block log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockIndex(pub u64);

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Arguments of a ledger transfer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferArgs {
    /// Receiving identity.
    pub to: Principal,
    /// Amount in base units.
    pub amount: TokenAmount,
    /// Opaque correlation memo.
    pub memo: Vec<u8>,
    /// Explicit fee; `None` lets the ledger apply its own.
    pub fee: Option<TokenAmount>,
}

/// Rejections reported by the ledger's transfer method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LedgerTransferError {
    /// The fee does not match the ledger's fee.
    #[error("bad fee, expected {expected_fee}")]
    #[serde(rename_all = "camelCase")]
    BadFee {
        /// Fee the ledger expects.
        expected_fee: TokenAmount,
    },
    /// The ledger's own balance check failed.
    #[error("insufficient funds, balance {balance}")]
    InsufficientFunds {
        /// Balance seen by the ledger.
        balance: TokenAmount,
    },
    /// The transfer's creation time is outside the deduplication window.
    #[error("transaction too old")]
    TooOld,
    /// The transfer's creation time is ahead of the ledger clock.
    #[error("transaction created in the future (ledger time {ledger_time})")]
    #[serde(rename_all = "camelCase")]
    CreatedInFuture {
        /// The ledger's current time in nanoseconds.
        ledger_time: u64,
    },
    /// An identical transfer was already recorded.
    #[error("duplicate of block {duplicate_of}")]
    #[serde(rename_all = "camelCase")]
    Duplicate {
        /// Block holding the original transfer.
        duplicate_of: BlockIndex,
    },
    /// The ledger is not accepting transfers right now.
    #[error("ledger temporarily unavailable")]
    TemporarilyUnavailable,
    /// Any other ledger-defined error.
    #[error("ledger error {error_code}: {message}")]
    #[serde(rename_all = "camelCase")]
    GenericError {
        /// Ledger-defined code.
        error_code: u64,
        /// Ledger-defined message.
        message: String,
    },
    /// The call was rejected before reaching the ledger's logic.
    #[error("call rejected: {message}")]
    Rejected {
        /// Agent or transport description.
        message: String,
    },
}

/// Failures of the read-only balance query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerQueryError {
    /// The query did not reach the ledger or was rejected.
    #[error("query failed: {0}")]
    Transport(String),
    /// The ledger's reply could not be decoded.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Read/write access to token ledgers.
///
/// Implementations are shared across concurrent payments and must not keep
/// per-call state.
#[async_trait::async_trait]
pub trait LedgerActor: Send + Sync {
    /// Submits a transfer on `ledger` from the caller's identity.
    async fn transfer(
        &self,
        ledger: &Principal,
        args: TransferArgs,
    ) -> Result<BlockIndex, LedgerTransferError>;

    /// Returns `owner`'s balance on `ledger` in base units.
    async fn balance_of(
        &self,
        ledger: &Principal,
        owner: &Principal,
    ) -> Result<TokenAmount, LedgerQueryError>;
}

#[async_trait::async_trait]
impl<T: LedgerActor + ?Sized> LedgerActor for Arc<T> {
    async fn transfer(
        &self,
        ledger: &Principal,
        args: TransferArgs,
    ) -> Result<BlockIndex, LedgerTransferError> {
        (**self).transfer(ledger, args).await
    }

    async fn balance_of(
        &self,
        ledger: &Principal,
        owner: &Principal,
    ) -> Result<TokenAmount, LedgerQueryError> {
        (**self).balance_of(ledger, owner).await
    }
}

/// Encodes a payer account id as a transfer memo.
///
/// The memo is the minimal big-endian byte string of the id. Zero encodes as a
/// single zero byte rather than an empty memo.
#[must_use]
pub fn account_memo(account_id: u64) -> Vec<u8> {
    if account_id == 0 {
        return vec![0];
    }
    let bytes = account_id.to_be_bytes();
    let leading = (account_id.leading_zeros() / 8) as usize;
    bytes[leading..].to_vec()
}

/// Submits a transfer of `amount` to `destination`, tagged with the payer's account memo.
///
/// # Errors
///
/// Returns [`IcpayError::TransactionFailed`] carrying the ledger's rejection.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(name = "icpay.ledger.transfer", skip_all, fields(ledger_id = %ledger_id, amount = %amount), err)
)]
pub async fn submit_transfer(
    ledger: &dyn LedgerActor,
    ledger_id: &Principal,
    destination: &Principal,
    amount: TokenAmount,
    account_id: u64,
) -> Result<BlockIndex, IcpayError> {
    let args = TransferArgs {
        to: destination.clone(),
        amount,
        memo: account_memo(account_id),
        fee: None,
    };
    let block_index = ledger
        .transfer(ledger_id, args)
        .await
        .map_err(|source| IcpayError::TransactionFailed {
            ledger_id: ledger_id.clone(),
            source,
        })?;

    #[cfg(feature = "telemetry")]
    tracing::debug!(block_index = %block_index, "Ledger accepted transfer");

    Ok(block_index)
}
