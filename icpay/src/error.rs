//! Error types for the ICPay SDK.
//!
//! Every failure surfaced by [`IcpayClient`](crate::client::IcpayClient) is an
//! [`IcpayError`]. Each variant maps to a stable machine-readable
//! [`ErrorCode`] and may carry a structured JSON details payload, so calling
//! applications can branch on failures without string matching.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::amount::TokenAmount;
use crate::ledger::{BlockIndex, LedgerQueryError, LedgerTransferError};
use crate::principal::Principal;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No signer is connected.
    WalletNotConnected,
    /// The payer does not hold enough of the requested token.
    InsufficientBalance,
    /// The ledger balance query failed.
    BalanceCheckFailed,
    /// No usable USD price exists for the requested token.
    PriceNotAvailable,
    /// The requested USD amount is zero, negative or not finite.
    InvalidUsdAmount,
    /// The requested base-unit amount is not a non-negative integer.
    InvalidAmount,
    /// The payer account could not be resolved.
    AccountInfoFetchFailed,
    /// The ledger rejected the transfer.
    TransactionFailed,
    /// The backend could not be notified of a submitted transfer.
    TransactionSyncTriggerFailed,
    /// The backend transaction status could not be fetched.
    TransactionStatusFetchFailed,
    /// Polling finished without observing a status.
    TransactionTimeout,
    /// The backend payment API could not be reached.
    NetworkError,
    /// The backend payment API answered with an error.
    ApiError,
    /// The SDK was misconfigured.
    InvalidConfig,
}

impl ErrorCode {
    /// Returns the wire representation of this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WalletNotConnected => "WALLET_NOT_CONNECTED",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::BalanceCheckFailed => "BALANCE_CHECK_FAILED",
            Self::PriceNotAvailable => "PRICE_NOT_AVAILABLE",
            Self::InvalidUsdAmount => "INVALID_USD_AMOUNT",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::AccountInfoFetchFailed => "ACCOUNT_INFO_FETCH_FAILED",
            Self::TransactionFailed => "TRANSACTION_FAILED",
            Self::TransactionSyncTriggerFailed => "TRANSACTION_SYNC_TRIGGER_FAILED",
            Self::TransactionStatusFetchFailed => "TRANSACTION_STATUS_FETCH_FAILED",
            Self::TransactionTimeout => "TRANSACTION_TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ApiError => "API_ERROR",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base error type for ICPay SDK operations.
#[derive(Debug, thiserror::Error)]
pub enum IcpayError {
    /// An operation needed the payer identity but no wallet is connected.
    #[error("Wallet is not connected")]
    WalletNotConnected,

    /// The payer's balance of the requested token is below the required amount.
    #[error("Insufficient balance on ledger {ledger_id}: required {required}, available {available}")]
    InsufficientBalance {
        /// Ledger whose balance was checked.
        ledger_id: Principal,
        /// Amount the transfer needs, in base units.
        required: TokenAmount,
        /// Amount the payer holds, in base units.
        available: TokenAmount,
    },

    /// Querying the ledger balance failed.
    #[error("Balance check failed on ledger {ledger_id}: {source}")]
    BalanceCheckFailed {
        /// Ledger that was queried.
        ledger_id: Principal,
        /// The underlying ledger error.
        #[source]
        source: LedgerQueryError,
    },

    /// No price was recorded for the ledger, or the recorded price is not positive.
    #[error("Price not available for ledger {ledger_id}")]
    PriceNotAvailable {
        /// Ledger whose price was requested.
        ledger_id: Principal,
    },

    /// The USD amount was zero, negative or not a finite number.
    #[error("Invalid USD amount: {reason}")]
    InvalidUsdAmount {
        /// Why the amount was rejected.
        reason: String,
    },

    /// The base-unit amount did not parse as a non-negative integer.
    #[error("Invalid amount {value:?}: expected a non-negative integer in base units")]
    InvalidAmount {
        /// The rejected input.
        value: String,
    },

    /// Resolving the payer account or the platform canister failed.
    #[error("Failed to fetch account info: {reason}")]
    AccountInfoFetchFailed {
        /// Why the lookup failed.
        reason: String,
    },

    /// The ledger rejected the transfer. Nothing was moved.
    #[error("Transaction failed on ledger {ledger_id}: {source}")]
    TransactionFailed {
        /// Ledger the transfer was submitted to.
        ledger_id: Principal,
        /// The ledger rejection, preserved for diagnostics.
        #[source]
        source: LedgerTransferError,
    },

    /// The backend could not be told about a submitted transfer.
    #[error("Failed to notify backend of block {block_index}: {reason}")]
    TransactionSyncTriggerFailed {
        /// Ledger block the transfer landed in.
        block_index: BlockIndex,
        /// Why the notification failed.
        reason: String,
    },

    /// The backend transaction record could not be fetched.
    #[error("Failed to fetch transaction status for {transaction_id}: {reason}")]
    TransactionStatusFetchFailed {
        /// Tracking key that was polled.
        transaction_id: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Polling ended without observing any status.
    #[error("Timed out waiting for transaction {transaction_id} after {attempts} attempts")]
    TransactionTimeout {
        /// Tracking key that was polled.
        transaction_id: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Transport failure talking to the backend payment API.
    #[error("Network error: {message}")]
    Network {
        /// Transport-level description.
        message: String,
    },

    /// The backend payment API answered with an error status or an unreadable body.
    #[error("API error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        /// HTTP status code, if one was received.
        status: Option<u16>,
        /// Error description or response body.
        message: String,
    },

    /// The SDK configuration is invalid or incomplete.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl IcpayError {
    /// Creates an [`IcpayError::InvalidUsdAmount`].
    #[must_use]
    pub fn invalid_usd_amount(reason: impl Into<String>) -> Self {
        Self::InvalidUsdAmount {
            reason: reason.into(),
        }
    }

    /// Creates an [`IcpayError::AccountInfoFetchFailed`].
    #[must_use]
    pub fn account_info(reason: impl Into<String>) -> Self {
        Self::AccountInfoFetchFailed {
            reason: reason.into(),
        }
    }

    /// Creates an [`IcpayError::InvalidConfig`].
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns the stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::WalletNotConnected => ErrorCode::WalletNotConnected,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::BalanceCheckFailed { .. } => ErrorCode::BalanceCheckFailed,
            Self::PriceNotAvailable { .. } => ErrorCode::PriceNotAvailable,
            Self::InvalidUsdAmount { .. } => ErrorCode::InvalidUsdAmount,
            Self::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            Self::AccountInfoFetchFailed { .. } => ErrorCode::AccountInfoFetchFailed,
            Self::TransactionFailed { .. } => ErrorCode::TransactionFailed,
            Self::TransactionSyncTriggerFailed { .. } => ErrorCode::TransactionSyncTriggerFailed,
            Self::TransactionStatusFetchFailed { .. } => ErrorCode::TransactionStatusFetchFailed,
            Self::TransactionTimeout { .. } => ErrorCode::TransactionTimeout,
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::Api { .. } => ErrorCode::ApiError,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
        }
    }

    /// Returns structured details for programmatic handling, if the variant has any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientBalance {
                ledger_id,
                required,
                available,
            } => Some(json!({
                "ledgerId": ledger_id,
                "required": required,
                "available": available,
            })),
            Self::BalanceCheckFailed { ledger_id, source } => Some(json!({
                "ledgerId": ledger_id,
                "error": source.to_string(),
            })),
            Self::PriceNotAvailable { ledger_id } => Some(json!({ "ledgerId": ledger_id })),
            Self::TransactionFailed { ledger_id, source } => Some(json!({
                "ledgerId": ledger_id,
                "ledgerError": source,
            })),
            Self::TransactionSyncTriggerFailed { block_index, .. } => {
                Some(json!({ "blockIndex": block_index }))
            }
            Self::TransactionStatusFetchFailed { transaction_id, .. } => {
                Some(json!({ "transactionId": transaction_id }))
            }
            Self::TransactionTimeout {
                transaction_id,
                attempts,
            } => Some(json!({
                "transactionId": transaction_id,
                "attempts": attempts,
            })),
            Self::Api {
                status: Some(status),
                ..
            } => Some(json!({ "status": status })),
            _ => None,
        }
    }

    /// Returns a serializable summary of this error, as handed to observers.
    #[must_use]
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Serializable snapshot of an [`IcpayError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
