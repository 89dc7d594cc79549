//! Payment requests and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::amount::{PaymentAmount, TokenAmount, UsdConversion};
use crate::ledger::BlockIndex;
use crate::principal::Principal;
use crate::tracking::{TransactionId, TransactionRecord, TransactionStatus};

/// A request to pay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Ledger to pay on.
    pub ledger_id: Principal,
    /// What to pay.
    pub amount: PaymentAmount,
    /// Payer account; looked up from the API when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_canister_id: Option<u64>,
    /// Caller data echoed on the response.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl PaymentRequest {
    /// Pays `amount` base units on `ledger_id`.
    #[must_use]
    pub fn base_units(ledger_id: Principal, amount: TokenAmount) -> Self {
        Self {
            ledger_id,
            amount: PaymentAmount::BaseUnits(amount),
            account_canister_id: None,
            metadata: Map::new(),
        }
    }

    /// Pays the equivalent of `usd_amount` dollars in the token of `ledger_id`.
    #[must_use]
    pub fn usd(ledger_id: Principal, usd_amount: f64) -> Self {
        Self {
            ledger_id,
            amount: PaymentAmount::Usd(usd_amount),
            account_canister_id: None,
            metadata: Map::new(),
        }
    }

    /// Sets the payer account.
    #[must_use]
    pub const fn with_account_canister_id(mut self, account_canister_id: u64) -> Self {
        self.account_canister_id = Some(account_canister_id);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The outcome of a submitted payment.
///
/// `Pending` means the transfer is on the ledger but the backend had not
/// settled it when the SDK stopped waiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// Backend id, or the block index when the backend was not reachable.
    pub transaction_id: TransactionId,
    /// Settlement status.
    pub status: TransactionStatus,
    /// Amount transferred, in base units.
    pub amount: TokenAmount,
    /// Ledger the transfer was made on.
    pub ledger_id: Principal,
    /// Recipient of the transfer.
    pub to: Principal,
    /// Ledger block holding the transfer.
    pub block_index: BlockIndex,
    /// When the transfer was recorded.
    pub timestamp: DateTime<Utc>,
    /// Failure reason reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Conversion details for USD payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd: Option<UsdConversion>,
    /// Metadata from the request.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Status of an existing transaction, as reported by [`await_transaction`].
///
/// [`await_transaction`]: crate::client::IcpayClient::await_transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusReport {
    /// The id that was tracked.
    pub transaction_id: TransactionId,
    /// Status when tracking stopped.
    pub status: TransactionStatus,
    /// The backend record, when one was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<TransactionRecord>,
}
