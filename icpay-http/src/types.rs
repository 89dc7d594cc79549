//! Payment API response and query types.

use chrono::{DateTime, Utc};
use icpay::amount::{PriceQuote, TokenAmount};
use icpay::principal::Principal;
use icpay::tracking::TransactionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{VecSkipError, serde_as};

/// A ledger the backend accepts payments on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedLedger {
    /// Backend id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Ledger canister.
    pub canister_id: Principal,
    /// Base-unit decimals.
    pub decimals: u8,
    /// Transfer fee in base units.
    #[serde(default)]
    pub fee: Option<TokenAmount>,
    /// Logo location.
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Latest USD price.
    #[serde(default)]
    pub price: Option<f64>,
    /// When the price was recorded.
    #[serde(default)]
    pub price_updated_at: Option<DateTime<Utc>>,
}

/// Latest price of one ledger's token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPrice {
    /// Ledger canister.
    #[serde(alias = "ledgerCanisterId")]
    pub canister_id: Principal,
    /// Ticker symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// USD price, absent when none has been recorded.
    #[serde(default)]
    pub price: Option<f64>,
    /// Base-unit decimals, when the backend includes them.
    #[serde(default)]
    pub decimals: Option<u8>,
    /// When the price was recorded.
    #[serde(default, alias = "updatedAt")]
    pub price_updated_at: Option<DateTime<Utc>>,
}

impl LedgerPrice {
    /// Converts into a quote using `decimals` when the price carries none.
    #[must_use]
    pub fn into_quote(self, decimals: u8) -> PriceQuote {
        PriceQuote {
            ledger_id: self.canister_id,
            price: self.price,
            decimals: self.decimals.unwrap_or(decimals),
            recorded_at: self.price_updated_at,
        }
    }
}

/// A payment intent and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Backend id.
    pub id: String,
    /// Backend payment status, passed through as reported.
    pub status: String,
    /// Amount in base units.
    pub amount: TokenAmount,
    /// Ledger paid on.
    #[serde(default, alias = "ledgerCanisterId")]
    pub ledger_id: Option<Principal>,
    /// Linked ledger transaction.
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// Requested USD amount.
    #[serde(default)]
    pub usd_amount: Option<f64>,
    /// Caller metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One page of history.
///
/// Items that fail to decode are skipped.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
)]
pub struct Page<T> {
    /// Items on this page.
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(alias = "transactions", alias = "payments")]
    pub items: Vec<T>,
    /// Total number of items, when reported.
    #[serde(default)]
    pub total: Option<u64>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Pagination and filters for history endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Maximum items to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Items to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Restrict to one ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<Principal>,
    /// Restrict to one status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl HistoryQuery {
    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Body of the platform endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlatformInfo {
    #[serde(alias = "canisterId")]
    pub(crate) platform_canister_id: Principal,
}
