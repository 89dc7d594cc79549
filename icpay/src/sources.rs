//! Backend metadata consumed by the payment pipeline.
//!
//! The pipeline needs two things from the backend payment API besides the
//! tracker: who the payer account is (and where payments go), and what a
//! token costs. Both are behind traits so the HTTP client lives in its own
//! crate and tests can use fixed values.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::amount::PriceQuote;
use crate::error::IcpayError;
use crate::principal::Principal;

/// The payer account as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Backend account id.
    pub id: String,
    /// Numeric account id used in transfer memos.
    pub account_canister_id: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the account takes live payments.
    #[serde(default)]
    pub is_live: bool,
    /// Whether the account is enabled.
    #[serde(default = "enabled")]
    pub is_active: bool,
}

const fn enabled() -> bool {
    true
}

/// Resolves the payer account and the payment destination.
#[async_trait::async_trait]
pub trait AccountSource: Send + Sync {
    /// Fetches the account behind the configured credentials.
    async fn account_info(&self) -> Result<AccountInfo, IcpayError>;

    /// Fetches the identity transfers are sent to.
    async fn platform_canister_id(&self) -> Result<Principal, IcpayError>;
}

/// Looks up USD prices.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns the latest quote for `ledger_id`.
    ///
    /// A quote without a price is a valid answer; the caller decides what a
    /// missing price means.
    async fn price_quote(&self, ledger_id: &Principal) -> Result<PriceQuote, IcpayError>;
}

#[async_trait::async_trait]
impl<T: AccountSource + ?Sized> AccountSource for Arc<T> {
    async fn account_info(&self) -> Result<AccountInfo, IcpayError> {
        (**self).account_info().await
    }

    async fn platform_canister_id(&self) -> Result<Principal, IcpayError> {
        (**self).platform_canister_id().await
    }
}

#[async_trait::async_trait]
impl<T: PriceSource + ?Sized> PriceSource for Arc<T> {
    async fn price_quote(&self, ledger_id: &Principal) -> Result<PriceQuote, IcpayError> {
        (**self).price_quote(ledger_id).await
    }
}
