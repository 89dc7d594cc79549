//! Balance resolution for the connected identity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::error::IcpayError;
use crate::ledger::LedgerActor;
use crate::principal::Principal;

/// Point-in-time balances of one identity, keyed by ledger.
///
/// Snapshots are never cached: a transfer always checks a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    /// Identity the balances belong to.
    pub owner: Principal,
    /// Base-unit balance per ledger.
    pub balances: BTreeMap<Principal, TokenAmount>,
    /// When the balances were read.
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Returns the balance held on `ledger_id`, if it was queried.
    #[must_use]
    pub fn get(&self, ledger_id: &Principal) -> Option<TokenAmount> {
        self.balances.get(ledger_id).copied()
    }

    /// Checks that `ledger_id` holds at least `required`.
    ///
    /// A ledger missing from the snapshot counts as a zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`IcpayError::InsufficientBalance`] when the balance is short.
    pub fn ensure_covers(&self, ledger_id: &Principal, required: TokenAmount) -> Result<(), IcpayError> {
        let available = self.get(ledger_id).unwrap_or(TokenAmount::ZERO);
        if available < required {
            return Err(IcpayError::InsufficientBalance {
                ledger_id: ledger_id.clone(),
                required,
                available,
            });
        }
        Ok(())
    }
}

/// Reads `owner`'s balances on each of `ledger_ids`.
///
/// Queries run one after another; any failure aborts the snapshot.
///
/// # Errors
///
/// Returns [`IcpayError::BalanceCheckFailed`] naming the ledger whose query
/// failed. A failed query is never reported as a zero balance.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(name = "icpay.balance.fetch", skip_all, fields(owner = %owner), err)
)]
pub async fn fetch_balances(
    ledger: &dyn LedgerActor,
    owner: &Principal,
    ledger_ids: &[Principal],
) -> Result<BalanceSnapshot, IcpayError> {
    let mut balances = BTreeMap::new();
    for ledger_id in ledger_ids {
        let balance = ledger
            .balance_of(ledger_id, owner)
            .await
            .map_err(|source| IcpayError::BalanceCheckFailed {
                ledger_id: ledger_id.clone(),
                source,
            })?;
        balances.insert(ledger_id.clone(), balance);
    }
    Ok(BalanceSnapshot {
        owner: owner.clone(),
        balances,
        fetched_at: Utc::now(),
    })
}
