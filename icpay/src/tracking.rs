//! The backend ledger-tracking service.
//!
//! After a transfer lands on the ledger, the backend is told about its block
//! index ([`TransactionTracker::notify_transfer`]) and creates a transaction
//! record that it updates as it observes the ledger. The SDK only reads those
//! records; their status is collapsed into a [`TransactionStatus`] by
//! [`BackendStatus::normalize`], the single place that interprets backend
//! status encodings.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_with::{VecSkipError, serde_as};

use crate::amount::TokenAmount;
use crate::error::IcpayError;
use crate::ledger::BlockIndex;
use crate::principal::Principal;

/// Backend-assigned transaction identifier.
///
/// The backend may emit ids as JSON numbers or strings; both deserialize to
/// the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wraps a textual id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the textual id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) if n.is_u64() => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "transaction id must be a string or unsigned integer, got {other}"
            ))),
        }
    }
}

/// What the poller follows: the backend id, or the raw block index when the
/// backend could not be notified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TrackingKey {
    /// A backend transaction id.
    Transaction(TransactionId),
    /// A ledger block index standing in for the backend id.
    Block(BlockIndex),
}

impl TrackingKey {
    /// The id passed to [`TransactionTracker::get_transaction`].
    #[must_use]
    pub fn lookup_id(&self) -> TransactionId {
        match self {
            Self::Transaction(id) => id.clone(),
            Self::Block(block) => TransactionId::from(block.0),
        }
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(id) => write!(f, "{id}"),
            Self::Block(block) => write!(f, "block:{block}"),
        }
    }
}

/// Status of a payment as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Submitted; the backend has not settled it yet.
    Pending,
    /// Settled successfully.
    Completed,
    /// Settled as failed.
    Failed,
}

impl TransactionStatus {
    /// Whether no further change is expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Status as stored by the backend.
///
/// The backend encodes statuses as variants: an object whose only key names
/// the state (`{"Completed": null}`, `{"Failed": "reason"}`). Plain strings
/// (`"completed"`) are accepted too. Anything else is kept verbatim as
/// [`BackendStatus::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    /// Awaiting ledger confirmation.
    Pending,
    /// The backend has processed the transfer.
    Processed,
    /// Funds were received, settlement is outstanding.
    Received,
    /// Fully settled.
    Completed,
    /// Settlement failed.
    Failed {
        /// Backend-supplied reason, if any.
        reason: Option<String>,
    },
    /// A status this SDK version does not know.
    Unrecognized(String),
}

impl BackendStatus {
    /// Collapses the backend status into the caller-facing status.
    ///
    /// Only `Completed` and `Failed` are terminal. Everything else, including
    /// statuses this SDK does not recognize, is `Pending`: the transfer is
    /// known to be on the ledger, so an unknown status never means failure.
    #[must_use]
    pub const fn normalize(&self) -> TransactionStatus {
        match self {
            Self::Completed => TransactionStatus::Completed,
            Self::Failed { .. } => TransactionStatus::Failed,
            Self::Pending | Self::Processed | Self::Received | Self::Unrecognized(_) => {
                TransactionStatus::Pending
            }
        }
    }

    /// The failure reason, for failed statuses.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason } => reason.as_deref(),
            _ => None,
        }
    }

    fn from_tag(tag: &str, payload: &Value) -> Option<Self> {
        let status = match tag.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processed" => Self::Processed,
            "received" => Self::Received,
            "completed" => Self::Completed,
            "failed" => Self::Failed {
                reason: match payload {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    _ => None,
                },
            },
            _ => return None,
        };
        Some(status)
    }

    /// Interprets a raw JSON status value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let parsed = match value {
            Value::String(tag) => Self::from_tag(tag, &Value::Null),
            Value::Object(map) if map.len() == 1 => map
                .iter()
                .next()
                .and_then(|(tag, payload)| Self::from_tag(tag, payload)),
            _ => None,
        };
        parsed.unwrap_or_else(|| Self::Unrecognized(value.to_string()))
    }

    fn tag(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Processed => "Processed",
            Self::Received => "Received",
            Self::Completed => "Completed",
            Self::Failed { .. } => "Failed",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl Serialize for BackendStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        if let Self::Unrecognized(raw) = self {
            return serializer.serialize_str(raw);
        }
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Failed {
                reason: Some(reason),
            } => map.serialize_entry(self.tag(), reason)?,
            _ => map.serialize_entry(self.tag(), &())?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BackendStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// A transaction record held by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Backend id.
    pub id: TransactionId,
    /// Backend status, absent while the backend is still indexing.
    #[serde(default)]
    pub status: Option<BackendStatus>,
    /// Amount in base units.
    #[serde(default)]
    pub amount: Option<TokenAmount>,
    /// Ledger the transfer was made on.
    #[serde(default, alias = "ledgerCanisterId")]
    pub ledger_id: Option<Principal>,
    /// Sender identity.
    #[serde(default, alias = "fromPrincipal")]
    pub from: Option<Principal>,
    /// Ledger block holding the transfer.
    #[serde(default)]
    pub block_index: Option<BlockIndex>,
    /// When the backend recorded the transfer.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Per-party settlement records (fees, splits, payouts). Not interpreted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settlements: Vec<Value>,
}

impl TransactionRecord {
    /// Whether this record is the one `key` refers to.
    #[must_use]
    pub fn matches(&self, key: &TrackingKey) -> bool {
        match key {
            TrackingKey::Transaction(id) => &self.id == id,
            TrackingKey::Block(block) => match self.block_index {
                Some(index) => index == *block,
                None => self.id == TransactionId::from(block.0),
            },
        }
    }

    /// The caller-facing status; records without a status are pending.
    #[must_use]
    pub fn normalized_status(&self) -> TransactionStatus {
        self.status
            .as_ref()
            .map_or(TransactionStatus::Pending, BackendStatus::normalize)
    }
}

/// Filter for [`TransactionTracker::list_transactions`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    /// Restrict to one payer account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_canister_id: Option<u64>,
    /// Restrict to one ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<Principal>,
    /// Records to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Maximum records to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// One page of transaction records.
///
/// Records that fail to decode are skipped rather than failing the page.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    /// Records on this page.
    #[serde_as(as = "VecSkipError<_>")]
    pub transactions: Vec<TransactionRecord>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Failures talking to the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The call did not reach the service.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service rejected the call.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The reply could not be decoded.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// The backend tracking service.
///
/// All calls are anonymous: they only report or read facts that are already
/// on the ledger, so no wallet signature is involved.
#[async_trait::async_trait]
pub trait TransactionTracker: Send + Sync {
    /// Reports a transfer at `block_index` on `ledger_id` and returns the
    /// backend id assigned to it.
    async fn notify_transfer(
        &self,
        ledger_id: &Principal,
        block_index: BlockIndex,
    ) -> Result<TransactionId, TrackerError>;

    /// Looks a record up by id. `Ok(None)` means the backend has no such record (yet).
    async fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, TrackerError>;

    /// Lists records matching `filter`.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, TrackerError>;
}

#[async_trait::async_trait]
impl<T: TransactionTracker + ?Sized> TransactionTracker for Arc<T> {
    async fn notify_transfer(
        &self,
        ledger_id: &Principal,
        block_index: BlockIndex,
    ) -> Result<TransactionId, TrackerError> {
        (**self).notify_transfer(ledger_id, block_index).await
    }

    async fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, TrackerError> {
        (**self).get_transaction(id).await
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, TrackerError> {
        (**self).list_transactions(filter).await
    }
}

/// Tells the tracker about a transfer.
///
/// # Errors
///
/// Returns [`IcpayError::TransactionSyncTriggerFailed`] on any tracker error.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(name = "icpay.tracker.notify", skip_all, fields(ledger_id = %ledger_id, block_index = %block_index), err)
)]
pub async fn notify_transfer(
    tracker: &dyn TransactionTracker,
    ledger_id: &Principal,
    block_index: BlockIndex,
) -> Result<TransactionId, IcpayError> {
    tracker
        .notify_transfer(ledger_id, block_index)
        .await
        .map_err(|e| IcpayError::TransactionSyncTriggerFailed {
            block_index,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(value: Value) -> TransactionStatus {
        serde_json::from_value::<BackendStatus>(value)
            .unwrap()
            .normalize()
    }

    #[test]
    fn variant_statuses_normalize() {
        assert_eq!(status(json!({"Completed": null})), TransactionStatus::Completed);
        assert_eq!(status(json!({"Pending": null})), TransactionStatus::Pending);
        assert_eq!(status(json!({"Processed": null})), TransactionStatus::Pending);
        assert_eq!(status(json!({"Received": null})), TransactionStatus::Pending);
        assert_eq!(status(json!({"Failed": "expired"})), TransactionStatus::Failed);
        assert_eq!(status(json!("completed")), TransactionStatus::Completed);
        assert_eq!(status(json!("FAILED")), TransactionStatus::Failed);
    }

    #[test]
    fn malformed_statuses_are_pending() {
        for raw in [
            json!({"Refunded": null}),
            json!({"Completed": null, "Failed": null}),
            json!({}),
            json!(7),
            json!(null),
            json!("settling"),
        ] {
            assert_eq!(status(raw.clone()), TransactionStatus::Pending, "{raw}");
        }
    }

    #[test]
    fn failure_reason_is_kept() {
        let parsed: BackendStatus =
            serde_json::from_value(json!({"Failed": {"reason": "ledger timeout"}})).unwrap();
        assert_eq!(parsed.failure_reason(), Some("ledger timeout"));
        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back, json!({"Failed": "ledger timeout"}));
    }

    #[test]
    fn transaction_ids_accept_numbers_and_strings() {
        let a: TransactionId = serde_json::from_value(json!(17)).unwrap();
        let b: TransactionId = serde_json::from_value(json!("17")).unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_value::<TransactionId>(json!(-1)).is_err());
    }

    #[test]
    fn records_match_by_id_or_block() {
        let record: TransactionRecord = serde_json::from_value(json!({
            "id": "tx-1",
            "status": {"Completed": null},
            "amount": "100",
            "ledgerCanisterId": "ryjl3-tyaaa-aaaaa-aaaba-cai",
            "blockIndex": 42,
        }))
        .unwrap();
        assert!(record.matches(&TrackingKey::Transaction("tx-1".into())));
        assert!(record.matches(&TrackingKey::Block(BlockIndex(42))));
        assert!(!record.matches(&TrackingKey::Block(BlockIndex(43))));
        assert_eq!(record.ledger_id, Some(Principal::icp_ledger()));
        assert_eq!(record.normalized_status(), TransactionStatus::Completed);
    }

    #[test]
    fn block_key_prefers_recorded_block_over_id() {
        let decoy: TransactionRecord = serde_json::from_value(json!({
            "id": 42,
            "blockIndex": 99,
            "status": {"Failed": "expired"},
        }))
        .unwrap();
        assert!(!decoy.matches(&TrackingKey::Block(BlockIndex(42))));
        assert!(decoy.matches(&TrackingKey::Block(BlockIndex(99))));

        let unindexed: TransactionRecord =
            serde_json::from_value(json!({"id": "42", "status": "pending"})).unwrap();
        assert!(unindexed.matches(&TrackingKey::Block(BlockIndex(42))));
    }

    #[test]
    fn pages_skip_undecodable_records() {
        let page: TransactionPage = serde_json::from_value(json!({
            "transactions": [
                {"id": "a", "status": "pending"},
                {"status": "pending"},
                {"id": "b"},
            ],
            "hasMore": true,
        }))
        .unwrap();
        assert_eq!(page.transactions.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.transactions[1].status, None);
        assert_eq!(page.transactions[1].normalized_status(), TransactionStatus::Pending);
    }
}
