//! Wire types of the x402 "exact" scheme on EIP-155 chains.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};

use crate::network::{self, ChainId};
use crate::timestamp::UnixTimestamp;

/// Name of the scheme this crate signs for.
pub const EXACT_SCHEME: &str = "exact";

/// Protocol version written when a body carries none.
pub const DEFAULT_X402_VERSION: u8 = 1;

const fn default_x402_version() -> u8 {
    DEFAULT_X402_VERSION
}

const fn default_max_timeout_seconds() -> u64 {
    60
}

/// Body of a `402 Payment Required` response.
///
/// `accepts` is kept as raw JSON; requirements of other schemes and chains
/// are not expected to share this crate's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    #[serde(default = "default_x402_version")]
    pub x402_version: u8,
    /// Offered payment requirements.
    #[serde(default)]
    pub accepts: Vec<Value>,
    /// Server-provided reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentRequired {
    /// Parses a response body.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the body is not a payment-required document.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Offered requirements that decode as EVM requirements, in offer order.
    pub fn evm_requirements(&self) -> impl Iterator<Item = PaymentRequirements> + '_ {
        self.accepts
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// EIP-712 domain of the token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    /// Token name as used in the domain.
    pub name: String,
    /// Token version as used in the domain.
    pub version: String,
}

/// One payment option offered by a server.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme, `exact` for this crate.
    pub scheme: String,
    /// CAIP-2 id or legacy network name.
    pub network: String,
    /// Amount in token base units.
    #[serde(alias = "amount")]
    #[serde_as(as = "DisplayFromStr")]
    pub max_amount_required: U256,
    /// Recipient.
    pub pay_to: Address,
    /// Token contract.
    pub asset: Address,
    /// Validity window of the authorization.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    /// Resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Token EIP-712 domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Eip712Domain>,
}

impl PaymentRequirements {
    /// Chain id of the requirement's network.
    #[must_use]
    pub fn chain_id(&self) -> Option<ChainId> {
        network::chain_id_of(&self.network)
    }

    /// Whether this is an `exact` requirement on an EIP-155 network.
    #[must_use]
    pub fn is_exact_evm(&self) -> bool {
        self.scheme == EXACT_SCHEME && self.chain_id().is_some()
    }
}

/// The signed ERC-3009 authorization.
///
/// Numeric fields travel as decimal strings.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Token owner.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount in base units.
    #[serde_as(as = "DisplayFromStr")]
    pub value: U256,
    /// Not valid before this time.
    pub valid_after: UnixTimestamp,
    /// Expires at this time.
    pub valid_before: UnixTimestamp,
    /// Replay-protection nonce.
    pub nonce: B256,
}

/// Signature plus the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    /// 65-byte EOA signature.
    pub signature: Bytes,
    /// The signed authorization.
    pub authorization: Authorization,
}

/// JSON carried, base64-encoded, in the `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version, echoed from the payment-required body.
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: String,
    /// Network of the accepted requirement.
    pub network: String,
    /// Scheme payload.
    pub payload: ExactEvmPayload,
}

sol!(
    /// ERC-3009 `transferWithAuthorization` message in EIP-712 form.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

impl From<&Authorization> for TransferWithAuthorization {
    fn from(auth: &Authorization) -> Self {
        Self {
            from: auth.from,
            to: auth.to,
            value: auth.value,
            validAfter: U256::from(auth.valid_after.as_secs()),
            validBefore: U256::from(auth.valid_before.as_secs()),
            nonce: auth.nonce,
        }
    }
}
