//! Client-side signing for the EIP-155 "exact" scheme.
//!
//! [`ExactEvmClient`] picks an `exact` requirement on an EIP-155 network from
//! a `402 Payment Required` body, signs an ERC-3009
//! `transferWithAuthorization` for it, and returns the base64 value of the
//! `X-PAYMENT` header.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256, FixedBytes, Signature};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngExt;
use rand::rng;

use crate::error::PaymentHeaderError;
use crate::network::{ChainId, DEFAULT_USDC_NAME, DEFAULT_USDC_VERSION};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    Authorization, ExactEvmPayload, PaymentPayload, PaymentRequired, PaymentRequirements,
    TransferWithAuthorization,
};

/// Request header carrying the encoded payment.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// How far in the past `validAfter` is placed, absorbing clock skew.
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// A trait that abstracts signing operations, allowing both owned signers and Arc-wrapped signers.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`.
pub trait SignerLike: Send + Sync {
    /// Returns the address of the signer.
    fn address(&self) -> Address;

    /// Signs the given hash.
    fn sign_hash(
        &self,
        hash: &FixedBytes<32>,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Returns the first `exact` requirement on an EIP-155 network.
///
/// # Errors
///
/// Returns [`PaymentHeaderError::NoMatchingRequirement`] if none is offered.
pub fn select_requirement(
    payment_required: &PaymentRequired,
) -> Result<PaymentRequirements, PaymentHeaderError> {
    payment_required
        .evm_requirements()
        .find(PaymentRequirements::is_exact_evm)
        .ok_or(PaymentHeaderError::NoMatchingRequirement)
}

/// The EIP-712 hash a payer signs for `authorization` under `requirements`.
///
/// # Errors
///
/// Returns [`PaymentHeaderError::UnsupportedNetwork`] if the network has no chain id.
pub fn signing_hash(
    requirements: &PaymentRequirements,
    authorization: &Authorization,
) -> Result<B256, PaymentHeaderError> {
    let chain_id: ChainId = requirements
        .chain_id()
        .ok_or_else(|| PaymentHeaderError::UnsupportedNetwork(requirements.network.clone()))?;
    let (name, version) = requirements.extra.as_ref().map_or_else(
        || (DEFAULT_USDC_NAME.to_owned(), DEFAULT_USDC_VERSION.to_owned()),
        |extra| (extra.name.clone(), extra.version.clone()),
    );
    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: requirements.asset,
    };
    Ok(TransferWithAuthorization::from(authorization).eip712_signing_hash(&domain))
}

/// Signs an ERC-3009 authorization for `requirements` as of `now`.
///
/// The authorization is valid from ten minutes before `now` until
/// `now + max_timeout_seconds`, with a random nonce.
///
/// # Errors
///
/// Returns [`PaymentHeaderError`] if the network is unsupported or signing fails.
pub async fn sign_authorization<S: SignerLike>(
    signer: &S,
    requirements: &PaymentRequirements,
    now: UnixTimestamp,
) -> Result<ExactEvmPayload, PaymentHeaderError> {
    let nonce: [u8; 32] = rng().random();
    let authorization = Authorization {
        from: signer.address(),
        to: requirements.pay_to,
        value: requirements.max_amount_required,
        valid_after: now.saturating_sub(VALID_AFTER_SKEW_SECS),
        valid_before: now.saturating_add(requirements.max_timeout_seconds),
        nonce: FixedBytes(nonce),
    };

    let hash = signing_hash(requirements, &authorization)?;
    let signature = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| PaymentHeaderError::Signing(format!("{e:?}")))?;

    Ok(ExactEvmPayload {
        signature: signature.as_bytes().into(),
        authorization,
    })
}

/// Builds `X-PAYMENT` headers with a fixed signer.
#[derive(Debug, Clone)]
pub struct ExactEvmClient<S> {
    signer: S,
}

impl<S: SignerLike> ExactEvmClient<S> {
    /// Creates a client signing with `signer`.
    pub const fn new(signer: S) -> Self {
        Self { signer }
    }

    /// Address payments are made from.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs a payment for `requirements` and wraps it in the header payload.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentHeaderError`] if the network is unsupported, the
    /// system clock is unusable, or signing fails.
    pub async fn payment_payload(
        &self,
        x402_version: u8,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, PaymentHeaderError> {
        let payload = sign_authorization(&self.signer, requirements, UnixTimestamp::now()?).await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            network = %requirements.network,
            pay_to = %requirements.pay_to,
            amount = %requirements.max_amount_required,
            "signed exact payment authorization"
        );

        Ok(PaymentPayload {
            x402_version,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payload,
        })
    }

    /// Turns a `402 Payment Required` body into an `X-PAYMENT` header value.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentHeaderError`] if the body is malformed, offers no
    /// usable requirement, or signing fails.
    pub async fn payment_header(&self, body: &[u8]) -> Result<String, PaymentHeaderError> {
        let payment_required =
            PaymentRequired::from_slice(body).map_err(PaymentHeaderError::InvalidBody)?;
        let requirements = select_requirement(&payment_required)?;
        let payload = self
            .payment_payload(payment_required.x402_version, &requirements)
            .await?;
        encode_header(&payload)
    }
}

/// Base64-encodes the JSON of `payload`.
///
/// # Errors
///
/// Returns [`PaymentHeaderError::Serialization`] if serialization fails.
pub fn encode_header(payload: &PaymentPayload) -> Result<String, PaymentHeaderError> {
    let json = serde_json::to_vec(payload)?;
    Ok(STANDARD.encode(json))
}
