//! Errors raised while building a payment header.

/// Errors that can occur while turning a `402 Payment Required` body into a
/// signed `X-PAYMENT` header.
#[derive(Debug, thiserror::Error)]
pub enum PaymentHeaderError {
    /// The body is not a payment-required document.
    #[error("Invalid payment-required body: {0}")]
    InvalidBody(#[source] serde_json::Error),
    /// No `exact` requirement on an EIP-155 network was offered.
    #[error("No exact EIP-155 payment requirement offered")]
    NoMatchingRequirement,
    /// The requirement names a network that maps to no chain id.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// EIP-712 signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),
    /// The system clock reads earlier than the Unix epoch.
    #[error("System clock is {0:?} before the Unix epoch")]
    Clock(std::time::Duration),
    /// The payload could not be serialized.
    #[error("Failed to serialize payment payload: {0}")]
    Serialization(#[from] serde_json::Error),
}
