//! Error type of the command-line tool.

use std::path::PathBuf;

use icpay::IcpayError;
use icpay_evm::PaymentHeaderError;
use icpay_http::ApiClientError;

/// Errors that end a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid configuration or a failed SDK operation.
    #[error(transparent)]
    Sdk(#[from] IcpayError),

    /// The payment API call failed.
    #[error("api error: {0}")]
    Api(#[from] ApiClientError),

    /// Building an x402 payment header failed.
    #[error("payment header error: {0}")]
    PaymentHeader(#[from] PaymentHeaderError),

    /// The EVM private key did not parse.
    #[error("invalid EVM private key")]
    InvalidKey,

    /// An input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Output could not be serialized.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}
