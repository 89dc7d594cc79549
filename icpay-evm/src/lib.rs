#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! x402 "exact" scheme payments on EIP-155 chains.
//!
//! A server answering `402 Payment Required` lists the payments it accepts.
//! This crate picks an `exact` requirement on an EVM network, signs an
//! ERC-3009 `transferWithAuthorization` for it with EIP-712, and encodes the
//! result as the `X-PAYMENT` request header.
//!
//! ```no_run
//! # async fn run(body: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! use alloy_signer_local::PrivateKeySigner;
//! use icpay_evm::ExactEvmClient;
//!
//! let signer = PrivateKeySigner::random();
//! let header = ExactEvmClient::new(signer).payment_header(body).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`client`] - Requirement selection, signing and header encoding
//! - [`error`] - Header construction errors
//! - [`network`] - EIP-155 network identifiers
//! - [`timestamp`] - Unix timestamps of authorization windows
//! - [`types`] - Wire types
//!
//! # Feature Flags
//!
//! - `telemetry` - Logs signed authorizations with `tracing`

pub mod client;
pub mod error;
pub mod network;
pub mod timestamp;
pub mod types;

pub use client::{ExactEvmClient, SignerLike, X_PAYMENT_HEADER};
pub use error::PaymentHeaderError;
pub use timestamp::UnixTimestamp;
