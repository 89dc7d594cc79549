//! REST client for the ICPay payment API.
//!
//! [`PaymentApiClient`] reads account, ledger, price and history data from
//! the backend and plugs into the core SDK as its account and price source.
//!
//! ```no_run
//! # async fn run() -> Result<(), icpay_http::ApiClientError> {
//! use icpay::config::IcpayConfig;
//! use icpay_http::PaymentApiClient;
//!
//! let config = IcpayConfig::default();
//! let client = PaymentApiClient::from_config(&config)?;
//! let ledgers = client.verified_ledgers().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`client`] - The API client and its ledger cache
//! - [`constants`] - Header names and defaults
//! - [`error`] - Transport error types
//! - [`types`] - Response and query types

pub mod client;
pub mod constants;
pub mod error;
pub mod types;

pub use client::PaymentApiClient;
pub use error::ApiClientError;
