#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of the ICPay SDK: send payments on Internet Computer ledgers and track
//! them until the ICPay backend settles them.
//!
//! # Overview
//!
//! A payment moves through a fixed pipeline, driven by
//! [`IcpayClient::send_funds`]: the payer identity comes from the connected
//! wallet, the amount is normalized to base units (converting USD at the
//! current price), the balance on the requested ledger is checked, the
//! transfer is submitted, the backend is notified of the transfer's block and
//! finally polled until it reports a status.
//!
//! The SDK talks to the outside world only through traits:
//!
//! - [`LedgerActor`](ledger::LedgerActor) for ledger transfers and balances
//! - [`TransactionTracker`](tracking::TransactionTracker) for the backend tracker
//! - [`AccountSource`](sources::AccountSource) and
//!   [`PriceSource`](sources::PriceSource) for backend metadata
//! - [`WalletConnector`](wallet::WalletConnector) and [`Signer`](wallet::Signer) for wallets
//!
//! The `icpay-http` crate implements the metadata sources over the ICPay REST API.
//!
//! # Modules
//!
//! - [`amount`] - Base-unit amounts and USD conversion
//! - [`balance`] - Balance snapshots
//! - [`cache`] - Session caches
//! - [`client`] - The payment client
//! - [`config`] - Configuration and environment loading
//! - [`error`] - Error taxonomy and stable codes
//! - [`ledger`] - Ledger access and transfer submission
//! - [`observer`] - Operation observers
//! - [`payment`] - Payment requests and responses
//! - [`poll`] - Status polling
//! - [`principal`] - Textual identities
//! - [`sources`] - Account and price sources
//! - [`tracking`] - Backend transaction records
//! - [`wallet`] - Wallet connections
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation of the pipeline

pub mod amount;
pub mod balance;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod observer;
pub mod payment;
pub mod poll;
pub mod principal;
pub mod sources;
pub mod tracking;
pub mod wallet;

pub use client::{IcpayClient, IcpayClientBuilder};
pub use error::{ErrorCode, IcpayError};
pub use payment::{PaymentRequest, TransactionResponse};
