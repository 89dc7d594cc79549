//! The `icpay` command-line tool.
//!
//! Read-only queries against the ICPay payment API, printed as JSON, plus
//! signing of x402 payment headers for EVM chains.
//!
//! # Modules
//!
//! - [`args`] - Flags and subcommands
//! - [`commands`] - Command execution
//! - [`error`] - Error type

pub mod args;
pub mod commands;
pub mod error;

pub use args::{Cli, Command};
pub use error::CliError;
