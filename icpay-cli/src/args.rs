//! Command-line arguments.
//!
//! Every connection flag falls back to the environment variable the SDK reads,
//! so a `.env` file is enough to run the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use icpay::config::{ApiCredentials, IcpayConfig};
use icpay::principal::Principal;
use icpay_http::constants::DEFAULT_PAGE_SIZE;
use url::Url;

/// Query the ICPay payment API.
#[derive(Debug, Parser)]
#[command(name = "icpay", version, about)]
pub struct Cli {
    /// Base URL of the payment API.
    #[arg(long, env = "ICPAY_API_URL")]
    pub api_url: Option<Url>,

    /// Secret API key.
    #[arg(long, env = "ICPAY_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Account id sent with the secret key.
    #[arg(long, env = "ICPAY_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Publishable API key, used when no secret key is set.
    #[arg(long, env = "ICPAY_PUBLISHABLE_KEY")]
    pub publishable_key: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "ICPAY_REQUEST_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Pagination flags shared by history commands.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct PageArgs {
    /// Maximum items to return.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub limit: u32,
    /// Items to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the account the credentials belong to.
    Account,
    /// List verified ledgers.
    Ledgers,
    /// Show the latest price of a ledger's token.
    Price {
        /// Ledger canister id.
        ledger: Principal,
    },
    /// List ledger transactions.
    Transactions {
        /// Pagination.
        #[command(flatten)]
        page: PageArgs,
        /// Only transactions on this ledger.
        #[arg(long)]
        ledger: Option<Principal>,
    },
    /// List payments.
    Payments {
        /// Pagination.
        #[command(flatten)]
        page: PageArgs,
        /// Only payments with this status.
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one payment.
    Payment {
        /// Payment id.
        id: String,
    },
    /// Sign an x402 `X-PAYMENT` header for a saved 402 response body.
    X402Header {
        /// File holding the `402 Payment Required` JSON body.
        body: PathBuf,
        /// Hex private key of the paying EVM account.
        #[arg(long, env = "ICPAY_EVM_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
    },
}

impl Cli {
    /// Builds the SDK configuration from flags, falling back to its defaults.
    #[must_use]
    pub fn config(&self) -> IcpayConfig {
        let mut config = IcpayConfig::default();
        if let Some(api_url) = &self.api_url {
            config.api_url.clone_from(api_url);
        }
        let credentials = match (&self.secret_key, &self.publishable_key) {
            (Some(secret_key), _) => Some(ApiCredentials::Secret {
                secret_key: secret_key.clone(),
                account_id: self.account_id.clone(),
            }),
            (None, Some(publishable_key)) => Some(ApiCredentials::Publishable {
                publishable_key: publishable_key.clone(),
            }),
            (None, None) => None,
        };
        if let Some(credentials) = credentials {
            config = config.with_credentials(credentials);
        }
        config.request_timeout_ms = self.timeout_ms;
        config
    }
}
