//! `icpay` command-line tool.
//!
//! # Usage
//!
//! ```bash
//! icpay --secret-key sk_live_... account
//! icpay price ryjl3-tyaaa-aaaaa-aaaba-cai
//! RUST_LOG=debug icpay transactions --limit 10
//! ```
//!
//! # Environment Variables
//!
//! - `ICPAY_API_URL` - Payment API base URL (default: `https://api.icpay.org`)
//! - `ICPAY_SECRET_KEY`, `ICPAY_ACCOUNT_ID` - Secret-key credentials
//! - `ICPAY_PUBLISHABLE_KEY` - Publishable-key credentials
//! - `ICPAY_EVM_PRIVATE_KEY` - Payer key for `x402-header`
//! - `RUST_LOG` - Log level filter (default: `info`)

use clap::Parser;
use icpay_cli::Cli;
use icpay_cli::commands::execute;
use icpay_http::PaymentApiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("icpay failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::print_stdout)]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;
    tracing::debug!(api_url = %config.api_url, "Loaded configuration");

    let client = PaymentApiClient::from_config(&config)?;
    let output = execute(cli.command, &client).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
