//! Command execution.

use alloy_signer_local::PrivateKeySigner;
use icpay::sources::PriceSource;
use icpay_evm::ExactEvmClient;
use icpay_http::PaymentApiClient;
use icpay_http::types::HistoryQuery;
use serde_json::{Value, json};

use crate::args::{Command, PageArgs};
use crate::error::CliError;

fn history_query(page: PageArgs) -> HistoryQuery {
    HistoryQuery::default()
        .with_limit(page.limit)
        .with_offset(page.offset)
}

/// Runs `command` against `client` and returns the JSON to print.
///
/// # Errors
///
/// Returns [`CliError`] if the API call or local processing fails.
pub async fn execute(command: Command, client: &PaymentApiClient) -> Result<Value, CliError> {
    let output = match command {
        Command::Account => serde_json::to_value(client.account_info().await?)?,
        Command::Ledgers => serde_json::to_value(client.verified_ledgers().await?)?,
        Command::Price { ledger } => serde_json::to_value(client.price_quote(&ledger).await?)?,
        Command::Transactions { page, ledger } => {
            let mut query = history_query(page);
            query.ledger_id = ledger;
            serde_json::to_value(client.transaction_history(&query).await?)?
        }
        Command::Payments { page, status } => {
            let mut query = history_query(page);
            query.status = status;
            serde_json::to_value(client.payment_history(&query).await?)?
        }
        Command::Payment { id } => serde_json::to_value(client.payment(&id).await?)?,
        Command::X402Header { body, private_key } => {
            let bytes = tokio::fs::read(&body)
                .await
                .map_err(|source| CliError::Io { path: body, source })?;
            let signer: PrivateKeySigner =
                private_key.trim().parse().map_err(|_| CliError::InvalidKey)?;
            let evm = ExactEvmClient::new(signer);
            let header = evm.payment_header(&bytes).await?;
            json!({
                "from": evm.address(),
                "header": icpay_evm::X_PAYMENT_HEADER,
                "value": header,
            })
        }
    };
    Ok(output)
}
