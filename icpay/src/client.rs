//! The payment client.
//!
//! [`IcpayClient::send_funds`] runs a payment through its stages:
//!
//! 1. resolve the payer identity from the connected wallet;
//! 2. normalize the amount, converting USD at the current price;
//! 3. resolve the payer account and the payment destination;
//! 4. check the payer's balance on the requested ledger;
//! 5. submit the ledger transfer;
//! 6. notify the backend of the transfer's block;
//! 7. poll the backend until it reports a status.
//!
//! Failures up to and including step 5 abort the payment. Once the transfer
//! is on the ledger nothing is fatal: a failed notification falls back to
//! tracking the block index, and a poll that gives up yields a `pending`
//! response. Each stage reports to the client's [`Observers`].

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::amount::{NormalizedAmount, PaymentAmount, TokenAmount, usd_to_base_units, validate_usd_amount};
use crate::balance::{BalanceSnapshot, fetch_balances};
use crate::cache::SessionCache;
use crate::config::IcpayConfig;
use crate::error::IcpayError;
use crate::ledger::{BlockIndex, LedgerActor, submit_transfer};
use crate::observer::{Observers, methods};
use crate::payment::{PaymentRequest, TransactionResponse, TransactionStatusReport};
use crate::poll::{PollClock, PollError, RetryPolicy, StatusPoller, TokioClock};
use crate::principal::Principal;
use crate::sources::{AccountSource, PriceSource};
use crate::tracking::{
    TrackingKey, TransactionFilter, TransactionId, TransactionRecord, TransactionStatus,
    TransactionTracker, notify_transfer,
};
use crate::wallet::{Signer, WalletConnection, WalletConnector, WalletProvider, WalletSlot};

/// Number of records the poller's list fallback asks for.
const FALLBACK_PAGE_SIZE: u32 = 50;

/// Where a payment goes and whose account it is credited to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Route {
    account_canister_id: u64,
    destination: Principal,
}

/// Sends and tracks payments.
///
/// The client is cheap to share behind an `Arc`; concurrent payments run
/// independently and only share the session cache.
pub struct IcpayClient {
    ledger: Arc<dyn LedgerActor>,
    tracker: Arc<dyn TransactionTracker>,
    accounts: Arc<dyn AccountSource>,
    prices: Arc<dyn PriceSource>,
    connector: Option<Arc<dyn WalletConnector>>,
    wallet: WalletSlot,
    cache: Arc<SessionCache>,
    clock: Arc<dyn PollClock>,
    policy: RetryPolicy,
    platform_canister_id: Option<Principal>,
    observers: Observers,
}

impl std::fmt::Debug for IcpayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcpayClient")
            .field("wallet", &self.wallet)
            .field("policy", &self.policy)
            .field("platform_canister_id", &self.platform_canister_id)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

/// Builder for [`IcpayClient`].
#[allow(missing_debug_implementations)]
pub struct IcpayClientBuilder {
    ledger: Arc<dyn LedgerActor>,
    tracker: Arc<dyn TransactionTracker>,
    accounts: Arc<dyn AccountSource>,
    prices: Arc<dyn PriceSource>,
    connector: Option<Arc<dyn WalletConnector>>,
    signer: Option<Arc<dyn Signer>>,
    cache: Option<Arc<SessionCache>>,
    clock: Arc<dyn PollClock>,
    policy: RetryPolicy,
    platform_canister_id: Option<Principal>,
    observers: Observers,
}

impl IcpayClientBuilder {
    /// Sets the wallet connector used by [`IcpayClient::connect_wallet`].
    #[must_use]
    pub fn with_wallet_connector(mut self, connector: Arc<dyn WalletConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Starts the client with `signer` already connected.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Shares `cache` with other clients.
    #[must_use]
    pub fn with_session_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the clock used while polling.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the polling policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fixes the payment destination instead of fetching it.
    #[must_use]
    pub fn with_platform_canister_id(mut self, id: Principal) -> Self {
        self.platform_canister_id = Some(id);
        self
    }

    /// Sets the observers.
    #[must_use]
    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Applies the polling policy and fixed destination of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &IcpayConfig) -> Self {
        self.policy = config.polling;
        if let Some(id) = &config.platform_canister_id {
            self.platform_canister_id = Some(id.clone());
        }
        self
    }

    /// Builds the client.
    #[must_use]
    pub fn build(self) -> IcpayClient {
        let wallet = WalletSlot::new();
        if let Some(signer) = self.signer {
            wallet.set(signer);
        }
        IcpayClient {
            ledger: self.ledger,
            tracker: self.tracker,
            accounts: self.accounts,
            prices: self.prices,
            connector: self.connector,
            wallet,
            cache: self.cache.unwrap_or_default(),
            clock: self.clock,
            policy: self.policy,
            platform_canister_id: self.platform_canister_id,
            observers: self.observers,
        }
    }
}

impl IcpayClient {
    /// Starts building a client from its collaborators.
    #[must_use]
    pub fn builder(
        ledger: Arc<dyn LedgerActor>,
        tracker: Arc<dyn TransactionTracker>,
        accounts: Arc<dyn AccountSource>,
        prices: Arc<dyn PriceSource>,
    ) -> IcpayClientBuilder {
        IcpayClientBuilder {
            ledger,
            tracker,
            accounts,
            prices,
            connector: None,
            signer: None,
            cache: None,
            clock: Arc::new(TokioClock),
            policy: RetryPolicy::default(),
            platform_canister_id: None,
            observers: Observers::default(),
        }
    }

    /// The session cache.
    #[must_use]
    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// The polling policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `fut` as the observed operation `method`.
    async fn observed<T, F>(&self, method: &str, params: Value, fut: F) -> Result<T, IcpayError>
    where
        T: Serialize,
        F: Future<Output = Result<T, IcpayError>>,
    {
        self.observers.start(method, &params);
        let result = fut.await;
        match &result {
            Ok(value) => self
                .observers
                .success(method, &serde_json::to_value(value).unwrap_or(Value::Null)),
            Err(err) => self.observers.error(method, &err.to_report()),
        }
        result
    }

    // Wallet

    /// Connects `provider` through the configured connector and makes it the
    /// active signer. A previously connected signer is disconnected.
    ///
    /// # Errors
    ///
    /// - [`IcpayError::InvalidConfig`] if no connector is configured.
    /// - [`IcpayError::WalletNotConnected`] if the provider handshake yields
    ///   no identity.
    /// - Any error of the connector.
    pub async fn connect_wallet(&self, provider: &WalletProvider) -> Result<WalletConnection, IcpayError> {
        self.observed(methods::CONNECT_WALLET, json!({ "provider": provider }), async {
            let connector = self
                .connector
                .as_ref()
                .ok_or_else(|| IcpayError::invalid_config("no wallet connector configured"))?;
            let signer = connector.connect(provider).await?;
            if !signer.is_connected() {
                return Err(IcpayError::WalletNotConnected);
            }
            let connection = WalletConnection::of(signer.as_ref());
            if let Some(previous) = self.wallet.set(signer) {
                previous.disconnect().await;
            }
            Ok(connection)
        })
        .await
    }

    /// Disconnects the active signer, if any.
    pub async fn disconnect_wallet(&self) {
        let _ = self
            .observed(methods::DISCONNECT_WALLET, Value::Null, async {
                let signer = self.wallet.take();
                if let Some(signer) = &signer {
                    signer.disconnect().await;
                }
                Ok::<_, IcpayError>(signer.is_some())
            })
            .await;
    }

    /// The connected payer identity, if a wallet is connected.
    #[must_use]
    pub fn wallet_address(&self) -> Option<Principal> {
        self.wallet.identity().ok()
    }

    // Balances

    /// Reads the connected identity's balance on `ledger_id`.
    ///
    /// # Errors
    ///
    /// [`IcpayError::WalletNotConnected`] or [`IcpayError::BalanceCheckFailed`].
    pub async fn balance(&self, ledger_id: &Principal) -> Result<TokenAmount, IcpayError> {
        let snapshot = self.balances(std::slice::from_ref(ledger_id)).await?;
        Ok(snapshot.get(ledger_id).unwrap_or(TokenAmount::ZERO))
    }

    /// Reads the connected identity's balances on `ledger_ids`.
    ///
    /// # Errors
    ///
    /// [`IcpayError::WalletNotConnected`] or [`IcpayError::BalanceCheckFailed`].
    pub async fn balances(&self, ledger_ids: &[Principal]) -> Result<BalanceSnapshot, IcpayError> {
        self.observed(methods::GET_BALANCES, json!({ "ledgerIds": ledger_ids }), async {
            let owner = self.wallet.identity()?;
            fetch_balances(self.ledger.as_ref(), &owner, ledger_ids).await
        })
        .await
    }

    // Amounts

    /// Resolves `amount` to base units of `ledger_id`'s token.
    ///
    /// # Errors
    ///
    /// - [`IcpayError::InvalidUsdAmount`] for a zero, negative or non-finite USD amount.
    /// - [`IcpayError::PriceNotAvailable`] when the token has no usable price.
    /// - Errors of the price source.
    pub async fn normalize_amount(
        &self,
        ledger_id: &Principal,
        amount: PaymentAmount,
    ) -> Result<NormalizedAmount, IcpayError> {
        self.observed(
            methods::NORMALIZE_AMOUNT,
            json!({ "ledgerId": ledger_id, "amount": amount }),
            async {
                match amount {
                    PaymentAmount::BaseUnits(amount) => Ok(NormalizedAmount::base_units(amount)),
                    PaymentAmount::Usd(usd_amount) => {
                        validate_usd_amount(usd_amount)?;
                        let quote = match self.prices.price_quote(ledger_id).await {
                            Ok(quote) => quote,
                            Err(IcpayError::Api {
                                status: Some(404), ..
                            }) => {
                                return Err(IcpayError::PriceNotAvailable {
                                    ledger_id: ledger_id.clone(),
                                });
                            }
                            Err(err) => return Err(err),
                        };
                        usd_to_base_units(usd_amount, &quote)
                    }
                }
            },
        )
        .await
    }

    // Payments

    /// Sends a payment and waits for the backend to settle it.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage up to the ledger transfer.
    /// After a successful transfer the result is always `Ok`, possibly with a
    /// `pending` status.
    pub async fn send_funds(&self, request: PaymentRequest) -> Result<TransactionResponse, IcpayError> {
        self.send_funds_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`send_funds`](Self::send_funds), with a token that stops the
    /// status wait early. Cancelling never affects the transfer; a cancelled
    /// wait yields a `pending` response.
    ///
    /// # Errors
    ///
    /// See [`send_funds`](Self::send_funds).
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "icpay.send_funds", skip_all, fields(ledger_id = %request.ledger_id))
    )]
    pub async fn send_funds_with_cancel(
        &self,
        request: PaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<TransactionResponse, IcpayError> {
        let params = serde_json::to_value(&request).unwrap_or(Value::Null);
        self.observed(methods::SEND_FUNDS, params, self.run_payment(request, cancel))
            .await
    }

    async fn run_payment(
        &self,
        request: PaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<TransactionResponse, IcpayError> {
        let PaymentRequest {
            ledger_id,
            amount,
            account_canister_id,
            metadata,
        } = request;

        let payer = self.wallet.identity()?;
        let normalized = self.normalize_amount(&ledger_id, amount).await?;
        let route = self
            .observed(
                methods::RESOLVE_ACCOUNT,
                json!({ "accountCanisterId": account_canister_id }),
                self.resolve_route(account_canister_id),
            )
            .await?;

        self.observed(
            methods::CHECK_BALANCE,
            json!({ "ledgerId": ledger_id, "owner": payer, "required": normalized.amount }),
            async {
                let snapshot =
                    fetch_balances(self.ledger.as_ref(), &payer, std::slice::from_ref(&ledger_id))
                        .await?;
                snapshot.ensure_covers(&ledger_id, normalized.amount)?;
                Ok::<_, IcpayError>(snapshot)
            },
        )
        .await?;

        let block_index = self
            .observed(
                methods::SUBMIT_TRANSFER,
                json!({
                    "ledgerId": ledger_id,
                    "to": route.destination,
                    "amount": normalized.amount,
                    "accountCanisterId": route.account_canister_id,
                }),
                submit_transfer(
                    self.ledger.as_ref(),
                    &ledger_id,
                    &route.destination,
                    normalized.amount,
                    route.account_canister_id,
                ),
            )
            .await?;

        let key = self.notify(&ledger_id, block_index).await;
        let filter = TransactionFilter {
            account_canister_id: Some(route.account_canister_id),
            ledger_id: Some(ledger_id.clone()),
            offset: None,
            limit: Some(FALLBACK_PAGE_SIZE),
        };
        let record = self.poll(&key, filter, cancel).await;

        let status = record
            .as_ref()
            .map_or(TransactionStatus::Pending, TransactionRecord::normalized_status);
        Ok(TransactionResponse {
            transaction_id: record
                .as_ref()
                .map_or_else(|| key.lookup_id(), |r| r.id.clone()),
            status,
            amount: normalized.amount,
            ledger_id,
            to: route.destination,
            block_index,
            timestamp: record
                .as_ref()
                .and_then(|r| r.timestamp)
                .unwrap_or_else(Utc::now),
            failure_reason: record
                .as_ref()
                .and_then(|r| r.status.as_ref())
                .and_then(|s| s.failure_reason())
                .map(str::to_owned),
            usd: normalized.usd,
            metadata,
        })
    }

    async fn resolve_route(&self, account_canister_id: Option<u64>) -> Result<Route, IcpayError> {
        let account_canister_id = match account_canister_id {
            Some(id) => id,
            None => {
                self.cache
                    .account
                    .get_or_try_fill(|| self.accounts.account_info())
                    .await
                    .map_err(as_account_error)?
                    .account_canister_id
            }
        };
        let destination = match &self.platform_canister_id {
            Some(id) => id.clone(),
            None => self
                .cache
                .platform_canister
                .get_or_try_fill(|| self.accounts.platform_canister_id())
                .await
                .map_err(as_account_error)?,
        };
        Ok(Route {
            account_canister_id,
            destination,
        })
    }

    /// Notifies the backend; on failure the block index becomes the tracking key.
    async fn notify(&self, ledger_id: &Principal, block_index: BlockIndex) -> TrackingKey {
        let notified = self
            .observed(
                methods::NOTIFY_TRANSFER,
                json!({ "ledgerId": ledger_id, "blockIndex": block_index }),
                notify_transfer(self.tracker.as_ref(), ledger_id, block_index),
            )
            .await;
        match notified {
            Ok(id) => TrackingKey::Transaction(id),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, block_index = %block_index, "Backend notification failed, tracking block index");
                drop(err);
                TrackingKey::Block(block_index)
            }
        }
    }

    /// Polls for `key`; a poll that gives up yields `None`.
    async fn poll(
        &self,
        key: &TrackingKey,
        filter: TransactionFilter,
        cancel: &CancellationToken,
    ) -> Option<TransactionRecord> {
        let poller = StatusPoller::new(self.tracker.as_ref(), self.clock.as_ref(), self.policy)
            .with_filter(filter);
        let polled = self
            .observed(
                methods::POLL_STATUS,
                json!({ "key": key, "maxAttempts": self.policy.max_attempts }),
                async { poller.poll(key, cancel).await.map_err(|e| e.into_error(key)) },
            )
            .await;
        match polled {
            Ok(record) => Some(record),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, key = %key, "No settled status, reporting pending");
                drop(err);
                None
            }
        }
    }

    /// Tracks an existing transaction with the client's polling policy.
    ///
    /// A wait that times out or is cancelled reports `pending`.
    ///
    /// # Errors
    ///
    /// [`IcpayError::TransactionStatusFetchFailed`] when the final lookup of an
    /// exhausted budget failed.
    pub async fn await_transaction(
        &self,
        transaction_id: TransactionId,
        cancel: &CancellationToken,
    ) -> Result<TransactionStatusReport, IcpayError> {
        let key = TrackingKey::Transaction(transaction_id.clone());
        self.observed(
            methods::AWAIT_TRANSACTION,
            json!({ "transactionId": transaction_id }),
            async {
                let poller =
                    StatusPoller::new(self.tracker.as_ref(), self.clock.as_ref(), self.policy);
                match poller.poll(&key, cancel).await {
                    Ok(record) => Ok(TransactionStatusReport {
                        transaction_id: record.id.clone(),
                        status: record.normalized_status(),
                        record: Some(record),
                    }),
                    Err(err @ PollError::Exhausted {
                        last_error: Some(_),
                        ..
                    }) => Err(err.into_error(&key)),
                    Err(_) => Ok(TransactionStatusReport {
                        transaction_id: transaction_id.clone(),
                        status: TransactionStatus::Pending,
                        record: None,
                    }),
                }
            },
        )
        .await
    }
}

/// Any failure to resolve the account or destination is an account-info failure.
fn as_account_error(err: IcpayError) -> IcpayError {
    match err {
        err @ IcpayError::AccountInfoFetchFailed { .. } => err,
        other => IcpayError::account_info(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::amount::PriceQuote;
    use crate::ledger::{LedgerQueryError, LedgerTransferError, TransferArgs};
    use crate::observer::OperationEvent;
    use crate::poll::testing::ManualClock;
    use crate::sources::AccountInfo;
    use crate::tracking::{TrackerError, TransactionPage};
    use crate::wallet::StaticSigner;

    fn payer() -> Principal {
        "2vxsx-fae".parse().unwrap()
    }

    fn platform() -> Principal {
        "aaaaa-aa".parse().unwrap()
    }

    struct FakeLedger {
        balances: HashMap<Principal, TokenAmount>,
        reply: Result<BlockIndex, LedgerTransferError>,
        transfers: Mutex<Vec<(Principal, TransferArgs)>>,
    }

    impl FakeLedger {
        /// A ledger where the payer holds `balance` ICP and nothing else.
        fn new(balance: u128) -> Self {
            Self {
                balances: HashMap::from([(Principal::icp_ledger(), TokenAmount::new(balance))]),
                reply: Ok(BlockIndex(42)),
                transfers: Mutex::new(Vec::new()),
            }
        }

        fn with_balance(mut self, ledger: Principal, balance: u128) -> Self {
            self.balances.insert(ledger, TokenAmount::new(balance));
            self
        }

        fn transfer_count(&self) -> usize {
            self.transfers.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl LedgerActor for FakeLedger {
        async fn transfer(
            &self,
            ledger: &Principal,
            args: TransferArgs,
        ) -> Result<BlockIndex, LedgerTransferError> {
            self.transfers.lock().unwrap().push((ledger.clone(), args));
            self.reply.clone()
        }

        async fn balance_of(
            &self,
            ledger: &Principal,
            owner: &Principal,
        ) -> Result<TokenAmount, LedgerQueryError> {
            assert_eq!(owner, &payer());
            Ok(self.balances.get(ledger).copied().unwrap_or(TokenAmount::ZERO))
        }
    }

    struct FakeTracker {
        notify: Result<TransactionId, TrackerError>,
        records: Mutex<VecDeque<Option<TransactionRecord>>>,
        listed: Vec<TransactionRecord>,
        looked_up: Mutex<Vec<TransactionId>>,
    }

    impl FakeTracker {
        fn new(notify: Result<TransactionId, TrackerError>) -> Self {
            Self {
                notify,
                records: Mutex::new(VecDeque::new()),
                listed: Vec::new(),
                looked_up: Mutex::new(Vec::new()),
            }
        }

        fn then_record(self, value: serde_json::Value) -> Self {
            self.records
                .lock()
                .unwrap()
                .push_back(Some(serde_json::from_value(value).unwrap()));
            self
        }
    }

    #[async_trait::async_trait]
    impl TransactionTracker for FakeTracker {
        async fn notify_transfer(
            &self,
            _ledger_id: &Principal,
            _block_index: BlockIndex,
        ) -> Result<TransactionId, TrackerError> {
            self.notify.clone()
        }

        async fn get_transaction(
            &self,
            id: &TransactionId,
        ) -> Result<Option<TransactionRecord>, TrackerError> {
            self.looked_up.lock().unwrap().push(id.clone());
            Ok(self.records.lock().unwrap().pop_front().flatten())
        }

        async fn list_transactions(
            &self,
            filter: &TransactionFilter,
        ) -> Result<TransactionPage, TrackerError> {
            assert_eq!(filter.limit, Some(FALLBACK_PAGE_SIZE));
            Ok(TransactionPage {
                transactions: self.listed.clone(),
                has_more: false,
            })
        }
    }

    #[derive(Default)]
    struct FakeAccounts {
        fetches: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl AccountSource for FakeAccounts {
        async fn account_info(&self) -> Result<AccountInfo, IcpayError> {
            *self.fetches.lock().unwrap() += 1;
            Ok(AccountInfo {
                id: "acc_1".into(),
                account_canister_id: 258,
                name: None,
                is_live: false,
                is_active: true,
            })
        }

        async fn platform_canister_id(&self) -> Result<Principal, IcpayError> {
            Ok(platform())
        }
    }

    struct FakePrices(Option<f64>);

    #[async_trait::async_trait]
    impl PriceSource for FakePrices {
        async fn price_quote(&self, ledger_id: &Principal) -> Result<PriceQuote, IcpayError> {
            Ok(PriceQuote {
                ledger_id: ledger_id.clone(),
                price: self.0,
                decimals: 8,
                recorded_at: None,
            })
        }
    }

    struct Harness {
        ledger: Arc<FakeLedger>,
        tracker: Arc<FakeTracker>,
        accounts: Arc<FakeAccounts>,
        clock: Arc<ManualClock>,
        events: Arc<Mutex<Vec<String>>>,
        client: IcpayClient,
    }

    fn harness(ledger: FakeLedger, tracker: FakeTracker, price: Option<f64>) -> Harness {
        let ledger = Arc::new(ledger);
        let tracker = Arc::new(tracker);
        let accounts = Arc::new(FakeAccounts::default());
        let clock = Arc::new(ManualClock::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observers = Observers::new().subscribe("*", move |event: &OperationEvent| {
            sink.lock().unwrap().push(event.name());
        });
        let client = IcpayClient::builder(
            ledger.clone(),
            tracker.clone(),
            accounts.clone(),
            Arc::new(FakePrices(price)),
        )
        .with_signer(Arc::new(StaticSigner::new(WalletProvider::Plug, payer())))
        .with_clock(clock.clone())
        .with_retry_policy(RetryPolicy::default().with_max_attempts(3))
        .with_observers(observers)
        .build();
        Harness {
            ledger,
            tracker,
            accounts,
            clock,
            events,
            client,
        }
    }

    fn icp_request(amount: u128) -> PaymentRequest {
        PaymentRequest::base_units(Principal::icp_ledger(), TokenAmount::new(amount))
    }

    #[tokio::test]
    async fn completed_payment_reports_backend_id() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": {"Completed": null}})),
            None,
        );

        let response = h
            .client
            .send_funds(icp_request(10_000_000).with_metadata("orderId", "A-17"))
            .await
            .unwrap();

        assert_eq!(response.transaction_id, TransactionId::from("tx-1"));
        assert_eq!(response.status, TransactionStatus::Completed);
        assert_eq!(response.block_index, BlockIndex(42));
        assert_eq!(response.to, platform());
        assert_eq!(response.metadata["orderId"], "A-17");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["transactionId"], "tx-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["amount"], "10000000");

        let transfers = h.ledger.transfers.lock().unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].1.memo, vec![0x01, 0x02]);
        assert!(h.clock.slept().is_empty());
    }

    #[tokio::test]
    async fn insufficient_balance_aborts_before_the_ledger() {
        let h = harness(
            FakeLedger::new(5_000_000),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );

        let err = h.client.send_funds(icp_request(10_000_000)).await.unwrap_err();
        match &err {
            IcpayError::InsufficientBalance {
                required, available, ..
            } => {
                assert_eq!(*required, TokenAmount::new(10_000_000));
                assert_eq!(*available, TokenAmount::new(5_000_000));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.ledger.transfer_count(), 0);
        assert!(h.events.lock().unwrap().contains(&"send_funds.error".to_owned()));
    }

    #[tokio::test]
    async fn balance_is_checked_on_the_requested_ledger() {
        let ck_btc: Principal = "mxzaz-hqaaa-aaaar-qaada-cai".parse().unwrap();
        let h = harness(
            FakeLedger::new(u128::MAX).with_balance(ck_btc.clone(), 2_000),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": "completed"})),
            None,
        );

        let err = h
            .client
            .send_funds(PaymentRequest::base_units(ck_btc.clone(), TokenAmount::new(5_000)))
            .await
            .unwrap_err();
        match &err {
            IcpayError::InsufficientBalance {
                required,
                available,
                ledger_id,
            } => {
                assert_eq!(*required, TokenAmount::new(5_000));
                assert_eq!(*available, TokenAmount::new(2_000));
                assert_eq!(ledger_id, &ck_btc);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.ledger.transfer_count(), 0);

        let response = h
            .client
            .send_funds(PaymentRequest::base_units(ck_btc.clone(), TokenAmount::new(1_500)))
            .await
            .unwrap();
        assert_eq!(response.ledger_id, ck_btc);
        assert_eq!(h.ledger.transfers.lock().unwrap()[0].0, ck_btc);
    }

    #[tokio::test]
    async fn missing_price_fails_usd_payment() {
        let h = harness(
            FakeLedger::new(u128::MAX),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );
        let err = h
            .client
            .send_funds(PaymentRequest::usd(Principal::icp_ledger(), 100.0))
            .await
            .unwrap_err();
        assert!(matches!(err, IcpayError::PriceNotAvailable { .. }));
        assert_eq!(h.ledger.transfer_count(), 0);
    }

    #[tokio::test]
    async fn usd_payment_converts_with_floor() {
        let h = harness(
            FakeLedger::new(u128::MAX),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": "completed"})),
            Some(3.0),
        );
        let response = h
            .client
            .send_funds(PaymentRequest::usd(Principal::icp_ledger(), 10.0))
            .await
            .unwrap();
        // 10 / 3 * 10^8, floored
        assert_eq!(response.amount, TokenAmount::new(333_333_333));
        assert!(response.usd.is_some());
    }

    #[tokio::test]
    async fn failed_notify_tracks_block_index() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Err(TrackerError::Transport("connection reset".into())))
                .then_record(json!({"id": "42", "status": {"Pending": null}})),
            None,
        );

        let response = h.client.send_funds(icp_request(1_000)).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Pending);
        assert_eq!(response.transaction_id, TransactionId::from("42"));
        assert_eq!(
            *h.tracker.looked_up.lock().unwrap(),
            vec![TransactionId::from("42")]
        );
        let events = h.events.lock().unwrap();
        assert!(events.contains(&"notify_transfer.error".to_owned()));
        assert!(events.contains(&"poll_status.success".to_owned()));
        assert_eq!(events.last().map(String::as_str), Some("send_funds.success"));
    }

    #[tokio::test]
    async fn exhausted_poll_is_pending_not_an_error() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );

        let response = h.client.send_funds(icp_request(1_000)).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Pending);
        assert_eq!(response.transaction_id, TransactionId::from("tx-1"));
        assert_eq!(h.tracker.looked_up.lock().unwrap().len(), 3);
        assert_eq!(h.clock.slept(), vec![Duration::from_secs(2); 2]);
        assert!(h.events.lock().unwrap().contains(&"poll_status.error".to_owned()));
    }

    #[tokio::test]
    async fn unrecognized_status_is_pending() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": {"Refunded": null}})),
            None,
        );
        let response = h.client.send_funds(icp_request(1_000)).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn failed_status_carries_reason() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": {"Failed": "expired"}})),
            None,
        );
        let response = h.client.send_funds(icp_request(1_000)).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Failed);
        assert_eq!(response.failure_reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn ledger_rejection_is_fatal() {
        let mut ledger = FakeLedger::new(50_000_000);
        ledger.reply = Err(LedgerTransferError::TemporarilyUnavailable);
        let h = harness(ledger, FakeTracker::new(Ok("tx-1".into())), None);

        let err = h.client.send_funds(icp_request(1_000)).await.unwrap_err();
        assert!(matches!(err, IcpayError::TransactionFailed { .. }));
        assert!(h.tracker.looked_up.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_is_fetched_once_per_session() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into()))
                .then_record(json!({"id": "tx-1", "status": "completed"}))
                .then_record(json!({"id": "tx-1", "status": "completed"})),
            None,
        );
        h.client.send_funds(icp_request(1)).await.unwrap();
        h.client.send_funds(icp_request(1)).await.unwrap();
        h.client
            .send_funds(icp_request(1).with_account_canister_id(9))
            .await
            .unwrap();
        assert_eq!(*h.accounts.fetches.lock().unwrap(), 1);
        assert_eq!(h.ledger.transfers.lock().unwrap()[2].1.memo, vec![9]);
    }

    #[tokio::test]
    async fn disconnected_wallet_cannot_pay() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );
        assert_eq!(h.client.wallet_address(), Some(payer()));
        h.client.disconnect_wallet().await;
        assert_eq!(h.client.wallet_address(), None);

        let err = h.client.send_funds(icp_request(1)).await.unwrap_err();
        assert!(matches!(err, IcpayError::WalletNotConnected));
        assert!(matches!(
            h.client.balance(&Principal::icp_ledger()).await,
            Err(IcpayError::WalletNotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_requires_a_connector() {
        let h = harness(
            FakeLedger::new(0),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );
        let err = h
            .client
            .connect_wallet(&WalletProvider::InternetIdentity)
            .await
            .unwrap_err();
        assert!(matches!(err, IcpayError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn cancelled_wait_is_pending() {
        let h = harness(
            FakeLedger::new(50_000_000),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = h
            .client
            .await_transaction("tx-1".into(), &cancel)
            .await
            .unwrap();
        assert_eq!(report.status, TransactionStatus::Pending);
        assert!(report.record.is_none());
    }

    #[tokio::test]
    async fn balance_reads_are_repeatable() {
        let h = harness(
            FakeLedger::new(5_000_000),
            FakeTracker::new(Ok("tx-1".into())),
            None,
        );
        let icp = Principal::icp_ledger();
        let first = h.client.balance(&icp).await.unwrap();
        let second = h.client.balance(&icp).await.unwrap();
        assert_eq!(first, TokenAmount::new(5_000_000));
        assert_eq!(first, second);
    }
}
