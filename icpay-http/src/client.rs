//! A client for the ICPay payment API.
//!
//! [`PaymentApiClient`] reads account, ledger, price and history data over
//! JSON HTTP, and implements [`AccountSource`] and [`PriceSource`] so it can
//! back an [`IcpayClient`](icpay::IcpayClient).
//!
//! ## Features
//!
//! - Uses `reqwest` for async HTTP requests
//! - Secret-key or publishable-key authentication
//! - Caches the verified ledger list with a configurable TTL
//! - Integrates with `tracing` if the `telemetry` feature is enabled

use std::fmt::Display;
use std::time::{Duration, Instant};

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use icpay::amount::PriceQuote;
use icpay::config::{ApiCredentials, IcpayConfig};
use icpay::principal::Principal;
use icpay::sources::{AccountInfo, AccountSource, PriceSource};
use icpay::tracking::TransactionRecord;
use icpay::IcpayError;
use reqwest::Client;
use tokio::sync::RwLock;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::constants::{ACCOUNT_ID_HEADER, PUBLIC_KEY_HEADER};
use crate::error::ApiClientError;
use crate::types::{HistoryQuery, LedgerPrice, Page, PaymentRecord, PlatformInfo, VerifiedLedger};

#[derive(Clone, Debug)]
struct LedgerCacheState {
    ledgers: Vec<VerifiedLedger>,
    expires_at: Instant,
}

/// A TTL cache for the verified ledger list.
///
/// Each clone has an independent cache state.
#[derive(Debug)]
pub struct LedgerCache {
    ttl: Duration,
    state: RwLock<Option<LedgerCacheState>>,
}

impl LedgerCache {
    /// Creates a new cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached list if still fresh.
    pub async fn get(&self) -> Option<Vec<VerifiedLedger>> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        (Instant::now() < cache.expires_at).then(|| cache.ledgers.clone())
    }

    /// Stores a list with the configured TTL.
    pub async fn set(&self, ledgers: Vec<VerifiedLedger>) {
        let mut guard = self.state.write().await;
        *guard = Some(LedgerCacheState {
            ledgers,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Clears the cache.
    pub async fn clear(&self) {
        *self.state.write().await = None;
    }
}

impl Clone for LedgerCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// A client for the ICPay payment API.
#[derive(Clone, Debug)]
pub struct PaymentApiClient {
    /// Base URL, always ending in `/`.
    base_url: Url,
    client: Client,
    /// Authentication and custom headers sent with each request.
    headers: HeaderMap,
    timeout: Option<Duration>,
    ledger_cache: LedgerCache,
}

impl PaymentApiClient {
    /// Default TTL of the verified ledger list (5 minutes).
    pub const DEFAULT_LEDGER_CACHE_TTL: Duration = Duration::from_secs(300);

    /// Constructs a client for `base_url` without credentials.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
            ledger_cache: LedgerCache::new(Self::DEFAULT_LEDGER_CACHE_TTL),
        }
    }

    /// Constructs a client from the API URL, credentials and timeout of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the URL or a credential is malformed.
    pub fn from_config(config: &IcpayConfig) -> Result<Self, ApiClientError> {
        let mut client = Self::try_from(config.api_url.as_str())?;
        if let Some(credentials) = &config.credentials {
            client = client.with_credentials(credentials)?;
        }
        if let Some(timeout) = config.request_timeout() {
            client = client.with_timeout(timeout);
        }
        Ok(client)
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the headers sent with every request.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the ledger cache.
    #[must_use]
    pub const fn ledger_cache(&self) -> &LedgerCache {
        &self.ledger_cache
    }

    /// Authenticates all future requests with `credentials`.
    ///
    /// A secret key is sent as a bearer token, with the account id in its own
    /// header. A publishable key is sent in the public-key header.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::InvalidHeader`] if a value is not a valid header.
    pub fn with_credentials(mut self, credentials: &ApiCredentials) -> Result<Self, ApiClientError> {
        match credentials {
            ApiCredentials::Secret {
                secret_key,
                account_id,
            } => {
                let mut bearer = header_value(&format!("Bearer {secret_key}"), "Authorization")?;
                bearer.set_sensitive(true);
                self.headers.insert(http::header::AUTHORIZATION, bearer);
                if let Some(account_id) = account_id {
                    self.headers.insert(
                        HeaderName::from_static(ACCOUNT_ID_HEADER),
                        header_value(account_id, ACCOUNT_ID_HEADER)?,
                    );
                }
            }
            ApiCredentials::Publishable { publishable_key } => {
                self.headers.insert(
                    HeaderName::from_static(PUBLIC_KEY_HEADER),
                    header_value(publishable_key, PUBLIC_KEY_HEADER)?,
                );
            }
        }
        Ok(self)
    }

    /// Adds custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL of the verified ledger cache.
    #[must_use]
    pub fn with_ledger_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ledger_cache = LedgerCache::new(ttl);
        self
    }

    /// Disables the verified ledger cache.
    #[must_use]
    pub fn without_ledger_cache(self) -> Self {
        self.with_ledger_cache_ttl(Duration::ZERO)
    }

    fn endpoint(&self, path: &str, context: &'static str) -> Result<Url, ApiClientError> {
        self.base_url
            .join(path)
            .map_err(|source| ApiClientError::UrlParse { context, source })
    }

    /// Sends `GET accounts/info`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.account_info", skip_all, fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn account_info(&self) -> Result<AccountInfo, ApiClientError> {
        let url = self.endpoint("accounts/info", "Failed to construct accounts/info URL")?;
        self.get_json(url, "GET /accounts/info", None::<&()>).await
    }

    /// Sends `GET platform` and returns the payment destination.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.platform", skip_all, fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn platform_canister_id(&self) -> Result<Principal, ApiClientError> {
        let url = self.endpoint("platform", "Failed to construct platform URL")?;
        let info: PlatformInfo = self.get_json(url, "GET /platform", None::<&()>).await?;
        Ok(info.platform_canister_id)
    }

    /// Sends `GET ledgers/verified`, bypassing the cache.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.verified_ledgers", skip_all, fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    async fn verified_ledgers_inner(&self) -> Result<Vec<VerifiedLedger>, ApiClientError> {
        let url = self.endpoint("ledgers/verified", "Failed to construct ledgers/verified URL")?;
        self.get_json(url, "GET /ledgers/verified", None::<&()>).await
    }

    /// Returns the ledgers payments are accepted on.
    ///
    /// Results are cached with a configurable TTL (default: 5 minutes).
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    pub async fn verified_ledgers(&self) -> Result<Vec<VerifiedLedger>, ApiClientError> {
        if let Some(ledgers) = self.ledger_cache.get().await {
            return Ok(ledgers);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!("icpay.api.ledger_cache_miss");

        let ledgers = self.verified_ledgers_inner().await?;
        self.ledger_cache.set(ledgers.clone()).await;
        Ok(ledgers)
    }

    /// Sends `GET ledgers/{canister}/price`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails. A ledger without a
    /// price record answers `404`.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.ledger_price", skip_all, fields(ledger_id = %ledger_id, otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn ledger_price(&self, ledger_id: &Principal) -> Result<LedgerPrice, ApiClientError> {
        let url = self.endpoint(
            &format!("ledgers/{ledger_id}/price"),
            "Failed to construct ledger price URL",
        )?;
        self.get_json(url, "GET /ledgers/{id}/price", None::<&()>).await
    }

    /// Sends `GET transactions/history`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.transaction_history", skip_all, fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn transaction_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Page<TransactionRecord>, ApiClientError> {
        let url = self.endpoint("transactions/history", "Failed to construct transactions/history URL")?;
        self.get_json(url, "GET /transactions/history", Some(query)).await
    }

    /// Sends `GET payments/history`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.payment_history", skip_all, fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn payment_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Page<PaymentRecord>, ApiClientError> {
        let url = self.endpoint("payments/history", "Failed to construct payments/history URL")?;
        self.get_json(url, "GET /payments/history", Some(query)).await
    }

    /// Sends `GET payments/{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "icpay.api.payment", skip_all, fields(payment_id = %payment_id, otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty), err)
    )]
    pub async fn payment(&self, payment_id: &str) -> Result<PaymentRecord, ApiClientError> {
        let mut url = self.endpoint("payments/", "Failed to construct payments URL")?;
        url.path_segments_mut()
            .map_err(|()| ApiClientError::UrlParse {
                context: "Base URL cannot have path segments",
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .pop_if_empty()
            .push(payment_id);
        self.get_json(url, "GET /payments/{id}", None::<&()>).await
    }

    /// Generic GET helper that handles query encoding, error mapping,
    /// timeout application, and telemetry integration.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages.
    async fn get_json<Q, R>(
        &self,
        url: Url,
        context: &'static str,
        query: Option<&Q>,
    ) -> Result<R, ApiClientError>
    where
        Q: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.get(url).headers(self.headers.clone());
        if let Some(query) = query {
            req = req.query(query);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| ApiClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| ApiClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| ApiClientError::ResponseBodyRead { context, source: e })?;
            Err(ApiClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

fn header_value(value: &str, context: &'static str) -> Result<HeaderValue, ApiClientError> {
    HeaderValue::from_str(value).map_err(|_| ApiClientError::InvalidHeader { context })
}

/// Parses a base URL, normalizing it to end with exactly one `/`.
impl TryFrom<&str> for PaymentApiClient {
    type Error = ApiClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| ApiClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Ok(Self::new(url))
    }
}

#[async_trait::async_trait]
impl AccountSource for PaymentApiClient {
    async fn account_info(&self) -> Result<AccountInfo, IcpayError> {
        Self::account_info(self)
            .await
            .map_err(|e| IcpayError::account_info(e.to_string()))
    }

    async fn platform_canister_id(&self) -> Result<Principal, IcpayError> {
        Self::platform_canister_id(self)
            .await
            .map_err(|e| IcpayError::account_info(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PriceSource for PaymentApiClient {
    /// Fetches the price; decimals missing from the price record are taken
    /// from the verified ledger list.
    async fn price_quote(&self, ledger_id: &Principal) -> Result<PriceQuote, IcpayError> {
        let price = self.ledger_price(ledger_id).await?;
        if let Some(decimals) = price.decimals {
            return Ok(price.into_quote(decimals));
        }
        let ledgers = self.verified_ledgers().await?;
        let decimals = ledgers
            .iter()
            .find(|l| &l.canister_id == ledger_id)
            .map(|l| l.decimals)
            .ok_or_else(|| IcpayError::PriceNotAvailable {
                ledger_id: ledger_id.clone(),
            })?;
        Ok(price.into_quote(decimals))
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to payment API failed");
        }
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use icpay::tracking::TransactionStatus;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn icp() -> Principal {
        Principal::icp_ledger()
    }

    fn ledgers_body() -> serde_json::Value {
        json!([{
            "id": "l1",
            "name": "Internet Computer",
            "symbol": "ICP",
            "canisterId": "ryjl3-tyaaa-aaaaa-aaaba-cai",
            "decimals": 8,
        }])
    }

    async fn client_for(server: &MockServer) -> PaymentApiClient {
        PaymentApiClient::try_from(server.uri().as_str()).unwrap()
    }

    #[tokio::test]
    async fn secret_credentials_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/info"))
            .and(header("authorization", "Bearer sk_test_1"))
            .and(header(ACCOUNT_ID_HEADER, "acc_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "acc_1",
                "accountCanisterId": 258,
                "name": "Shop",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server)
            .await
            .with_credentials(&ApiCredentials::Secret {
                secret_key: "sk_test_1".into(),
                account_id: Some("acc_1".into()),
            })
            .unwrap();
        let info = client.account_info().await.unwrap();
        assert_eq!(info.account_canister_id, 258);
        assert_eq!(info.name.as_deref(), Some("Shop"));
    }

    #[tokio::test]
    async fn publishable_key_uses_public_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform"))
            .and(header(PUBLIC_KEY_HEADER, "pk_test_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"platformCanisterId": "aaaaa-aa"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server)
            .await
            .with_credentials(&ApiCredentials::Publishable {
                publishable_key: "pk_test_1".into(),
            })
            .unwrap();
        let id = AccountSource::platform_canister_id(&client).await.unwrap();
        assert_eq!(id.as_str(), "aaaaa-aa");
    }

    #[tokio::test]
    async fn verified_ledgers_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ledgers/verified"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ledgers_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let first = client.verified_ledgers().await.unwrap();
        let second = client.verified_ledgers().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].canister_id, icp());
    }

    #[tokio::test]
    async fn disabled_cache_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ledgers/verified"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ledgers_body()))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await.without_ledger_cache();
        client.verified_ledgers().await.unwrap();
        client.verified_ledgers().await.unwrap();
    }

    #[tokio::test]
    async fn price_quote_takes_decimals_from_ledger_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ledgers/ryjl3-tyaaa-aaaaa-aaaba-cai/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "canisterId": "ryjl3-tyaaa-aaaaa-aaaba-cai",
                "price": 4.2,
                "priceUpdatedAt": "2026-03-01T00:00:00Z",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ledgers/verified"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ledgers_body()))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let quote = client.price_quote(&icp()).await.unwrap();
        assert_eq!(quote.decimals, 8);
        assert_eq!(quote.price, Some(4.2));
        assert!(quote.recorded_at.is_some());
    }

    #[tokio::test]
    async fn missing_price_maps_to_api_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ledgers/ryjl3-tyaaa-aaaaa-aaaba-cai/price"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no price"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.price_quote(&icp()).await.unwrap_err();
        assert!(matches!(
            err,
            IcpayError::Api {
                status: Some(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn history_is_paginated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/history"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactions": [
                    {"id": 7, "status": {"Completed": null}, "amount": "100"},
                    {"id": "8", "status": "pending"},
                ],
                "total": 10,
                "hasMore": true,
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let page = client
            .transaction_history(&HistoryQuery::default().with_limit(2).with_offset(4))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].normalized_status(), TransactionStatus::Completed);
        assert_eq!(page.items[1].id.as_str(), "8");
    }

    #[tokio::test]
    async fn payment_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pay_1",
                "status": "completed",
                "amount": "100000",
                "transactionId": 12,
                "createdAt": "2026-02-02T10:00:00Z",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let payment = client.payment("pay_1").await.unwrap();
        assert_eq!(payment.transaction_id.unwrap().as_str(), "12");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let client = PaymentApiClient::try_from("http://127.0.0.1:9").unwrap();
        let err: IcpayError = client.account_info().await.unwrap_err().into();
        assert_eq!(err.code(), icpay::ErrorCode::NetworkError);
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = PaymentApiClient::try_from("https://api.icpay.org/sdk").unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.icpay.org/sdk/");
    }
}
