//! Operation observers.
//!
//! Every public SDK operation, and every stage of a payment, reports its start,
//! its result and its failure to the registered observers. Observers come in
//! two shapes:
//!
//! - an [`OperationObserver`] implementation, whose methods default to no-ops;
//! - a closure subscribed to an event name on an [`Observers`] registry.
//!
//! Observers run inline and cannot influence the operation they watch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorReport;

/// Names of the operations and stages that emit events.
pub mod methods {
    /// The full payment pipeline.
    pub const SEND_FUNDS: &str = "send_funds";
    /// Amount validation and USD conversion.
    pub const NORMALIZE_AMOUNT: &str = "normalize_amount";
    /// Payer account resolution.
    pub const RESOLVE_ACCOUNT: &str = "resolve_account";
    /// Balance query and coverage check.
    pub const CHECK_BALANCE: &str = "check_balance";
    /// Ledger transfer submission.
    pub const SUBMIT_TRANSFER: &str = "submit_transfer";
    /// Backend notification.
    pub const NOTIFY_TRANSFER: &str = "notify_transfer";
    /// Status polling.
    pub const POLL_STATUS: &str = "poll_status";
    /// Balance queries.
    pub const GET_BALANCES: &str = "get_balances";
    /// Standalone status tracking.
    pub const AWAIT_TRANSACTION: &str = "await_transaction";
    /// Wallet connection.
    pub const CONNECT_WALLET: &str = "connect_wallet";
    /// Wallet disconnection.
    pub const DISCONNECT_WALLET: &str = "disconnect_wallet";
}

/// Lifecycle point of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The operation began.
    Start,
    /// The operation produced a result.
    Success,
    /// The operation failed.
    Error,
}

impl Phase {
    /// The phase's name in event names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEvent {
    /// Operation or stage name, see [`methods`].
    pub method: String,
    /// Lifecycle point.
    pub phase: Phase,
    /// Parameters for `Start`, the result for `Success`, the error report for `Error`.
    pub payload: Value,
}

impl OperationEvent {
    /// The event name closures subscribe to: `"{method}.{phase}"`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.method, self.phase)
    }
}

/// Receives operation lifecycle notifications.
///
/// All methods have default no-op implementations; override the ones you need.
pub trait OperationObserver: Send + Sync {
    /// An operation started with `params`.
    fn method_start(&self, _method: &str, _params: &Value) {}

    /// An operation completed with `result`.
    fn method_success(&self, _method: &str, _result: &Value) {}

    /// An operation failed.
    fn method_error(&self, _method: &str, _error: &ErrorReport) {}
}

type SubscriberFn = dyn Fn(&OperationEvent) + Send + Sync;

/// Phase side of an event-name pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhasePattern {
    Any,
    Only(Phase),
    /// Unknown phase name; matches nothing.
    Unknown,
}

/// Event-name pattern: exact `"send_funds.error"`, or with a `*` on either side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    method: Option<String>,
    phase: PhasePattern,
}

impl Pattern {
    fn parse(event: &str) -> Self {
        let (method, phase) = event.split_once('.').unwrap_or((event, "*"));
        Self {
            method: (method != "*").then(|| method.to_owned()),
            phase: match phase {
                "*" => PhasePattern::Any,
                "start" => PhasePattern::Only(Phase::Start),
                "success" => PhasePattern::Only(Phase::Success),
                "error" => PhasePattern::Only(Phase::Error),
                _ => PhasePattern::Unknown,
            },
        }
    }

    fn matches(&self, method: &str, phase: Phase) -> bool {
        let phase_matches = match self.phase {
            PhasePattern::Any => true,
            PhasePattern::Only(p) => p == phase,
            PhasePattern::Unknown => false,
        };
        phase_matches && self.method.as_deref().is_none_or(|m| m == method)
    }
}

/// Registry of observers, dispatched in registration order.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn OperationObserver>>,
    subscribers: Vec<(Pattern, Arc<SubscriberFn>)>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("observers", &self.observers.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Observers {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty() && self.subscribers.is_empty()
    }

    /// Adds an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl OperationObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Subscribes `callback` to events named `event`.
    ///
    /// `event` is `"{method}.{phase}"`; either side may be `*`, and a bare
    /// method name matches all of its phases.
    #[must_use]
    pub fn subscribe<F>(mut self, event: &str, callback: F) -> Self
    where
        F: Fn(&OperationEvent) + Send + Sync + 'static,
    {
        self.subscribers.push((Pattern::parse(event), Arc::new(callback)));
        self
    }

    fn dispatch(&self, method: &str, phase: Phase, payload: impl FnOnce() -> Value) {
        let mut matching = self
            .subscribers
            .iter()
            .filter(|(pattern, _)| pattern.matches(method, phase))
            .peekable();
        if matching.peek().is_none() {
            return;
        }
        let event = OperationEvent {
            method: method.to_owned(),
            phase,
            payload: payload(),
        };
        for (_, callback) in matching {
            callback(&event);
        }
    }

    pub(crate) fn start(&self, method: &str, params: &Value) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(method, "Operation started");
        for observer in &self.observers {
            observer.method_start(method, params);
        }
        self.dispatch(method, Phase::Start, || params.clone());
    }

    pub(crate) fn success(&self, method: &str, result: &Value) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(method, "Operation succeeded");
        for observer in &self.observers {
            observer.method_success(method, result);
        }
        self.dispatch(method, Phase::Success, || result.clone());
    }

    pub(crate) fn error(&self, method: &str, error: &ErrorReport) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(method, code = %error.code, "Operation failed");
        for observer in &self.observers {
            observer.method_error(method, error);
        }
        self.dispatch(method, Phase::Error, || {
            serde_json::to_value(error).unwrap_or(Value::Null)
        });
    }
}

impl OperationObserver for Observers {
    fn method_start(&self, method: &str, params: &Value) {
        self.start(method, params);
    }

    fn method_success(&self, method: &str, result: &Value) {
        self.success(method, result);
    }

    fn method_error(&self, method: &str, error: &ErrorReport) {
        self.error(method, error);
    }
}
