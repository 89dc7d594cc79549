//! Wallet connections.
//!
//! Each wallet provider is wrapped in a [`Signer`] when it connects, so the
//! rest of the SDK asks one uniform question ("who is paying?") instead of
//! inspecting provider-specific objects. A [`WalletConnector`] performs the
//! provider handshake and the [`WalletSlot`] holds the active signer for the
//! session.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IcpayError;
use crate::principal::Principal;

/// A wallet provider the SDK can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WalletProvider {
    /// Internet Identity.
    InternetIdentity,
    /// The Plug browser extension.
    Plug,
    /// The OISY wallet.
    Oisy,
    /// NFID.
    Nfid,
    /// Any other provider, by id.
    Custom(String),
}

impl WalletProvider {
    /// Returns the provider id used on the wire.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::InternetIdentity => "ii",
            Self::Plug => "plug",
            Self::Oisy => "oisy",
            Self::Nfid => "nfid",
            Self::Custom(id) => id,
        }
    }
}

impl FromStr for WalletProvider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ii" | "internet-identity" | "internetidentity" => Self::InternetIdentity,
            "plug" => Self::Plug,
            "oisy" => Self::Oisy,
            "nfid" => Self::Nfid,
            _ => Self::Custom(s.to_owned()),
        })
    }
}

impl fmt::Display for WalletProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for WalletProvider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for WalletProvider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(provider) = s.parse::<Self>();
        Ok(provider)
    }
}

/// A connected wallet able to authorize ledger transfers.
#[async_trait::async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    /// The provider this signer came from.
    fn provider(&self) -> &WalletProvider;

    /// The signer's ledger identity, or `None` once disconnected.
    fn identity(&self) -> Option<Principal>;

    /// Whether the signer can still authorize transfers.
    fn is_connected(&self) -> bool {
        self.identity().is_some()
    }

    /// Ends the provider session.
    async fn disconnect(&self) {}
}

/// Performs the provider handshake and produces a [`Signer`].
#[async_trait::async_trait]
pub trait WalletConnector: Send + Sync {
    /// Connects to `provider`.
    async fn connect(&self, provider: &WalletProvider) -> Result<Arc<dyn Signer>, IcpayError>;
}

/// Outcome of a connection attempt, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
    /// Provider that was connected.
    pub provider: WalletProvider,
    /// Identity reported by the provider.
    pub identity: Option<Principal>,
    /// Whether the signer is usable.
    pub connected: bool,
}

impl WalletConnection {
    /// Describes the state of `signer`.
    #[must_use]
    pub fn of(signer: &dyn Signer) -> Self {
        Self {
            provider: signer.provider().clone(),
            identity: signer.identity(),
            connected: signer.is_connected(),
        }
    }
}

/// A signer whose identity is fixed when it is created.
///
/// Suits backends that hold their own key and tests.
#[derive(Debug)]
pub struct StaticSigner {
    provider: WalletProvider,
    identity: Principal,
    connected: AtomicBool,
}

impl StaticSigner {
    /// Creates a connected signer for `identity`.
    #[must_use]
    pub const fn new(provider: WalletProvider, identity: Principal) -> Self {
        Self {
            provider,
            identity,
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait::async_trait]
impl Signer for StaticSigner {
    fn provider(&self) -> &WalletProvider {
        &self.provider
    }

    fn identity(&self) -> Option<Principal> {
        self.connected
            .load(Ordering::Acquire)
            .then(|| self.identity.clone())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Holds the session's active signer.
#[derive(Debug, Default)]
pub struct WalletSlot {
    signer: RwLock<Option<Arc<dyn Signer>>>,
}

impl WalletSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `signer`, returning the one it replaces.
    pub fn set(&self, signer: Arc<dyn Signer>) -> Option<Arc<dyn Signer>> {
        let mut guard = self
            .signer
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.replace(signer)
    }

    /// Removes the active signer.
    pub fn take(&self) -> Option<Arc<dyn Signer>> {
        let mut guard = self
            .signer
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.take()
    }

    /// Returns the active signer, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Signer>> {
        self.signer
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Resolves the connected identity.
    ///
    /// # Errors
    ///
    /// Returns [`IcpayError::WalletNotConnected`] when no signer is installed
    /// or the installed one has disconnected.
    pub fn identity(&self) -> Result<Principal, IcpayError> {
        self.current()
            .filter(|signer| signer.is_connected())
            .and_then(|signer| signer.identity())
            .ok_or(IcpayError::WalletNotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payer() -> Principal {
        "2vxsx-fae".parse().unwrap()
    }

    #[test]
    fn provider_ids_round_trip() {
        for id in ["ii", "plug", "oisy", "nfid", "metamask"] {
            let provider: WalletProvider = id.parse().unwrap();
            assert_eq!(provider.id(), id);
        }
        let json = serde_json::to_string(&WalletProvider::InternetIdentity).unwrap();
        assert_eq!(json, "\"ii\"");
    }

    #[test]
    fn empty_slot_reports_not_connected() {
        let slot = WalletSlot::new();
        assert!(matches!(slot.identity(), Err(IcpayError::WalletNotConnected)));
    }

    #[tokio::test]
    async fn disconnected_signer_has_no_identity() {
        let slot = WalletSlot::new();
        let signer = Arc::new(StaticSigner::new(WalletProvider::Plug, payer()));
        slot.set(signer.clone());
        assert_eq!(slot.identity().unwrap(), payer());

        signer.disconnect().await;
        assert!(!signer.is_connected());
        assert!(matches!(slot.identity(), Err(IcpayError::WalletNotConnected)));
        assert!(!WalletConnection::of(signer.as_ref()).connected);
    }
}
