//! Textual ledger identities.
//!
//! A [`Principal`] identifies a user, canister or ledger on the network. The
//! SDK never decodes principals to bytes; it validates the textual form
//! (dash-separated groups of lowercase base32) and passes it through to the
//! ledger actor and the backend unchanged.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static PRINCIPAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z2-7]{1,5}(-[a-z2-7]{1,5}){0,12}$").expect("Invalid principal regex")
});

/// The ICP ledger canister.
pub const ICP_LEDGER_CANISTER_ID: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

/// A validated textual principal, e.g. `ryjl3-tyaaa-aaaaa-aaaba-cai`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(String);

/// Error returned when a string is not a principal in textual form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid principal {0:?}")]
pub struct PrincipalParseError(pub String);

impl Principal {
    /// The ICP ledger canister principal.
    #[must_use]
    pub fn icp_ledger() -> Self {
        Self(ICP_LEDGER_CANISTER_ID.to_owned())
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Principal {
    type Err = PrincipalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if PRINCIPAL_REGEX.is_match(trimmed) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(PrincipalParseError(s.to_owned()))
        }
    }
}

impl TryFrom<&str> for Principal {
    type Error = PrincipalParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Principal {
    type Error = PrincipalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canister_and_management_principals() {
        assert!("ryjl3-tyaaa-aaaaa-aaaba-cai".parse::<Principal>().is_ok());
        assert!("aaaaa-aa".parse::<Principal>().is_ok());
        assert!("2vxsx-fae".parse::<Principal>().is_ok());
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("".parse::<Principal>().is_err());
        assert!("RYJL3-TYAAA".parse::<Principal>().is_err());
        assert!("ryjl3--tyaaa".parse::<Principal>().is_err());
        assert!("0xdeadbeef".parse::<Principal>().is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let p = Principal::icp_ledger();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"ryjl3-tyaaa-aaaaa-aaaba-cai\"");
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<Principal>("\"not a principal\"").is_err());
    }
}
