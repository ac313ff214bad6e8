//! Call identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one call session, as assigned by the upstream provider.
///
/// A missing identifier is represented by [`CallId::UNKNOWN`] rather than
/// `Option`, so every event always carries a `callId` on the wire.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Sentinel used when the provider omits the call identifier.
    pub const UNKNOWN: &'static str = "unknown";

    /// Wrap a raw identifier.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The sentinel id.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_owned())
    }

    /// Build from an optional raw value, falling back to the sentinel
    /// for `None` and empty strings.
    pub fn or_unknown(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if !s.is_empty() => Self::from_raw(s),
            _ => Self::unknown(),
        }
    }

    /// Whether this is the sentinel id.
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CallId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
