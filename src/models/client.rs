use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Identity of a requester, derived from forwarding headers or the peer
/// address. Advisory only: the headers it comes from are client-controlled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Shared identity for every client whose address could not be derived.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
