use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseAddressError;

/// Width of an [`Address`] in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Content address of a chunk: the first [`ADDRESS_LEN`] bytes of the
/// BLAKE3 digest of its data.
///
/// Twenty bytes keep dataset-map entries and closure keys compact while
/// leaving collision resistance far beyond what one database can exhaust.
/// The all-zero value is reserved as the *empty* address, meaning "no
/// chunk"; it is what a fresh store reports as its root and what callers
/// pass as the expected value for a dataset entry they believe absent.
///
/// Addresses order lexicographically. The parents closure relies on this
/// for its `(height, address)` key order, and the dataset-map encodings
/// rely on it for sorted iteration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

/// A set of addresses, as handed to GC as generation roots.
pub type AddressSet = HashSet<Address>;

impl Address {
    /// The reserved "no chunk" address.
    pub const EMPTY: Self = Self([0; ADDRESS_LEN]);

    /// The address of the given chunk data.
    pub fn digest(data: &[u8]) -> Self {
        let full = blake3::hash(data);
        let mut bytes = [0; ADDRESS_LEN];
        bytes.copy_from_slice(&full.as_bytes()[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Returns `true` for the reserved empty address.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Abbreviated rendering for logs and error messages: the first four
    /// bytes, hex-encoded.
    pub fn abbrev(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; ADDRESS_LEN] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr:{}..", self.abbrev())
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason| ParseAddressError {
            input: s.to_string(),
            reason,
        };
        if s.len() != ADDRESS_LEN * 2 {
            return Err(bad("expected 40 hex characters"));
        }
        let decoded = hex::decode(s).map_err(|_| bad("not hexadecimal"))?;
        let mut bytes = [0; ADDRESS_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}
