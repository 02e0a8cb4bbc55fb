use thiserror::Error;

/// Failure to parse the textual form of an address.
///
/// Produced by `Address`'s `FromStr` impl. The offending input is echoed
/// back so callers relaying user-supplied addresses (CLI arguments,
/// config values) can say which operand was bad.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("bad address {input:?}: {reason}")]
pub struct ParseAddressError {
    pub input: String,
    pub reason: &'static str,
}
