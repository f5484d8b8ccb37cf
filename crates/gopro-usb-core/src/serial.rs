//! Camera serial extraction and USB network address derivation
//!
//! A camera advertises itself with an mDNS instance name that embeds its 14
//! character serial number, e.g. `GoPro-C3601370011883`. The last three digits of
//! that serial select the camera's address on its USB network.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

/// Length of a camera serial number
pub const SERIAL_LEN: usize = 14;

/// Address returned when discovery gives up and the caller opted into a fallback
pub const FALLBACK_ADDRESS: &str = "172.28.183.51";

/// A 14 character uppercase alphanumeric camera serial
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialToken(String);

impl SerialToken {
    /// Create a serial token, checking length and alphabet
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.len() == SERIAL_LEN && value.bytes().all(is_serial_byte) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidSerial(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The three trailing characters used for address derivation
    pub fn suffix(&self) -> &str {
        &self.0[SERIAL_LEN - 3..]
    }
}

impl TryFrom<String> for SerialToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SerialToken> for String {
    fn from(token: SerialToken) -> Self {
        token.0
    }
}

impl fmt::Display for SerialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_serial_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit()
}

/// Address of a camera on its USB network, shaped `172.2X.1YZ.51`
///
/// The characters are substituted verbatim, so a serial ending in letters yields
/// a string that does not parse as IPv4. Use [`DerivedAddress::to_ipv4`] to check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedAddress(String);

impl DerivedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse as IPv4, `None` when the serial suffix was not numeric
    pub fn to_ipv4(&self) -> Option<Ipv4Addr> {
        self.0.parse().ok()
    }
}

impl fmt::Display for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map a serial to its camera address
pub fn derive_address(serial: &SerialToken) -> DerivedAddress {
    // SerialToken guarantees 14 ASCII characters
    let suffix = serial.suffix().as_bytes();
    let (x, y, z) = (suffix[0] as char, suffix[1] as char, suffix[2] as char);
    DerivedAddress(format!("172.2{x}.1{y}{z}.51"))
}

/// Rule for pulling a serial out of an advertisement name
///
/// Kept behind a trait so a future naming convention can be swapped in without
/// touching the discovery session.
pub trait SerialMatcher: Send + Sync {
    fn extract(&self, name: &str) -> Option<SerialToken>;
}

/// Matches the first run of uppercase letters and digits that is exactly 14 long
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLengthMatcher;

fn serial_runs() -> &'static Regex {
    static RUNS: OnceLock<Regex> = OnceLock::new();
    RUNS.get_or_init(|| Regex::new("[A-Z0-9]+").expect("serial run pattern is valid"))
}

impl SerialMatcher for RunLengthMatcher {
    fn extract(&self, name: &str) -> Option<SerialToken> {
        serial_runs()
            .find_iter(name)
            .map(|m| m.as_str())
            .find(|run| run.len() == SERIAL_LEN)
            .map(|run| SerialToken(run.to_string()))
    }
}

/// Extract a serial with the default [`RunLengthMatcher`]
pub fn extract_serial(name: &str) -> Option<SerialToken> {
    RunLengthMatcher.extract(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefixed_name() {
        let serial = extract_serial("GoPro-C3601370011883").unwrap();
        assert_eq!(serial.as_str(), "C3601370011883");
    }

    #[test]
    fn test_extract_bare_serial() {
        let serial = extract_serial("C3601370011883").unwrap();
        assert_eq!(serial.as_str(), "C3601370011883");
    }

    #[test]
    fn test_extract_no_match() {
        assert!(extract_serial("GoPro-short").is_none());
        assert!(extract_serial("").is_none());
        // lowercase is not normalised
        assert!(extract_serial("gopro-c3601370011883").is_none());
    }

    #[test]
    fn test_extract_requires_exact_run_length() {
        assert!(extract_serial("GoPro C360137001188").is_none());
        assert!(extract_serial("GoPro C36013700118833").is_none());
    }

    #[test]
    fn test_extract_first_of_several() {
        let serial = extract_serial("AAAAAAAAAAAAAAA C3601370011883 C3601370011999").unwrap();
        assert_eq!(serial.as_str(), "C3601370011883");
    }

    #[test]
    fn test_derive_address() {
        let serial = SerialToken::new("C3601370011883").unwrap();
        let address = derive_address(&serial);
        assert_eq!(address.as_str(), "172.28.183.51");
        assert_eq!(address.to_ipv4(), Some(Ipv4Addr::new(172, 28, 183, 51)));
    }

    #[test]
    fn test_derive_address_non_numeric_suffix() {
        let serial = SerialToken::new("C36013700118AB").unwrap();
        let address = derive_address(&serial);
        assert_eq!(address.as_str(), "172.28.1AB.51");
        assert!(address.to_ipv4().is_none());
    }

    #[test]
    fn test_serial_token_validation() {
        assert!(SerialToken::new("C3601370011883").is_ok());
        assert!(SerialToken::new("c3601370011883").is_err());
        assert!(SerialToken::new("C360137001188").is_err());
    }

    #[test]
    fn test_serial_token_serde() {
        let json = serde_json::to_string(&SerialToken::new("C3601370011883").unwrap()).unwrap();
        assert_eq!(json, "\"C3601370011883\"");
        assert!(serde_json::from_str::<SerialToken>("\"short\"").is_err());
    }
}
