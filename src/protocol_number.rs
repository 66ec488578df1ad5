use std::fmt;
use std::str::FromStr;

use crate::{PROTOCOLS, ProtocolEntry};

/// An 8-bit IP protocol number, as carried in the IPv4 `Protocol` field and
/// the IPv6 `Next Header` field.
///
/// Names are resolved through the global [`PROTOCOLS`] registry, so they
/// follow any dataset override.
///
/// # Examples
///
/// ```
/// use ip_protocols::{ProtocolNumber, TCP};
///
/// assert_eq!(TCP.value(), 6);
/// assert_eq!(TCP.keyword().as_deref(), Some("TCP"));
/// assert_eq!(TCP.to_string(), "TCP");
///
/// let udp: ProtocolNumber = "udp".parse().unwrap();
/// assert_eq!(udp.value(), 17);
///
/// // Numbers without a keyword display as decimal.
/// assert_eq!(ProtocolNumber::new(200).to_string(), "200");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolNumber(u8);

impl ProtocolNumber {
    /// Creates a protocol number from its raw value.
    pub const fn new(value: u8) -> Self { Self(value) }

    /// Returns the raw 8-bit value.
    pub const fn value(&self) -> u8 { self.0 }

    /// The registry entry owning this number.
    pub fn entry(&self) -> Option<ProtocolEntry> {
        crate::lookup_by_number(self.0.into())
    }

    /// The registry keyword, e.g. `"TCP"`.
    pub fn keyword(&self) -> Option<String> {
        crate::lookup_keyword(self.0.into())
    }

    /// The registry long name, e.g. `"Transmission Control"`.
    pub fn protocol_name(&self) -> Option<String> {
        crate::lookup_protocol_name(self.0.into())
    }

    /// Returns true if the registry marks this number as an IPv6 extension
    /// header.
    pub fn is_ipv6_extension_header(&self) -> bool {
        self.entry()
            .is_some_and(|entry| entry.is_ipv6_extension_header())
    }
}

impl From<u8> for ProtocolNumber {
    fn from(value: u8) -> Self { Self(value) }
}

impl From<ProtocolNumber> for u8 {
    fn from(number: ProtocolNumber) -> Self { number.0 }
}

impl fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keyword() {
            Some(keyword) => f.write_str(&keyword),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Error returned when a string names no known protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown IP protocol {0:?}")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolNumber {
    type Err = UnknownProtocol;

    /// Accepts a decimal number, a keyword, or a long protocol name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.trim().parse::<u8>() {
            return Ok(Self(value));
        }
        PROTOCOLS
            .get()
            .and_then(|store| store.number_named(s))
            .and_then(|number| u8::try_from(number).ok())
            .map(Self)
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}
