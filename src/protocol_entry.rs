use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a range ends before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("protocol range end {end} precedes start {start}")]
pub struct InvertedRange {
    /// The requested first number.
    pub start: u32,
    /// The requested last number.
    pub end: u32,
}

/// One row of the protocol numbers registry.
///
/// A row is assigned either a single protocol number or an inclusive range of
/// numbers (for example the `148-252` "Unassigned" block). For a single value
/// `range_start() == range_end()`.
///
/// # Examples
///
/// ```
/// use ip_protocols::ProtocolEntry;
///
/// let tcp = ProtocolEntry::new(6, 6, "TCP", "Transmission Control", "", "[RFC9293]");
/// assert_eq!(tcp.keyword(), "TCP");
/// assert!(tcp.contains(6));
/// assert!(!tcp.is_range());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "EntryFields")
)]
pub struct ProtocolEntry {
    range_start: u32,
    range_end: u32,
    keyword: String,
    protocol: String,
    ipv6_extension_header: String,
    reference: String,
}

impl ProtocolEntry {
    /// Creates an entry covering `range_start..=range_end`.
    ///
    /// # Panics
    ///
    /// Panics if `range_end < range_start`.
    pub fn new(
        range_start: u32,
        range_end: u32,
        keyword: impl Into<String>,
        protocol: impl Into<String>,
        ipv6_extension_header: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        match Self::try_new(
            range_start,
            range_end,
            keyword,
            protocol,
            ipv6_extension_header,
            reference,
        ) {
            Ok(entry) => entry,
            Err(error) => panic!("{}", error),
        }
    }

    /// Creates an entry covering `range_start..=range_end`, failing if the
    /// range is inverted.
    ///
    /// # Examples
    ///
    /// ```
    /// use ip_protocols::{InvertedRange, ProtocolEntry};
    ///
    /// assert!(ProtocolEntry::try_new(148, 252, "", "Unassigned", "", "").is_ok());
    /// assert_eq!(
    ///     ProtocolEntry::try_new(252, 148, "", "", "", ""),
    ///     Err(InvertedRange { start: 252, end: 148 })
    /// );
    /// ```
    pub fn try_new(
        range_start: u32,
        range_end: u32,
        keyword: impl Into<String>,
        protocol: impl Into<String>,
        ipv6_extension_header: impl Into<String>,
        reference: impl Into<String>,
    ) -> Result<Self, InvertedRange> {
        if range_end < range_start {
            return Err(InvertedRange { start: range_start, end: range_end });
        }
        Ok(Self {
            range_start,
            range_end,
            keyword: keyword.into(),
            protocol: protocol.into(),
            ipv6_extension_header: ipv6_extension_header.into(),
            reference: reference.into(),
        })
    }

    /// The first protocol number covered by this entry.
    pub fn range_start(&self) -> u32 { self.range_start }

    /// The last protocol number covered by this entry (inclusive).
    pub fn range_end(&self) -> u32 { self.range_end }

    /// The short name from the `Keyword` column, e.g. `"TCP"`. May be empty.
    pub fn keyword(&self) -> &str { &self.keyword }

    /// The long name from the `Protocol` column, e.g. `"Transmission
    /// Control"`. May be empty.
    pub fn protocol(&self) -> &str { &self.protocol }

    /// The raw `IPv6 Extension Header` column, usually `"Y"` or empty.
    pub fn ipv6_extension_header(&self) -> &str { &self.ipv6_extension_header }

    /// The raw `Reference` column.
    pub fn reference(&self) -> &str { &self.reference }

    /// Returns true if `number` falls inside this entry's range.
    pub fn contains(&self, number: u32) -> bool {
        (self.range_start..=self.range_end).contains(&number)
    }

    /// Returns true if this entry spans more than one protocol number.
    pub fn is_range(&self) -> bool { self.range_start != self.range_end }

    /// Returns true if the registry marks this protocol as an IPv6
    /// extension header.
    pub fn is_ipv6_extension_header(&self) -> bool {
        self.ipv6_extension_header.eq_ignore_ascii_case("y")
    }
}

/// Unchecked field layout that deserialization goes through.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct EntryFields {
    range_start: u32,
    range_end: u32,
    keyword: String,
    protocol: String,
    ipv6_extension_header: String,
    reference: String,
}

#[cfg(feature = "serde")]
impl TryFrom<EntryFields> for ProtocolEntry {
    type Error = InvertedRange;

    fn try_from(fields: EntryFields) -> Result<Self, Self::Error> {
        Self::try_new(
            fields.range_start,
            fields.range_end,
            fields.keyword,
            fields.protocol,
            fields.ipv6_extension_header,
            fields.reference,
        )
    }
}

impl fmt::Display for ProtocolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_range() {
            write!(f, "{}-{}", self.range_start, self.range_end)?;
        } else {
            write!(f, "{}", self.range_start)?;
        }
        match (self.keyword.is_empty(), self.protocol.is_empty()) {
            (false, false) => write!(f, " {} ({})", self.keyword, self.protocol),
            (false, true) => write!(f, " {}", self.keyword),
            (true, false) => write!(f, " ({})", self.protocol),
            (true, true) => Ok(()),
        }
    }
}
