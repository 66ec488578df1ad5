//! IP Protocols: bidirectional lookup of IANA-assigned IP protocol numbers.
//!
//! This crate maps the 8-bit protocol numbers carried in the IPv4 `Protocol`
//! field and the IPv6 `Next Header` field to their registered keywords and
//! long names, and back again. The data comes from the IANA [Assigned
//! Internet Protocol Numbers][iana] registry, which ships embedded in the
//! crate as CSV.
//!
//! # Basic Usage
//!
//! ```rust
//! use ip_protocols::{lookup_decimal, lookup_keyword, lookup_protocol_name, TCP};
//!
//! assert_eq!(lookup_keyword(6).as_deref(), Some("TCP"));
//! assert_eq!(lookup_protocol_name(6).as_deref(), Some("Transmission Control"));
//!
//! // Names resolve case-insensitively, by keyword or by long name.
//! assert_eq!(lookup_decimal("tcp"), Some(6));
//! assert_eq!(lookup_decimal("transmission   control"), Some(6));
//!
//! // Well-known numbers are available as constants.
//! assert_eq!(TCP.value(), 6);
//! ```
//!
//! # Lazy Loading
//!
//! On first access to [`PROTOCOLS`] (directly or through any lookup
//! function) the embedded dataset is parsed once and indexed by number
//! (ranges such as `148-252` are expanded), by keyword, and by long name.
//! If that parse fails the failure is cached and every lookup returns
//! `None`.
//!
//! # Overriding the Dataset
//!
//! A newer copy of the registry can replace the embedded one at runtime:
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! ip_protocols::load_from_file(Path::new("protocol-numbers-1.csv"))?;
//! ```
//!
//! The replacement is parsed first and then swapped in whole, so concurrent
//! lookups see either the old data or the new data, never a mix. A failed
//! override leaves the registry empty until the next successful load or a
//! [`LazyProtocols::reset`].
//!
//! To load something other than the embedded data on first access, call
//! [`set_registry_config`] before any lookup.
//!
//! [iana]: https://www.iana.org/assignments/protocol-numbers/

mod protocol_entry;
pub use protocol_entry::{InvertedRange, ProtocolEntry};

mod protocol_number;
pub use protocol_number::{ProtocolNumber, UnknownProtocol};

mod protocol_store;
pub use protocol_store::ProtocolStore;

mod protocols_registry;
pub use protocols_registry::*;

mod csv_loader;
pub use csv_loader::{
    ConfigError, CsvFormat, DatasetSource, EMBEDDED_CSV, LoadError, RegistryConfig,
    SourceDefect,
};
