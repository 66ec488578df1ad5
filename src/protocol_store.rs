use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use log::{debug, trace};

use crate::csv_loader::{
    normalize_keyword, normalize_protocol_name, open_file, parse_decimal_field, read_rows,
};
use crate::{CsvFormat, LoadError, ProtocolEntry};

/// An immutable, indexed snapshot of the protocol numbers registry.
///
/// The `ProtocolStore` keeps every registry row in file order and provides
/// lookups in both directions:
/// - protocol number to [`ProtocolEntry`] (ranges are expanded, so every
///   number in `148-252` resolves to the same entry)
/// - keyword (case-insensitive) to protocol number
/// - long protocol name (case- and whitespace-insensitive) to protocol number
///
/// When keys collide, the first row in file order owns the key. Later rows
/// are still kept in [`entries`](Self::entries) and still claim any numbers
/// or names that were not taken yet.
///
/// # Examples
///
/// ```
/// use ip_protocols::ProtocolStore;
///
/// let csv = "\
/// Decimal,Keyword,Protocol,IPv6 Extension Header,Reference
/// 6,TCP,Transmission Control,,[RFC9293]
/// 17,UDP,User Datagram,,[RFC768]
/// 148-252,,Unassigned,,
/// ";
/// let store = ProtocolStore::from_bytes(csv.as_bytes()).unwrap();
///
/// assert_eq!(store.number_named("tcp"), Some(6));
/// assert_eq!(store.number_named("user   datagram"), Some(17));
/// assert_eq!(store.keyword_for_number(17), Some("UDP"));
/// assert_eq!(store.entry_for_number(200).unwrap().range_start(), 148);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ProtocolStore {
    entries: Vec<ProtocolEntry>,
    /// Disjoint claimed ranges keyed by their first number, mapping to the
    /// last number and the owning entry.
    entries_by_number: BTreeMap<u32, (u32, usize)>,
    numbers_claimed: u64,
    entries_by_keyword: HashMap<String, usize>,
    entries_by_protocol_name: HashMap<String, usize>,
}

impl ProtocolStore {
    /// Creates a store from entries already in registry order.
    ///
    /// # Examples
    ///
    /// ```
    /// use ip_protocols::{ProtocolEntry, ProtocolStore};
    ///
    /// let store = ProtocolStore::new([
    ///     ProtocolEntry::new(1, 1, "ICMP", "Internet Control Message", "", "[RFC792]"),
    ///     ProtocolEntry::new(6, 6, "TCP", "Transmission Control", "", "[RFC9293]"),
    /// ]);
    /// assert_eq!(store.len(), 2);
    /// assert_eq!(store.number_named("Internet Control Message"), Some(1));
    /// ```
    pub fn new<T>(entries: T) -> Self
    where
        T: IntoIterator<Item = ProtocolEntry>,
    {
        let mut store = Self::default();
        for entry in entries {
            store.insert(entry);
        }
        store
    }

    /// Parses a registry in the IANA CSV layout.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        Self::from_reader_with(reader, &CsvFormat::default())
    }

    /// Parses a registry using the given CSV dialect.
    ///
    /// Rows whose `Decimal` column is not a number or a numeric range are
    /// dropped silently. Fails if the source is empty, has no rows after the
    /// header, or cannot be read as CSV.
    pub fn from_reader_with<R: Read>(
        reader: R,
        format: &CsvFormat,
    ) -> Result<Self, LoadError> {
        let rows = read_rows(reader, format)?;
        let row_count = rows.len();

        let mut store = Self::default();
        for row in rows {
            if row.decimal.is_empty() {
                continue;
            }
            let Some((start, end)) = parse_decimal_field(&row.decimal) else {
                trace!("skipping non-numeric protocol row {:?}", row.decimal);
                continue;
            };
            store.insert(ProtocolEntry::new(
                start,
                end,
                row.keyword,
                row.protocol,
                row.ipv6_extension_header,
                row.reference,
            ));
        }

        debug!(
            "parsed {} protocol entries from {} rows, dropped {} ({} numbers, {} keywords, {} names)",
            store.entries.len(),
            row_count,
            row_count - store.entries.len(),
            store.numbers_claimed,
            store.entries_by_keyword.len(),
            store.entries_by_protocol_name.len()
        );
        Ok(store)
    }

    /// Parses a registry from an in-memory buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        Self::from_reader(bytes)
    }

    /// Parses a registry file from disk.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        Self::from_reader(open_file(path)?)
    }

    /// Appends an entry and indexes whatever keys it can still claim.
    fn insert(&mut self, entry: ProtocolEntry) {
        let index = self.entries.len();

        self.claim_numbers(entry.range_start(), entry.range_end(), index);
        if !entry.keyword().is_empty() {
            self.entries_by_keyword
                .entry(normalize_keyword(entry.keyword()))
                .or_insert(index);
        }
        if !entry.protocol().is_empty() {
            self.entries_by_protocol_name
                .entry(normalize_protocol_name(entry.protocol()))
                .or_insert(index);
        }

        self.entries.push(entry);
    }

    /// Claims every number in `start..=end` that no earlier entry owns.
    ///
    /// Claims are stored as ranges, so this costs time in the number of
    /// existing claims, not in the width of the range.
    fn claim_numbers(&mut self, start: u32, end: u32, index: usize) {
        let preceding = self.entries_by_number.range(..start).next_back();
        let overlapping = self.entries_by_number.range(start..=end);

        let mut gaps = Vec::new();
        let mut next_unclaimed = u64::from(start);
        for (&claim_start, &(claim_end, _)) in preceding.into_iter().chain(overlapping) {
            if u64::from(claim_end) < next_unclaimed {
                continue;
            }
            if u64::from(claim_start) > next_unclaimed {
                gaps.push((next_unclaimed as u32, claim_start - 1));
            }
            next_unclaimed = u64::from(claim_end) + 1;
        }
        if next_unclaimed <= u64::from(end) {
            gaps.push((next_unclaimed as u32, end));
        }

        for (gap_start, gap_end) in gaps {
            self.numbers_claimed += u64::from(gap_end - gap_start) + 1;
            self.entries_by_number.insert(gap_start, (gap_end, index));
        }
    }

    /// All entries in registry order, including ones whose keys were already
    /// claimed by earlier rows.
    pub fn entries(&self) -> &[ProtocolEntry] { &self.entries }

    /// The number of entries.
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// The number of distinct protocol numbers covered by the store.
    pub fn numbers_indexed(&self) -> u64 { self.numbers_claimed }

    /// Looks up the entry that owns a protocol number.
    ///
    /// # Examples
    ///
    /// ```
    /// use ip_protocols::ProtocolStore;
    ///
    /// let store = ProtocolStore::from_bytes(b"header\n6,TCP,Transmission Control\n").unwrap();
    /// assert_eq!(store.entry_for_number(6).unwrap().keyword(), "TCP");
    /// assert!(store.entry_for_number(7).is_none());
    /// ```
    pub fn entry_for_number(&self, number: u32) -> Option<&ProtocolEntry> {
        self.entries_by_number
            .range(..=number)
            .next_back()
            .filter(|&(_, &(claim_end, _))| number <= claim_end)
            .map(|(_, &(_, index))| &self.entries[index])
    }

    /// Looks up an entry by keyword, then by long protocol name.
    ///
    /// The keyword match ignores case; the long name match also ignores
    /// surrounding whitespace and the width of interior whitespace runs. A
    /// keyword match always wins over a long name match.
    pub fn entry_named(&self, name: &str) -> Option<&ProtocolEntry> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.entries_by_keyword
            .get(&normalize_keyword(name))
            .or_else(|| {
                self.entries_by_protocol_name
                    .get(&normalize_protocol_name(name))
            })
            .map(|&index| &self.entries[index])
    }

    /// Resolves a keyword or long protocol name to a protocol number.
    ///
    /// For a range entry the first number of the range is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use ip_protocols::ProtocolStore;
    ///
    /// let store = ProtocolStore::from_bytes(b"header\n6,TCP,Transmission Control\n").unwrap();
    /// assert_eq!(store.number_named(" Tcp "), Some(6));
    /// assert_eq!(store.number_named("transMission   control"), Some(6));
    /// assert_eq!(store.number_named("nonexistent"), None);
    /// ```
    pub fn number_named(&self, name: &str) -> Option<u32> {
        self.entry_named(name).map(ProtocolEntry::range_start)
    }

    /// Returns the keyword for a protocol number, if it has a non-empty one.
    pub fn keyword_for_number(&self, number: u32) -> Option<&str> {
        self.entry_for_number(number)
            .map(ProtocolEntry::keyword)
            .filter(|keyword| !keyword.is_empty())
    }

    /// Returns the long protocol name for a protocol number, if it has a
    /// non-empty one.
    pub fn protocol_name_for_number(&self, number: u32) -> Option<&str> {
        self.entry_for_number(number)
            .map(ProtocolEntry::protocol)
            .filter(|protocol| !protocol.is_empty())
    }
}
