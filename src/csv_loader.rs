//! Reading protocol registry rows from comma-separated data.
//!
//! This module turns a byte stream in the IANA "Assigned Internet Protocol
//! Numbers" CSV layout into trimmed, padded rows, and parses the `Decimal`
//! column into a protocol number range.
//!
//! # CSV Layout
//!
//! ```text
//! # comment lines are skipped
//! Decimal,Keyword,Protocol,IPv6 Extension Header,Reference
//! 6,TCP,Transmission Control,,[RFC9293]
//! 148-252,,Unassigned,,[Internet_Assigned_Numbers_Authority]
//! ```
//!
//! The first record is always treated as the header. Records may carry fewer
//! than five fields (missing fields are empty) or more (extra fields are
//! ignored).

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use thiserror::Error;

/// The protocol numbers dataset compiled into the crate.
pub const EMBEDDED_CSV: &[u8] = include_bytes!("../data/protocol-numbers.csv");

/// Number of columns in a registry row.
const COLUMNS: usize = 5;

/// Errors that can occur while loading a protocol registry.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source held no bytes, or no data rows followed the header.
    #[error("protocol numbers source is empty")]
    EmptySource,
    /// The byte stream is not well-formed CSV.
    #[error("malformed protocol numbers source: {0}")]
    MalformedSource(#[from] SourceDefect),
    /// A dataset file could not be opened.
    #[error("cannot open protocol numbers file {}: {source}", .path.display())]
    Io {
        /// The file that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl From<csv::Error> for LoadError {
    fn from(error: csv::Error) -> Self {
        LoadError::MalformedSource(SourceDefect::Csv(error))
    }
}

/// What made a source fail to parse as CSV.
#[derive(Debug, Error)]
pub enum SourceDefect {
    /// The CSV reader failed, e.g. on invalid UTF-8 or a read error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// A `"` appeared inside an unquoted field.
    #[error("bare quote in unquoted field on line {line}")]
    BareQuote {
        /// The 1-based line of the quote.
        line: u64,
    },
    /// A closing quote was followed by something other than a delimiter or
    /// the end of the line.
    #[error("unexpected character after closing quote on line {line}")]
    TextAfterQuote {
        /// The 1-based line of the offending character.
        line: u64,
    },
    /// A quoted field was still open at the end of the input.
    #[error("quoted field starting on line {line} is never closed")]
    UnterminatedQuote {
        /// The 1-based line where the field opened.
        line: u64,
    },
}

/// Error returned when registry configuration cannot be modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration was attempted after the registry was initialized.
    #[error("cannot modify protocol registry configuration after it has been accessed")]
    AlreadyInitialized,
}

/// Dialect settings for reading registry CSV data.
///
/// The default is comma-delimited with `#` line comments, matching the
/// published IANA file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    /// The field delimiter.
    pub delimiter: u8,
    /// Records starting with this byte are skipped entirely. `None` disables
    /// comment handling.
    pub comment: Option<u8>,
}

impl CsvFormat {
    /// The IANA layout: `,` delimiter and `#` comments.
    pub const IANA: Self = Self { delimiter: b',', comment: Some(b'#') };

    /// Returns this format with a different comment marker.
    pub fn with_comment(self, comment: Option<u8>) -> Self {
        Self { comment, ..self }
    }
}

impl Default for CsvFormat {
    fn default() -> Self { Self::IANA }
}

/// Where the registry obtains its default dataset.
///
/// # Examples
///
/// ```
/// use ip_protocols::DatasetSource;
///
/// let embedded = DatasetSource::Embedded;
/// let custom = DatasetSource::Bytes(b"Decimal,Keyword\n6,TCP\n".to_vec());
/// let file = DatasetSource::File("/etc/protocol-numbers.csv".into());
/// # let _ = (embedded, custom, file);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DatasetSource {
    /// The dataset compiled into the crate ([`EMBEDDED_CSV`]).
    #[default]
    Embedded,
    /// An in-memory dataset.
    Bytes(Vec<u8>),
    /// A dataset read from disk when the registry initializes.
    File(PathBuf),
}

impl DatasetSource {
    /// Opens the dataset for reading.
    pub fn open(&self) -> Result<Box<dyn Read + '_>, LoadError> {
        match self {
            DatasetSource::Embedded => Ok(Box::new(EMBEDDED_CSV)),
            DatasetSource::Bytes(bytes) => Ok(Box::new(bytes.as_slice())),
            DatasetSource::File(path) => Ok(Box::new(open_file(path)?)),
        }
    }
}

/// Configuration consumed by a lazily initialized registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// The dataset loaded on first access.
    pub source: DatasetSource,
    /// The CSV dialect used for the default dataset and for overrides.
    pub format: CsvFormat,
}

impl RegistryConfig {
    /// The embedded IANA dataset in the IANA layout.
    pub const EMBEDDED: Self =
        Self { source: DatasetSource::Embedded, format: CsvFormat::IANA };

    /// Creates a configuration reading `source` in the IANA layout.
    pub fn with_source(source: DatasetSource) -> Self {
        Self { source, format: CsvFormat::IANA }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self { Self::EMBEDDED }
}

/// A data row with all five columns trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawRow {
    pub decimal: String,
    pub keyword: String,
    pub protocol: String,
    pub ipv6_extension_header: String,
    pub reference: String,
}

impl RawRow {
    fn from_record(record: &csv::StringRecord) -> Self {
        let mut fields = record
            .iter()
            .map(str::to_string)
            .chain(std::iter::repeat(String::new()))
            .take(COLUMNS);
        let mut next = || fields.next().unwrap_or_default();
        Self {
            decimal: next(),
            keyword: next(),
            protocol: next(),
            ipv6_extension_header: next(),
            reference: next(),
        }
    }
}

/// Reads every data row from `reader`, skipping the header record.
///
/// Fails with [`LoadError::EmptySource`] if there is nothing after the
/// header, and with [`LoadError::MalformedSource`] if the CSV reader fails.
pub(crate) fn read_rows<R: Read>(
    mut reader: R,
    format: &CsvFormat,
) -> Result<Vec<RawRow>, LoadError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).map_err(csv::Error::from)?;
    check_quoting(&data, format)?;

    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(format.delimiter)
        .comment(format.comment)
        .from_reader(data.as_slice());

    let mut rows = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        if index == 0 {
            continue;
        }
        rows.push(RawRow::from_record(&record));
    }

    if rows.is_empty() {
        return Err(LoadError::EmptySource);
    }
    Ok(rows)
}

#[derive(Clone, Copy)]
enum QuoteState {
    RecordStart,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
    Comment,
}

/// Rejects quoting the `csv` reader would otherwise accept silently.
///
/// Quotes may only open a field, a closing quote must be followed by a
/// delimiter or a line end, and every quoted field must be closed.
fn check_quoting(data: &[u8], format: &CsvFormat) -> Result<(), SourceDefect> {
    use QuoteState::*;

    let mut state = RecordStart;
    let mut line = 1u64;
    let mut quote_line = 1u64;
    for &byte in data {
        let line_end = byte == b'\n' || byte == b'\r';
        state = match state {
            Comment if byte == b'\n' => RecordStart,
            Comment => Comment,
            RecordStart if format.comment == Some(byte) => Comment,
            RecordStart | FieldStart | Unquoted if line_end => RecordStart,
            RecordStart | FieldStart | Unquoted if byte == format.delimiter => FieldStart,
            RecordStart | FieldStart if byte == b'"' => {
                quote_line = line;
                Quoted
            }
            Unquoted if byte == b'"' => return Err(SourceDefect::BareQuote { line }),
            RecordStart | FieldStart | Unquoted => Unquoted,
            Quoted if byte == b'"' => QuoteInQuoted,
            Quoted => Quoted,
            QuoteInQuoted if byte == b'"' => Quoted,
            QuoteInQuoted if line_end => RecordStart,
            QuoteInQuoted if byte == format.delimiter => FieldStart,
            QuoteInQuoted => return Err(SourceDefect::TextAfterQuote { line }),
        };
        if byte == b'\n' {
            line += 1;
        }
    }

    match state {
        Quoted => Err(SourceDefect::UnterminatedQuote { line: quote_line }),
        _ => Ok(()),
    }
}

/// Opens a dataset file, attaching the path to any error.
pub(crate) fn open_file(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses the `Decimal` column: either `"6"` or an inclusive range such as
/// `"148-252"`.
///
/// Returns `None` for placeholder text ("Reserved", "Unassigned"), values
/// that do not fit in a `u32`, and inverted ranges.
pub(crate) fn parse_decimal_field(field: &str) -> Option<(u32, u32)> {
    let field = field.trim();
    if !field.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    match field.split_once('-') {
        Some((start, end)) => {
            let start = start.trim().parse::<u32>().ok()?;
            let end = end.trim().parse::<u32>().ok()?;
            (end >= start).then_some((start, end))
        }
        None => {
            let value = field.parse::<u32>().ok()?;
            Some((value, value))
        }
    }
}

/// Normalizes a long protocol name for lookup: lowercase, with every run of
/// whitespace collapsed to a single space.
pub(crate) fn normalize_protocol_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes a keyword for lookup.
pub(crate) fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_uppercase()
}
