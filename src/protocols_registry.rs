use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};
use paste::paste;

use crate::csv_loader::open_file;
use crate::{ConfigError, LoadError, ProtocolEntry, ProtocolStore, RegistryConfig};

/// A macro that declares a well-known protocol number at compile time.
///
/// This macro creates two constants:
/// - A raw `u8` constant with the suffix `_RAW`
/// - A [`ProtocolNumber`](crate::ProtocolNumber) constant with the given name
///
/// # Examples
///
/// ```
/// use ip_protocols::*;
/// use paste::paste;
///
/// const_protocol!(253, EXPERIMENT_1);
///
/// assert_eq!(EXPERIMENT_1.value(), 253);
/// paste! {
///     assert_eq!([<EXPERIMENT_1 _RAW>], 253);
/// }
/// ```
#[macro_export]
macro_rules! const_protocol {
    ($value:expr, $const_name:ident) => {
        paste! {
            pub const [<$const_name _RAW>]: u8 = $value;
        }
        pub const $const_name: $crate::ProtocolNumber = $crate::ProtocolNumber::new($value);
    };
}

// See https://www.iana.org/assignments/protocol-numbers/

const_protocol!(0, HOPOPT);
const_protocol!(1, ICMP);
const_protocol!(2, IGMP);
const_protocol!(4, IPV4);
const_protocol!(6, TCP);
const_protocol!(17, UDP);
const_protocol!(41, IPV6);
const_protocol!(43, IPV6_ROUTE);
const_protocol!(44, IPV6_FRAG);
const_protocol!(46, RSVP);
const_protocol!(47, GRE);
const_protocol!(50, ESP);
const_protocol!(51, AH);
const_protocol!(58, IPV6_ICMP);
const_protocol!(59, IPV6_NONXT);
const_protocol!(60, IPV6_OPTS);
const_protocol!(88, EIGRP);
const_protocol!(89, OSPF);
const_protocol!(103, PIM);
const_protocol!(112, VRRP);
const_protocol!(115, L2TP);
const_protocol!(132, SCTP);
const_protocol!(135, MOBILITY_HEADER);
const_protocol!(136, UDPLITE);
const_protocol!(137, MPLS_IN_IP);
const_protocol!(143, ETHERNET);

#[derive(Debug)]
enum State {
    Uninitialized,
    Ready(Arc<ProtocolStore>),
    /// Initialization or an override failed; holds the error message.
    Failed(String),
}

/// A lazily initialized protocol registry with an override path.
///
/// The first query loads the configured dataset (the embedded IANA data by
/// default). Initialization runs once: concurrent first callers block until
/// it finishes and then share the result. A failed initialization is cached,
/// and every later query reports "not found" instead of parsing again.
///
/// [`load_from_reader`](Self::load_from_reader) and friends parse a new
/// dataset and swap it in whole. Readers holding an `Arc<ProtocolStore>`
/// from [`get`](Self::get) keep seeing the snapshot they started with.
///
/// # Thread Safety
///
/// The state lives behind an `RwLock`. Initialization and replacement take
/// the write lock, so no caller observes a half-built store.
///
/// # Examples
///
/// ```
/// use ip_protocols::{DatasetSource, LazyProtocols, RegistryConfig};
///
/// let registry = LazyProtocols::new(RegistryConfig::with_source(DatasetSource::Bytes(
///     b"Decimal,Keyword,Protocol\n6,TCP,Transmission Control\n".to_vec(),
/// )));
///
/// let store = registry.get().unwrap();
/// assert_eq!(store.number_named("tcp"), Some(6));
///
/// registry.load_from_bytes(b"Decimal,Keyword,Protocol\n17,UDP,User Datagram\n").unwrap();
/// assert_eq!(registry.get().unwrap().number_named("tcp"), None);
/// ```
#[derive(Debug)]
pub struct LazyProtocols {
    config: Mutex<RegistryConfig>,
    state: RwLock<State>,
}

impl LazyProtocols {
    /// Creates an uninitialized registry that will load from `config`.
    pub const fn new(config: RegistryConfig) -> Self {
        Self {
            config: Mutex::new(config),
            state: RwLock::new(State::Uninitialized),
        }
    }

    /// Gets the current store, initializing the registry if necessary.
    ///
    /// Returns `None` if initialization (or the most recent override) failed.
    pub fn get(&self) -> Option<Arc<ProtocolStore>> {
        match &*self.read_state() {
            State::Ready(store) => return Some(Arc::clone(store)),
            State::Failed(_) => return None,
            State::Uninitialized => {}
        }

        let mut state = self.write_state();
        if let State::Uninitialized = *state {
            *state = self.initialize();
        }
        match &*state {
            State::Ready(store) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    fn initialize(&self) -> State {
        let config = self.lock_config();
        let result = config
            .source
            .open()
            .and_then(|reader| ProtocolStore::from_reader_with(reader, &config.format));
        match result {
            Ok(store) => State::Ready(Arc::new(store)),
            Err(error) => {
                warn!("protocol registry initialization failed: {}", error);
                State::Failed(error.to_string())
            }
        }
    }

    /// Replaces the configuration used by lazy initialization.
    ///
    /// Only allowed while the registry is uninitialized (before the first
    /// query, or after [`reset`](Self::reset)).
    pub fn configure(&self, config: RegistryConfig) -> Result<(), ConfigError> {
        let state = self.write_state();
        if !matches!(*state, State::Uninitialized) {
            return Err(ConfigError::AlreadyInitialized);
        }
        *self.lock_config() = config;
        Ok(())
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> RegistryConfig { self.lock_config().clone() }

    /// Parses `reader` and replaces the whole registry with the result.
    ///
    /// The new store is built before the write lock is taken, then swapped
    /// in at once. If parsing fails the previous store is discarded and the
    /// registry stays in the failed state until the next successful override
    /// or a [`reset`](Self::reset).
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<(), LoadError> {
        let format = self.lock_config().format;
        let result = ProtocolStore::from_reader_with(reader, &format);

        let mut state = self.write_state();
        match result {
            Ok(store) => {
                info!(
                    "protocol registry replaced ({} entries, {} numbers)",
                    store.len(),
                    store.numbers_indexed()
                );
                *state = State::Ready(Arc::new(store));
                Ok(())
            }
            Err(error) => {
                warn!("protocol registry override failed: {}", error);
                *state = State::Failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Replaces the registry with an in-memory dataset.
    pub fn load_from_bytes(&self, bytes: &[u8]) -> Result<(), LoadError> {
        self.load_from_reader(bytes)
    }

    /// Replaces the registry with the contents of a CSV file.
    ///
    /// If the file cannot be opened the registry is left untouched.
    pub fn load_from_path(&self, path: &Path) -> Result<(), LoadError> {
        self.load_from_reader(open_file(path)?)
    }

    /// Drops the current store (or cached failure). The next query runs lazy
    /// initialization again with the current configuration.
    pub fn reset(&self) {
        *self.write_state() = State::Uninitialized;
    }

    /// Returns the cached failure message, if the registry is in the failed
    /// state.
    pub fn init_error(&self) -> Option<String> {
        match &*self.read_state() {
            State::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Returns true once a store has been loaded successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), State::Ready(_))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_config(&self) -> MutexGuard<'_, RegistryConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The global protocol numbers registry.
///
/// Lazily loads the embedded IANA dataset on first access. The free
/// functions [`lookup_by_number`], [`lookup_decimal`], [`lookup_keyword`] and
/// [`lookup_protocol_name`] all query this instance.
///
/// # Examples
///
/// ```
/// use ip_protocols::PROTOCOLS;
///
/// let store = PROTOCOLS.get().unwrap();
/// assert_eq!(store.number_named("TCP"), Some(6));
/// assert_eq!(store.keyword_for_number(17), Some("UDP"));
/// ```
pub static PROTOCOLS: LazyProtocols = LazyProtocols::new(RegistryConfig::EMBEDDED);

/// Returns the registry entry owning protocol number `number`.
///
/// # Examples
///
/// ```
/// let entry = ip_protocols::lookup_by_number(150).unwrap();
/// assert_eq!(entry.range_start(), 148);
/// assert_eq!(entry.range_end(), 252);
/// ```
pub fn lookup_by_number(number: u32) -> Option<ProtocolEntry> {
    PROTOCOLS.get()?.entry_for_number(number).cloned()
}

/// Resolves a keyword or long protocol name to its protocol number.
///
/// # Examples
///
/// ```
/// assert_eq!(ip_protocols::lookup_decimal("TCP"), Some(6));
/// assert_eq!(ip_protocols::lookup_decimal(" Tcp "), Some(6));
/// assert_eq!(ip_protocols::lookup_decimal("Internet Control Message"), Some(1));
/// ```
pub fn lookup_decimal(name: &str) -> Option<u32> {
    PROTOCOLS.get()?.number_named(name)
}

/// Returns the keyword for a protocol number, e.g. `6` -> `"TCP"`.
pub fn lookup_keyword(number: u32) -> Option<String> {
    PROTOCOLS.get()?.keyword_for_number(number).map(str::to_string)
}

/// Returns the long protocol name for a protocol number, e.g. `6` ->
/// `"Transmission Control"`.
pub fn lookup_protocol_name(number: u32) -> Option<String> {
    PROTOCOLS
        .get()?
        .protocol_name_for_number(number)
        .map(str::to_string)
}

/// Replaces the global registry with data parsed from `reader`.
///
/// You don't need to call this for normal use.
pub fn load_from_reader<R: Read>(reader: R) -> Result<(), LoadError> {
    PROTOCOLS.load_from_reader(reader)
}

/// Replaces the global registry with data parsed from a CSV file.
pub fn load_from_file(path: &Path) -> Result<(), LoadError> {
    PROTOCOLS.load_from_path(path)
}

/// Sets the configuration used when the global registry initializes.
///
/// Must be called before the first query.
///
/// ```rust,ignore
/// use ip_protocols::{set_registry_config, DatasetSource, RegistryConfig};
///
/// set_registry_config(RegistryConfig::with_source(DatasetSource::File(
///     "/usr/share/iana/protocol-numbers.csv".into(),
/// )))
/// .unwrap();
/// ```
pub fn set_registry_config(config: RegistryConfig) -> Result<(), ConfigError> {
    PROTOCOLS.configure(config)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::DatasetSource;

    const OLD: &[u8] = b"Decimal,Keyword,Protocol,IPv6 Extension Header,Reference\n\
                         6,TCP,Transmission Control,,[RFC9293]\n";
    const NEW: &[u8] = b"Decimal,Keyword,Protocol,IPv6 Extension Header,Reference\n\
                         17,UDP,User Datagram,,[RFC768]\n";

    fn registry(bytes: &[u8]) -> LazyProtocols {
        LazyProtocols::new(RegistryConfig::with_source(DatasetSource::Bytes(bytes.to_vec())))
    }

    #[test]
    fn test_constants() {
        assert_eq!(TCP.value(), 6);
        assert_eq!(TCP_RAW, 6);
        assert_eq!(UDP_RAW, 17);
        assert_eq!(IPV6_ICMP.value(), 58);
        assert_eq!(ETHERNET_RAW, 143);
    }

    #[test]
    fn test_lazy_initialization() {
        let registry = registry(OLD);
        assert!(!registry.is_ready());
        let store = registry.get().unwrap();
        assert!(registry.is_ready());
        assert_eq!(store.number_named("TCP"), Some(6));
        assert!(Arc::ptr_eq(&store, &registry.get().unwrap()));
    }

    #[test]
    fn test_initialization_failure_is_cached() {
        let registry = registry(b"");
        assert!(registry.get().is_none());
        assert_eq!(
            registry.init_error().as_deref(),
            Some("protocol numbers source is empty")
        );
        // Fixing the configuration has no effect until a reset.
        assert_eq!(
            registry.configure(RegistryConfig::EMBEDDED),
            Err(ConfigError::AlreadyInitialized)
        );
        assert!(registry.get().is_none());

        registry.reset();
        registry.configure(RegistryConfig::EMBEDDED).unwrap();
        assert_eq!(registry.get().unwrap().number_named("udp"), Some(17));
        assert!(registry.init_error().is_none());
    }

    #[test]
    fn test_missing_file_source_fails() {
        let registry = LazyProtocols::new(RegistryConfig::with_source(DatasetSource::File(
            "/nonexistent/path/12345.csv".into(),
        )));
        assert!(registry.get().is_none());
        assert!(registry.init_error().unwrap().contains("12345.csv"));
    }

    #[test]
    fn test_override_replaces_everything() {
        let registry = registry(OLD);
        let old = registry.get().unwrap();
        registry.load_from_bytes(NEW).unwrap();

        let new = registry.get().unwrap();
        assert_eq!(new.number_named("TCP"), None);
        assert_eq!(new.number_named("UDP"), Some(17));
        // Snapshots already handed out are unaffected.
        assert_eq!(old.number_named("TCP"), Some(6));
    }

    #[test]
    fn test_override_before_first_query() {
        let registry = registry(OLD);
        registry.load_from_bytes(NEW).unwrap();
        assert_eq!(registry.get().unwrap().number_named("TCP"), None);
    }

    #[test]
    fn test_failed_override_drops_previous_store() {
        let registry = registry(OLD);
        assert!(registry.get().is_some());

        let result = registry.load_from_bytes(b"Decimal,Keyword\n");
        assert!(matches!(result, Err(LoadError::EmptySource)));
        assert!(registry.get().is_none());
        assert!(registry.init_error().is_some());

        registry.load_from_bytes(NEW).unwrap();
        assert_eq!(registry.get().unwrap().number_named("UDP"), Some(17));
    }

    #[test]
    fn test_override_uses_configured_format() {
        let registry = registry(OLD);
        let mut config = registry.config();
        config.format = config.format.with_comment(Some(b';'));
        registry.configure(config).unwrap();

        registry
            .load_from_bytes(b"header\n;6,TCP\n17,UDP\n")
            .unwrap();
        let store = registry.get().unwrap();
        assert_eq!(store.number_named("TCP"), None);
        assert_eq!(store.number_named("UDP"), Some(17));
    }

    #[test]
    fn test_concurrent_first_access() {
        let registry = LazyProtocols::new(RegistryConfig::EMBEDDED);
        let stores: Vec<Arc<ProtocolStore>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| registry.get().unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });
        for store in &stores {
            assert!(Arc::ptr_eq(store, &stores[0]));
            assert_eq!(store.numbers_indexed(), 256);
        }
    }

    #[test]
    fn test_concurrent_reads_during_override() {
        let registry = registry(OLD);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let store = registry.get().unwrap();
                        let tcp = store.number_named("TCP");
                        let udp = store.number_named("UDP");
                        // Always exactly one of the two complete datasets.
                        assert!(tcp.is_some() != udp.is_some());
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..50 {
                    let data = if i % 2 == 0 { NEW } else { OLD };
                    registry.load_from_bytes(data).unwrap();
                }
            });
        });
    }
}
