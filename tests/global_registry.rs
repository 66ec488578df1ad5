//! Integration tests for the process-wide registry.
//!
//! Tests that override `PROTOCOLS` hold `GLOBAL` so they do not interleave
//! with tests that expect the embedded data.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use ip_protocols::{
    ConfigError, EMBEDDED_CSV, ICMP, IPV6_FRAG, LoadError, PROTOCOLS, ProtocolNumber,
    RegistryConfig, TCP, UDP, lookup_by_number, lookup_decimal, lookup_keyword,
    lookup_protocol_name,
};

static GLOBAL: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

#[test]
fn test_embedded_lookups() {
    let _guard = lock();

    assert_eq!(lookup_keyword(6).as_deref(), Some("TCP"));
    assert_eq!(lookup_protocol_name(6).as_deref(), Some("Transmission Control"));
    assert_eq!(lookup_decimal("TCP"), Some(6));
    assert_eq!(lookup_decimal("tcp"), lookup_decimal(" Tcp "));
    assert_eq!(
        lookup_decimal("transMission   control"),
        lookup_decimal("Transmission Control")
    );
    assert_eq!(lookup_decimal("Internet Control Message"), Some(1));

    let entry = lookup_by_number(150).unwrap();
    assert_eq!(entry.range_start(), 148);
    assert_eq!(entry.range_end(), 252);
    assert_eq!(lookup_keyword(150), None);

    assert_eq!(lookup_keyword(61), None);
    assert_eq!(lookup_protocol_name(61).as_deref(), Some("any host internal protocol"));
    assert!(lookup_by_number(256).is_none());
    assert_eq!(lookup_decimal("Reserved"), Some(255));
}

#[test]
fn test_every_entry_round_trips() {
    let _guard = lock();

    let store = PROTOCOLS.get().unwrap();
    for entry in store.entries() {
        for number in entry.range_start()..=entry.range_end() {
            let owner = lookup_by_number(number).unwrap();
            assert!(owner.contains(number));
        }
        if !entry.keyword().is_empty() {
            let named = store.entry_named(entry.keyword()).unwrap();
            assert_eq!(named, entry);
            assert_eq!(lookup_decimal(entry.keyword()), Some(entry.range_start()));
        }
    }
    // Entries that own their first number resolve through both names.
    let icmp = lookup_by_number(1).unwrap();
    assert_eq!(lookup_decimal(icmp.keyword()), Some(icmp.range_start()));
    assert_eq!(lookup_decimal(icmp.protocol()), Some(icmp.range_start()));
}

#[test]
fn test_protocol_number_constants() {
    let _guard = lock();

    assert_eq!(TCP.keyword().as_deref(), Some("TCP"));
    assert_eq!(UDP.protocol_name().as_deref(), Some("User Datagram"));
    assert_eq!(ICMP.to_string(), "ICMP");
    assert!(IPV6_FRAG.is_ipv6_extension_header());
    assert!(!TCP.is_ipv6_extension_header());
    assert_eq!(ProtocolNumber::new(200).to_string(), "200");
    assert_eq!("Transmission Control".parse::<ProtocolNumber>().unwrap(), TCP);
}

#[test]
fn test_queries_are_idempotent() {
    let _guard = lock();

    let first = (lookup_by_number(84), lookup_decimal("IPTM"), lookup_keyword(84));
    let second = (lookup_by_number(84), lookup_decimal("IPTM"), lookup_keyword(84));
    assert_eq!(first, second);
    assert_eq!(first.1, Some(84));
    assert_eq!(first.2.as_deref(), Some("TTP"));
}

#[test]
fn test_concurrent_queries() {
    let _guard = lock();

    thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(lookup_decimal("UDP"), Some(17));
                    assert_eq!(lookup_keyword(17).as_deref(), Some("UDP"));
                    assert_eq!(PROTOCOLS.get().unwrap().numbers_indexed(), 256);
                }
            });
        }
    });
}

#[test]
fn test_override_and_reset() {
    let _guard = lock();

    ip_protocols::load_from_reader(
        "Decimal,Keyword,Protocol,IPv6 Extension Header,Reference\n\
         200,NEWP,New Protocol,,[Local]\n"
            .as_bytes(),
    )
    .unwrap();

    assert_eq!(lookup_decimal("NEWP"), Some(200));
    assert_eq!(lookup_decimal("new protocol"), Some(200));
    // Data present only in the old dataset is gone.
    assert_eq!(lookup_decimal("TCP"), None);
    assert!(lookup_by_number(150).is_none());
    assert_eq!(
        ip_protocols::set_registry_config(RegistryConfig::EMBEDDED),
        Err(ConfigError::AlreadyInitialized)
    );

    let result = ip_protocols::load_from_reader("".as_bytes());
    assert!(matches!(result, Err(LoadError::EmptySource)));
    assert_eq!(lookup_decimal("NEWP"), None);
    assert!(PROTOCOLS.init_error().is_some());

    PROTOCOLS.reset();
    assert_eq!(lookup_decimal("TCP"), Some(6));
    assert!(PROTOCOLS.init_error().is_none());

    ip_protocols::load_from_reader(EMBEDDED_CSV).unwrap();
    assert_eq!(lookup_decimal("UDP"), Some(17));
}
