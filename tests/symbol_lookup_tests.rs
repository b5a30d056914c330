//! Integration tests for symbol lookup

use vellum::{
    layout::value::U8, ErrorKind, LibraryLookup, MapLookup, MemorySegment, Session, SymbolLookup,
};

#[cfg(test)]
mod symbol_lookup_tests {
    use super::*;

    #[test]
    fn test_default_lookup_resolves_process_symbols() {
        let lookup = LibraryLookup::default_lookup();
        let malloc = lookup.find("malloc").unwrap();
        assert_ne!(malloc.address(), 0);
        assert_eq!(malloc.byte_size(), 0);
        assert_eq!(malloc.get(&U8, 0).unwrap_err().kind(), ErrorKind::OutOfBounds);
        assert!(lookup.find("vellum_definitely_missing").is_none());
    }

    #[test]
    fn test_missing_library() {
        let session = Session::confined();
        let err = LibraryLookup::open("/nonexistent/libvellum_missing.so", &session).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        session.close().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_library_unloaded_with_session() {
        let session = Session::shared();
        let lookup = match LibraryLookup::open("libm.so.6", &session) {
            Ok(lookup) => lookup,
            // Not every environment ships glibc's libm under this name
            Err(_) => return,
        };
        let cos = lookup.find("cos").unwrap();
        assert_eq!(cos.session(), &session);
        assert_eq!(lookup.try_find("cos").unwrap().unwrap().address(), cos.address());

        session.close().unwrap();
        assert!(!cos.is_alive());
        assert!(lookup.find("cos").is_none());
        assert_eq!(
            lookup.try_find("cos").unwrap_err().kind(),
            ErrorKind::NotAlive
        );
    }

    #[test]
    fn test_composed_lookups() {
        let overrides = MapLookup::new().with_symbol("malloc", 0x1000);
        let lookup = overrides.or(LibraryLookup::default_lookup());

        assert_eq!(lookup.find("malloc").unwrap().address(), 0x1000);
        assert!(lookup.find("free").is_some());

        let fallback = |name: &str| {
            name.starts_with("stub_")
                .then(|| MemorySegment::of_address(0xdead))
        };
        let lookup = lookup.or(fallback);
        assert_eq!(lookup.find("stub_anything").unwrap().address(), 0xdead);
        assert!(lookup.find("missing").is_none());
    }
}
