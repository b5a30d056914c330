//! Symbol lookup: resolving names to native addresses
//!
//! A [`SymbolLookup`] answers "where does this symbol live" with a
//! zero-length native segment, or `None` when it does not know the name.
//! Lookups compose with [`SymbolLookup::or`].

use std::{
    collections::HashMap,
    ffi::{CStr, CString},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use crate::{
    error::{Result, VellumError},
    segment::MemorySegment,
    session::Session,
};

/// Resolver of symbol names to addresses
pub trait SymbolLookup: Send + Sync {
    /// Address of `name` as a zero-length segment; `None` if unknown
    fn find(&self, name: &str) -> Option<MemorySegment>;

    /// Lookup that consults `other` when this one does not know a name
    fn or<L>(self, other: L) -> Or<Self, L>
    where
        Self: Sized,
        L: SymbolLookup,
    {
        Or {
            first: self,
            second: other,
        }
    }
}

impl<F> SymbolLookup for F
where
    F: Fn(&str) -> Option<MemorySegment> + Send + Sync,
{
    fn find(&self, name: &str) -> Option<MemorySegment> {
        self(name)
    }
}

/// Two lookups consulted in order
#[derive(Debug, Clone)]
pub struct Or<A, B> {
    first: A,
    second: B,
}

impl<A: SymbolLookup, B: SymbolLookup> SymbolLookup for Or<A, B> {
    fn find(&self, name: &str) -> Option<MemorySegment> {
        self.first.find(name).or_else(|| self.second.find(name))
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a thread-local NUL-terminated string
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Symbols of a dynamic library, or of the process's global namespace
#[derive(Debug)]
pub struct LibraryLookup {
    handle: usize,
    name: String,
    session: Session,
}

impl LibraryLookup {
    /// Load the library at `path`; it is unloaded when `session` closes.
    ///
    /// Symbols found are zero-length segments in `session`.
    pub fn open(path: impl AsRef<Path>, session: &Session) -> Result<Self> {
        let path = path.as_ref();
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| VellumError::invalid_argument("path", "Path contains null bytes"))?;

        let _guard = session.acquire()?;
        // SAFETY: c_path is a valid NUL-terminated string
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(VellumError::invalid_argument(
                "path",
                format!("Cannot open library {}: {}", path.display(), last_dl_error()),
            ));
        }

        let address = handle as usize;
        let name = path.display().to_string();
        let closing = name.clone();
        session.add_fallible_close_action(move || {
            // SAFETY: handle came from a successful dlopen and is closed once
            if unsafe { libc::dlclose(address as *mut libc::c_void) } != 0 {
                return Err(VellumError::platform(format!(
                    "Cannot close library {}: {}",
                    closing,
                    last_dl_error()
                )));
            }
            Ok(())
        })?;

        log::debug!("Opened library {} in session {}", name, session.id());
        Ok(Self {
            handle: address,
            name,
            session: session.clone(),
        })
    }

    /// Lookup over every symbol already loaded into the process
    pub fn default_lookup() -> Self {
        Self {
            handle: libc::RTLD_DEFAULT as usize,
            name: "<default>".to_string(),
            session: Session::global(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Like [`SymbolLookup::find`], reporting a closed or inaccessible
    /// session as an error
    pub fn try_find(&self, name: &str) -> Result<Option<MemorySegment>> {
        let symbol = match CString::new(name) {
            Ok(symbol) => symbol,
            Err(_) => return Ok(None),
        };
        let _guard = self.session.acquire()?;
        // SAFETY: the library stays loaded while the session guard is held
        let address = unsafe { libc::dlsym(self.handle as *mut libc::c_void, symbol.as_ptr()) };
        if address.is_null() {
            return Ok(None);
        }
        Ok(Some(MemorySegment::native(
            address as usize,
            0,
            self.session.clone(),
        )))
    }
}

impl SymbolLookup for LibraryLookup {
    fn find(&self, name: &str) -> Option<MemorySegment> {
        match self.try_find(name) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("Lookup of {} in {} failed: {}", name, self.name, err);
                None
            }
        }
    }
}

/// Fixed table of symbol addresses
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    symbols: HashMap<String, usize>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, name: impl Into<String>, address: usize) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: usize) -> Option<usize> {
        self.symbols.insert(name.into(), address)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for MapLookup {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        Self {
            symbols: iter
                .into_iter()
                .map(|(name, address)| (name.into(), address))
                .collect(),
        }
    }
}

impl SymbolLookup for MapLookup {
    fn find(&self, name: &str) -> Option<MemorySegment> {
        self.symbols
            .get(name)
            .map(|address| MemorySegment::of_address(*address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lookup() {
        let lookup = MapLookup::new().with_symbol("answer", 0x2a);
        assert_eq!(lookup.find("answer").unwrap().address(), 0x2a);
        assert_eq!(lookup.find("answer").unwrap().byte_size(), 0);
        assert!(lookup.find("question").is_none());
    }

    #[test]
    fn test_or_combinator() {
        let first: MapLookup = [("a", 1usize)].into_iter().collect();
        let second = MapLookup::new().with_symbol("a", 2).with_symbol("b", 3);
        let combined = first.or(second);
        assert_eq!(combined.find("a").unwrap().address(), 1);
        assert_eq!(combined.find("b").unwrap().address(), 3);
        assert!(combined.find("c").is_none());
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |name: &str| (name == "x").then(|| MemorySegment::of_address(8));
        assert!(lookup.find("x").is_some());
        assert!(lookup.find("y").is_none());
    }

    #[test]
    fn test_default_lookup_finds_libc() {
        let lookup = LibraryLookup::default_lookup();
        let strlen = lookup.find("strlen").unwrap();
        assert_ne!(strlen.address(), 0);
        assert_eq!(strlen.session(), &Session::global());
        assert!(lookup.find("vellum_no_such_symbol").is_none());
        assert!(lookup.find("bad\0name").is_none());
    }
}
