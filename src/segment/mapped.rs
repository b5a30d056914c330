//! Mapped segments over files and memory file descriptors

use std::{
    fs::{File, OpenOptions},
    os::fd::OwnedFd,
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use memmap2::{Mmap, MmapMut, MmapOptions};
use nix::unistd::{sysconf, SysconfVar};
use serde::{Deserialize, Serialize};

use super::{MemorySegment, Storage};
use crate::{
    error::{Result, VellumError},
    session::Session,
};

/// Kinds of backing storage for a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingType {
    /// A file on a filesystem
    FileBacked,
    /// Anonymous memory file descriptor (Linux-specific)
    MemFd,
}

impl Default for BackingType {
    fn default() -> Self {
        Self::FileBacked
    }
}

impl BackingType {
    /// Check if this backing type is supported on the current platform
    pub fn is_supported(&self) -> bool {
        match self {
            BackingType::FileBacked => true,
            BackingType::MemFd => cfg!(target_os = "linux"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackingType::FileBacked => "file-backed",
            BackingType::MemFd => "memfd",
        }
    }
}

/// Access mode of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MapMode {
    /// Segments are read-only views
    ReadOnly,
    /// Shared read-write mapping; writes reach the backing storage
    #[default]
    ReadWrite,
}

/// Configuration for mapping a file or memfd into a session
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Name of the memfd, or of the default file under the temp directory
    pub name: String,
    /// Bytes to map
    pub size: usize,
    /// Offset into the backing storage where the mapping starts
    pub offset: u64,
    pub backing_type: BackingType,
    /// Explicit file path for file-backed mappings
    pub file_path: Option<PathBuf>,
    pub mode: MapMode,
    /// Create (and extend) the file if needed
    pub create: bool,
    /// Permissions for created files (Unix permissions)
    pub permissions: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            offset: 0,
            backing_type: BackingType::default(),
            file_path: None,
            mode: MapMode::default(),
            create: true,
            permissions: 0o644,
        }
    }
}

impl MapConfig {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Map `size` bytes of the file at `path`
    pub fn file(path: impl Into<PathBuf>, size: usize) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, size).with_file_path(path)
    }

    /// Map a fresh memfd of `size` bytes
    pub fn memfd(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size).with_backing_type(BackingType::MemFd)
    }

    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_mode(mut self, mode: MapMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.size > isize::MAX as usize {
            return Err(VellumError::invalid_argument(
                "size",
                "Mapping size must be positive and addressable",
            ));
        }

        if !self.backing_type.is_supported() {
            return Err(VellumError::invalid_argument(
                "backing_type",
                format!(
                    "Backing type {} is not supported on this platform",
                    self.backing_type.name()
                ),
            ));
        }

        match self.backing_type {
            BackingType::FileBacked => {
                if self.file_path.is_none() && self.name.is_empty() {
                    return Err(VellumError::invalid_argument(
                        "file_path",
                        "File-backed mappings need a path or a name",
                    ));
                }
            }
            BackingType::MemFd => {
                if self.name.is_empty() {
                    return Err(VellumError::invalid_argument(
                        "name",
                        "Memfd name cannot be empty",
                    ));
                }
                if self.mode == MapMode::ReadOnly {
                    return Err(VellumError::invalid_argument(
                        "mode",
                        "A fresh memfd cannot be mapped read-only",
                    ));
                }
            }
        }

        self.end_offset()?;
        Ok(())
    }

    /// Path used for file-backed mappings
    pub fn default_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("vellum_{}", self.name)))
    }

    fn end_offset(&self) -> Result<u64> {
        self.offset
            .checked_add(self.size as u64)
            .ok_or_else(|| VellumError::invalid_argument("offset", "Mapping end overflows"))
    }
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A live mapping shared by the segments sliced from it
pub(crate) struct MappedRegion {
    mapping: Mutex<Option<Mapping>>,
    address: usize,
    len: usize,
    backing: BackingType,
}

impl MappedRegion {
    fn create(config: &MapConfig) -> Result<Self> {
        let mapping = match config.backing_type {
            BackingType::FileBacked => {
                let file = open_file(config)?;
                map_backing(&file, config)?
            }
            BackingType::MemFd => {
                let fd = create_memfd(config)?;
                map_backing(&fd, config)?
            }
        };
        let address = match &mapping {
            Mapping::ReadOnly(map) => map.as_ptr() as usize,
            Mapping::ReadWrite(map) => map.as_ptr() as usize,
        };
        Ok(Self {
            mapping: Mutex::new(Some(mapping)),
            address,
            len: config.size,
            backing: config.backing_type,
        })
    }

    fn unmap(&self) {
        let released = self
            .mapping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            log::debug!(
                "Unmapped {} region at {:#x} ({} bytes)",
                self.backing.name(),
                self.address,
                self.len
            );
        }
    }

    fn flush_range(&self, offset: usize, len: usize) -> Result<()> {
        let guard = self.mapping.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(Mapping::ReadWrite(map)) => map
                .flush_range(offset, len)
                .map_err(|e| VellumError::from_io(e, "Failed to flush memory mapping")),
            Some(Mapping::ReadOnly(_)) => Ok(()),
            None => Err(VellumError::platform("Mapping already released")),
        }
    }
}

fn open_file(config: &MapConfig) -> Result<File> {
    let path = config.default_file_path();
    let end = config.end_offset()?;

    let file = match (config.mode, config.create) {
        (MapMode::ReadOnly, _) => File::open(&path)
            .map_err(|e| VellumError::from_io(e, "Failed to open file for mapping"))?,
        (MapMode::ReadWrite, create) => OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| VellumError::from_io(e, "Failed to create/open file"))?,
    };

    let len = file
        .metadata()
        .map_err(|e| VellumError::from_io(e, "Failed to stat mapped file"))?
        .len();
    if len < end {
        if config.create && config.mode == MapMode::ReadWrite {
            file.set_len(end)
                .map_err(|e| VellumError::from_io(e, "Failed to set file size"))?;
        } else {
            return Err(VellumError::invalid_argument(
                "size",
                format!("File is {} bytes, mapping needs {}", len, end),
            ));
        }
    }
    Ok(file)
}

#[cfg(target_os = "linux")]
fn create_memfd(config: &MapConfig) -> Result<OwnedFd> {
    use nix::{
        sys::memfd::{memfd_create, MemFdCreateFlag},
        unistd::ftruncate,
    };
    use std::ffi::CString;

    let name = CString::new(config.name.clone())
        .map_err(|_| VellumError::invalid_argument("name", "Name contains null bytes"))?;

    let fd = memfd_create(name.as_c_str(), MemFdCreateFlag::MFD_CLOEXEC)
        .map_err(|e| VellumError::platform(format!("Failed to create memfd: {}", e)))?;

    ftruncate(&fd, config.end_offset()? as libc::off_t)
        .map_err(|e| VellumError::platform(format!("Failed to set memfd size: {}", e)))?;

    Ok(fd)
}

#[cfg(not(target_os = "linux"))]
fn create_memfd(_config: &MapConfig) -> Result<OwnedFd> {
    Err(VellumError::unsupported(
        "map",
        "memfd backing is only available on Linux",
    ))
}

fn map_backing<T: std::os::fd::AsRawFd>(backing: &T, config: &MapConfig) -> Result<Mapping> {
    let mut options = MmapOptions::new();
    options.offset(config.offset).len(config.size);
    // SAFETY: the mapping is only reached through segments whose accesses are
    // bounds checked and stop once the owning session unmaps it
    let mapping = unsafe {
        match config.mode {
            MapMode::ReadOnly => options.map(backing).map(Mapping::ReadOnly),
            MapMode::ReadWrite => options.map_mut(backing).map(Mapping::ReadWrite),
        }
    };
    mapping.map_err(|e| VellumError::from_io(e, "Failed to create memory mapping"))
}

fn page_size() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => 4096,
    }
}

/// Page-aligned start and length covering `[address, address + len)`
fn page_span(address: usize, len: usize) -> (usize, usize) {
    let page = page_size();
    let start = address & !(page - 1);
    let end = (address + len + page - 1) & !(page - 1);
    (start, end - start)
}

impl Session {
    /// Map a file or memfd into this session.
    ///
    /// The mapping is released when the session closes. Read-only mappings
    /// produce read-only segments.
    pub fn map(&self, config: &MapConfig) -> Result<MemorySegment> {
        config.validate()?;
        let _guard = self.acquire()?;

        let region = Arc::new(MappedRegion::create(config)?);
        let address = region.address;

        let unmapped = Arc::clone(&region);
        self.add_close_action(move || unmapped.unmap())?;

        log::debug!(
            "Mapped {} bytes of {} backing '{}' into session {}",
            config.size,
            config.backing_type.name(),
            config.name,
            self.id()
        );

        let segment = MemorySegment::from_parts(
            Storage::Mapped(region),
            address,
            config.size,
            self.clone(),
        );
        Ok(match config.mode {
            MapMode::ReadOnly => segment.as_read_only(),
            MapMode::ReadWrite => segment,
        })
    }
}

impl MemorySegment {
    fn mapped_region(&self, operation: &str) -> Result<&Arc<MappedRegion>> {
        match &self.storage {
            Storage::Mapped(region) => Ok(region),
            _ => Err(VellumError::unsupported(
                operation,
                "segment is not backed by a mapping",
            )),
        }
    }

    /// Bring the contents of the segment into physical memory
    pub fn load(&self) -> Result<()> {
        self.mapped_region("load")?;
        let (_guard, ptr) = self.check_access(0, self.size, 1, false)?;
        if self.size == 0 {
            return Ok(());
        }
        let (start, len) = page_span(ptr as usize, self.size);
        // SAFETY: the span covers pages of a live mapping
        unsafe { libc::madvise(start as *mut libc::c_void, len, libc::MADV_WILLNEED) };
        let page = page_size();
        let mut offset = 0;
        while offset < self.size {
            // SAFETY: offset is within the checked range
            unsafe { std::ptr::read_volatile(ptr.add(offset)) };
            offset += page;
        }
        Ok(())
    }

    /// Hint that the contents of the segment may be evicted from physical
    /// memory
    pub fn unload(&self) -> Result<()> {
        self.mapped_region("unload")?;
        let (_guard, ptr) = self.check_access(0, self.size, 1, false)?;
        if self.size == 0 {
            return Ok(());
        }
        let (start, len) = page_span(ptr as usize, self.size);
        // SAFETY: the span covers pages of a live shared mapping; dropping
        // them only discards cached copies of the backing storage
        let rc = unsafe { libc::madvise(start as *mut libc::c_void, len, libc::MADV_DONTNEED) };
        if rc != 0 {
            return Err(VellumError::from_io(
                std::io::Error::last_os_error(),
                "Failed to unload mapping",
            ));
        }
        Ok(())
    }

    /// Whether every page of the segment is resident in physical memory
    pub fn is_loaded(&self) -> Result<bool> {
        self.mapped_region("is_loaded")?;
        let (_guard, ptr) = self.check_access(0, self.size, 1, false)?;
        if self.size == 0 {
            return Ok(true);
        }
        let (start, len) = page_span(ptr as usize, self.size);
        let mut residency = vec![0u8; len / page_size()];
        // SAFETY: the span covers pages of a live mapping and the vector has
        // one entry per page
        let rc = unsafe {
            libc::mincore(
                start as *mut libc::c_void,
                len,
                residency.as_mut_ptr() as _,
            )
        };
        if rc != 0 {
            return Err(VellumError::from_io(
                std::io::Error::last_os_error(),
                "Failed to query mapping residency",
            ));
        }
        Ok(residency.iter().all(|page| page & 1 == 1))
    }

    /// Write modified contents back to the backing storage
    pub fn force(&self) -> Result<()> {
        let region = self.mapped_region("force")?;
        let _guard = self.session.acquire()?;
        if self.size == 0 {
            return Ok(());
        }
        region.flush_range(self.address - region.address, self.size)
    }
}
