//! Memory segments: bounds-checked, session-scoped views of memory
//!
//! A [`MemorySegment`] is a contiguous range of bytes backed by native
//! memory, by a Rust heap array or by a file mapping. Every access goes
//! through the same checks, in this order:
//!
//! 1. the owning session is alive and accessible from the calling thread
//! 2. the range lies within the segment
//! 3. the address satisfies the alignment of the layout
//! 4. writes target a writable segment
//!
//! A failed check has no side effect.

mod access;
mod bulk;
mod heap;
#[cfg(feature = "file-backed")]
pub mod mapped;
mod restricted;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
    thread::ThreadId,
};

use crate::{
    error::{Result, VellumError},
    layout::{value::check_alignment, ArrayElement, CarrierKind, MemoryLayout},
    session::{AccessGuard, Session},
};

pub use self::bulk::Elements;
use self::heap::HeapArray;
#[cfg(feature = "file-backed")]
use self::mapped::MappedRegion;

/// What a segment points into
#[derive(Clone)]
pub(crate) enum Storage {
    /// Off-heap memory at an absolute address
    Native,
    /// A heap array; segment addresses are offsets into it
    Heap(Arc<HeapArray>),
    /// A file or memfd mapping at an absolute address
    #[cfg(feature = "file-backed")]
    Mapped(Arc<MappedRegion>),
}

/// A bounded view of memory owned by a session
#[derive(Clone)]
pub struct MemorySegment {
    storage: Storage,
    address: usize,
    size: usize,
    read_only: bool,
    session: Session,
}

impl MemorySegment {
    pub(crate) fn from_parts(storage: Storage, address: usize, size: usize, session: Session) -> Self {
        Self {
            storage,
            address,
            size,
            read_only: false,
            session,
        }
    }

    /// Native segment over `size` bytes at `address`
    pub(crate) fn native(address: usize, size: usize, session: Session) -> Self {
        Self::from_parts(Storage::Native, address, size, session)
    }

    /// Zero-length native segment at address zero
    pub fn null() -> Self {
        Self::of_address(0)
    }

    /// Zero-length native segment at `address` in the global session.
    ///
    /// Zero-length segments reject every access until reinterpreted.
    pub fn of_address(address: usize) -> Self {
        Self::native(address, 0, Session::global())
    }

    /// Heap segment over the elements of `values`, owned by the global
    /// session
    pub fn of_array<T: ArrayElement>(values: Vec<T>) -> Self {
        let array = Arc::new(HeapArray::new(values));
        let size = array.byte_len();
        Self::from_parts(Storage::Heap(array), 0, size, Session::global())
    }

    pub fn of_bytes(bytes: Vec<u8>) -> Self {
        Self::of_array(bytes)
    }

    /// Address of the first byte; an offset into the array for heap segments
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn byte_size(&self) -> usize {
        self.size
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the segment is backed by native or mapped memory
    pub fn is_native(&self) -> bool {
        !matches!(self.storage, Storage::Heap(_))
    }

    pub fn is_mapped(&self) -> bool {
        #[cfg(feature = "file-backed")]
        {
            matches!(self.storage, Storage::Mapped(_))
        }
        #[cfg(not(feature = "file-backed"))]
        {
            false
        }
    }

    /// Carrier of the heap array behind a heap segment
    pub fn array_kind(&self) -> Option<CarrierKind> {
        match &self.storage {
            Storage::Heap(array) => Some(array.kind()),
            _ => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_alive(&self) -> bool {
        self.session.is_alive()
    }

    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.session.is_accessible_by(thread)
    }

    /// Same memory, writes rejected
    pub fn as_read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    /// Identity of the backing object; zero for absolute addresses
    fn base_identity(&self) -> usize {
        match &self.storage {
            Storage::Heap(array) => Arc::as_ptr(array) as usize,
            _ => 0,
        }
    }

    /// Strongest alignment the backing storage can honour
    fn max_alignment(&self) -> usize {
        match &self.storage {
            Storage::Heap(array) => array.max_alignment(),
            _ => usize::MAX,
        }
    }

    #[inline]
    fn raw_ptr(&self, offset: usize) -> *mut u8 {
        match &self.storage {
            Storage::Heap(array) => array.as_ptr().wrapping_add(self.address + offset),
            _ => self.address.wrapping_add(offset) as *mut u8,
        }
    }

    fn check_bounds(&self, offset: usize, length: usize) -> Result<()> {
        if offset > self.size || length > self.size - offset {
            return Err(VellumError::out_of_bounds(offset, length, self.size));
        }
        Ok(())
    }

    fn check_aligned(&self, offset: usize, alignment: usize) -> Result<()> {
        let address = self.address.wrapping_add(offset);
        if alignment > self.max_alignment() || address & (alignment - 1) != 0 {
            return Err(VellumError::misaligned(address, alignment));
        }
        Ok(())
    }

    /// The one guard every dereference goes through.
    ///
    /// Returns the access registration together with the pointer to the first
    /// byte of the checked range.
    pub(crate) fn check_access(
        &self,
        offset: usize,
        length: usize,
        alignment: usize,
        write: bool,
    ) -> Result<(AccessGuard<'_>, *mut u8)> {
        let guard = self.session.acquire()?;
        self.check_bounds(offset, length)?;
        self.check_aligned(offset, alignment)?;
        if write && self.read_only {
            return Err(VellumError::ReadOnly);
        }
        Ok((guard, self.raw_ptr(offset)))
    }

    fn slice_unchecked(&self, offset: usize, size: usize) -> Self {
        Self {
            address: self.address + offset,
            size,
            ..self.clone()
        }
    }

    /// Sub-segment of `size` bytes starting at `offset`
    pub fn as_slice(&self, offset: usize, size: usize) -> Result<Self> {
        self.check_bounds(offset, size)?;
        Ok(self.slice_unchecked(offset, size))
    }

    /// Sub-segment from `offset` to the end
    pub fn as_slice_from(&self, offset: usize) -> Result<Self> {
        self.check_bounds(offset, 0)?;
        Ok(self.slice_unchecked(offset, self.size - offset))
    }

    /// Sub-segment whose start must satisfy `alignment`
    pub fn as_slice_aligned(&self, offset: usize, size: usize, alignment: usize) -> Result<Self> {
        check_alignment(alignment)?;
        self.check_bounds(offset, size)?;
        self.check_aligned(offset, alignment)?;
        Ok(self.slice_unchecked(offset, size))
    }

    /// Sub-segment shaped after `layout`
    pub fn as_slice_layout(&self, offset: usize, layout: &MemoryLayout) -> Result<Self> {
        self.as_slice_aligned(offset, layout.byte_size()?, layout.byte_alignment())
    }

    /// Offset of `other` relative to this segment's start.
    ///
    /// Both segments must share their backing object; negative values mean
    /// `other` starts before this segment.
    pub fn segment_offset(&self, other: &MemorySegment) -> Result<isize> {
        if self.base_identity() != other.base_identity() {
            return Err(VellumError::unsupported(
                "segment_offset",
                "segments are backed by different objects",
            ));
        }
        Ok(other.address.wrapping_sub(self.address) as isize)
    }

    /// Slice of this segment that overlaps with `other`, if any
    pub fn as_overlapping_slice(&self, other: &MemorySegment) -> Option<Self> {
        if self.base_identity() != other.base_identity() {
            return None;
        }
        let start = self.address.max(other.address);
        let end = self
            .address
            .saturating_add(self.size)
            .min(other.address.saturating_add(other.size));
        (start < end).then(|| self.slice_unchecked(start - self.address, end - start))
    }
}

impl PartialEq for MemorySegment {
    fn eq(&self, other: &Self) -> bool {
        self.base_identity() == other.base_identity() && self.address == other.address
    }
}

impl Eq for MemorySegment {}

impl Hash for MemorySegment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base_identity().hash(state);
        self.address.hash(state);
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.storage {
            Storage::Native => "native",
            Storage::Heap(_) => "heap",
            #[cfg(feature = "file-backed")]
            Storage::Mapped(_) => "mapped",
        };
        f.debug_struct("MemorySegment")
            .field("kind", &kind)
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .field("read_only", &self.read_only)
            .field("session", &self.session.id())
            .finish()
    }
}

impl fmt::Display for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemorySegment{{ address: {:#x}, byte_size: {} }}",
            self.address, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_null_segment() {
        let null = MemorySegment::null();
        assert_eq!(null.address(), 0);
        assert_eq!(null.byte_size(), 0);
        assert!(null.is_native());
        assert_eq!(null, MemorySegment::of_address(0));
        assert_ne!(null, MemorySegment::of_address(8));
    }

    #[test]
    fn test_slice_bounds() {
        let segment = MemorySegment::of_bytes(vec![0u8; 16]);
        assert_eq!(segment.as_slice(4, 12).unwrap().byte_size(), 12);
        assert_eq!(segment.as_slice(16, 0).unwrap().byte_size(), 0);
        assert_eq!(
            segment.as_slice(4, 13).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
        assert_eq!(
            segment.as_slice(17, 0).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
        assert_eq!(segment.as_slice_from(10).unwrap().byte_size(), 6);
    }

    #[test]
    fn test_heap_alignment_limited_by_element() {
        let bytes = MemorySegment::of_bytes(vec![0u8; 16]);
        assert!(bytes.as_slice_aligned(0, 4, 4).is_err());
        let longs = MemorySegment::of_array(vec![0u64; 2]);
        assert!(longs.as_slice_aligned(8, 8, 8).is_ok());
        assert!(longs.as_slice_aligned(4, 4, 8).is_err());
    }

    #[test]
    fn test_identity_and_overlap() {
        let segment = MemorySegment::of_bytes(vec![0u8; 32]);
        let a = segment.as_slice(0, 16).unwrap();
        let b = segment.as_slice(8, 16).unwrap();
        assert_eq!(a.segment_offset(&b).unwrap(), 8);
        assert_eq!(b.segment_offset(&a).unwrap(), -8);

        let overlap = a.as_overlapping_slice(&b).unwrap();
        assert_eq!(overlap.address(), 8);
        assert_eq!(overlap.byte_size(), 8);

        let other = MemorySegment::of_bytes(vec![0u8; 32]);
        assert!(a.as_overlapping_slice(&other).is_none());
        assert!(a.segment_offset(&other).is_err());
        assert_ne!(segment, other);
        assert_eq!(segment, segment.as_slice(0, 4).unwrap());
    }

    #[test]
    fn test_read_only_view() {
        let segment = MemorySegment::of_bytes(vec![0u8; 4]);
        let view = segment.as_read_only();
        assert!(view.is_read_only());
        assert!(!segment.is_read_only());
        assert_eq!(view, segment);
        assert!(view.as_slice(0, 2).unwrap().is_read_only());
    }
}
