//! Slicing allocator - hands out consecutive slices of one segment

use std::sync::atomic::{AtomicUsize, Ordering};

use super::SegmentAllocator;
use crate::{
    error::{Result, VellumError},
    layout::value::check_alignment,
    segment::MemorySegment,
};

/// Bump allocator over a segment.
///
/// Allocations are consecutive, non-overlapping slices of the backing
/// segment, aligned as requested. Individual slices cannot be freed; the whole
/// segment is reused after [`SlicingAllocator::reset`]. Memory is not cleared.
#[derive(Debug)]
pub struct SlicingAllocator {
    /// Segment slices are cut from
    segment: MemorySegment,
    /// Offset of the first free byte (atomically updated)
    current_offset: AtomicUsize,
}

impl SlicingAllocator {
    pub fn new(segment: MemorySegment) -> Self {
        Self {
            segment,
            current_offset: AtomicUsize::new(0),
        }
    }

    /// Align a value up to the given alignment
    fn align_up(value: usize, align: usize) -> Option<usize> {
        value
            .checked_add(align - 1)
            .map(|value| value & !(align - 1))
    }

    pub fn segment(&self) -> &MemorySegment {
        &self.segment
    }

    /// Bytes consumed so far, alignment padding included
    pub fn used_size(&self) -> usize {
        self.current_offset.load(Ordering::Acquire)
    }

    pub fn available_size(&self) -> usize {
        self.segment.byte_size() - self.used_size()
    }

    /// Start handing out slices from the beginning again.
    ///
    /// Slices handed out earlier stay valid and will alias new ones.
    pub fn reset(&self) {
        self.current_offset.store(0, Ordering::Release);
    }
}

impl SegmentAllocator for SlicingAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment> {
        check_alignment(alignment)?;
        let base = self.segment.address();
        let total = self.segment.byte_size();

        loop {
            let current = self.current_offset.load(Ordering::Acquire);
            let start = Self::align_up(base + current, alignment)
                .map(|aligned| aligned - base)
                .filter(|start| *start <= total && size <= total - start)
                .ok_or_else(|| VellumError::out_of_bounds(current, size, total))?;
            let slice = self.segment.as_slice_aligned(start, size, alignment)?;

            match self.current_offset.compare_exchange_weak(
                current,
                start + size,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(slice),
                Err(_) => {
                    // Another thread advanced the offset, retry
                    std::hint::spin_loop();
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SegmentAllocatorExt;
    use crate::error::ErrorKind;
    use crate::session::Session;

    #[test]
    fn test_consecutive_slices() {
        let session = Session::confined();
        let backing = session.allocate(64, 16).unwrap();
        let allocator = SlicingAllocator::new(backing.clone());

        let a = allocator.allocate(3, 1).unwrap();
        let b = allocator.allocate(8, 8).unwrap();
        assert_eq!(a.address(), backing.address());
        assert_eq!(b.address(), backing.address() + 8);
        assert_eq!(allocator.used_size(), 16);
        assert_eq!(allocator.available_size(), 48);
        assert_eq!(b.session(), &session);
        session.close().unwrap();
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let allocator = SlicingAllocator::new(MemorySegment::of_bytes(vec![0u8; 10]));
        allocator.allocate_bytes(8).unwrap();
        assert_eq!(
            allocator.allocate_bytes(3).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
        allocator.allocate_bytes(2).unwrap();
        allocator.reset();
        assert_eq!(allocator.allocate_bytes(10).unwrap().byte_size(), 10);
    }

    #[test]
    fn test_heap_alignment_limit() {
        let allocator = SlicingAllocator::new(MemorySegment::of_bytes(vec![0u8; 32]));
        assert_eq!(
            allocator.allocate(4, 4).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
