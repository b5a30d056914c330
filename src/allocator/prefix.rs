//! Prefix allocator - always returns the start of one segment

use super::SegmentAllocator;
use crate::{error::Result, segment::MemorySegment};

/// Allocator that answers every request with a prefix of the same segment.
///
/// Useful for reusing one scratch buffer across calls; each allocation
/// overwrites what the previous one handed out. Memory is not cleared.
#[derive(Debug, Clone)]
pub struct PrefixAllocator {
    segment: MemorySegment,
}

impl PrefixAllocator {
    pub fn new(segment: MemorySegment) -> Self {
        Self { segment }
    }

    pub fn segment(&self) -> &MemorySegment {
        &self.segment
    }
}

impl SegmentAllocator for PrefixAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment> {
        self.segment.as_slice_aligned(0, size, alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SegmentAllocatorExt;
    use crate::error::ErrorKind;
    use crate::layout::value::*;

    #[test]
    fn test_prefix_reuse() {
        let allocator = PrefixAllocator::new(MemorySegment::of_array(vec![0u64; 4]));
        let first = allocator.allocate_value(&I64, 11).unwrap();
        let second = allocator.allocate_value(&I64, 22).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(&I64, 0).unwrap(), 22);
    }

    #[test]
    fn test_prefix_too_large() {
        let allocator = PrefixAllocator::new(MemorySegment::of_bytes(vec![0u8; 4]));
        assert_eq!(
            allocator.allocate(5, 1).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
    }
}
