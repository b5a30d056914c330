//! Segment allocators
//!
//! [`SegmentAllocator`] is the single allocation seam: sessions, arenas and
//! the slicing and prefix strategies all implement it, and
//! [`SegmentAllocatorExt`] derives the layout-aware helpers from it.

mod bump;
pub(crate) mod native;
mod prefix;

pub use bump::SlicingAllocator;
pub use prefix::PrefixAllocator;

use crate::{
    config::DEFAULT_ALIGNMENT,
    error::{Result, VellumError},
    layout::{AddressLayout, Carrier, MemoryLayout, ValueLayout},
    segment::MemorySegment,
    session::Session,
};

/// Source of memory segments
pub trait SegmentAllocator {
    /// Allocate a segment of `size` bytes whose address is a multiple of
    /// `alignment`
    fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment>;
}

/// Layout-aware allocation helpers
pub trait SegmentAllocatorExt: SegmentAllocator {
    fn allocate_bytes(&self, size: usize) -> Result<MemorySegment> {
        self.allocate(size, DEFAULT_ALIGNMENT)
    }

    /// Segment sized and aligned after `layout`
    fn allocate_layout(&self, layout: &MemoryLayout) -> Result<MemorySegment> {
        self.allocate(layout.byte_size()?, layout.byte_alignment())
    }

    /// Segment holding a single `value`
    fn allocate_value<T: Carrier>(&self, layout: &ValueLayout<T>, value: T) -> Result<MemorySegment> {
        let segment = self.allocate(layout.byte_size(), layout.byte_alignment())?;
        segment.set(layout, 0, value)?;
        Ok(segment)
    }

    /// Segment for `count` consecutive `element`s
    fn allocate_array(&self, element: &MemoryLayout, count: usize) -> Result<MemorySegment> {
        let size = element
            .byte_size()?
            .checked_mul(count)
            .ok_or_else(|| VellumError::invalid_argument("count", "array size overflows"))?;
        self.allocate(size, element.byte_alignment())
    }

    /// Segment initialized with `values`
    fn allocate_from<T: Carrier>(&self, layout: &ValueLayout<T>, values: &[T]) -> Result<MemorySegment> {
        let size = layout
            .byte_size()
            .checked_mul(values.len())
            .ok_or_else(|| VellumError::invalid_argument("values", "array size overflows"))?;
        let segment = self.allocate(size, layout.byte_alignment())?;
        segment.copy_from_slice(layout, 0, values)?;
        Ok(segment)
    }

    /// NUL-terminated copy of `value`
    fn allocate_string(&self, value: &str) -> Result<MemorySegment> {
        let segment = self.allocate_bytes(value.len() + 1)?;
        segment.set_string(0, value)?;
        Ok(segment)
    }

    /// Segment holding the address of `target`
    fn allocate_address(&self, layout: &AddressLayout, target: &MemorySegment) -> Result<MemorySegment> {
        let segment = self.allocate(layout.byte_size(), layout.byte_alignment())?;
        segment.set_address(layout, 0, target)?;
        Ok(segment)
    }
}

impl<A: SegmentAllocator + ?Sized> SegmentAllocatorExt for A {}

impl SegmentAllocator for Session {
    fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment> {
        native::allocate(self, size, alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::value::*;

    #[test]
    fn test_extension_helpers() {
        let session = Session::confined();

        let value = session.allocate_value(&I32, 42).unwrap();
        assert_eq!(value.byte_size(), 4);
        assert_eq!(value.get(&I32, 0).unwrap(), 42);

        let array = session.allocate_from(&F32, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(array.to_vec(&F32).unwrap(), vec![1.0, 2.0, 3.0]);

        let string = session.allocate_string("vellum").unwrap();
        assert_eq!(string.byte_size(), 7);
        assert_eq!(string.get_string(0).unwrap(), "vellum");

        let point = MemoryLayout::struct_layout([I32.with_name("x"), I32.with_name("y")]).unwrap();
        let points = session.allocate_array(&point, 3).unwrap();
        assert_eq!(points.byte_size(), 24);
        assert_eq!(points.address() % 4, 0);

        let pointer = session.allocate_address(&ADDRESS, &string).unwrap();
        assert_eq!(
            pointer.get_address(&ADDRESS, 0).unwrap().address(),
            string.address()
        );

        session.close().unwrap();
        assert!(!value.is_alive());
    }

    #[test]
    fn test_allocate_layout_rejects_unbounded() {
        let session = Session::confined();
        let unbounded = MemoryLayout::unbounded_sequence(U8).unwrap();
        assert!(session.allocate_layout(&unbounded).is_err());
        session.close().unwrap();
    }
}
