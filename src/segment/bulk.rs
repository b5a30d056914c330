//! Bulk operations: fill, copy, compare, strings and element iteration

use std::ptr;

use super::MemorySegment;
use crate::{
    config::WORD_SIZE,
    error::{Result, VellumError},
    layout::{Carrier, MemoryLayout, ValueLayout},
};

fn range_length(from: usize, to: usize, size: usize) -> Result<usize> {
    if from > to || to > size {
        return Err(VellumError::out_of_bounds(from, to.saturating_sub(from), size));
    }
    Ok(to - from)
}

fn checked_span(count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .ok_or_else(|| VellumError::invalid_argument("count", "element span overflows"))
}

/// Index of the first differing byte in the first `len` bytes at `a` and `b`
///
/// # Safety
/// Both pointers must be valid for reads of `len` bytes.
unsafe fn first_difference(a: *const u8, b: *const u8, len: usize) -> Option<usize> {
    let mut offset = 0;
    while offset + WORD_SIZE <= len {
        let wa = unsafe { ptr::read_unaligned(a.add(offset) as *const u64) };
        let wb = unsafe { ptr::read_unaligned(b.add(offset) as *const u64) };
        if wa != wb {
            break;
        }
        offset += WORD_SIZE;
    }
    while offset < len {
        if unsafe { *a.add(offset) != *b.add(offset) } {
            return Some(offset);
        }
        offset += 1;
    }
    None
}

impl MemorySegment {
    /// Set every byte of the segment to `value`
    pub fn fill(&self, value: u8) -> Result<()> {
        let (_guard, ptr) = self.check_access(0, self.size, 1, true)?;
        // SAFETY: the whole segment was validated for writing
        unsafe { ptr::write_bytes(ptr, value, self.size) };
        Ok(())
    }

    /// Copy all of `src` to the start of this segment
    pub fn copy_from(&self, src: &MemorySegment) -> Result<()> {
        MemorySegment::copy(src, 0, self, 0, src.size)
    }

    /// Copy `bytes` bytes from `src` at `src_offset` to `dst` at `dst_offset`.
    ///
    /// Overlapping ranges are handled as if the source were first copied to a
    /// temporary buffer.
    pub fn copy(
        src: &MemorySegment,
        src_offset: usize,
        dst: &MemorySegment,
        dst_offset: usize,
        bytes: usize,
    ) -> Result<()> {
        let (_src_guard, from) = src.check_access(src_offset, bytes, 1, false)?;
        let (_dst_guard, to) = dst.check_access(dst_offset, bytes, 1, true)?;
        // SAFETY: both ranges validated; ptr::copy tolerates overlap
        unsafe { ptr::copy(from, to, bytes) };
        Ok(())
    }

    /// Copy `count` elements between two arrays of carrier `T`, swapping
    /// bytes when the layouts disagree on byte order
    #[allow(clippy::too_many_arguments)]
    pub fn copy_elements<T: Carrier>(
        src: &MemorySegment,
        src_layout: &ValueLayout<T>,
        src_offset: usize,
        dst: &MemorySegment,
        dst_layout: &ValueLayout<T>,
        dst_offset: usize,
        count: usize,
    ) -> Result<()> {
        let width = src_layout.byte_size();
        let bytes = checked_span(count, width)?;
        let (_src_guard, from) =
            src.check_access(src_offset, bytes, src_layout.byte_alignment(), false)?;
        let (_dst_guard, to) =
            dst.check_access(dst_offset, bytes, dst_layout.byte_alignment(), true)?;

        if src_layout.order() == dst_layout.order() {
            // SAFETY: both ranges validated
            unsafe { ptr::copy(from, to, bytes) };
            return Ok(());
        }

        // Staging through a buffer keeps overlapping ranges correct
        let values: Vec<T> = (0..count)
            .map(|i| unsafe { T::read_raw(from.add(i * width), src_layout.order()) })
            .collect();
        for (i, value) in values.into_iter().enumerate() {
            unsafe { value.write_raw(to.add(i * width), dst_layout.order()) };
        }
        Ok(())
    }

    /// Read `dst.len()` values starting at `offset` into `dst`
    pub fn copy_to_slice<T: Carrier>(
        &self,
        layout: &ValueLayout<T>,
        offset: usize,
        dst: &mut [T],
    ) -> Result<()> {
        let width = layout.byte_size();
        let bytes = checked_span(dst.len(), width)?;
        let (_guard, from) = self.check_access(offset, bytes, layout.byte_alignment(), false)?;
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = unsafe { T::read_raw(from.add(i * width), layout.order()) };
        }
        Ok(())
    }

    /// Write the values of `src` starting at `offset`
    pub fn copy_from_slice<T: Carrier>(
        &self,
        layout: &ValueLayout<T>,
        offset: usize,
        src: &[T],
    ) -> Result<()> {
        let width = layout.byte_size();
        let bytes = checked_span(src.len(), width)?;
        let (_guard, to) = self.check_access(offset, bytes, layout.byte_alignment(), true)?;
        for (i, value) in src.iter().enumerate() {
            unsafe { value.write_raw(to.add(i * width), layout.order()) };
        }
        Ok(())
    }

    /// Offset of the first byte at which this segment and `other` differ.
    ///
    /// `None` when both have the same size and contents; when one is a
    /// prefix of the other, the size of the shorter one.
    pub fn mismatch(&self, other: &MemorySegment) -> Result<Option<usize>> {
        MemorySegment::mismatch_ranges(self, 0, self.size, other, 0, other.size)
    }

    /// Like [`MemorySegment::mismatch`] over `[src_from, src_to)` of `src`
    /// and `[dst_from, dst_to)` of `dst`; the result is relative to the range
    /// starts
    pub fn mismatch_ranges(
        src: &MemorySegment,
        src_from: usize,
        src_to: usize,
        dst: &MemorySegment,
        dst_from: usize,
        dst_to: usize,
    ) -> Result<Option<usize>> {
        let src_len = range_length(src_from, src_to, src.size)?;
        let dst_len = range_length(dst_from, dst_to, dst.size)?;
        let (_src_guard, a) = src.check_access(src_from, src_len, 1, false)?;
        let (_dst_guard, b) = dst.check_access(dst_from, dst_len, 1, false)?;

        let common = src_len.min(dst_len);
        // SAFETY: both ranges validated for reading
        if let Some(offset) = unsafe { first_difference(a, b, common) } {
            return Ok(Some(offset));
        }
        Ok((src_len != dst_len).then_some(common))
    }

    /// Copy the whole segment into a vector of carrier `T`
    pub fn to_vec<T: Carrier>(&self, layout: &ValueLayout<T>) -> Result<Vec<T>> {
        let width = layout.byte_size();
        if self.size % width != 0 {
            return Err(VellumError::invalid_argument(
                "layout",
                format!(
                    "segment size {} is not a multiple of the {} byte element",
                    self.size, width
                ),
            ));
        }
        let count = self.size / width;
        if count > isize::MAX as usize / std::mem::size_of::<T>().max(1) {
            return Err(VellumError::invalid_argument(
                "layout",
                format!("{} elements do not fit in a vector", count),
            ));
        }
        let mut values = Vec::new();
        values
            .try_reserve_exact(count)
            .map_err(|_| VellumError::OutOfMemory {
                requested: self.size,
            })?;
        let (_guard, from) = self.check_access(0, self.size, 1, false)?;
        for i in 0..count {
            values.push(unsafe { T::read_raw(from.add(i * width), layout.order()) });
        }
        Ok(values)
    }

    /// Read a NUL-terminated string starting at `offset`.
    ///
    /// Invalid UTF-8 sequences are replaced; a missing terminator is an
    /// out-of-bounds error.
    pub fn get_string(&self, offset: usize) -> Result<String> {
        let (_guard, start) = self.check_access(offset, 0, 1, false)?;
        let available = self.size - offset;
        // SAFETY: [offset, size) is inside the segment
        let bytes = unsafe { std::slice::from_raw_parts(start as *const u8, available) };
        let end = bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| VellumError::out_of_bounds(offset, available + 1, self.size))?;
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Write `value` followed by a NUL terminator at `offset`
    pub fn set_string(&self, offset: usize, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        let (_guard, to) = self.check_access(offset, bytes.len() + 1, 1, true)?;
        // SAFETY: len + 1 bytes validated for writing
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), to, bytes.len());
            *to.add(bytes.len()) = 0;
        }
        Ok(())
    }

    /// Iterate over consecutive slices shaped after `layout`
    pub fn elements(&self, layout: &MemoryLayout) -> Result<Elements> {
        let stride = layout.byte_size()?;
        if stride == 0 {
            return Err(VellumError::invalid_argument(
                "layout",
                "element layout has size zero",
            ));
        }
        if self.size % stride != 0 {
            return Err(VellumError::invalid_argument(
                "layout",
                format!(
                    "segment size {} is not a multiple of the element size {}",
                    self.size, stride
                ),
            ));
        }
        self.check_aligned(0, layout.byte_alignment())?;
        Ok(Elements {
            segment: self.clone(),
            stride,
            next: 0,
            end: self.size / stride,
        })
    }
}

/// Iterator over the element slices of a segment
#[derive(Debug, Clone)]
pub struct Elements {
    segment: MemorySegment,
    stride: usize,
    next: usize,
    end: usize,
}

impl Iterator for Elements {
    type Item = MemorySegment;

    fn next(&mut self) -> Option<MemorySegment> {
        if self.next == self.end {
            return None;
        }
        let slice = self
            .segment
            .slice_unchecked(self.next * self.stride, self.stride);
        self.next += 1;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Elements {
    fn next_back(&mut self) -> Option<MemorySegment> {
        if self.next == self.end {
            return None;
        }
        self.end -= 1;
        Some(
            self.segment
                .slice_unchecked(self.end * self.stride, self.stride),
        )
    }
}

impl ExactSizeIterator for Elements {}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::layout::{value::*, ByteOrder, MemoryLayout};
    use crate::MemorySegment;

    #[test]
    fn test_fill_and_to_vec() {
        let segment = MemorySegment::of_bytes(vec![0u8; 6]);
        segment.fill(0xAB).unwrap();
        assert_eq!(segment.to_vec(&U8).unwrap(), vec![0xAB; 6]);
        assert_eq!(
            segment.to_vec(&I32_UNALIGNED).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_overlapping_copy() {
        let segment = MemorySegment::of_bytes((0u8..10).collect());
        MemorySegment::copy(&segment, 0, &segment, 2, 8).unwrap();
        assert_eq!(
            segment.to_vec(&U8).unwrap(),
            vec![0, 1, 0, 1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[test]
    fn test_copy_elements_swaps_order() {
        let src = MemorySegment::of_array(vec![0x0102_0304u32, 0x0A0B_0C0D]);
        let dst = MemorySegment::of_array(vec![0u32; 2]);
        let be = U32.with_order(ByteOrder::BigEndian);
        let le = U32.with_order(ByteOrder::LittleEndian);
        MemorySegment::copy_elements(&src, &le, 0, &dst, &be, 0, 2).unwrap();
        assert_eq!(dst.get_at_index(&be, 0).unwrap(), src.get_at_index(&le, 0).unwrap());
        assert_eq!(dst.get_at_index(&be, 1).unwrap(), src.get_at_index(&le, 1).unwrap());
        assert_eq!(dst.get(&U8, 0).unwrap(), src.get(&U8, 3).unwrap());
    }

    #[test]
    fn test_slice_round_trip() {
        let segment = MemorySegment::of_array(vec![0i16; 4]);
        segment.copy_from_slice(&I16, 2, &[5, -6, 7]).unwrap();
        let mut out = [0i16; 4];
        segment.copy_to_slice(&I16, 0, &mut out).unwrap();
        assert_eq!(out, [0, 5, -6, 7]);
        assert!(segment.copy_from_slice(&I16, 4, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_mismatch() {
        let a = MemorySegment::of_bytes((0u8..40).collect());
        let b = MemorySegment::of_bytes((0u8..40).collect());
        assert_eq!(a.mismatch(&b).unwrap(), None);

        b.set(&U8, 37, 0).unwrap();
        assert_eq!(a.mismatch(&b).unwrap(), Some(37));

        let prefix = a.as_slice(0, 20).unwrap();
        assert_eq!(a.mismatch(&prefix).unwrap(), Some(20));
        assert_eq!(prefix.mismatch(&a).unwrap(), Some(20));

        assert_eq!(
            MemorySegment::mismatch_ranges(&a, 10, 20, &b, 10, 20).unwrap(),
            None
        );
        assert!(MemorySegment::mismatch_ranges(&a, 20, 10, &b, 0, 1).is_err());
    }

    #[test]
    fn test_strings() {
        let segment = MemorySegment::of_bytes(vec![0xFFu8; 16]);
        segment.set_string(2, "hello").unwrap();
        assert_eq!(segment.get_string(2).unwrap(), "hello");
        assert_eq!(segment.get_string(4).unwrap(), "llo");
        assert_eq!(
            segment.get_string(8).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
        assert!(segment.set_string(12, "four").is_err());
    }

    #[test]
    fn test_elements() {
        let segment = MemorySegment::of_array(vec![1i32, 2, 3, 4]);
        let pair = MemoryLayout::sequence_layout(2, I32).unwrap();
        let sums: Vec<i32> = segment
            .elements(&pair)
            .unwrap()
            .map(|e| e.get(&I32, 0).unwrap() + e.get(&I32, 4).unwrap())
            .collect();
        assert_eq!(sums, vec![3, 7]);
        assert_eq!(segment.elements(&I32.to_layout()).unwrap().rev().count(), 4);
        let triple = MemoryLayout::sequence_layout(3, I32).unwrap();
        assert!(segment.elements(&triple).is_err());
    }
}
