//! Heap arrays backing heap segments

use std::ptr::{self, NonNull};

use crate::layout::{ArrayElement, CarrierKind};

/// A boxed slice of an [`ArrayElement`] carrier, owned through a type-erased
/// pointer so that segments over arrays of any carrier share one type
pub(crate) struct HeapArray {
    ptr: NonNull<u8>,
    byte_len: usize,
    elem_len: usize,
    kind: CarrierKind,
    drop_fn: unsafe fn(*mut u8, usize),
}

unsafe fn drop_boxed<T>(ptr: *mut u8, len: usize) {
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr as *mut T, len)) });
}

impl HeapArray {
    pub(crate) fn new<T: ArrayElement>(values: Vec<T>) -> Self {
        let boxed = values.into_boxed_slice();
        let elem_len = boxed.len();
        let raw = Box::into_raw(boxed) as *mut T as *mut u8;
        Self {
            // SAFETY: pointers produced by Box::into_raw are never null
            ptr: unsafe { NonNull::new_unchecked(raw) },
            byte_len: elem_len * T::KIND.byte_size(),
            elem_len,
            kind: T::KIND,
            drop_fn: drop_boxed::<T>,
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub(crate) fn kind(&self) -> CarrierKind {
        self.kind
    }

    /// Strongest alignment an access into the array may claim
    #[inline]
    pub(crate) fn max_alignment(&self) -> usize {
        self.kind.byte_size()
    }
}

impl Drop for HeapArray {
    fn drop(&mut self) {
        // SAFETY: ptr and elem_len came from Box::into_raw of a Box<[T]> and
        // drop_fn was monomorphized for the same T
        unsafe { (self.drop_fn)(self.ptr.as_ptr(), self.elem_len) }
    }
}

// SAFETY: the array is exclusively owned and only reached through raw
// pointer reads and writes of plain-old-data carriers
unsafe impl Send for HeapArray {}
unsafe impl Sync for HeapArray {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_array_metadata() {
        let array = HeapArray::new(vec![1i32, 2, 3]);
        assert_eq!(array.byte_len(), 12);
        assert_eq!(array.kind(), CarrierKind::I32);
        assert_eq!(array.max_alignment(), 4);
        assert_eq!(unsafe { *(array.as_ptr() as *const i32).add(2) }, 3);
    }

    #[test]
    fn test_empty_array() {
        let array = HeapArray::new(Vec::<f64>::new());
        assert_eq!(array.byte_len(), 0);
        assert_eq!(array.max_alignment(), 8);
    }
}
