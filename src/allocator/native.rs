//! Native allocation primitive backing session allocations

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::{
    config::MAX_ALLOCATION_SIZE,
    error::{Result, VellumError},
    layout::value::check_alignment,
    segment::MemorySegment,
    session::{Session, SessionKind},
};

/// A zeroed block from the system allocator, freed by a close action
struct NativeBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl NativeBlock {
    fn free(self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout and
        // is freed exactly once, by the close action that owns the block
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the block is plain memory with no thread affinity
unsafe impl Send for NativeBlock {}

/// Allocate `size` zeroed bytes aligned to `alignment`, owned by `session`.
///
/// Arguments and the session are validated before any memory is obtained.
pub(crate) fn allocate(session: &Session, size: usize, alignment: usize) -> Result<MemorySegment> {
    check_alignment(alignment)?;
    if size > MAX_ALLOCATION_SIZE {
        return Err(VellumError::invalid_argument(
            "size",
            format!("{} exceeds the maximum allocation size", size),
        ));
    }

    let _guard = session.acquire()?;

    let layout = Layout::from_size_align(size.max(1), alignment).map_err(|_| {
        VellumError::invalid_argument(
            "size",
            format!("{} bytes aligned to {} overflows", size, alignment),
        )
    })?;
    // SAFETY: layout has a non-zero size
    let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
        .ok_or(VellumError::OutOfMemory { requested: size })?;
    let address = ptr.as_ptr() as usize;

    // the global session never closes, so its blocks are leaked outright
    if session.kind() != SessionKind::Global {
        let block = NativeBlock { ptr, layout };
        session.register(Box::new(move || {
            block.free();
            Ok(())
        }))?;
    }

    session.record_allocation(size);
    log::trace!(
        "Allocated {} bytes aligned to {} at {:#x} in session {}",
        size,
        alignment,
        address,
        session.id()
    );

    Ok(MemorySegment::native(address, size, session.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::value::*;

    #[test]
    fn test_zeroed_and_aligned() {
        let session = Session::confined();
        let segment = allocate(&session, 100, 64).unwrap();
        assert_eq!(segment.address() % 64, 0);
        assert_eq!(segment.byte_size(), 100);
        assert!(segment.to_vec(&U8).unwrap().iter().all(|b| *b == 0));
        assert_eq!(session.stats().allocations, 1);
        session.close().unwrap();
    }

    #[test]
    fn test_zero_size() {
        let session = Session::confined();
        let segment = allocate(&session, 0, 1).unwrap();
        assert_eq!(segment.byte_size(), 0);
        assert_eq!(segment.get(&U8, 0).unwrap_err().kind(), ErrorKind::OutOfBounds);
        session.close().unwrap();
    }

    #[test]
    fn test_invalid_arguments() {
        let session = Session::confined();
        for alignment in [0, 3, 12] {
            assert_eq!(
                allocate(&session, 8, alignment).unwrap_err().kind(),
                ErrorKind::InvalidArgument
            );
        }
        assert_eq!(
            allocate(&session, usize::MAX, 1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(session.stats().allocations, 0);
    }

    #[test]
    fn test_global_allocation_registers_no_close_action() {
        let global = Session::global();
        let before = global.stats();
        let segment = allocate(&global, 16, 8).unwrap();
        let after = global.stats();
        assert_eq!(after.close_actions, before.close_actions);
        assert!(after.allocations > before.allocations);
        segment.set(&I64, 8, 7).unwrap();
        assert_eq!(segment.get(&I64, 8).unwrap(), 7);
    }

    #[test]
    fn test_closed_session() {
        let session = Session::shared();
        session.close().unwrap();
        assert_eq!(
            allocate(&session, 8, 8).unwrap_err().kind(),
            ErrorKind::NotAlive
        );
    }
}
