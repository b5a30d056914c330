//! Typed value and address access

use super::{MemorySegment, Storage};
use crate::{
    error::{Result, VellumError},
    layout::{AddressLayout, Carrier, ValueLayout},
    session::Session,
};

fn index_offset(index: usize, width: usize, size: usize) -> Result<usize> {
    index
        .checked_mul(width)
        .ok_or_else(|| VellumError::out_of_bounds(usize::MAX, width, size))
}

impl MemorySegment {
    /// Read a value of carrier `T` at `offset`
    #[inline]
    pub fn get<T: Carrier>(&self, layout: &ValueLayout<T>, offset: usize) -> Result<T> {
        let (_guard, ptr) =
            self.check_access(offset, layout.byte_size(), layout.byte_alignment(), false)?;
        // SAFETY: check_access validated the range and that the session is alive
        Ok(unsafe { T::read_raw(ptr, layout.order()) })
    }

    /// Write `value` at `offset`
    #[inline]
    pub fn set<T: Carrier>(&self, layout: &ValueLayout<T>, offset: usize, value: T) -> Result<()> {
        let (_guard, ptr) =
            self.check_access(offset, layout.byte_size(), layout.byte_alignment(), true)?;
        // SAFETY: check_access validated the range, liveness and writability
        unsafe { value.write_raw(ptr, layout.order()) };
        Ok(())
    }

    /// Read the `index`-th element of an array of `layout` values
    pub fn get_at_index<T: Carrier>(&self, layout: &ValueLayout<T>, index: usize) -> Result<T> {
        self.get(layout, index_offset(index, layout.byte_size(), self.size)?)
    }

    /// Write the `index`-th element of an array of `layout` values
    pub fn set_at_index<T: Carrier>(
        &self,
        layout: &ValueLayout<T>,
        index: usize,
        value: T,
    ) -> Result<()> {
        self.set(layout, index_offset(index, layout.byte_size(), self.size)?, value)
    }

    /// Read an address and materialize it as a native segment in the global
    /// session, sized after the target layout of `layout` (zero without one)
    pub fn get_address(&self, layout: &AddressLayout, offset: usize) -> Result<MemorySegment> {
        let address = {
            let (_guard, ptr) =
                self.check_access(offset, layout.byte_size(), layout.byte_alignment(), false)?;
            // SAFETY: range validated by check_access
            unsafe { layout.read_raw(ptr) }
        };
        let alignment = layout.dereference_alignment();
        if address & (alignment - 1) != 0 {
            return Err(VellumError::misaligned(address, alignment));
        }
        Ok(MemorySegment::native(
            address,
            layout.dereference_size(),
            Session::global(),
        ))
    }

    /// Store the address of `target` at `offset`.
    ///
    /// Heap segments have no stable native address and are rejected.
    pub fn set_address(
        &self,
        layout: &AddressLayout,
        offset: usize,
        target: &MemorySegment,
    ) -> Result<()> {
        if let Storage::Heap(_) = target.storage {
            return Err(VellumError::unsupported(
                "set_address",
                "heap segments cannot be converted to native addresses",
            ));
        }
        let (_guard, ptr) =
            self.check_access(offset, layout.byte_size(), layout.byte_alignment(), true)?;
        // SAFETY: range validated by check_access
        unsafe { layout.write_raw(ptr, target.address) };
        Ok(())
    }

    pub fn get_address_at_index(
        &self,
        layout: &AddressLayout,
        index: usize,
    ) -> Result<MemorySegment> {
        self.get_address(layout, index_offset(index, layout.byte_size(), self.size)?)
    }

    pub fn set_address_at_index(
        &self,
        layout: &AddressLayout,
        index: usize,
        target: &MemorySegment,
    ) -> Result<()> {
        self.set_address(
            layout,
            index_offset(index, layout.byte_size(), self.size)?,
            target,
        )
    }
}
