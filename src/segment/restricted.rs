//! Restricted operations that change the spatial or temporal bounds of a
//! segment without being able to verify them

use super::{MemorySegment, Storage};
use crate::{
    config::MAX_ALLOCATION_SIZE,
    error::{Result, VellumError},
    session::Session,
};

impl MemorySegment {
    fn check_reinterpretable(&self) -> Result<()> {
        if let Storage::Heap(_) = self.storage {
            return Err(VellumError::unsupported(
                "reinterpret",
                "heap segments cannot be reinterpreted",
            ));
        }
        Ok(())
    }

    fn check_new_size(new_size: usize) -> Result<()> {
        if new_size > MAX_ALLOCATION_SIZE {
            return Err(VellumError::invalid_argument(
                "new_size",
                format!("{} exceeds the addressable size", new_size),
            ));
        }
        Ok(())
    }

    /// Same address and session, `new_size` bytes.
    ///
    /// # Safety
    /// The caller asserts that `new_size` bytes starting at this segment's
    /// address are valid memory for as long as the session is alive.
    pub unsafe fn reinterpret(&self, new_size: usize) -> Result<MemorySegment> {
        self.check_reinterpretable()?;
        Self::check_new_size(new_size)?;
        Ok(MemorySegment {
            size: new_size,
            ..self.clone()
        })
    }

    /// Same address and size, owned by `session`.
    ///
    /// # Safety
    /// The caller asserts that the memory stays valid for as long as `session`
    /// is alive.
    pub unsafe fn reinterpret_in(&self, session: &Session) -> Result<MemorySegment> {
        self.check_reinterpretable()?;
        Ok(MemorySegment {
            session: session.clone(),
            ..self.clone()
        })
    }

    /// `new_size` bytes at this address owned by `session`, with `cleanup`
    /// run when `session` closes.
    ///
    /// `cleanup` receives a zero-length segment at the same address in the
    /// global session. If `session` cannot accept the action it runs at once
    /// and the error is returned.
    ///
    /// # Safety
    /// Same contract as [`MemorySegment::reinterpret`] and
    /// [`MemorySegment::reinterpret_in`].
    pub unsafe fn reinterpret_with_cleanup<F>(
        &self,
        new_size: usize,
        session: &Session,
        cleanup: F,
    ) -> Result<MemorySegment>
    where
        F: FnOnce(MemorySegment) + Send + 'static,
    {
        self.check_reinterpretable()?;
        Self::check_new_size(new_size)?;
        let address = self.address;
        session.add_close_action(move || cleanup(MemorySegment::of_address(address)))?;
        Ok(MemorySegment::native(address, new_size, session.clone()))
    }
}
