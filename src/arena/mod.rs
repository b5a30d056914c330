//! Arenas: allocators bound to one session
//!
//! An [`Arena`] owns a session and allocates every segment into it. Closing
//! the arena (or dropping it) releases all of them at once.

mod config;

pub use config::{ArenaConfig, ArenaConfigBuilder};

#[cfg(feature = "file-backed")]
use crate::segment::mapped::MapConfig;
use crate::{
    allocator::{native, SegmentAllocator},
    error::Result,
    segment::MemorySegment,
    session::{Session, SessionKind},
};

/// Allocator owning the lifecycle of its segments
#[derive(Debug)]
pub struct Arena {
    session: Session,
}

impl Arena {
    /// Arena usable only from the calling thread
    pub fn of_confined() -> Self {
        Self {
            session: Session::confined(),
        }
    }

    /// Arena usable from any thread
    pub fn of_shared() -> Self {
        Self {
            session: Session::shared(),
        }
    }

    /// Arena whose memory is released once the arena and every segment
    /// allocated from it have been dropped
    pub fn of_auto() -> Self {
        Self {
            session: Session::implicit(),
        }
    }

    /// Arena over the global session; its memory is never released
    pub fn global() -> Self {
        Self {
            session: Session::global(),
        }
    }

    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        Ok(Self {
            session: Session::with_config(&config)?,
        })
    }

    /// Session of the arena's segments; closing it through this handle is
    /// refused, use [`Arena::close`]
    pub fn session(&self) -> Session {
        self.session.as_non_closeable()
    }

    pub fn kind(&self) -> SessionKind {
        self.session.kind()
    }

    /// Close the session, releasing every segment allocated from the arena
    pub fn close(&self) -> Result<()> {
        self.session.close()
    }

    /// Map a file or memfd into the arena
    #[cfg(feature = "file-backed")]
    pub fn map(&self, config: &MapConfig) -> Result<MemorySegment> {
        self.session.as_non_closeable().map(config)
    }
}

impl SegmentAllocator for Arena {
    fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment> {
        native::allocate(&self.session.as_non_closeable(), size, alignment)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.session.is_closeable() || !self.session.is_alive() {
            return;
        }
        if let Err(err) = self.session.close() {
            log::warn!("Failed to close arena session {}: {}", self.session.id(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SegmentAllocatorExt;
    use crate::error::ErrorKind;
    use crate::layout::value::*;

    #[test]
    fn test_arena_segments_share_session() {
        let arena = Arena::of_confined();
        let a = arena.allocate_value(&I32, 1).unwrap();
        let b = arena.allocate_value(&I64, 2).unwrap();
        assert_eq!(a.session(), b.session());
        assert_eq!(a.session(), &arena.session());
        assert_eq!(
            a.session().close().unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        arena.close().unwrap();
        assert_eq!(b.get(&I64, 0).unwrap_err().kind(), ErrorKind::NotAlive);
    }

    #[test]
    fn test_drop_closes_arena() {
        let segment = {
            let arena = Arena::of_shared();
            arena.allocate_bytes(16).unwrap()
        };
        assert!(!segment.is_alive());
    }

    #[test]
    fn test_auto_arena_outlives_handle() {
        let segment = {
            let arena = Arena::of_auto();
            arena.allocate_value(&U16, 7).unwrap()
        };
        assert!(segment.is_alive());
        assert_eq!(segment.get(&U16, 0).unwrap(), 7);
    }

    #[test]
    fn test_with_config() {
        let arena = Arena::with_config(ArenaConfig::new(SessionKind::Shared).with_name("scratch"))
            .unwrap();
        assert_eq!(arena.kind(), SessionKind::Shared);
        assert_eq!(arena.session().name(), Some("scratch"));
    }
}
