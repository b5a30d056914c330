//! Sessions: lifecycles owning native resources
//!
//! A [`Session`] decides when the memory behind a segment may be accessed and
//! when it is released. Every segment is tied to exactly one session; once the
//! session closes, every access through any of its segments fails.
//!
//! Four kinds exist:
//!
//! - **Confined**: one owner thread, explicit close
//! - **Shared**: any thread, explicit close
//! - **Implicit**: any thread, released when the last handle is dropped
//! - **Global**: any thread, never closes

pub(crate) mod cleanup;
mod gate;
mod stats;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
    thread::{self, ThreadId},
};

use serde::{Deserialize, Serialize};

use crate::{
    arena::ArenaConfig,
    error::{Result, VellumError},
    segment::MemorySegment,
};

use self::{
    cleanup::{CleanupStack, CloseAction},
    gate::{AccessGate, CloseAttempt},
    stats::{next_session_id, AtomicSessionStats},
};

pub use self::gate::AccessGuard;
pub use self::stats::SessionStats;

lazy_static::lazy_static! {
    static ref GLOBAL_SESSION: Session = Session::create(SessionKind::Global, None);
}

/// Lifecycle and thread discipline of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    Confined,
    Shared,
    Implicit,
    Global,
}

impl SessionKind {
    /// Whether `close()` may be called on sessions of this kind
    pub fn is_closeable(self) -> bool {
        matches!(self, SessionKind::Confined | SessionKind::Shared)
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionKind::Confined => "confined",
            SessionKind::Shared => "shared",
            SessionKind::Implicit => "implicit",
            SessionKind::Global => "global",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct SessionInner {
    id: u64,
    kind: SessionKind,
    owner: Option<ThreadId>,
    name: Option<String>,
    gate: AccessGate,
    cleanup: CleanupStack,
    stats: AtomicSessionStats,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.kind == SessionKind::Global || !self.gate.force_close() {
            return;
        }
        match self.kind {
            SessionKind::Implicit => {
                log::debug!("Reclaiming implicit session {}", self.id);
            }
            _ => {
                log::warn!(
                    "{} session {} dropped without close; releasing its resources",
                    self.kind,
                    self.id
                );
            }
        }
        if let Err(err) = self.cleanup.run_all() {
            log::warn!("Cleanup of session {} failed: {}", self.id, err);
        }
    }
}

/// Handle to a session.
///
/// Handles are cheap to clone and compare equal when they refer to the same
/// session, including non-closeable views obtained with
/// [`Session::as_non_closeable`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    closeable: bool,
}

impl Session {
    fn create(kind: SessionKind, name: Option<String>) -> Self {
        let owner = match kind {
            SessionKind::Confined => Some(thread::current().id()),
            _ => None,
        };
        let inner = SessionInner {
            id: next_session_id(),
            kind,
            owner,
            name,
            gate: AccessGate::new(),
            cleanup: CleanupStack::new(),
            stats: AtomicSessionStats::new(),
        };
        log::debug!("Created {} session {}", kind, inner.id);
        Self {
            inner: Arc::new(inner),
            closeable: kind.is_closeable(),
        }
    }

    /// Session owned by the calling thread
    pub fn confined() -> Self {
        Self::create(SessionKind::Confined, None)
    }

    /// Session usable from any thread, closed explicitly
    pub fn shared() -> Self {
        Self::create(SessionKind::Shared, None)
    }

    /// Session released once every handle to it (including the ones held by
    /// its segments) has been dropped
    pub fn implicit() -> Self {
        Self::create(SessionKind::Implicit, None)
    }

    /// The process-wide session that is always alive
    pub fn global() -> Self {
        GLOBAL_SESSION.clone()
    }

    /// Session described by an arena configuration
    pub fn with_config(config: &ArenaConfig) -> Result<Self> {
        config.validate()?;
        Ok(match config.kind {
            SessionKind::Global => Self::global(),
            kind => Self::create(kind, config.name.clone()),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    /// Diagnostic name given through [`ArenaConfig`]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Owner thread of a confined session
    pub fn owner_thread(&self) -> Option<ThreadId> {
        self.inner.owner
    }

    /// Whether `close()` may be called through this handle
    pub fn is_closeable(&self) -> bool {
        self.closeable
    }

    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.inner.owner.map_or(true, |owner| owner == thread)
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        match self.inner.owner {
            Some(owner) => {
                let caller = thread::current().id();
                if owner == caller {
                    Ok(())
                } else {
                    Err(VellumError::WrongThread { owner, caller })
                }
            }
            None => Ok(()),
        }
    }

    fn not_alive(&self) -> VellumError {
        VellumError::NotAlive {
            session: self.inner.id,
        }
    }

    /// Register the calling thread as an accessor.
    ///
    /// The session cannot close until the returned guard is dropped.
    pub fn acquire(&self) -> Result<AccessGuard<'_>> {
        self.check_thread()?;
        if self.inner.kind == SessionKind::Global {
            return Ok(AccessGuard::unguarded());
        }
        if self.inner.gate.enter() {
            Ok(AccessGuard::entered(&self.inner.gate))
        } else {
            Err(self.not_alive())
        }
    }

    /// Run `f` while keeping the session open
    pub fn while_alive<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let _guard = self.acquire()?;
        Ok(f())
    }

    /// Allocate `size` zeroed bytes aligned to `alignment`, freed when this
    /// session closes
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<MemorySegment> {
        crate::allocator::native::allocate(self, size, alignment)
    }

    /// Register an infallible cleanup to run when the session closes
    pub fn add_close_action<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Box::new(move || {
            action();
            Ok(())
        }))
    }

    /// Register a cleanup whose failure is reported by `close()`
    pub fn add_fallible_close_action<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.register(Box::new(action))
    }

    /// Push `action` on the cleanup stack.
    ///
    /// When the session cannot accept it, the action runs immediately and the
    /// reason is returned.
    pub(crate) fn register(&self, action: CloseAction) -> Result<()> {
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => {
                if let Err(failure) = cleanup::run_one(action) {
                    log::warn!(
                        "Close action rejected by session {} failed: {}",
                        self.inner.id,
                        failure
                    );
                }
                return Err(err);
            }
        };
        self.inner.cleanup.push(action);
        self.inner.stats.record_close_action();
        drop(guard);
        Ok(())
    }

    /// Close the session and run its close actions.
    ///
    /// Fails without side effects when the session cannot be closed through
    /// this handle, is touched from a foreign thread, is already closed or has
    /// accessors in flight. Once the session is closed, every close action
    /// runs; their failures are reported together.
    pub fn close(&self) -> Result<()> {
        if !self.closeable {
            return Err(VellumError::unsupported(
                "close",
                format!("{} session {} cannot be closed explicitly", self.kind(), self.id()),
            ));
        }
        self.check_thread()?;

        match self.inner.gate.try_close() {
            CloseAttempt::Closed => {}
            CloseAttempt::AlreadyClosed => return Err(self.not_alive()),
            CloseAttempt::Busy(count) => {
                self.inner.stats.record_busy_close();
                return Err(VellumError::resource_busy(format!(
                    "session {} has {} accessor(s) in flight",
                    self.id(),
                    count
                )));
            }
        }

        log::debug!("Closing {} session {}", self.kind(), self.id());
        self.inner.cleanup.run_all()
    }

    /// View of this session that refuses `close()`
    pub fn as_non_closeable(&self) -> Session {
        Session {
            inner: Arc::clone(&self.inner),
            closeable: false,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.stats.snapshot(self.inner.gate.in_flight())
    }

    pub(crate) fn record_allocation(&self, bytes: usize) {
        self.inner.stats.record_allocation(bytes);
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("name", &self.inner.name)
            .field("alive", &self.is_alive())
            .field("closeable", &self.closeable)
            .finish()
    }
}
