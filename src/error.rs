//! Error types and handling for Vellum

use std::thread::ThreadId;

/// Result type alias for Vellum operations
pub type Result<T> = std::result::Result<T, VellumError>;

/// Classification of [`VellumError`] values.
///
/// Every error maps onto exactly one kind; callers that only need to decide
/// whether to retry, redispatch or give up should match on the kind rather
/// than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed size, alignment, offset or layout parameters
    InvalidArgument,
    /// Access range outside the spatial bounds of a segment
    OutOfBounds,
    /// Operation on a closed session or on a segment whose session closed
    NotAlive,
    /// Confined-session operation from a thread other than the owner
    WrongThread,
    /// Operation not supported by this session or segment variant
    Unsupported,
    /// A session could not close because accessors are in flight
    ResourceBusy,
    /// One or more close actions failed while a session was closing
    CleanupFailed,
    /// The system allocator could not satisfy a request
    OutOfMemory,
    /// I/O or platform failure (mapping files, loading libraries)
    Io,
}

/// Error types for the Vellum memory access core
#[derive(Debug, thiserror::Error)]
pub enum VellumError {
    /// Invalid parameters or layout composition
    #[error("Invalid argument: {parameter} - {message}")]
    InvalidArgument { parameter: String, message: String },

    /// Access address does not satisfy the layout alignment
    #[error("Misaligned access: address {address:#x} not aligned to {alignment}")]
    Misaligned { address: usize, alignment: usize },

    /// Access range exceeds the segment bounds
    #[error("Out of bounds: range [{offset}, {offset} + {length}) outside segment of size {size}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },

    /// Session is closed
    #[error("Already closed: session {session} is not alive")]
    NotAlive { session: u64 },

    /// Confined session touched from a foreign thread
    #[error("Wrong thread: session owned by {owner:?}, accessed from {caller:?}")]
    WrongThread { owner: ThreadId, caller: ThreadId },

    /// Write attempted through a read-only segment
    #[error("Attempt to write a read-only segment")]
    ReadOnly,

    /// Structurally unsupported operation
    #[error("Unsupported operation: {operation} - {message}")]
    Unsupported { operation: String, message: String },

    /// Session has accessors in flight
    #[error("Resource busy: {message}")]
    ResourceBusy { message: String },

    /// Aggregated close action failures
    #[error("Close failed: {} close action(s) failed: {}", .failures.len(), .failures.join("; "))]
    CloseFailed { failures: Vec<String> },

    /// Allocation failure
    #[error("Out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl VellumError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a misalignment error
    pub fn misaligned(address: usize, alignment: usize) -> Self {
        Self::Misaligned { address, alignment }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(offset: usize, length: usize, size: usize) -> Self {
        Self::OutOfBounds {
            offset,
            length,
            size,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a resource busy error
    pub fn resource_busy(message: impl Into<String>) -> Self {
        Self::ResourceBusy {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::Misaligned { .. } => ErrorKind::InvalidArgument,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::NotAlive { .. } => ErrorKind::NotAlive,
            Self::WrongThread { .. } => ErrorKind::WrongThread,
            Self::ReadOnly | Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            Self::CloseFailed { .. } => ErrorKind::CleanupFailed,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::Io { .. } | Self::Platform { .. } => ErrorKind::Io,
        }
    }

    /// Whether the failed operation may succeed if simply retried later.
    ///
    /// Only a busy session qualifies: every other kind signals a caller bug
    /// or a permanent state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ResourceBusy
    }
}

impl From<std::io::Error> for VellumError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}
