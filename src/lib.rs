//! # Vellum - Bounds-Checked Foreign Memory Access
//!
//! Vellum gives safe, bounds-checked, lifetime-checked access to memory that
//! lives outside the Rust heap (native allocations, mapped files, symbols in
//! shared libraries) as well as to ordinary heap arrays, through one uniform
//! segment abstraction.
//!
//! ## Features
//!
//! - **Declarative layouts**: scalars, structs, unions, sequences and padding,
//!   with path-based offset resolution
//! - **Sessions**: confined, shared, implicit and global lifecycles with
//!   deterministic cleanup
//! - **Segments**: spatial, temporal, confinement and alignment checks on
//!   every access
//! - **Allocators**: native, slicing and prefix allocation strategies
//! - **Mapped memory**: file-backed and memfd segments
//! - **Symbol lookup**: addresses resolved from dynamic libraries
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Vellum Core                      │
//! ├──────────────────────────────────────────────────┤
//! │  Layouts            │  Segments                  │
//! │  - value / address  │  - native / heap / mapped  │
//! │  - struct / union   │  - slicing, copy, compare  │
//! │  - sequence / path  │  - typed get / set         │
//! └──────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────────┐  ┌─────────────────────────┐
//! │  Sessions / Arenas  │  │  Allocators / Lookup    │
//! │  (lifecycle, gate)  │  │  (allocation, symbols)  │
//! └─────────────────────┘  └─────────────────────────┘
//! ```

// Core modules
pub mod error;
pub mod layout;
pub mod segment;
pub mod session;

// Allocation and lifecycle front-ends
pub mod allocator;
pub mod arena;

// Symbol resolution
pub mod lookup;

// Main API re-exports
pub use allocator::{PrefixAllocator, SegmentAllocator, SegmentAllocatorExt, SlicingAllocator};
pub use arena::{Arena, ArenaConfig, ArenaConfigBuilder};
pub use error::{ErrorKind, Result, VellumError};
pub use layout::{
    AddressLayout, ArrayElement, ByteOrder, Carrier, CarrierKind, GroupLayout, MemoryLayout,
    PathElement, SequenceLayout, ValueHandle, ValueLayout,
};
pub use lookup::{LibraryLookup, MapLookup, SymbolLookup};
pub use segment::{Elements, MemorySegment};
#[cfg(feature = "file-backed")]
pub use segment::mapped::{BackingType, MapConfig, MapMode};
pub use session::{AccessGuard, Session, SessionKind, SessionStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    /// Alignment used by `allocate_bytes` and string allocation
    pub const DEFAULT_ALIGNMENT: usize = 1;

    /// Largest size a single native allocation may request
    pub const MAX_ALLOCATION_SIZE: usize = isize::MAX as usize;

    /// Size given to segments dereferenced through an unbounded target layout
    pub const UNBOUNDED_SIZE: usize = isize::MAX as usize;

    /// Width of the word used by bulk comparisons
    pub const WORD_SIZE: usize = std::mem::size_of::<u64>();
}
