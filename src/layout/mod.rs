//! Declarative memory layouts
//!
//! A [`MemoryLayout`] describes the shape of a region of memory: its size,
//! its alignment constraint and, for scalar leaves, the carrier type and byte
//! order used to read and write it. Layouts compose into structs, unions and
//! sequences, and a path of [`PathElement`]s addresses any nested member to
//! compute its byte offset.
//!
//! Layouts are immutable. Every `with_*` derivation returns a new layout.
//!
//! ```text
//!   struct_layout([I32.with_name("x"), I32.with_name("y")])   => [i32le(x)i32le(y)]
//!   byte_offset([group_element("y")])                         => 4
//! ```

pub mod group;
pub mod path;
mod raw;
pub mod sequence;
pub mod value;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

pub use group::{GroupKind, GroupLayout, PaddingLayout};
pub use path::{PathElement, ValueHandle};
pub use sequence::SequenceLayout;
pub use value::{
    AddressLayout, ArrayElement, ByteOrder, Carrier, CarrierKind, ValueDescriptor, ValueLayout,
};

/// Closed set of layout variants.
///
/// Decoding rebuilds the tree through the same checks as the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "raw::RawMemoryLayout")]
pub enum MemoryLayout {
    /// Scalar or address leaf
    Value(ValueDescriptor),
    /// Repeated element
    Sequence(SequenceLayout),
    /// Members laid out one after another
    Struct(GroupLayout),
    /// Members overlapping at offset zero
    Union(GroupLayout),
    /// Size-only filler
    Padding(PaddingLayout),
}

impl MemoryLayout {
    /// Struct of `members` in declaration order.
    ///
    /// Every member must already sit at an offset that satisfies its
    /// alignment; use [`MemoryLayout::padding_layout`] to insert filler, or
    /// [`MemoryLayout::c_struct`] to have it computed.
    pub fn struct_layout<I, L>(members: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        let members = members.into_iter().map(Into::into).collect();
        Ok(MemoryLayout::Struct(GroupLayout::new(GroupKind::Struct, members)?))
    }

    /// Struct of `members` padded the way the platform C ABI lays it out
    pub fn c_struct<I, L>(members: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        let members = group::c_abi_members(members.into_iter().map(Into::into).collect())?;
        Ok(MemoryLayout::Struct(GroupLayout::new(GroupKind::Struct, members)?))
    }

    pub fn union_layout<I, L>(members: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        let members = members.into_iter().map(Into::into).collect();
        Ok(MemoryLayout::Union(GroupLayout::new(GroupKind::Union, members)?))
    }

    pub fn sequence_layout(count: u64, element: impl Into<MemoryLayout>) -> Result<Self> {
        Ok(MemoryLayout::Sequence(SequenceLayout::new(
            Some(count),
            element.into(),
        )?))
    }

    /// Sequence without a known element count.
    ///
    /// Its size is unspecified; path indices into it are only checked for
    /// offset overflow.
    pub fn unbounded_sequence(element: impl Into<MemoryLayout>) -> Result<Self> {
        Ok(MemoryLayout::Sequence(SequenceLayout::new(
            None,
            element.into(),
        )?))
    }

    pub fn padding_layout(size: usize) -> Result<Self> {
        Ok(MemoryLayout::Padding(PaddingLayout::new(size)?))
    }

    /// Size in bytes; InvalidArgument for unbounded sequences
    pub fn byte_size(&self) -> Result<usize> {
        match self {
            MemoryLayout::Value(desc) => Ok(desc.byte_size()),
            MemoryLayout::Sequence(seq) => seq.byte_size().ok_or_else(|| {
                VellumError::invalid_argument("layout", "unbounded sequence has no size")
            }),
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => Ok(group.byte_size()),
            MemoryLayout::Padding(padding) => Ok(padding.byte_size()),
        }
    }

    pub fn has_known_size(&self) -> bool {
        self.byte_size().is_ok()
    }

    pub fn byte_alignment(&self) -> usize {
        match self {
            MemoryLayout::Value(desc) => desc.byte_alignment(),
            MemoryLayout::Sequence(seq) => seq.byte_alignment(),
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group.byte_alignment(),
            MemoryLayout::Padding(padding) => padding.byte_alignment(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MemoryLayout::Value(desc) => desc.name(),
            MemoryLayout::Sequence(seq) => seq.name(),
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group.name(),
            MemoryLayout::Padding(padding) => padding.name(),
        }
    }

    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        self.renamed(Some(Arc::from(name.as_ref())))
    }

    pub fn without_name(&self) -> Self {
        self.renamed(None)
    }

    fn renamed(&self, name: Option<Arc<str>>) -> Self {
        match self {
            MemoryLayout::Value(desc) => MemoryLayout::Value(desc.with_name(name)),
            MemoryLayout::Sequence(seq) => MemoryLayout::Sequence(seq.with_name(name)),
            MemoryLayout::Struct(group) => MemoryLayout::Struct(group.with_name(name)),
            MemoryLayout::Union(group) => MemoryLayout::Union(group.with_name(name)),
            MemoryLayout::Padding(padding) => MemoryLayout::Padding(padding.with_name(name)),
        }
    }

    /// Derive a layout with another alignment constraint.
    ///
    /// Groups and sequences reject alignments weaker than those of their
    /// members.
    pub fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        Ok(match self {
            MemoryLayout::Value(desc) => MemoryLayout::Value(desc.with_byte_alignment(alignment)?),
            MemoryLayout::Sequence(seq) => {
                MemoryLayout::Sequence(seq.with_byte_alignment(alignment)?)
            }
            MemoryLayout::Struct(group) => MemoryLayout::Struct(group.with_byte_alignment(alignment)?),
            MemoryLayout::Union(group) => MemoryLayout::Union(group.with_byte_alignment(alignment)?),
            MemoryLayout::Padding(padding) => {
                MemoryLayout::Padding(padding.with_byte_alignment(alignment)?)
            }
        })
    }

    /// Value descriptor if this is a scalar or address leaf
    pub fn as_value(&self) -> Option<&ValueDescriptor> {
        match self {
            MemoryLayout::Value(desc) => Some(desc),
            _ => None,
        }
    }

    /// Typed view of this layout when it is a value of carrier `T`
    pub fn as_value_layout<T: Carrier>(&self) -> Option<ValueLayout<T>> {
        self.as_value().and_then(ValueLayout::from_descriptor)
    }

    pub fn as_address_layout(&self) -> Option<AddressLayout> {
        self.as_value().and_then(AddressLayout::from_descriptor)
    }

    fn fmt_name_and_alignment(
        &self,
        f: &mut fmt::Formatter<'_>,
        natural_alignment: usize,
    ) -> fmt::Result {
        if self.byte_alignment() != natural_alignment {
            write!(f, "%{}", self.byte_alignment())?;
        }
        if let Some(name) = self.name() {
            write!(f, "({})", name)?;
        }
        Ok(())
    }
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLayout::Value(desc) => {
                desc.fmt_descriptor(f)?;
                if let Some(name) = desc.name() {
                    write!(f, "({})", name)?;
                }
                Ok(())
            }
            MemoryLayout::Sequence(seq) => {
                match seq.element_count() {
                    Some(count) => write!(f, "[{}:{}]", count, seq.element())?,
                    None => write!(f, "[*:{}]", seq.element())?,
                }
                self.fmt_name_and_alignment(f, seq.element().byte_alignment())
            }
            MemoryLayout::Struct(group) | MemoryLayout::Union(group) => {
                let separator = if matches!(self, MemoryLayout::Union(_)) {
                    "|"
                } else {
                    ""
                };
                write!(f, "[")?;
                for (index, member) in group.members().iter().enumerate() {
                    if index > 0 {
                        write!(f, "{}", separator)?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, "]")?;
                let natural = group
                    .members()
                    .iter()
                    .map(MemoryLayout::byte_alignment)
                    .max()
                    .unwrap_or(1);
                self.fmt_name_and_alignment(f, natural)
            }
            MemoryLayout::Padding(padding) => {
                write!(f, "x{}", padding.byte_size())?;
                self.fmt_name_and_alignment(f, 1)
            }
        }
    }
}
