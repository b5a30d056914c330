//! Deserialized layout trees, rebuilt through the checked constructors
//!
//! The encoded form mirrors the derived `Serialize` output of the layout
//! types. Sizes, offsets and alignments found in the input are recomputed and
//! must agree with what the constructors derive from the members.

use std::sync::Arc;

use serde::Deserialize;

use super::{
    group::{GroupKind, GroupLayout, PaddingLayout},
    sequence::SequenceLayout,
    value::{check_alignment, ByteOrder, CarrierKind, ValueDescriptor},
    MemoryLayout,
};
use crate::error::{Result, VellumError};

#[derive(Deserialize)]
pub(crate) struct RawValueDescriptor {
    carrier: CarrierKind,
    order: ByteOrder,
    alignment: usize,
    name: Option<Arc<str>>,
}

impl TryFrom<RawValueDescriptor> for ValueDescriptor {
    type Error = VellumError;

    fn try_from(raw: RawValueDescriptor) -> Result<Self> {
        check_alignment(raw.alignment)?;
        Ok(ValueDescriptor::decoded(
            raw.carrier,
            raw.order,
            raw.alignment,
            raw.name,
        ))
    }
}

#[derive(Deserialize)]
pub(crate) enum RawMemoryLayout {
    Value(ValueDescriptor),
    Sequence(RawSequenceLayout),
    Struct(RawGroupLayout),
    Union(RawGroupLayout),
    Padding(RawPaddingLayout),
}

#[derive(Deserialize)]
pub(crate) struct RawSequenceLayout {
    element: Box<MemoryLayout>,
    count: Option<u64>,
    size: Option<usize>,
    alignment: usize,
    name: Option<Arc<str>>,
}

#[derive(Deserialize)]
pub(crate) struct RawGroupLayout {
    members: Vec<MemoryLayout>,
    offsets: Vec<usize>,
    size: usize,
    alignment: usize,
    name: Option<Arc<str>>,
}

#[derive(Deserialize)]
pub(crate) struct RawPaddingLayout {
    size: usize,
    alignment: usize,
    name: Option<Arc<str>>,
}

impl TryFrom<RawMemoryLayout> for MemoryLayout {
    type Error = VellumError;

    fn try_from(raw: RawMemoryLayout) -> Result<Self> {
        Ok(match raw {
            RawMemoryLayout::Value(desc) => MemoryLayout::Value(desc),
            RawMemoryLayout::Sequence(raw) => MemoryLayout::Sequence(raw.rebuild()?),
            RawMemoryLayout::Struct(raw) => MemoryLayout::Struct(raw.rebuild(GroupKind::Struct)?),
            RawMemoryLayout::Union(raw) => MemoryLayout::Union(raw.rebuild(GroupKind::Union)?),
            RawMemoryLayout::Padding(raw) => MemoryLayout::Padding(raw.rebuild()?),
        })
    }
}

impl RawSequenceLayout {
    fn rebuild(self) -> Result<SequenceLayout> {
        let seq = SequenceLayout::new(self.count, *self.element)?;
        if seq.byte_size() != self.size {
            return Err(mismatch("size"));
        }
        let seq = if self.alignment == seq.byte_alignment() {
            seq
        } else {
            seq.with_byte_alignment(self.alignment)?
        };
        Ok(seq.with_name(self.name))
    }
}

impl RawGroupLayout {
    fn rebuild(self, kind: GroupKind) -> Result<GroupLayout> {
        let group = GroupLayout::new(kind, self.members)?;
        if group.offsets() != self.offsets.as_slice() {
            return Err(mismatch("offsets"));
        }
        if group.byte_size() != self.size {
            return Err(mismatch("size"));
        }
        let group = if self.alignment == group.byte_alignment() {
            group
        } else {
            group.with_byte_alignment(self.alignment)?
        };
        Ok(group.with_name(self.name))
    }
}

impl RawPaddingLayout {
    fn rebuild(self) -> Result<PaddingLayout> {
        Ok(PaddingLayout::new(self.size)?
            .with_byte_alignment(self.alignment)?
            .with_name(self.name))
    }
}

fn mismatch(field: &str) -> VellumError {
    VellumError::invalid_argument(
        field,
        format!("encoded {} disagrees with the members", field),
    )
}
