//! Layout paths and offset resolution

use std::fmt;

use super::{Carrier, MemoryLayout, ValueLayout};
use crate::{
    error::{Result, VellumError},
    segment::MemorySegment,
};

/// One step of a layout path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// Member of a struct or union, by name
    GroupElement(String),
    /// Member of a struct or union, by position
    GroupIndex(usize),
    /// Element of a sequence at a fixed index
    SequenceElement(u64),
    /// Element of a sequence whose index is supplied at resolution time
    SequenceOpen,
    /// Pointee of an address layout with a target layout
    Dereference,
}

impl PathElement {
    pub fn group_element(name: impl Into<String>) -> Self {
        PathElement::GroupElement(name.into())
    }

    pub fn group_index(index: usize) -> Self {
        PathElement::GroupIndex(index)
    }

    pub fn sequence_element(index: u64) -> Self {
        PathElement::SequenceElement(index)
    }

    pub fn sequence_open() -> Self {
        PathElement::SequenceOpen
    }

    pub fn dereference() -> Self {
        PathElement::Dereference
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::GroupElement(name) => write!(f, ".{}", name),
            PathElement::GroupIndex(index) => write!(f, ".#{}", index),
            PathElement::SequenceElement(index) => write!(f, "[{}]", index),
            PathElement::SequenceOpen => write!(f, "[*]"),
            PathElement::Dereference => write!(f, "*"),
        }
    }
}

/// Where a path walk ended up
struct Resolved<'a> {
    layout: &'a MemoryLayout,
    offset: usize,
}

/// How open elements and dereferences are treated while walking
enum WalkMode<'i> {
    /// Offsets are required: open elements consume `indices`, dereference fails
    Offset(&'i [u64]),
    /// Only the selected layout matters
    Select,
}

fn bad_path(path: &[PathElement], position: usize, message: impl fmt::Display) -> VellumError {
    let rendered: String = path.iter().map(ToString::to_string).collect();
    VellumError::invalid_argument(
        "path",
        format!("{} at element {} of '{}'", message, position, rendered),
    )
}

fn advance(
    path: &[PathElement],
    position: usize,
    offset: usize,
    delta: Option<usize>,
) -> Result<usize> {
    delta
        .and_then(|delta| offset.checked_add(delta))
        .filter(|offset| *offset <= isize::MAX as usize)
        .ok_or_else(|| bad_path(path, position, "offset overflows"))
}

fn walk<'a>(root: &'a MemoryLayout, path: &[PathElement], mode: WalkMode<'_>) -> Result<Resolved<'a>> {
    let mut current = root;
    let mut offset = 0usize;
    let mut next_index = 0usize;

    for (position, element) in path.iter().enumerate() {
        match element {
            PathElement::GroupElement(name) => {
                let group = match current {
                    MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group,
                    _ => return Err(bad_path(path, position, "not a group layout")),
                };
                let index = group
                    .member_index(name)
                    .ok_or_else(|| bad_path(path, position, format!("no member named '{}'", name)))?;
                offset = advance(path, position, offset, Some(group.offsets()[index]))?;
                current = &group.members()[index];
            }
            PathElement::GroupIndex(index) => {
                let group = match current {
                    MemoryLayout::Struct(group) | MemoryLayout::Union(group) => group,
                    _ => return Err(bad_path(path, position, "not a group layout")),
                };
                if *index >= group.members().len() {
                    return Err(bad_path(
                        path,
                        position,
                        format!("member index {} out of range", index),
                    ));
                }
                offset = advance(path, position, offset, Some(group.offsets()[*index]))?;
                current = &group.members()[*index];
            }
            PathElement::SequenceElement(_) | PathElement::SequenceOpen => {
                let seq = match current {
                    MemoryLayout::Sequence(seq) => seq,
                    _ => return Err(bad_path(path, position, "not a sequence layout")),
                };
                let index = match (element, &mode) {
                    (PathElement::SequenceElement(index), _) => Some(*index),
                    (_, WalkMode::Offset(indices)) => {
                        let index = indices.get(next_index).copied().ok_or_else(|| {
                            bad_path(path, position, "open sequence element has no index")
                        })?;
                        next_index += 1;
                        Some(index)
                    }
                    (_, WalkMode::Select) => None,
                };
                if let Some(index) = index {
                    if let Some(count) = seq.element_count() {
                        if index >= count {
                            return Err(bad_path(
                                path,
                                position,
                                format!("index {} out of range for {} elements", index, count),
                            ));
                        }
                    }
                    let stride = seq.element().byte_size()?;
                    let delta = usize::try_from(index)
                        .ok()
                        .and_then(|index| index.checked_mul(stride));
                    offset = advance(path, position, offset, delta)?;
                }
                current = seq.element();
            }
            PathElement::Dereference => {
                if let WalkMode::Offset(_) = mode {
                    return Err(bad_path(
                        path,
                        position,
                        "dereference has no offset in the enclosing layout",
                    ));
                }
                let target = current
                    .as_value()
                    .and_then(|desc| desc.target_layout())
                    .ok_or_else(|| {
                        bad_path(path, position, "not an address layout with a target layout")
                    })?;
                offset = 0;
                current = target;
            }
        }
    }

    if let WalkMode::Offset(indices) = mode {
        if next_index != indices.len() {
            return Err(VellumError::invalid_argument(
                "indices",
                format!(
                    "{} indices supplied for {} open path elements",
                    indices.len(),
                    next_index
                ),
            ));
        }
    }

    Ok(Resolved {
        layout: current,
        offset,
    })
}

impl MemoryLayout {
    /// Byte offset of the layout selected by `path`, relative to this layout
    pub fn byte_offset(&self, path: &[PathElement]) -> Result<usize> {
        self.byte_offset_indexed(path, &[])
    }

    /// Byte offset with the open sequence elements of `path` bound, in order,
    /// to `indices`
    pub fn byte_offset_indexed(&self, path: &[PathElement], indices: &[u64]) -> Result<usize> {
        walk(self, path, WalkMode::Offset(indices)).map(|resolved| resolved.offset)
    }

    /// Layout selected by `path`
    pub fn select(&self, path: &[PathElement]) -> Result<MemoryLayout> {
        walk(self, path, WalkMode::Select).map(|resolved| resolved.layout.clone())
    }

    /// `offset + index * byte_size()`
    pub fn scale(&self, offset: usize, index: usize) -> Result<usize> {
        self.byte_size()?
            .checked_mul(index)
            .and_then(|scaled| scaled.checked_add(offset))
            .ok_or_else(|| VellumError::invalid_argument("index", "scaled offset overflows"))
    }

    /// Resolve `path` to a value of carrier `T` and its offset
    pub fn value_handle<T: Carrier>(&self, path: &[PathElement]) -> Result<ValueHandle<T>> {
        let resolved = walk(self, path, WalkMode::Offset(&[]))?;
        let layout = resolved.layout.as_value_layout::<T>().ok_or_else(|| {
            VellumError::invalid_argument(
                "path",
                format!(
                    "selected layout {} is not a {} value",
                    resolved.layout,
                    T::KIND.name()
                ),
            )
        })?;
        Ok(ValueHandle {
            offset: resolved.offset,
            layout,
        })
    }
}

/// A value layout bound to the byte offset a layout path resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct ValueHandle<T: Carrier> {
    offset: usize,
    layout: ValueLayout<T>,
}

impl<T: Carrier> ValueHandle<T> {
    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    pub fn layout(&self) -> &ValueLayout<T> {
        &self.layout
    }

    fn absolute(&self, base: usize) -> Result<usize> {
        base.checked_add(self.offset)
            .ok_or_else(|| VellumError::out_of_bounds(base, self.offset, usize::MAX))
    }

    /// Read the value from the struct starting at `base` in `segment`
    pub fn get(&self, segment: &MemorySegment, base: usize) -> Result<T> {
        segment.get(&self.layout, self.absolute(base)?)
    }

    /// Write the value into the struct starting at `base` in `segment`
    pub fn set(&self, segment: &MemorySegment, base: usize, value: T) -> Result<()> {
        segment.set(&self.layout, self.absolute(base)?, value)
    }
}
