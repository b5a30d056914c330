//! Group layouts (structs and unions) and padding

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{value::check_alignment, MemoryLayout};
use crate::error::{Result, VellumError};

/// Whether members are laid out one after another or overlap at offset zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    Struct,
    Union,
}

/// Members of a struct or union together with their resolved offsets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupLayout {
    members: Vec<MemoryLayout>,
    offsets: Vec<usize>,
    size: usize,
    alignment: usize,
    name: Option<Arc<str>>,
}

impl GroupLayout {
    pub(crate) fn new(kind: GroupKind, members: Vec<MemoryLayout>) -> Result<Self> {
        let mut offsets = Vec::with_capacity(members.len());
        let mut size = 0usize;
        let mut alignment = 1usize;

        for (index, member) in members.iter().enumerate() {
            let member_size = member.byte_size().map_err(|_| {
                VellumError::invalid_argument(
                    "members",
                    format!("member {} has no known size", index),
                )
            })?;
            let member_alignment = member.byte_alignment();
            alignment = alignment.max(member_alignment);

            match kind {
                GroupKind::Struct => {
                    if size % member_alignment != 0 {
                        return Err(VellumError::invalid_argument(
                            "members",
                            format!(
                                "member {} at offset {} violates its alignment {}; add explicit padding",
                                index, size, member_alignment
                            ),
                        ));
                    }
                    offsets.push(size);
                    size = size.checked_add(member_size).ok_or_else(|| {
                        VellumError::invalid_argument("members", "struct size overflows")
                    })?;
                }
                GroupKind::Union => {
                    offsets.push(0);
                    size = size.max(member_size);
                }
            }
        }

        if size > isize::MAX as usize {
            return Err(VellumError::invalid_argument(
                "members",
                "group size exceeds the address space",
            ));
        }

        Ok(Self {
            members,
            offsets,
            size,
            alignment,
            name: None,
        })
    }

    pub fn members(&self) -> &[MemoryLayout] {
        &self.members
    }

    /// Byte offset of each member, in declaration order
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn byte_size(&self) -> usize {
        self.size
    }

    pub fn byte_alignment(&self) -> usize {
        self.alignment
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Index of the first member carrying `name`
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.name() == Some(name))
    }

    /// Largest alignment among the members
    fn member_alignment(&self) -> usize {
        self.members
            .iter()
            .map(MemoryLayout::byte_alignment)
            .max()
            .unwrap_or(1)
    }

    pub(crate) fn with_name(&self, name: Option<Arc<str>>) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    pub(crate) fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        check_alignment(alignment)?;
        let required = self.member_alignment();
        if alignment < required {
            return Err(VellumError::invalid_argument(
                "alignment",
                format!(
                    "{} is weaker than the member alignment {}",
                    alignment, required
                ),
            ));
        }
        Ok(Self {
            alignment,
            ..self.clone()
        })
    }
}

/// Unaddressable filler of a fixed size
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PaddingLayout {
    size: usize,
    alignment: usize,
    name: Option<Arc<str>>,
}

impl PaddingLayout {
    pub(crate) fn new(size: usize) -> Result<Self> {
        if size == 0 || size > isize::MAX as usize {
            return Err(VellumError::invalid_argument(
                "size",
                format!("padding size {} must be positive and addressable", size),
            ));
        }
        Ok(Self {
            size,
            alignment: 1,
            name: None,
        })
    }

    pub fn byte_size(&self) -> usize {
        self.size
    }

    pub fn byte_alignment(&self) -> usize {
        self.alignment
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn with_name(&self, name: Option<Arc<str>>) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    pub(crate) fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        check_alignment(alignment)?;
        Ok(Self {
            alignment,
            ..self.clone()
        })
    }
}

/// Insert the padding a C compiler would place between and after `members`
pub(crate) fn c_abi_members(members: Vec<MemoryLayout>) -> Result<Vec<MemoryLayout>> {
    let mut padded = Vec::with_capacity(members.len() * 2);
    let mut offset = 0usize;
    let mut alignment = 1usize;

    for member in members {
        let member_alignment = member.byte_alignment();
        let member_size = member.byte_size()?;
        let aligned = align_up(offset, member_alignment)?;
        if aligned > offset {
            padded.push(MemoryLayout::padding_layout(aligned - offset)?);
        }
        offset = aligned.checked_add(member_size).ok_or_else(|| {
            VellumError::invalid_argument("members", "struct size overflows")
        })?;
        alignment = alignment.max(member_alignment);
        padded.push(member);
    }

    let total = align_up(offset, alignment)?;
    if total > offset {
        padded.push(MemoryLayout::padding_layout(total - offset)?);
    }
    Ok(padded)
}

fn align_up(value: usize, alignment: usize) -> Result<usize> {
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
        .ok_or_else(|| VellumError::invalid_argument("members", "struct size overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::value::{I32, I64, I8, U8};

    #[test]
    fn test_struct_offsets() {
        let group = GroupLayout::new(
            GroupKind::Struct,
            vec![I32.with_name("x").into(), I32.with_name("y").into()],
        )
        .unwrap();
        assert_eq!(group.offsets(), &[0, 4]);
        assert_eq!(group.byte_size(), 8);
        assert_eq!(group.byte_alignment(), 4);
        assert_eq!(group.member_index("y"), Some(1));
        assert_eq!(group.member_index("z"), None);
    }

    #[test]
    fn test_struct_requires_explicit_padding() {
        let result = GroupLayout::new(GroupKind::Struct, vec![I8.into(), I32.into()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_union_layout() {
        let group = GroupLayout::new(GroupKind::Union, vec![I8.into(), I64.into()]).unwrap();
        assert_eq!(group.offsets(), &[0, 0]);
        assert_eq!(group.byte_size(), 8);
        assert_eq!(group.byte_alignment(), 8);
    }

    #[test]
    fn test_group_alignment_cannot_weaken() {
        let group = GroupLayout::new(GroupKind::Struct, vec![I64.into()]).unwrap();
        assert!(group.with_byte_alignment(4).is_err());
        assert_eq!(group.with_byte_alignment(32).unwrap().byte_alignment(), 32);
    }

    #[test]
    fn test_c_abi_padding() {
        let members = c_abi_members(vec![U8.into(), I32.into(), U8.into()]).unwrap();
        let group = GroupLayout::new(GroupKind::Struct, members).unwrap();
        // u8, pad 3, i32, u8, pad 3
        assert_eq!(group.members().len(), 5);
        assert_eq!(group.offsets()[2], 4);
        assert_eq!(group.byte_size(), 12);
    }

    #[test]
    fn test_padding_rejects_zero() {
        assert!(PaddingLayout::new(0).is_err());
        assert_eq!(PaddingLayout::new(3).unwrap().byte_size(), 3);
    }
}
