//! Sequence layouts: a homogeneous element repeated a fixed or unbounded
//! number of times

use std::sync::Arc;

use serde::Serialize;

use super::{value::check_alignment, MemoryLayout};
use crate::error::{Result, VellumError};

/// `count` repetitions of `element`, or an unbounded repetition when the
/// count is `None`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SequenceLayout {
    element: Box<MemoryLayout>,
    count: Option<u64>,
    size: Option<usize>,
    alignment: usize,
    name: Option<Arc<str>>,
}

impl SequenceLayout {
    pub(crate) fn new(count: Option<u64>, element: MemoryLayout) -> Result<Self> {
        let element_size = element.byte_size().map_err(|_| {
            VellumError::invalid_argument("element", "sequence element must have a known size")
        })?;
        let element_alignment = element.byte_alignment();
        if element_size % element_alignment != 0 {
            return Err(VellumError::invalid_argument(
                "element",
                format!(
                    "element size {} is not a multiple of its alignment {}",
                    element_size, element_alignment
                ),
            ));
        }

        let size = match count {
            None => None,
            Some(count) => Some(
                usize::try_from(count)
                    .ok()
                    .and_then(|count| count.checked_mul(element_size))
                    .filter(|size| *size <= isize::MAX as usize)
                    .ok_or_else(|| {
                        VellumError::invalid_argument(
                            "count",
                            format!("{} x {} bytes overflows the address space", count, element_size),
                        )
                    })?,
            ),
        };

        Ok(Self {
            element: Box::new(element),
            count,
            size,
            alignment: element_alignment,
            name: None,
        })
    }

    pub fn element(&self) -> &MemoryLayout {
        &self.element
    }

    /// Number of elements, `None` for unbounded sequences
    pub fn element_count(&self) -> Option<u64> {
        self.count
    }

    pub fn is_unbounded(&self) -> bool {
        self.count.is_none()
    }

    /// Total size, `None` for unbounded sequences
    pub fn byte_size(&self) -> Option<usize> {
        self.size
    }

    pub fn byte_alignment(&self) -> usize {
        self.alignment
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Same element, different count
    pub fn with_element_count(&self, count: u64) -> Result<Self> {
        let mut resized = Self::new(Some(count), (*self.element).clone())?;
        resized.alignment = self.alignment;
        resized.name = self.name.clone();
        Ok(resized)
    }

    /// Collapse nested bounded sequences into one sequence over the innermost
    /// element, e.g. `[2:[3:i32]]` becomes `[6:i32]`.
    pub fn flatten(&self) -> Result<Self> {
        let mut count = match self.count {
            Some(count) => count,
            None => return Ok(self.clone()),
        };
        let mut element = &*self.element;
        while let MemoryLayout::Sequence(inner) = element {
            match inner.count {
                Some(inner_count) => {
                    count = count.checked_mul(inner_count).ok_or_else(|| {
                        VellumError::invalid_argument("count", "flattened count overflows")
                    })?;
                    element = &inner.element;
                }
                None => break,
            }
        }
        Self::new(Some(count), element.clone())
    }

    pub(crate) fn with_name(&self, name: Option<Arc<str>>) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    pub(crate) fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        check_alignment(alignment)?;
        let element_alignment = self.element.byte_alignment();
        if alignment < element_alignment {
            return Err(VellumError::invalid_argument(
                "alignment",
                format!(
                    "{} is weaker than the element alignment {}",
                    alignment, element_alignment
                ),
            ));
        }
        Ok(Self {
            alignment,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::value::{I16, I32, U8};

    #[test]
    fn test_sequence_size() {
        let seq = SequenceLayout::new(Some(10), I32.to_layout()).unwrap();
        assert_eq!(seq.byte_size(), Some(40));
        assert_eq!(seq.byte_alignment(), 4);
        assert_eq!(seq.element_count(), Some(10));
    }

    #[test]
    fn test_unbounded_sequence() {
        let seq = SequenceLayout::new(None, U8.to_layout()).unwrap();
        assert!(seq.is_unbounded());
        assert_eq!(seq.byte_size(), None);
    }

    #[test]
    fn test_element_size_must_be_multiple_of_alignment() {
        let odd = I16.with_byte_alignment(4).unwrap().to_layout();
        assert!(SequenceLayout::new(Some(2), odd).is_err());
    }

    #[test]
    fn test_overflowing_count_rejected() {
        assert!(SequenceLayout::new(Some(u64::MAX), I32.to_layout()).is_err());
    }

    #[test]
    fn test_flatten() {
        let inner = MemoryLayout::sequence_layout(3, I32).unwrap();
        let outer = SequenceLayout::new(Some(2), inner).unwrap();
        let flat = outer.flatten().unwrap();
        assert_eq!(flat.element_count(), Some(6));
        assert_eq!(flat.byte_size(), outer.byte_size());
    }

    #[test]
    fn test_alignment_derivation() {
        let seq = SequenceLayout::new(Some(4), I32.to_layout()).unwrap();
        assert!(seq.with_byte_alignment(2).is_err());
        assert_eq!(seq.with_byte_alignment(16).unwrap().byte_alignment(), 16);
    }
}
