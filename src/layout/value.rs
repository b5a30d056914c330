//! Scalar value layouts, carriers and byte order

use std::{fmt, marker::PhantomData, sync::Arc};

use serde::{Deserialize, Serialize};

use super::MemoryLayout;
use crate::{
    config::UNBOUNDED_SIZE,
    error::{Result, VellumError},
};

/// Byte order of a scalar in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the platform this crate was compiled for
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::LittleEndian;
    /// Byte order of the platform this crate was compiled for
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::BigEndian;

    /// Whether values in this order can be read without swapping
    #[inline]
    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }

    fn suffix(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "le",
            ByteOrder::BigEndian => "be",
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// Materialized representation read or written by a value layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// A native address, materialized as a memory segment
    Address,
}

impl CarrierKind {
    /// Width of the carrier in bytes
    pub const fn byte_size(self) -> usize {
        match self {
            CarrierKind::Bool | CarrierKind::I8 | CarrierKind::U8 => 1,
            CarrierKind::I16 | CarrierKind::U16 => 2,
            CarrierKind::I32 | CarrierKind::U32 | CarrierKind::F32 => 4,
            CarrierKind::I64 | CarrierKind::U64 | CarrierKind::F64 => 8,
            CarrierKind::Address => std::mem::size_of::<usize>(),
        }
    }

    /// Short type name used in layout descriptors
    pub fn name(self) -> &'static str {
        match self {
            CarrierKind::Bool => "bool",
            CarrierKind::I8 => "i8",
            CarrierKind::U8 => "u8",
            CarrierKind::I16 => "i16",
            CarrierKind::U16 => "u16",
            CarrierKind::I32 => "i32",
            CarrierKind::U32 => "u32",
            CarrierKind::I64 => "i64",
            CarrierKind::U64 => "u64",
            CarrierKind::F32 => "f32",
            CarrierKind::F64 => "f64",
            CarrierKind::Address => "ptr",
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Scalar types that value layouts can read and write.
///
/// The set of carriers is closed; it is implemented for `bool` and the fixed
/// width integer and floating point types.
pub trait Carrier: sealed::Sealed + Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Kind tag matching this type
    const KIND: CarrierKind;

    /// Read a value stored in `order` at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `Self::KIND.byte_size()` bytes.
    unsafe fn read_raw(ptr: *const u8, order: ByteOrder) -> Self;

    /// Write this value at `ptr` in `order`.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `Self::KIND.byte_size()` bytes.
    unsafe fn write_raw(self, ptr: *mut u8, order: ByteOrder);
}

/// Carriers that may back a heap segment.
///
/// `bool` is excluded: arbitrary bytes written through a byte layout are not
/// valid `bool` values.
pub trait ArrayElement: Carrier {}

macro_rules! int_carrier {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Carrier for $ty {
            const KIND: CarrierKind = CarrierKind::$kind;

            #[inline]
            unsafe fn read_raw(ptr: *const u8, order: ByteOrder) -> Self {
                let value = unsafe { std::ptr::read_unaligned(ptr as *const $ty) };
                if order.is_native() { value } else { value.swap_bytes() }
            }

            #[inline]
            unsafe fn write_raw(self, ptr: *mut u8, order: ByteOrder) {
                let value = if order.is_native() { self } else { self.swap_bytes() };
                unsafe { std::ptr::write_unaligned(ptr as *mut $ty, value) }
            }
        }

        impl ArrayElement for $ty {}
    )*};
}

macro_rules! float_carrier {
    ($($ty:ty => $kind:ident as $bits:ty),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Carrier for $ty {
            const KIND: CarrierKind = CarrierKind::$kind;

            #[inline]
            unsafe fn read_raw(ptr: *const u8, order: ByteOrder) -> Self {
                <$ty>::from_bits(unsafe { <$bits as Carrier>::read_raw(ptr, order) })
            }

            #[inline]
            unsafe fn write_raw(self, ptr: *mut u8, order: ByteOrder) {
                unsafe { self.to_bits().write_raw(ptr, order) }
            }
        }

        impl ArrayElement for $ty {}
    )*};
}

int_carrier!(
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
);

float_carrier!(f32 => F32 as u32, f64 => F64 as u64);

impl sealed::Sealed for bool {}

impl Carrier for bool {
    const KIND: CarrierKind = CarrierKind::Bool;

    #[inline]
    unsafe fn read_raw(ptr: *const u8, _order: ByteOrder) -> Self {
        unsafe { ptr.read() != 0 }
    }

    #[inline]
    unsafe fn write_raw(self, ptr: *mut u8, _order: ByteOrder) {
        unsafe { ptr.write(self as u8) }
    }
}

/// Untyped description of a value or address layout.
///
/// This is the form a scalar takes inside a [`MemoryLayout`] tree; the typed
/// [`ValueLayout`] and [`AddressLayout`] wrappers are views over it.
///
/// The target layout of an address is never encoded. It can only be attached
/// through [`AddressLayout::with_target_layout`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "super::raw::RawValueDescriptor")]
pub struct ValueDescriptor {
    carrier: CarrierKind,
    order: ByteOrder,
    alignment: usize,
    name: Option<Arc<str>>,
    #[serde(skip)]
    target: Option<Arc<MemoryLayout>>,
}

impl ValueDescriptor {
    const fn natural(carrier: CarrierKind) -> Self {
        Self {
            carrier,
            order: ByteOrder::NATIVE,
            alignment: carrier.byte_size(),
            name: None,
            target: None,
        }
    }

    const fn unaligned(carrier: CarrierKind) -> Self {
        Self {
            carrier,
            order: ByteOrder::NATIVE,
            alignment: 1,
            name: None,
            target: None,
        }
    }

    pub(crate) fn decoded(
        carrier: CarrierKind,
        order: ByteOrder,
        alignment: usize,
        name: Option<Arc<str>>,
    ) -> Self {
        Self {
            carrier,
            order,
            alignment,
            name,
            target: None,
        }
    }

    pub fn carrier(&self) -> CarrierKind {
        self.carrier
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn byte_size(&self) -> usize {
        self.carrier.byte_size()
    }

    pub fn byte_alignment(&self) -> usize {
        self.alignment
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Layout of the memory an address value points to
    pub fn target_layout(&self) -> Option<&MemoryLayout> {
        self.target.as_deref()
    }

    pub(crate) fn with_name(&self, name: Option<Arc<str>>) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    pub(crate) fn with_order(&self, order: ByteOrder) -> Self {
        Self {
            order,
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

    pub(crate) fn with_target(&self, target: Option<MemoryLayout>) -> Self {
        Self {
            target: target.map(Arc::new),
            ..self.clone()
        }
    }

    pub(crate) fn fmt_descriptor(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.carrier.name())?;
        if self.byte_size() > 1 {
            write!(f, "{}", self.order.suffix())?;
        }
        if self.alignment != self.byte_size() {
            write!(f, "%{}", self.alignment)?;
        }
        if let Some(target) = &self.target {
            write!(f, ":{}", target)?;
        }
        Ok(())
    }
}

/// Validate that an alignment is a positive power of two
pub(crate) fn check_alignment(alignment: usize) -> Result<()> {
    if !alignment.is_power_of_two() {
        return Err(VellumError::invalid_argument(
            "alignment",
            format!("{} is not a positive power of two", alignment),
        ));
    }
    Ok(())
}

/// Typed layout of a scalar with carrier `T`.
pub struct ValueLayout<T: Carrier> {
    desc: ValueDescriptor,
    _carrier: PhantomData<fn() -> T>,
}

impl<T: Carrier> ValueLayout<T> {
    /// Native byte order, aligned to the carrier width
    pub const fn natural() -> Self {
        Self {
            desc: ValueDescriptor::natural(T::KIND),
            _carrier: PhantomData,
        }
    }

    /// Native byte order, byte alignment
    pub const fn unaligned() -> Self {
        Self {
            desc: ValueDescriptor::unaligned(T::KIND),
            _carrier: PhantomData,
        }
    }

    pub(crate) fn from_descriptor(desc: &ValueDescriptor) -> Option<Self> {
        (desc.carrier == T::KIND).then(|| Self {
            desc: desc.clone(),
            _carrier: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &ValueDescriptor {
        &self.desc
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.desc.byte_size()
    }

    #[inline]
    pub fn byte_alignment(&self) -> usize {
        self.desc.alignment
    }

    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.desc.order
    }

    pub fn name(&self) -> Option<&str> {
        self.desc.name()
    }

    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        Self {
            desc: self.desc.with_name(Some(Arc::from(name.as_ref()))),
            _carrier: PhantomData,
        }
    }

    pub fn without_name(&self) -> Self {
        Self {
            desc: self.desc.with_name(None),
            _carrier: PhantomData,
        }
    }

    pub fn with_order(&self, order: ByteOrder) -> Self {
        Self {
            desc: self.desc.with_order(order),
            _carrier: PhantomData,
        }
    }

    /// Derive a layout with a different alignment constraint.
    ///
    /// Any power of two is accepted, including values below or above the
    /// natural alignment of the carrier.
    pub fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        Ok(Self {
            desc: self.desc.with_byte_alignment(alignment)?,
            _carrier: PhantomData,
        })
    }

    /// Erase the carrier type
    pub fn to_layout(&self) -> MemoryLayout {
        MemoryLayout::Value(self.desc.clone())
    }
}

impl<T: Carrier> Clone for ValueLayout<T> {
    fn clone(&self) -> Self {
        Self {
            desc: self.desc.clone(),
            _carrier: PhantomData,
        }
    }
}

impl<T: Carrier> PartialEq for ValueLayout<T> {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc
    }
}

impl<T: Carrier> Eq for ValueLayout<T> {}

impl<T: Carrier> fmt::Debug for ValueLayout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueLayout").field(&self.desc).finish()
    }
}

impl<T: Carrier> fmt::Display for ValueLayout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_layout(), f)
    }
}

impl<T: Carrier> From<ValueLayout<T>> for MemoryLayout {
    fn from(layout: ValueLayout<T>) -> Self {
        MemoryLayout::Value(layout.desc)
    }
}

impl<T: Carrier> From<&ValueLayout<T>> for MemoryLayout {
    fn from(layout: &ValueLayout<T>) -> Self {
        layout.to_layout()
    }
}

/// Layout of a native address.
///
/// Reading an address produces a native segment in the global session whose
/// size is zero, or the size of the target layout when one is attached.
#[derive(Clone, PartialEq, Eq)]
pub struct AddressLayout {
    desc: ValueDescriptor,
}

impl AddressLayout {
    pub const fn natural() -> Self {
        Self {
            desc: ValueDescriptor::natural(CarrierKind::Address),
        }
    }

    pub const fn unaligned() -> Self {
        Self {
            desc: ValueDescriptor::unaligned(CarrierKind::Address),
        }
    }

    pub(crate) fn from_descriptor(desc: &ValueDescriptor) -> Option<Self> {
        (desc.carrier == CarrierKind::Address).then(|| Self { desc: desc.clone() })
    }

    pub fn descriptor(&self) -> &ValueDescriptor {
        &self.desc
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.desc.byte_size()
    }

    #[inline]
    pub fn byte_alignment(&self) -> usize {
        self.desc.alignment
    }

    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.desc.order
    }

    pub fn name(&self) -> Option<&str> {
        self.desc.name()
    }

    pub fn target_layout(&self) -> Option<&MemoryLayout> {
        self.desc.target_layout()
    }

    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        Self {
            desc: self.desc.with_name(Some(Arc::from(name.as_ref()))),
        }
    }

    pub fn without_name(&self) -> Self {
        Self {
            desc: self.desc.with_name(None),
        }
    }

    pub fn with_order(&self, order: ByteOrder) -> Self {
        Self {
            desc: self.desc.with_order(order),
        }
    }

    pub fn with_byte_alignment(&self, alignment: usize) -> Result<Self> {
        Ok(Self {
            desc: self.desc.with_byte_alignment(alignment)?,
        })
    }

    /// Attach the layout of the pointee.
    ///
    /// Addresses read through the returned layout are materialized as
    /// segments sized after `target`; an unbounded sequence target yields
    /// segments of [`UNBOUNDED_SIZE`] bytes.
    ///
    /// # Safety
    /// Nothing checks that the memory behind addresses read with this layout
    /// really has the extent `target` describes, or that it stays valid.
    pub unsafe fn with_target_layout(&self, target: impl Into<MemoryLayout>) -> Self {
        Self {
            desc: self.desc.with_target(Some(target.into())),
        }
    }

    pub fn without_target_layout(&self) -> Self {
        Self {
            desc: self.desc.with_target(None),
        }
    }

    /// Size of segments materialized from addresses read with this layout
    pub(crate) fn dereference_size(&self) -> usize {
        match self.desc.target_layout() {
            None => 0,
            Some(target) => target.byte_size().unwrap_or(UNBOUNDED_SIZE),
        }
    }

    /// Alignment the pointee must satisfy
    pub(crate) fn dereference_alignment(&self) -> usize {
        self.desc
            .target_layout()
            .map(MemoryLayout::byte_alignment)
            .unwrap_or(1)
    }

    /// # Safety
    /// `ptr` must be valid for reads of a pointer-sized value.
    #[inline]
    pub(crate) unsafe fn read_raw(&self, ptr: *const u8) -> usize {
        let value = unsafe { std::ptr::read_unaligned(ptr as *const usize) };
        if self.desc.order.is_native() {
            value
        } else {
            value.swap_bytes()
        }
    }

    /// # Safety
    /// `ptr` must be valid for writes of a pointer-sized value.
    #[inline]
    pub(crate) unsafe fn write_raw(&self, ptr: *mut u8, address: usize) {
        let value = if self.desc.order.is_native() {
            address
        } else {
            address.swap_bytes()
        };
        unsafe { std::ptr::write_unaligned(ptr as *mut usize, value) }
    }

    pub fn to_layout(&self) -> MemoryLayout {
        MemoryLayout::Value(self.desc.clone())
    }
}

impl fmt::Debug for AddressLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AddressLayout").field(&self.desc).finish()
    }
}

impl fmt::Display for AddressLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_layout(), f)
    }
}

impl From<AddressLayout> for MemoryLayout {
    fn from(layout: AddressLayout) -> Self {
        MemoryLayout::Value(layout.desc)
    }
}

impl From<&AddressLayout> for MemoryLayout {
    fn from(layout: &AddressLayout) -> Self {
        layout.to_layout()
    }
}

pub const BOOL: ValueLayout<bool> = ValueLayout::natural();
pub const I8: ValueLayout<i8> = ValueLayout::natural();
pub const U8: ValueLayout<u8> = ValueLayout::natural();
pub const I16: ValueLayout<i16> = ValueLayout::natural();
pub const U16: ValueLayout<u16> = ValueLayout::natural();
pub const I32: ValueLayout<i32> = ValueLayout::natural();
pub const U32: ValueLayout<u32> = ValueLayout::natural();
pub const I64: ValueLayout<i64> = ValueLayout::natural();
pub const U64: ValueLayout<u64> = ValueLayout::natural();
pub const F32: ValueLayout<f32> = ValueLayout::natural();
pub const F64: ValueLayout<f64> = ValueLayout::natural();
pub const ADDRESS: AddressLayout = AddressLayout::natural();

pub const I16_UNALIGNED: ValueLayout<i16> = ValueLayout::unaligned();
pub const U16_UNALIGNED: ValueLayout<u16> = ValueLayout::unaligned();
pub const I32_UNALIGNED: ValueLayout<i32> = ValueLayout::unaligned();
pub const U32_UNALIGNED: ValueLayout<u32> = ValueLayout::unaligned();
pub const I64_UNALIGNED: ValueLayout<i64> = ValueLayout::unaligned();
pub const U64_UNALIGNED: ValueLayout<u64> = ValueLayout::unaligned();
pub const F32_UNALIGNED: ValueLayout<f32> = ValueLayout::unaligned();
pub const F64_UNALIGNED: ValueLayout<f64> = ValueLayout::unaligned();
pub const ADDRESS_UNALIGNED: AddressLayout = AddressLayout::unaligned();
