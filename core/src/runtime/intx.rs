//! Fixed-width integers (Int8/Int16/Int32/Int64), instantiated once from a
//! generic implementation instead of once per width.

use crate::error::RuntimeError;
use crate::runtime::int::Int;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{Metamethods, TypeDescriptor, TypeTag, Value};
use num_integer::Integer;
use num_traits::{CheckedAdd, PrimInt, Signed, WrappingAdd, WrappingSub};
use once_cell::sync::Lazy;
use std::fmt::Display;
use std::sync::Arc;

/// The machine integer widths the runtime exposes. Each width supplies its
/// conversions to/from [Value] and its wire format; everything else is
/// shared.
pub trait FixedInt:
    PrimInt
    + Signed
    + Integer
    + CheckedAdd
    + WrappingAdd
    + WrappingSub
    + Display
    + Send
    + Sync
    + 'static
{
    const TYPE_NAME: &'static str;
    const BITS: u32;

    fn into_value(self) -> Value;
    fn from_value(v: &Value) -> Self;
    fn write_wire(self, out: &mut Vec<u8>);
    fn read_wire(input: &mut ByteReader<'_>) -> Result<Self, RuntimeError>;
}

impl FixedInt for i8 {
    const TYPE_NAME: &'static str = "Int8";
    const BITS: u32 = 8;

    fn into_value(self) -> Value {
        Value::Int8(self)
    }

    fn from_value(v: &Value) -> Self {
        match v {
            Value::Int8(x) => *x,
            other => panic!("expected Int8, got {other:?}"),
        }
    }

    fn write_wire(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_wire(input: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        Ok(i8::from_le_bytes([input.read_u8()?]))
    }
}

impl FixedInt for i16 {
    const TYPE_NAME: &'static str = "Int16";
    const BITS: u32 = 16;

    fn into_value(self) -> Value {
        Value::Int16(self)
    }

    fn from_value(v: &Value) -> Self {
        match v {
            Value::Int16(x) => *x,
            other => panic!("expected Int16, got {other:?}"),
        }
    }

    fn write_wire(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_wire(input: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let bytes = input.read_bytes(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

impl FixedInt for i32 {
    const TYPE_NAME: &'static str = "Int32";
    const BITS: u32 = 32;

    fn into_value(self) -> Value {
        Value::Int32(self)
    }

    fn from_value(v: &Value) -> Self {
        match v {
            Value::Int32(x) => *x,
            other => panic!("expected Int32, got {other:?}"),
        }
    }

    fn write_wire(self, out: &mut Vec<u8>) {
        serialize::write_varint(out, self as i64);
    }

    fn read_wire(input: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let value = input.read_varint()?;
        i32::try_from(value).map_err(|_| RuntimeError::InvalidData {
            reason: "Int32 out of range",
        })
    }
}

impl FixedInt for i64 {
    const TYPE_NAME: &'static str = "Int64";
    const BITS: u32 = 64;

    fn into_value(self) -> Value {
        Value::Int64(self)
    }

    fn from_value(v: &Value) -> Self {
        match v {
            Value::Int64(x) => *x,
            other => panic!("expected Int64, got {other:?}"),
        }
    }

    fn write_wire(self, out: &mut Vec<u8>) {
        serialize::write_varint(out, self);
    }

    fn read_wire(input: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        input.read_varint()
    }
}

// ===== Shared operations =====

pub fn clamped<T: FixedInt>(x: T, low: T, high: T) -> T {
    if x < low {
        low
    } else if x > high {
        high
    } else {
        x
    }
}

pub fn is_between<T: FixedInt>(x: T, low: T, high: T) -> bool {
    x >= low && x <= high
}

pub fn wrapping_plus<T: FixedInt>(x: T, y: T) -> T {
    x.wrapping_add(&y)
}

pub fn wrapping_minus<T: FixedInt>(x: T, y: T) -> T {
    x.wrapping_sub(&y)
}

/// Logical (zero-filling) left shift.
pub fn unsigned_left_shifted<T: FixedInt>(x: T, bits: u32) -> T {
    if bits >= T::BITS {
        T::zero()
    } else {
        x.unsigned_shl(bits)
    }
}

/// Logical (zero-filling) right shift.
pub fn unsigned_right_shifted<T: FixedInt>(x: T, bits: u32) -> T {
    if bits >= T::BITS {
        T::zero()
    } else {
        x.unsigned_shr(bits)
    }
}

pub fn gcd<T: FixedInt>(x: T, y: T) -> T {
    x.abs().gcd(&y.abs())
}

pub fn abs<T: FixedInt>(x: T) -> T {
    x.abs()
}

/// Parse with the same syntax as [Int::from_str], rejecting out-of-range
/// values.
pub fn parse<T: FixedInt>(s: &str) -> Option<T> {
    let big = Int::from_str(s)?;
    let value = big.to_i64(false).ok()?;
    T::from(value)
}

/// Convert a big [Int], failing on overflow unless `truncate` is set.
pub fn from_int<T: FixedInt>(i: &Int, truncate: bool) -> Result<T, RuntimeError> {
    let wide = i.to_i64(truncate)?;
    match T::from(wide) {
        Some(value) => Ok(value),
        None if truncate => {
            let mask = if T::BITS == 64 { u64::MAX } else { (1u64 << T::BITS) - 1 };
            let wrapped = (wide as u64) & mask;
            // Sign-extend the truncated bits
            let shift = 64 - T::BITS;
            let signed = ((wrapped << shift) as i64) >> shift;
            Ok(T::from(signed).expect("masked value fits"))
        }
        None => Err(RuntimeError::InvalidConversion {
            value: i.to_string(),
            target: T::TYPE_NAME,
        }),
    }
}

/// A lazy arithmetic sequence of fixed-width integers. Stops early rather
/// than wrapping past the type's range.
pub struct FixedRange<T: FixedInt> {
    next: Option<T>,
    last: Option<T>,
    step: T,
}

impl<T: FixedInt> Iterator for FixedRange<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let current = self.next?;
        if let Some(last) = self.last {
            let done = if self.step < T::zero() {
                current < last
            } else {
                current > last
            };
            if done {
                self.next = None;
                return None;
            }
        }
        self.next = current.checked_add(&self.step);
        Some(current)
    }
}

/// Lazy iterator from `first` to `last` inclusive; `step` defaults to ±1
/// toward `last`.
pub fn to<T: FixedInt>(first: T, last: T, step: Option<T>) -> FixedRange<T> {
    let step = step.unwrap_or_else(|| {
        if last < first {
            T::zero() - T::one()
        } else {
            T::one()
        }
    });
    FixedRange { next: Some(first), last: Some(last), step }
}

/// Lazy unbounded iterator from `first` by `step` (until the range's edge).
pub fn onward<T: FixedInt>(first: T, step: T) -> FixedRange<T> {
    FixedRange { next: Some(first), last: None, step }
}

// ===== Type descriptors =====

fn as_text_mm<T: FixedInt>(
    obj: Option<&Value>,
    colorize: bool,
    _ty: &TypeDescriptor,
) -> Text {
    match obj {
        None => Text::from_str(T::TYPE_NAME),
        Some(v) => {
            let body = T::from_value(v).to_string();
            if colorize {
                Text::from_str(&format!("\x1b[35m{body}\x1b[m"))
            } else {
                Text::from_str(&body)
            }
        }
    }
}

fn serialize_mm<T: FixedInt>(
    obj: &Value,
    out: &mut Vec<u8>,
    _ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    T::from_value(obj).write_wire(out);
    Ok(())
}

fn deserialize_mm<T: FixedInt>(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    Ok(T::read_wire(input)?.into_value())
}

fn descriptor<T: FixedInt>() -> Arc<TypeDescriptor> {
    Arc::new(TypeDescriptor {
        size: (T::BITS / 8) as usize,
        align: (T::BITS / 8) as usize,
        tag: TypeTag::Opaque { name: T::TYPE_NAME.into() },
        metamethods: Metamethods {
            as_text: Some(as_text_mm::<T>),
            is_none: Some(|v, _| matches!(v, Value::Null)),
            serialize: Some(serialize_mm::<T>),
            deserialize: Some(deserialize_mm::<T>),
            ..Metamethods::default()
        },
    })
}

pub static INT8: Lazy<Arc<TypeDescriptor>> = Lazy::new(descriptor::<i8>);
pub static INT16: Lazy<Arc<TypeDescriptor>> = Lazy::new(descriptor::<i16>);
pub static INT32: Lazy<Arc<TypeDescriptor>> = Lazy::new(descriptor::<i32>);
pub static INT64: Lazy<Arc<TypeDescriptor>> = Lazy::new(descriptor::<i64>);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clamped_and_between() {
        assert_eq!(clamped(15i8, 0, 10), 10);
        assert_eq!(clamped(-15i8, 0, 10), 0);
        assert!(is_between(5i32, 1, 10));
        assert!(!is_between(50i32, 1, 10));
    }

    #[test]
    fn test_wrapping_ops() {
        assert_eq!(wrapping_plus(i8::MAX, 1), i8::MIN);
        assert_eq!(wrapping_minus(i8::MIN, 1), i8::MAX);
    }

    #[test]
    fn test_unsigned_shifts() {
        assert_eq!(unsigned_right_shifted(-1i8, 4), 0x0f);
        assert_eq!(unsigned_left_shifted(1i16, 3), 8);
        assert_eq!(unsigned_left_shifted(1i16, 40), 0);
    }

    #[test]
    fn test_parse_and_overflow() {
        assert_eq!(parse::<i8>("127"), Some(127));
        assert_eq!(parse::<i8>("128"), None);
        assert_eq!(parse::<i16>("0x7fff"), Some(i16::MAX));
    }

    #[test]
    fn test_from_int_truncation() {
        let too_big = Int::Small(300);
        assert!(from_int::<i8>(&too_big, false).is_err());
        assert_eq!(from_int::<i8>(&too_big, true).unwrap(), 300i64 as i8);
        assert_eq!(from_int::<i32>(&Int::Small(-7), false).unwrap(), -7);
    }

    #[test]
    fn test_ranges_stop_at_edges() {
        let values: Vec<i8> = to(1i8, 5i8, None).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        let near_edge: Vec<i8> = onward(i8::MAX - 2, 1).take(10).collect();
        assert_eq!(near_edge, vec![125, 126, 127]);
    }

    #[test]
    fn test_gcd_abs() {
        assert_eq!(gcd(-12i32, 18), 6);
        assert_eq!(abs(-3i64), 3);
    }

    #[test]
    fn test_wire_round_trip() {
        let mut out = Vec::new();
        serialize_mm::<i16>(&Value::Int16(-2), &mut out, &INT16).unwrap();
        assert_eq!(out, vec![0xfe, 0xff]);
        let mut reader = ByteReader::new(&out);
        let back = deserialize_mm::<i16>(&mut reader, &INT16).unwrap();
        assert!(matches!(back, Value::Int16(-2)));

        let mut out = Vec::new();
        serialize_mm::<i64>(&Value::Int64(1), &mut out, &INT64).unwrap();
        assert_eq!(out, vec![2], "zig-zag varint");
    }
}
