//! Floating-point numbers (`Num` = f64, `Num32` = f32). NaN doubles as the
//! none value for optional nums, so every operation here treats NaN as "no
//! value" rather than propagating it silently through comparisons.

use crate::consts::RADIANS_PER_DEGREE;
use crate::error::RuntimeError;
use crate::runtime::serialize::ByteReader;
use crate::runtime::text::Text;
use crate::runtime::types::{Metamethods, TypeDescriptor, TypeTag, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::sync::Arc;

pub const TAU: f64 = std::f64::consts::TAU;
pub const PI: f64 = std::f64::consts::PI;
pub const E: f64 = std::f64::consts::E;

/// Parse a float literal with `_` separators and optional `%` (divide by
/// 100) or `deg` (degrees to radians) suffix. Returns none on failure.
pub fn parse(s: &str) -> Option<f64> {
    let s = s.trim();
    let (s, scale) = if let Some(body) = s.strip_suffix('%') {
        (body, 0.01)
    } else if let Some(body) = s.strip_suffix("deg") {
        (body, RADIANS_PER_DEGREE)
    } else {
        (s, 1.0)
    };
    let cleaned: String = s.chars().filter(|&c| c != '_').collect();
    cleaned.parse::<f64>().ok().map(|n| n * scale)
}

/// Format with the shortest representation that round-trips.
pub fn format(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 && n.is_finite() {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

pub fn clamped(x: f64, low: f64, high: f64) -> f64 {
    x.clamp(low, high)
}

pub fn is_between(x: f64, low: f64, high: f64) -> bool {
    x >= low && x <= high
}

/// Approximate equality with both relative and absolute tolerance.
pub fn near(x: f64, y: f64, ratio: f64, absolute: f64) -> bool {
    if x == y {
        return true;
    }
    let diff = (x - y).abs();
    diff <= absolute || diff <= ratio * x.abs().max(y.abs())
}

/// Linear interpolation between `low` and `high` by `amount`.
pub fn mix(amount: f64, low: f64, high: f64) -> f64 {
    low + amount * (high - low)
}

/// Convert to f32, failing when the narrowing loses information and
/// `truncate` is false.
pub fn to_num32(n: f64, truncate: bool) -> Result<f32, RuntimeError> {
    let narrowed = n as f32;
    if !truncate && narrowed as f64 != n && !n.is_nan() {
        return Err(RuntimeError::InvalidConversion {
            value: n.to_string(),
            target: "Num32",
        });
    }
    Ok(narrowed)
}

/// Total order on floats: the comparison metamethod must be a total order,
/// so NaN sorts after all numbers (and equal to itself).
pub fn compare(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn as_num(v: &Value) -> f64 {
    match v {
        Value::Num(n) => *n,
        other => panic!("expected Num, got {other:?}"),
    }
}

fn as_num32(v: &Value) -> f32 {
    match v {
        Value::Num32(n) => *n,
        other => panic!("expected Num32, got {other:?}"),
    }
}

/// The `Num` (f64) type descriptor.
pub static NUM: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 8,
        align: 8,
        tag: TypeTag::Opaque { name: "Num".into() },
        metamethods: Metamethods {
            compare: Some(|x, y, _| compare(as_num(x), as_num(y))),
            equal: Some(|x, y, _| as_num(x) == as_num(y)),
            as_text: Some(|obj, colorize, _| match obj {
                None => Text::from_str("Num"),
                Some(v) => {
                    let body = format(as_num(v));
                    if colorize {
                        Text::from_str(&format!("\x1b[35m{body}\x1b[m"))
                    } else {
                        Text::from_str(&body)
                    }
                }
            }),
            is_none: Some(|v, _| as_num(v).is_nan()),
            deserialize: Some(num_deserialize),
            ..Metamethods::default()
        },
    })
});

/// The `Num32` (f32) type descriptor.
pub static NUM32: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 4,
        align: 4,
        tag: TypeTag::Opaque { name: "Num32".into() },
        metamethods: Metamethods {
            compare: Some(|x, y, _| {
                compare(as_num32(x) as f64, as_num32(y) as f64)
            }),
            equal: Some(|x, y, _| as_num32(x) == as_num32(y)),
            as_text: Some(|obj, colorize, _| match obj {
                None => Text::from_str("Num32"),
                Some(v) => {
                    let body = format(as_num32(v) as f64);
                    if colorize {
                        Text::from_str(&format!("\x1b[35m{body}\x1b[m"))
                    } else {
                        Text::from_str(&body)
                    }
                }
            }),
            is_none: Some(|v, _| as_num32(v).is_nan()),
            deserialize: Some(num32_deserialize),
            ..Metamethods::default()
        },
    })
});

fn num_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let bytes = input.read_bytes(8)?;
    let bits = u64::from_le_bytes(bytes.try_into().expect("8 bytes"));
    Ok(Value::Num(f64::from_bits(bits)))
}

fn num32_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let bytes = input.read_bytes(4)?;
    let bits = u32::from_le_bytes(bytes.try_into().expect("4 bytes"));
    Ok(Value::Num32(f32::from_bits(bits)))
}
