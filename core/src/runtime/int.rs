//! Arbitrary-precision integers with an inline fast path. `Int` is a sum
//! type: values that fit in a machine word stay in `Small`, and arithmetic
//! only falls through to the heap-allocated big representation on overflow.
//! Big results that fit a word are renormalized back to `Small`, so the two
//! representations never alias the same value.

use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{Metamethods, TypeDescriptor, TypeTag, Value};
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// An integer of unbounded size.
#[derive(Clone, Debug)]
pub enum Int {
    Small(i64),
    Big(Arc<BigInt>),
}

impl Int {
    pub const ZERO: Int = Int::Small(0);
    pub const ONE: Int = Int::Small(1);

    /// Normalize a big value: shrink back to `Small` when it fits.
    pub fn from_bigint(value: BigInt) -> Int {
        match value.to_i64() {
            Some(small) => Int::Small(small),
            None => Int::Big(Arc::new(value)),
        }
    }

    pub fn from_i64(value: i64) -> Int {
        Int::Small(value)
    }

    /// Convert from a float. When `truncate` is false, fails unless the
    /// float is exactly an integer in range.
    pub fn from_num(n: f64, truncate: bool) -> Result<Int, RuntimeError> {
        if !n.is_finite() {
            return Err(RuntimeError::InvalidConversion {
                value: n.to_string(),
                target: "Int",
            });
        }
        let truncated = n.trunc();
        if !truncate && truncated != n {
            return Err(RuntimeError::InvalidConversion {
                value: n.to_string(),
                target: "Int",
            });
        }
        let big = BigInt::from_f64(truncated).ok_or({
            RuntimeError::InvalidConversion { value: n.to_string(), target: "Int" }
        })?;
        Ok(Int::from_bigint(big))
    }

    fn to_bigint(&self) -> BigInt {
        match self {
            Int::Small(x) => BigInt::from(*x),
            Int::Big(big) => (**big).clone(),
        }
    }

    /// The value as an `i64`. When `truncate` is false, out-of-range values
    /// fail instead of wrapping.
    pub fn to_i64(&self, truncate: bool) -> Result<i64, RuntimeError> {
        match self {
            Int::Small(x) => Ok(*x),
            Int::Big(big) => {
                if truncate {
                    let (sign, digits) = big.to_u64_digits();
                    let word = digits.first().copied().unwrap_or(0) as i64;
                    Ok(if sign == Sign::Minus { word.wrapping_neg() } else { word })
                } else {
                    big.to_i64().ok_or_else(|| RuntimeError::InvalidConversion {
                        value: big.to_string(),
                        target: "Int64",
                    })
                }
            }
        }
    }

    pub fn to_num(&self) -> f64 {
        match self {
            Int::Small(x) => *x as f64,
            Int::Big(big) => big.to_f64().unwrap_or(f64::INFINITY),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Int::Small(x) => *x < 0,
            Int::Big(big) => big.is_negative(),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Int::Small(0))
    }

    /// Whether this value is stored inline (used by tests pinning the
    /// small/big transition point).
    pub fn is_small(&self) -> bool {
        matches!(self, Int::Small(_))
    }

    // ===== Arithmetic =====

    pub fn plus(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            if let Some(z) = x.checked_add(*y) {
                return Int::Small(z);
            }
        }
        Int::from_bigint(self.to_bigint() + other.to_bigint())
    }

    pub fn minus(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            if let Some(z) = x.checked_sub(*y) {
                return Int::Small(z);
            }
        }
        Int::from_bigint(self.to_bigint() - other.to_bigint())
    }

    pub fn times(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            if let Some(z) = x.checked_mul(*y) {
                return Int::Small(z);
            }
        }
        Int::from_bigint(self.to_bigint() * other.to_bigint())
    }

    /// Euclidean division: the remainder is non-negative whenever the
    /// divisor is positive. Panics on a zero divisor.
    pub fn divided_by(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            if let Some(q) = x.checked_div_euclid(*y) {
                return Int::Small(q);
            }
        }
        let (x, d) = (self.to_bigint(), other.to_bigint());
        let (mut q, r) = x.div_mod_floor(&d);
        if r.is_negative() {
            q += BigInt::one();
        }
        Int::from_bigint(q)
    }

    /// Euclidean modulus: always in `[0, |divisor|)`.
    pub fn modulo(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            if let Some(r) = x.checked_rem_euclid(*y) {
                return Int::Small(r);
            }
        }
        let (x, d) = (self.to_bigint(), other.to_bigint());
        let mut r = x.mod_floor(&d);
        if r.is_negative() {
            r -= &d;
        }
        Int::from_bigint(r)
    }

    /// 1-based wrap: `((x − 1) mod m) + 1`.
    pub fn modulo1(&self, other: &Int) -> Int {
        self.minus(&Int::ONE).modulo(other).plus(&Int::ONE)
    }

    pub fn left_shifted(&self, bits: &Int) -> Int {
        let shift = bits.to_i64(false).unwrap_or(0).clamp(0, u32::MAX as i64) as u32;
        if let Int::Small(x) = self {
            if let Some(z) = x.checked_shl(shift) {
                if (z >> shift) == *x {
                    return Int::Small(z);
                }
            }
        }
        Int::from_bigint(self.to_bigint() << shift)
    }

    pub fn right_shifted(&self, bits: &Int) -> Int {
        let shift = bits.to_i64(false).unwrap_or(0).clamp(0, u32::MAX as i64) as u32;
        match self {
            Int::Small(x) => Int::Small(x.checked_shr(shift).unwrap_or(if *x < 0 { -1 } else { 0 })),
            Int::Big(big) => Int::from_bigint((**big).clone() >> shift),
        }
    }

    pub fn bit_and(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            return Int::Small(x & y);
        }
        Int::from_bigint(self.to_bigint() & other.to_bigint())
    }

    pub fn bit_or(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            return Int::Small(x | y);
        }
        Int::from_bigint(self.to_bigint() | other.to_bigint())
    }

    pub fn bit_xor(&self, other: &Int) -> Int {
        if let (Int::Small(x), Int::Small(y)) = (self, other) {
            return Int::Small(x ^ y);
        }
        Int::from_bigint(self.to_bigint() ^ other.to_bigint())
    }

    /// Bitwise complement.
    pub fn negated(&self) -> Int {
        match self {
            Int::Small(x) => Int::Small(!x),
            Int::Big(big) => Int::from_bigint(-(&**big) - BigInt::one()),
        }
    }

    /// Arithmetic negation.
    pub fn negative(&self) -> Int {
        match self {
            Int::Small(x) => match x.checked_neg() {
                Some(z) => Int::Small(z),
                None => Int::from_bigint(-BigInt::from(*x)),
            },
            Int::Big(big) => Int::from_bigint(-(&**big)),
        }
    }

    pub fn abs(&self) -> Int {
        if self.is_negative() {
            self.negative()
        } else {
            self.clone()
        }
    }

    pub fn power(&self, exponent: &Int) -> Int {
        let exp = match exponent.to_i64(false) {
            Ok(e) if e >= 0 => e as u32,
            _ => return Int::ZERO,
        };
        Int::from_bigint(self.to_bigint().pow(exp))
    }

    pub fn gcd(&self, other: &Int) -> Int {
        Int::from_bigint(self.to_bigint().gcd(&other.to_bigint()))
    }

    /// Integer square root; none for negative values.
    pub fn sqrt(&self) -> Option<Int> {
        if self.is_negative() {
            return None;
        }
        Some(Int::from_bigint(self.to_bigint().sqrt()))
    }

    pub fn factorial(&self) -> Int {
        let mut result = BigInt::one();
        let n = self.to_i64(true).unwrap_or(0).max(0);
        for i in 2..=n {
            result *= i;
        }
        Int::from_bigint(result)
    }

    pub fn choose(&self, k: &Int) -> Int {
        let n = self.to_bigint();
        let k = k.to_bigint();
        if k.is_negative() || k > n {
            return Int::ZERO;
        }
        let mut result = BigInt::one();
        let mut i = BigInt::one();
        while i <= k {
            result = result * (&n - &i + BigInt::one()) / &i;
            i += BigInt::one();
        }
        Int::from_bigint(result)
    }

    /// Miller–Rabin probabilistic primality test with `reps` random bases.
    pub fn is_prime(&self, reps: u32) -> bool {
        let n = self.to_bigint();
        if n < BigInt::from(2) {
            return false;
        }
        for p in [2u32, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
            let p = BigInt::from(p);
            if n == p {
                return true;
            }
            if (&n % &p).is_zero() {
                return false;
            }
        }
        let one = BigInt::one();
        let n_minus_1 = &n - &one;
        let mut d = n_minus_1.clone();
        let mut r = 0u32;
        while (&d % 2u32).is_zero() {
            d /= 2u32;
            r += 1;
        }
        use rand::Rng;
        let mut rng = rand::thread_rng();
        'witness: for _ in 0..reps.max(1) {
            let a = BigInt::from(rng.gen_range(2u64..u64::MAX));
            let a = &a % (&n_minus_1 - &one) + 2u32;
            let mut x = a.modpow(&d, &n);
            if x == one || x == n_minus_1 {
                continue;
            }
            for _ in 0..r.saturating_sub(1) {
                x = x.modpow(&BigInt::from(2u32), &n);
                if x == n_minus_1 {
                    continue 'witness;
                }
            }
            return false;
        }
        true
    }

    pub fn next_prime(&self) -> Int {
        if self.compare_value(&Int::Small(2)) == Ordering::Less {
            return Int::Small(2);
        }
        let mut candidate = self.plus(&Int::ONE);
        if candidate.modulo(&Int::Small(2)).is_zero() {
            candidate = candidate.plus(&Int::ONE);
        }
        loop {
            if candidate.is_prime(25) {
                return candidate;
            }
            candidate = candidate.plus(&Int::Small(2));
        }
    }

    // ===== Comparison =====

    pub fn compare_value(&self, other: &Int) -> Ordering {
        match (self, other) {
            (Int::Small(x), Int::Small(y)) => x.cmp(y),
            // Normalization means a big value is always out of i64 range
            (Int::Small(_), Int::Big(y)) => {
                if y.is_negative() { Ordering::Greater } else { Ordering::Less }
            }
            (Int::Big(x), Int::Small(_)) => {
                if x.is_negative() { Ordering::Less } else { Ordering::Greater }
            }
            (Int::Big(x), Int::Big(y)) => x.cmp(y),
        }
    }

    pub fn equal_value(&self, other: &Int) -> bool {
        self.compare_value(other) == Ordering::Equal
    }

    pub fn is_between(&self, low: &Int, high: &Int) -> bool {
        self.compare_value(low) != Ordering::Less
            && self.compare_value(high) != Ordering::Greater
    }

    pub fn clamped(&self, low: &Int, high: &Int) -> Int {
        if self.compare_value(low) == Ordering::Less {
            low.clone()
        } else if self.compare_value(high) == Ordering::Greater {
            high.clone()
        } else {
            self.clone()
        }
    }

    pub fn hash_value(&self) -> u64 {
        match self {
            Int::Small(x) => hashing::siphash(&x.to_le_bytes()),
            Int::Big(big) => {
                let (sign, bytes) = big.to_bytes_le();
                let mut buf = vec![match sign {
                    Sign::Minus => 0xff,
                    _ => 1,
                }];
                buf.extend_from_slice(&bytes);
                hashing::siphash(&buf)
            }
        }
    }

    // ===== Parsing and formatting =====

    /// Parse an integer literal: optional sign, optional `0x`/`0o`/`0b`
    /// prefix, `_` separators. Returns none on any malformed input.
    pub fn from_str(s: &str) -> Option<Int> {
        let s = s.trim();
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (radix, digits) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            (16, hex)
        } else if let Some(oct) = s.strip_prefix("0o") {
            (8, oct)
        } else if let Some(bin) = s.strip_prefix("0b") {
            (2, bin)
        } else {
            (10, s)
        };
        let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
        if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        let big = BigInt::parse_bytes(cleaned.as_bytes(), radix)?;
        Some(Int::from_bigint(if negative { -big } else { big }))
    }

    pub fn value_as_text(&self) -> Text {
        Text::from_str(&self.to_string())
    }

    /// Hexadecimal form, zero-padded to `digits`.
    pub fn hex(&self, digits: usize, uppercase: bool, prefix: bool) -> Text {
        let body = match self {
            Int::Small(x) if *x >= 0 => format!("{x:0digits$x}"),
            _ => {
                let big = self.to_bigint();
                format!("{}{:0digits$x}", if big.is_negative() { "-" } else { "" }, big.abs())
            }
        };
        let body = if uppercase { body.to_uppercase() } else { body };
        Text::from_str(&if prefix { format!("0x{body}") } else { body })
    }

    /// Octal form, zero-padded to `digits`.
    pub fn octal(&self, digits: usize, prefix: bool) -> Text {
        let big = self.to_bigint();
        let body = format!(
            "{}{:0digits$o}",
            if big.is_negative() { "-" } else { "" },
            big.abs()
        );
        Text::from_str(&if prefix { format!("0o{body}") } else { body })
    }

    /// Lazy iterator from `self` to `last` (inclusive), by `step` (default
    /// ±1 toward `last`).
    pub fn to(&self, last: Int, step: Option<Int>) -> IntRange {
        let step = step.unwrap_or_else(|| {
            if last.compare_value(self) == Ordering::Less {
                Int::Small(-1)
            } else {
                Int::ONE
            }
        });
        IntRange { next: self.clone(), last: Some(last), step }
    }

    /// Lazy unbounded iterator from `self` by `step`.
    pub fn onward(&self, step: Int) -> IntRange {
        IntRange { next: self.clone(), last: None, step }
    }
}

/// A lazy arithmetic sequence of [Int]s.
pub struct IntRange {
    next: Int,
    last: Option<Int>,
    step: Int,
}

impl Iterator for IntRange {
    type Item = Int;

    fn next(&mut self) -> Option<Int> {
        if let Some(last) = &self.last {
            let done = if self.step.is_negative() {
                self.next.compare_value(last) == Ordering::Less
            } else {
                self.next.compare_value(last) == Ordering::Greater
            };
            if done {
                return None;
            }
        }
        let current = self.next.clone();
        self.next = current.plus(&self.step);
        Some(current)
    }
}

impl Display for Int {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Int::Small(x) => write!(f, "{x}"),
            Int::Big(big) => write!(f, "{big}"),
        }
    }
}

impl PartialEq for Int {
    fn eq(&self, other: &Self) -> bool {
        self.equal_value(other)
    }
}

impl Eq for Int {}

impl PartialOrd for Int {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare_value(other))
    }
}

impl Ord for Int {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_value(other)
    }
}

// ===== Type descriptor =====

/// The `Int` type descriptor.
pub static INT: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 8,
        align: 8,
        tag: TypeTag::Opaque { name: "Int".into() },
        metamethods: Metamethods {
            hash: Some(|v, _| as_int(v).hash_value()),
            compare: Some(|x, y, _| as_int(x).compare_value(as_int(y))),
            equal: Some(|x, y, _| as_int(x).equal_value(as_int(y))),
            as_text: Some(int_as_text),
            is_none: Some(|v, _| matches!(v, Value::Null)),
            serialize: Some(int_serialize),
            deserialize: Some(int_deserialize),
        },
    })
});

fn as_int(v: &Value) -> &Int {
    match v {
        Value::Int(i) => i,
        other => panic!("expected Int, got {other:?}"),
    }
}

fn int_as_text(obj: Option<&Value>, colorize: bool, _ty: &TypeDescriptor) -> Text {
    match obj {
        None => Text::from_str("Int"),
        Some(v) => {
            let body = as_int(v).to_string();
            if colorize {
                Text::from_str(&format!("\x1b[35m{body}\x1b[m"))
            } else {
                Text::from_str(&body)
            }
        }
    }
}

// Wire format: a flag byte picks the representation, then either a zig-zag
// varint (small) or a length-prefixed decimal string (big).
fn int_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    _ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    match as_int(obj) {
        Int::Small(x) => {
            out.push(0);
            serialize::write_varint(out, *x);
        }
        Int::Big(big) => {
            out.push(1);
            let digits = big.to_string();
            serialize::write_varint(out, digits.len() as i64);
            out.extend_from_slice(digits.as_bytes());
        }
    }
    Ok(())
}

fn int_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let int = match input.read_u8()? {
        0 => Int::Small(input.read_varint()?),
        _ => {
            let len = input.read_varint()? as usize;
            let digits = input.read_bytes(len)?;
            let s = std::str::from_utf8(digits).map_err(|_| {
                RuntimeError::InvalidData { reason: "non-ASCII big int digits" }
            })?;
            Int::from_str(s).ok_or(RuntimeError::InvalidData {
                reason: "malformed big int digits",
            })?
        }
    };
    Ok(Value::Int(int))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_doubling_crosses_to_big_only_past_i64() {
        let mut i = Int::ONE;
        for _ in 0..62 {
            i = i.plus(&i.clone());
        }
        assert!(i.is_small(), "2^62 stays on the inline path");
        assert_eq!(i.to_string(), "4611686018427387904");
        let big = i.plus(&i.clone());
        assert!(!big.is_small(), "the 63rd doubling goes to the big path");
        assert_eq!(big.to_string(), "9223372036854775808");
    }

    #[test]
    fn test_overflow_transitions_and_agrees() {
        let max = Int::Small(i64::MAX);
        let bumped = max.plus(&Int::ONE);
        assert!(!bumped.is_small());
        assert_eq!(bumped.to_string(), "9223372036854775808");
        let back = bumped.minus(&Int::ONE);
        assert!(back.is_small(), "renormalizes to the inline path");
        assert_eq!(back, max);
    }

    #[test]
    fn test_euclidean_division() {
        let x = Int::Small(-7);
        let m = Int::Small(3);
        assert_eq!(x.divided_by(&m), Int::Small(-3));
        assert_eq!(x.modulo(&m), Int::Small(2));
        assert_eq!(Int::Small(7).modulo(&Int::Small(3)), Int::Small(1));
    }

    #[test]
    fn test_modulo1() {
        // 1-based wrap: 12 mod1 12 == 12, 13 mod1 12 == 1
        assert_eq!(Int::Small(12).modulo1(&Int::Small(12)), Int::Small(12));
        assert_eq!(Int::Small(13).modulo1(&Int::Small(12)), Int::Small(1));
        assert_eq!(Int::Small(0).modulo1(&Int::Small(12)), Int::Small(12));
    }

    #[test]
    fn test_parse_prefixes_and_separators() {
        assert_eq!(Int::from_str("1_000_000"), Some(Int::Small(1_000_000)));
        assert_eq!(Int::from_str("0xff"), Some(Int::Small(255)));
        assert_eq!(Int::from_str("0o777"), Some(Int::Small(511)));
        assert_eq!(Int::from_str("0b1010"), Some(Int::Small(10)));
        assert_eq!(Int::from_str("-42"), Some(Int::Small(-42)));
        assert_eq!(Int::from_str("bogus"), None);
        assert_eq!(Int::from_str(""), None);
    }

    #[test]
    fn test_from_str_round_trip() {
        for value in [Int::Small(0), Int::Small(-123), Int::Small(i64::MAX)] {
            let text = value.value_as_text();
            assert_eq!(Int::from_str(&text.to_string()), Some(value));
        }
        let huge = Int::Small(i64::MAX).times(&Int::Small(i64::MAX));
        assert_eq!(Int::from_str(&huge.to_string()), Some(huge.clone()));
        assert!(!huge.is_small());
    }

    #[test]
    fn test_small_big_agree() {
        // The same arithmetic through forced-big operands matches the
        // inline path.
        let a = Int::Small(123_456);
        let b = Int::Small(789);
        let big_a = Int::Big(Arc::new(BigInt::from(123_456)));
        assert_eq!(a.times(&b), big_a.times(&b));
        assert_eq!(a.plus(&b), big_a.plus(&b));
        assert_eq!(a.modulo(&b), big_a.modulo(&b));
        assert_eq!(a.hash_value(), big_a.hash_value());
    }

    #[test]
    fn test_conversion_truncate_flag() {
        assert_eq!(Int::from_num(3.0, false).unwrap(), Int::Small(3));
        assert!(Int::from_num(3.5, false).is_err());
        assert_eq!(Int::from_num(3.5, true).unwrap(), Int::Small(3));
        let big = Int::Small(i64::MAX).plus(&Int::ONE);
        assert!(big.to_i64(false).is_err());
        assert_eq!(big.to_i64(true).unwrap(), i64::MIN);
    }

    #[test]
    fn test_ranges() {
        let ups: Vec<i64> = Int::Small(1)
            .to(Int::Small(5), None)
            .map(|i| i.to_i64(false).unwrap())
            .collect();
        assert_eq!(ups, vec![1, 2, 3, 4, 5]);
        let downs: Vec<i64> = Int::Small(5)
            .to(Int::Small(1), None)
            .map(|i| i.to_i64(false).unwrap())
            .collect();
        assert_eq!(downs, vec![5, 4, 3, 2, 1]);
        let onward: Vec<i64> = Int::Small(0)
            .onward(Int::Small(10))
            .take(3)
            .map(|i| i.to_i64(false).unwrap())
            .collect();
        assert_eq!(onward, vec![0, 10, 20]);
    }

    #[test]
    fn test_misc_math() {
        assert_eq!(Int::Small(12).gcd(&Int::Small(18)), Int::Small(6));
        assert_eq!(Int::Small(-5).abs(), Int::Small(5));
        assert_eq!(Int::Small(2).power(&Int::Small(10)), Int::Small(1024));
        assert_eq!(Int::Small(10).sqrt(), Some(Int::Small(3)));
        assert_eq!(Int::Small(-1).sqrt(), None);
        assert_eq!(Int::Small(5).factorial(), Int::Small(120));
        assert_eq!(Int::Small(5).choose(&Int::Small(2)), Int::Small(10));
        assert!(Int::Small(97).is_prime(25));
        assert!(!Int::Small(98).is_prime(25));
        assert_eq!(Int::Small(90).next_prime(), Int::Small(97));
    }

    #[test]
    fn test_hex_octal() {
        assert_eq!(Int::Small(255).hex(4, true, true).to_string(), "0x00FF");
        assert_eq!(Int::Small(8).octal(0, true).to_string(), "0o10");
    }

    #[test]
    fn test_clamped_between() {
        assert!(Int::Small(5).is_between(&Int::Small(1), &Int::Small(10)));
        assert!(!Int::Small(0).is_between(&Int::Small(1), &Int::Small(10)));
        assert_eq!(
            Int::Small(99).clamped(&Int::Small(1), &Int::Small(10)),
            Int::Small(10)
        );
    }
}
