//! Integration tests for the runtime value library: the cross-type
//! invariants (hash/equality agreement, total ordering, optional
//! semantics), serialization round trips, and the concrete end-to-end
//! scenarios for each compound type.

use pretty_assertions::assert_eq;
use std::cmp::Ordering;
use std::sync::Arc;
use tomo::runtime::int::{Int, INT};
use tomo::runtime::intx::INT64;
use tomo::runtime::list::{list_of, List};
use tomo::runtime::optional::{is_none, none_value, optional_of};
use tomo::runtime::path::PathValue;
use tomo::runtime::serialize::{generic_deserialize, generic_serialize};
use tomo::runtime::structs::{struct_of, StructValue};
use tomo::runtime::table::{table_of, Table};
use tomo::runtime::text::{Text, TEXT};
use tomo::runtime::types::{
    generic_compare, generic_equal, generic_hash, TypeDescriptor, Value, BOOL,
};

fn int64(x: i64) -> Value {
    Value::Int64(x)
}

// ===== Cross-type invariants =====

fn sample_values() -> Vec<(Value, Arc<TypeDescriptor>)> {
    let list_ty = list_of(INT64.clone());
    let table_ty = table_of(INT64.clone(), INT64.clone());
    let mut table = Table::new();
    table.set(int64(1), int64(2), &table_ty).unwrap();
    vec![
        (Value::Bool(true), BOOL.clone()),
        (int64(123), INT64.clone()),
        (Value::Int(Int::from_str("123456789123456789123456789").unwrap()), INT.clone()),
        (Value::Text(Text::from_str("hello")), TEXT.clone()),
        (
            Value::List(List::from_vec(vec![int64(1), int64(2)])),
            list_ty,
        ),
        (Value::Table(table), table_ty),
    ]
}

#[test]
fn test_equal_values_hash_equal() {
    for (value, ty) in sample_values() {
        assert!(generic_equal(&value, &value.clone(), &ty));
        assert_eq!(
            generic_hash(&value, &ty),
            generic_hash(&value.clone(), &ty),
            "hash must agree for equal values of {}",
            ty.type_name()
        );
        assert_eq!(
            generic_compare(&value, &value.clone(), &ty),
            Ordering::Equal
        );
    }
}

#[test]
fn test_compare_is_antisymmetric() {
    let values = [int64(-5), int64(0), int64(5), int64(100)];
    for a in &values {
        for b in &values {
            let ab = generic_compare(a, b, &INT64);
            let ba = generic_compare(b, a, &INT64);
            assert_eq!(ab, ba.reverse());
        }
    }
}

#[test]
fn test_serialize_round_trips() {
    for (value, ty) in sample_values() {
        let bytes = generic_serialize(&value, &ty).unwrap();
        let back = generic_deserialize(&bytes, &ty).unwrap();
        assert!(
            generic_equal(&value, &back, &ty),
            "round trip failed for {}",
            ty.type_name()
        );
    }
}

#[test]
fn test_truncated_streams_fail() {
    let ty = list_of(TEXT.clone());
    let value = Value::List(List::from_vec(vec![
        Value::Text(Text::from_str("alpha")),
        Value::Text(Text::from_str("beta")),
    ]));
    let bytes = generic_serialize(&value, &ty).unwrap();
    for cut in 1..bytes.len() {
        assert!(
            generic_deserialize(&bytes[..cut], &ty).is_err(),
            "truncation at {cut} should fail"
        );
    }
}

#[test]
fn test_optional_invariants() {
    for (value, ty) in sample_values() {
        let none = none_value(&ty);
        assert!(is_none(&none, &ty), "none_value is none for {}", ty.type_name());
        assert!(!is_none(&value, &ty), "real value is not none for {}", ty.type_name());

        let opt_ty = optional_of(ty.clone());
        assert_eq!(generic_compare(&none, &value, &opt_ty), Ordering::Less);
        assert!(generic_equal(&none, &none_value(&ty), &opt_ty));
        assert_eq!(generic_hash(&none, &opt_ty), 0);

        // Presence-byte serialization round trips both states
        for v in [&none, &value] {
            let bytes = generic_serialize(v, &opt_ty).unwrap();
            let back = generic_deserialize(&bytes, &opt_ty).unwrap();
            assert!(generic_equal(v, &back, &opt_ty));
        }
    }
}

// ===== Scenario: text round trip of a mixed-script string =====

#[test]
fn test_text_mixed_script_round_trip() {
    let input: &[u8] =
        &[0xF0, 0x9F, 0x91, 0x8B, 0xE2, 0x9D, 0xA4, 0xEF, 0xB8, 0x8F, 0x41];
    let text = Text::from_bytes(input).unwrap();
    assert_eq!(text.len(), 3, "three grapheme clusters");
    assert_eq!(text.utf8_bytes(), input);
    let names: Vec<String> =
        text.codepoint_names().iter().map(|n| n.to_string()).collect();
    assert_eq!(
        names,
        vec![
            "WAVING HAND SIGN",
            "HEAVY BLACK HEART + VARIATION SELECTOR-16",
            "LATIN CAPITAL LETTER A",
        ]
    );

    // UTF-16 and UTF-32 round trips
    assert!(Text::from_utf16(&text.utf16_units()).unwrap().equal(&text));
    assert!(Text::from_codepoints(&text.utf32_codepoints()).equal(&text));
}

// ===== Scenario: table set/get with a collision chain =====

#[test]
fn test_table_collision_chain() {
    let ty = table_of(INT64.clone(), INT64.clone());

    // Choose keys so at least three share a home bucket modulo the initial
    // bucket count (8). The hash key is random per process, so probe for
    // colliding keys rather than hard-coding them.
    let mut colliding = Vec::new();
    let target = generic_hash(&int64(0), &INT64) % 8;
    let mut candidate = 0i64;
    while colliding.len() < 3 && candidate < 100_000 {
        if generic_hash(&int64(candidate), &INT64) % 8 == target {
            colliding.push(candidate);
        }
        candidate += 1;
    }
    assert_eq!(colliding.len(), 3, "found three colliding keys");

    let mut keys = colliding.clone();
    let mut filler = 1_000_000i64;
    while keys.len() < 8 {
        if !keys.contains(&filler) {
            keys.push(filler);
        }
        filler += 1;
    }

    let mut table = Table::new();
    for (i, &k) in keys.iter().enumerate() {
        table.set(int64(k), int64(i as i64), &ty).unwrap();
    }
    assert_eq!(table.len(), 8);
    for (i, &k) in keys.iter().enumerate() {
        assert!(
            generic_equal(table.get(&int64(k), &ty).unwrap(), &int64(i as i64), &INT64),
            "key {k}"
        );
    }

    // Removing the first-inserted key preserves the rest
    table.remove(&int64(keys[0]), &ty);
    assert_eq!(table.len(), 7);
    assert!(table.get(&int64(keys[0]), &ty).is_none());
    for (i, &k) in keys.iter().enumerate().skip(1) {
        assert!(
            generic_equal(table.get(&int64(k), &ty).unwrap(), &int64(i as i64), &INT64),
            "key {k} after removal"
        );
    }
}

#[test]
fn test_table_insertion_order_and_entry() {
    let ty = table_of(TEXT.clone(), INT64.clone());
    let mut table = Table::new();
    for (i, name) in ["delta", "alpha", "zulu"].iter().enumerate() {
        table
            .set(Value::Text(Text::from_str(name)), int64(i as i64), &ty)
            .unwrap();
    }
    // The most recently inserted key is the last entry
    let (last_key, _) = table.entry(table.len() as i64).unwrap();
    assert!(generic_equal(
        last_key,
        &Value::Text(Text::from_str("zulu")),
        &TEXT
    ));
}

#[test]
fn test_table_sorted_idempotent() {
    let ty = table_of(INT64.clone(), INT64.clone());
    let mut table = Table::new();
    for k in [5i64, 2, 9, 1, 7] {
        table.set(int64(k), int64(-k), &ty).unwrap();
    }
    let once = table.sorted(&ty).unwrap();
    let twice = once.sorted(&ty).unwrap();
    assert!(generic_equal(
        &Value::Table(once.clone()),
        &Value::Table(twice),
        &ty
    ));
    let keys: Vec<i64> = once
        .iter()
        .map(|(k, _)| match k {
            Value::Int64(x) => *x,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(keys, vec![1, 2, 5, 7, 9]);
}

// ===== Scenario: list slice aliasing + copy-on-write =====

#[test]
fn test_list_slice_aliasing_and_cow() {
    let mut a = List::from_vec((1..=5).map(int64).collect());
    let b = a.slice(2, 4);
    assert_eq!(b.len(), 3);

    a.insert(int64(99), 1).unwrap();

    let b_values: Vec<i64> = b
        .iter()
        .map(|v| match v {
            Value::Int64(x) => *x,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(b_values, vec![2, 3, 4], "the aliased slice is unchanged");
}

#[test]
fn test_list_reversal_round_trip() {
    let list = List::from_vec((1..=7).map(int64).collect());
    let round = list.reversed().reversed();
    let ty = list_of(INT64.clone());
    assert!(generic_equal(
        &Value::List(list),
        &Value::List(round),
        &ty
    ));
}

#[test]
fn test_list_slice_length_law() {
    let list = List::from_vec((1..=10).map(int64).collect());
    for i in 1..=10i64 {
        for j in i..=10i64 {
            assert_eq!(list.slice(i, j).len() as i64, j - i + 1);
        }
    }
}

// ===== Scenario: big int overflow =====

#[test]
fn test_bigint_doubling_scenario() {
    let mut i = Int::Small(1);
    for _ in 0..62 {
        i = i.plus(&i.clone());
        assert!(i.is_small(), "doubling within i64 stays inline");
    }
    assert_eq!(i.to_string(), "4611686018427387904");
    let overflowed = i.plus(&i.clone());
    assert!(!overflowed.is_small(), "the 63rd doubling moves to the big path");
    assert_eq!(overflowed.to_string(), "9223372036854775808");
    // Coming back down re-normalizes to the inline representation
    let back = overflowed.minus(&i);
    assert!(back.is_small());
    assert_eq!(back, i);
}

#[test]
fn test_int_text_round_trip() {
    for i in [
        Int::Small(0),
        Int::Small(-1),
        Int::Small(i64::MAX),
        Int::Small(i64::MAX).times(&Int::Small(12345)),
    ] {
        let text = i.value_as_text();
        assert_eq!(Int::from_str(&text.to_string()), Some(i));
    }
}

// ===== Paths =====

#[test]
fn test_path_text_round_trip() {
    for s in ["/usr/local/bin", "~/notes.txt", "./src/main.tm", "../up/two"] {
        let path = PathValue::from_str(s);
        let back = PathValue::from_text(&Text::from_str(&path.to_string()));
        assert!(path.equal(&back), "{s}");
    }
}

// ===== Structs in tables (compound keys) =====

#[test]
fn test_struct_keys_in_tables() {
    let point_ty = struct_of(
        "Point",
        vec![("x".into(), INT64.clone()), ("y".into(), INT64.clone())],
        false,
        false,
    );
    let ty = table_of(point_ty.clone(), INT64.clone());
    let point = |x: i64, y: i64| {
        Value::Struct(StructValue::new(vec![int64(x), int64(y)]))
    };

    let mut table = Table::new();
    table.set(point(1, 2), int64(12), &ty).unwrap();
    table.set(point(3, 4), int64(34), &ty).unwrap();

    // A structurally equal key finds the entry
    assert!(generic_equal(
        table.get(&point(1, 2), &ty).unwrap(),
        &int64(12),
        &INT64
    ));
    assert!(table.get(&point(9, 9), &ty).is_none());
}

// ===== Nested compound serialization =====

#[test]
fn test_nested_serialization() {
    let inner_ty = list_of(optional_of(TEXT.clone()));
    let table_ty = table_of(TEXT.clone(), inner_ty.clone());

    let mut table = Table::new();
    table
        .set(
            Value::Text(Text::from_str("words")),
            Value::List(List::from_vec(vec![
                Value::Text(Text::from_str("one")),
                Value::Text(Text::none()),
                Value::Text(Text::from_str("two")),
            ])),
            &table_ty,
        )
        .unwrap();
    let with_fallback = {
        let mut base = Table::new();
        base.set(
            Value::Text(Text::from_str("base")),
            Value::List(List::new()),
            &table_ty,
        )
        .unwrap();
        table.with_fallback(Some(base))
    };

    let value = Value::Table(with_fallback);
    let bytes = generic_serialize(&value, &table_ty).unwrap();
    let back = generic_deserialize(&bytes, &table_ty).unwrap();
    assert!(generic_equal(&value, &back, &table_ty));

    // Fallback presence is part of structural equality
    let without_fallback = Value::Table(table);
    assert!(!generic_equal(&value, &without_fallback, &table_ty));
}
