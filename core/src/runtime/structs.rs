//! Struct values and their field-walking metamethods. Descriptor layout
//! computations honor the C ABI rules for these structs: fields in
//! declaration order with alignment padding, and runs of consecutive `Bool`
//! fields bit-packed into shared bytes.

use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{
    generic_as_text, generic_compare, generic_equal, generic_hash, Metamethods,
    StructInfo, TypeDescriptor, TypeTag, Value,
};
use std::cmp::Ordering;
use std::sync::Arc;

/// A struct value: its field values in declaration order.
#[derive(Clone, Debug)]
pub struct StructValue(Arc<Vec<Value>>);

impl StructValue {
    pub fn new(fields: Vec<Value>) -> Self {
        Self(Arc::new(fields))
    }

    pub fn fields(&self) -> &[Value] {
        &self.0
    }
}

fn is_bool(ty: &TypeDescriptor) -> bool {
    matches!(&ty.tag, TypeTag::Opaque { name } if name == "Bool")
}

/// Size and alignment of a struct with the given fields: declaration order,
/// alignment padding, consecutive bools sharing bytes bit by bit, and a
/// non-bool field after packed bools rounding up to the next byte.
pub fn struct_layout(fields: &[(String, Arc<TypeDescriptor>)]) -> (usize, usize) {
    let mut byte_offset = 0usize;
    let mut bit_offset = 0usize;
    let mut align = 1usize;
    for (_, ty) in fields {
        if is_bool(ty) {
            bit_offset += 1;
            if bit_offset >= 8 {
                byte_offset += 1;
                bit_offset = 0;
            }
        } else {
            if bit_offset > 0 {
                byte_offset += 1;
                bit_offset = 0;
            }
            if ty.align > 1 && byte_offset % ty.align > 0 {
                byte_offset += ty.align - (byte_offset % ty.align);
            }
            byte_offset += ty.size;
            align = align.max(ty.align);
        }
    }
    if bit_offset > 0 {
        byte_offset += 1;
    }
    if align > 1 && byte_offset % align > 0 {
        byte_offset += align - (byte_offset % align);
    }
    (byte_offset, align)
}

fn as_struct(v: &Value) -> &StructValue {
    match v {
        Value::Struct(s) => s,
        other => panic!("expected a struct value, got {other:?}"),
    }
}

fn info(ty: &TypeDescriptor) -> &StructInfo {
    match &ty.tag {
        TypeTag::Struct(info) => info,
        _ => panic!("struct metamethod on non-struct descriptor"),
    }
}

fn struct_hash(v: &Value, ty: &TypeDescriptor) -> u64 {
    let info = info(ty);
    let fields = as_struct(v).fields();
    match info.fields.len() {
        0 => 0,
        1 => generic_hash(&fields[0], &info.fields[0].1),
        n => {
            let words: Vec<u64> = (0..n)
                .map(|i| generic_hash(&fields[i], &info.fields[i].1))
                .collect();
            hashing::siphash_words(&words)
        }
    }
}

fn struct_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    let info = info(ty);
    let (a, b) = (as_struct(x).fields(), as_struct(y).fields());
    for (i, (_, field_ty)) in info.fields.iter().enumerate() {
        let cmp = generic_compare(&a[i], &b[i], field_ty);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

fn struct_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    let info = info(ty);
    let (a, b) = (as_struct(x).fields(), as_struct(y).fields());
    info.fields
        .iter()
        .enumerate()
        .all(|(i, (_, field_ty))| generic_equal(&a[i], &b[i], field_ty))
}

fn struct_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let info = info(ty);
    match obj {
        None => Text::from_str(&info.name),
        Some(_) if info.is_secret => {
            Text::from_str(&info.name).concat(&Text::from_str("(...)"))
        }
        Some(v) => {
            let fields = as_struct(v).fields();
            let mut out = Text::from_str(&info.name).concat(&Text::from_str("("));
            for (i, (name, field_ty)) in info.fields.iter().enumerate() {
                if i > 0 {
                    out = out.concat(&Text::from_str(", "));
                }
                out = out.concat(&Text::from_str(&format!("{name}=")));
                out = out.concat(&generic_as_text(Some(&fields[i]), colorize, field_ty));
            }
            out.concat(&Text::from_str(")"))
        }
    }
}

// Packed bools serialize as one byte per bool
fn struct_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let info = info(ty);
    let fields = as_struct(obj).fields();
    for (i, (_, field_ty)) in info.fields.iter().enumerate() {
        serialize::serialize_value(&fields[i], out, field_ty)?;
    }
    Ok(())
}

fn struct_deserialize(
    input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let info = info(ty);
    let mut fields = Vec::with_capacity(info.fields.len());
    for (_, field_ty) in &info.fields {
        fields.push(serialize::deserialize_value(input, field_ty)?);
    }
    Ok(Value::Struct(StructValue::new(fields)))
}

/// Descriptor for a struct type with the given ordered fields.
pub fn struct_of(
    name: impl Into<String>,
    fields: Vec<(String, Arc<TypeDescriptor>)>,
    is_secret: bool,
    is_opaque: bool,
) -> Arc<TypeDescriptor> {
    let (size, align) = struct_layout(&fields);
    Arc::new(TypeDescriptor {
        size,
        align,
        tag: TypeTag::Struct(StructInfo {
            name: name.into(),
            fields,
            is_secret,
            is_opaque,
        }),
        metamethods: Metamethods {
            hash: Some(struct_hash),
            compare: Some(struct_compare),
            equal: Some(struct_equal),
            as_text: Some(struct_as_text),
            is_none: Some(|v, _| matches!(v, Value::Null)),
            serialize: Some(struct_serialize),
            deserialize: Some(struct_deserialize),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::intx::{INT32, INT64};
    use crate::runtime::types::BOOL;
    use pretty_assertions::assert_eq;

    fn point_ty() -> Arc<TypeDescriptor> {
        struct_of(
            "Point",
            vec![
                ("x".into(), INT64.clone()),
                ("y".into(), INT64.clone()),
            ],
            false,
            false,
        )
    }

    fn point(x: i64, y: i64) -> Value {
        Value::Struct(StructValue::new(vec![Value::Int64(x), Value::Int64(y)]))
    }

    #[test]
    fn test_layout_plain() {
        let ty = point_ty();
        assert_eq!((ty.size, ty.align), (16, 8));
    }

    #[test]
    fn test_layout_packs_bools() {
        // Three consecutive bools share one byte
        let flags = struct_of(
            "Flags",
            vec![
                ("a".into(), BOOL.clone()),
                ("b".into(), BOOL.clone()),
                ("c".into(), BOOL.clone()),
            ],
            false,
            false,
        );
        assert_eq!((flags.size, flags.align), (1, 1));

        // A non-bool field after packed bools rounds up to its alignment
        let mixed = struct_of(
            "Mixed",
            vec![
                ("a".into(), BOOL.clone()),
                ("b".into(), BOOL.clone()),
                ("n".into(), INT32.clone()),
            ],
            false,
            false,
        );
        assert_eq!((mixed.size, mixed.align), (8, 4));

        // Nine bools need two bytes
        let many = struct_of(
            "Many",
            (0..9)
                .map(|i| (format!("b{i}"), BOOL.clone()))
                .collect(),
            false,
            false,
        );
        assert_eq!((many.size, many.align), (2, 1));
    }

    #[test]
    fn test_metamethods() {
        let ty = point_ty();
        let a = point(1, 2);
        let b = point(1, 2);
        let c = point(1, 3);
        assert!(generic_equal(&a, &b, &ty));
        assert!(!generic_equal(&a, &c, &ty));
        assert_eq!(generic_hash(&a, &ty), generic_hash(&b, &ty));
        assert_eq!(generic_compare(&a, &c, &ty), Ordering::Less);
        assert_eq!(
            generic_as_text(Some(&a), false, &ty).to_string(),
            "Point(x=1, y=2)"
        );
    }

    #[test]
    fn test_secret_structs_redact() {
        let ty = struct_of(
            "Password",
            vec![("text".into(), INT64.clone())],
            true,
            false,
        );
        let v = Value::Struct(StructValue::new(vec![Value::Int64(42)]));
        assert_eq!(
            generic_as_text(Some(&v), false, &ty).to_string(),
            "Password(...)"
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let ty = struct_of(
            "Mixed",
            vec![
                ("flag".into(), BOOL.clone()),
                ("n".into(), INT64.clone()),
            ],
            false,
            false,
        );
        let v = Value::Struct(StructValue::new(vec![
            Value::Bool(true),
            Value::Int64(-5),
        ]));
        let bytes = serialize::generic_serialize(&v, &ty).unwrap();
        let back = serialize::generic_deserialize(&bytes, &ty).unwrap();
        assert!(generic_equal(&v, &back, &ty));
    }
}
