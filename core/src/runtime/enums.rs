//! Tagged-union values and their metamethods. Runtime tags count from 1;
//! tag 0 is reserved as the none value of optional enums.

use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{
    generic_as_text, generic_compare, generic_equal, generic_hash, EnumInfo,
    Metamethods, TypeDescriptor, TypeTag, Value,
};
use std::cmp::Ordering;
use std::sync::Arc;

/// An enum value: a tag plus the payload for that tag (if any).
#[derive(Clone, Debug)]
pub struct EnumValue {
    tag: i32,
    payload: Option<Arc<Value>>,
}

impl EnumValue {
    pub fn new(tag: i32, payload: Option<Value>) -> Self {
        Self { tag, payload: payload.map(Arc::new) }
    }

    /// The none value of an optional enum.
    pub fn none() -> Self {
        Self { tag: 0, payload: None }
    }

    pub fn tag(&self) -> i32 {
        self.tag
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.tag == 0
    }
}

fn as_enum(v: &Value) -> &EnumValue {
    match v {
        Value::Enum(e) => e,
        other => panic!("expected an enum value, got {other:?}"),
    }
}

fn info(ty: &TypeDescriptor) -> &EnumInfo {
    match &ty.tag {
        TypeTag::Enum(info) => info,
        _ => panic!("enum metamethod on non-enum descriptor"),
    }
}

fn payload_ty<'a>(
    ty: &'a TypeDescriptor,
    tag: i32,
) -> Option<&'a Arc<TypeDescriptor>> {
    if tag < 1 {
        return None;
    }
    info(ty).tags.get((tag - 1) as usize)?.1.as_ref()
}

fn enum_hash(v: &Value, ty: &TypeDescriptor) -> u64 {
    let value = as_enum(v);
    let payload_hash = match (value.payload(), payload_ty(ty, value.tag)) {
        (Some(payload), Some(pty)) => generic_hash(payload, pty),
        _ => 0,
    };
    hashing::siphash_words(&[value.tag as u64, payload_hash])
}

fn enum_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    let (a, b) = (as_enum(x), as_enum(y));
    if a.tag != b.tag {
        return a.tag.cmp(&b.tag);
    }
    match (a.payload(), b.payload(), payload_ty(ty, a.tag)) {
        (Some(pa), Some(pb), Some(pty)) => generic_compare(pa, pb, pty),
        _ => Ordering::Equal,
    }
}

fn enum_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    let (a, b) = (as_enum(x), as_enum(y));
    if a.tag != b.tag {
        return false;
    }
    match (a.payload(), b.payload(), payload_ty(ty, a.tag)) {
        (Some(pa), Some(pb), Some(pty)) => generic_equal(pa, pb, pty),
        _ => true,
    }
}

fn enum_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let info = info(ty);
    match obj {
        None => Text::from_str(&info.name),
        Some(v) => {
            let value = as_enum(v);
            if value.tag < 1 {
                return Text::from_str("none");
            }
            let (tag_name, _) = &info.tags[(value.tag - 1) as usize];
            match (value.payload(), payload_ty(ty, value.tag)) {
                (Some(payload), Some(pty)) => {
                    generic_as_text(Some(payload), colorize, pty)
                }
                _ if colorize => Text::from_str(&format!("\x1b[1m{tag_name}\x1b[m")),
                _ => Text::from_str(tag_name),
            }
        }
    }
}

fn enum_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let value = as_enum(obj);
    serialize::write_varint(out, value.tag as i64);
    if let (Some(payload), Some(pty)) = (value.payload(), payload_ty(ty, value.tag)) {
        serialize::serialize_value(payload, out, pty)?;
    }
    Ok(())
}

fn enum_deserialize(
    input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let tag = input.read_varint()?;
    let tag = i32::try_from(tag)
        .map_err(|_| RuntimeError::InvalidData { reason: "enum tag out of range" })?;
    if tag != 0 && (tag < 1 || tag as usize > info(ty).tags.len()) {
        return Err(RuntimeError::InvalidData { reason: "unknown enum tag" });
    }
    let payload = match payload_ty(ty, tag) {
        Some(pty) => Some(serialize::deserialize_value(input, pty)?),
        None => None,
    };
    Ok(Value::Enum(EnumValue::new(tag, payload)))
}

/// Descriptor for an enum with the given ordered `(name, payload)` tags.
pub fn enum_of(
    name: impl Into<String>,
    tags: Vec<(String, Option<Arc<TypeDescriptor>>)>,
) -> Arc<TypeDescriptor> {
    // Layout: i32 tag, then the payload padded to the widest payload's
    // alignment
    let payload_align = tags
        .iter()
        .filter_map(|(_, ty)| ty.as_ref().map(|t| t.align))
        .max()
        .unwrap_or(1);
    let payload_size = tags
        .iter()
        .filter_map(|(_, ty)| ty.as_ref().map(|t| t.size))
        .max()
        .unwrap_or(0);
    let align = payload_align.max(4);
    let mut size = 4;
    if payload_align > 1 && size % payload_align > 0 {
        size += payload_align - (size % payload_align);
    }
    size += payload_size;
    if size % align > 0 {
        size += align - (size % align);
    }
    Arc::new(TypeDescriptor {
        size,
        align,
        tag: TypeTag::Enum(EnumInfo { name: name.into(), tags }),
        metamethods: Metamethods {
            hash: Some(enum_hash),
            compare: Some(enum_compare),
            equal: Some(enum_equal),
            as_text: Some(enum_as_text),
            is_none: Some(|v, _| as_enum(v).is_none()),
            serialize: Some(enum_serialize),
            deserialize: Some(enum_deserialize),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::intx::INT64;
    use crate::runtime::structs::{struct_of, StructValue};
    use pretty_assertions::assert_eq;

    fn shape_ty() -> Arc<TypeDescriptor> {
        let circle = struct_of(
            "Circle",
            vec![("radius".into(), INT64.clone())],
            false,
            false,
        );
        enum_of(
            "Shape",
            vec![
                ("Point".into(), None),
                ("Circle".into(), Some(circle)),
            ],
        )
    }

    fn circle(radius: i64) -> Value {
        Value::Enum(EnumValue::new(
            2,
            Some(Value::Struct(StructValue::new(vec![Value::Int64(radius)]))),
        ))
    }

    #[test]
    fn test_tag_ordering() {
        let ty = shape_ty();
        let point = Value::Enum(EnumValue::new(1, None));
        assert_eq!(generic_compare(&point, &circle(1), &ty), Ordering::Less);
        assert_eq!(
            generic_compare(&circle(2), &circle(1), &ty),
            Ordering::Greater
        );
        assert!(generic_equal(&circle(3), &circle(3), &ty));
        assert!(!generic_equal(&point, &circle(3), &ty));
    }

    #[test]
    fn test_hash_includes_payload() {
        let ty = shape_ty();
        assert_eq!(
            generic_hash(&circle(5), &ty),
            generic_hash(&circle(5), &ty)
        );
        assert_ne!(
            generic_hash(&circle(5), &ty),
            generic_hash(&circle(6), &ty)
        );
    }

    #[test]
    fn test_tag_zero_is_none() {
        let ty = shape_ty();
        let none = Value::Enum(EnumValue::none());
        assert!((ty.metamethods.is_none.unwrap())(&none, &ty));
        assert!(!(ty.metamethods.is_none.unwrap())(&circle(1), &ty));
    }

    #[test]
    fn test_as_text() {
        let ty = shape_ty();
        let point = Value::Enum(EnumValue::new(1, None));
        assert_eq!(generic_as_text(Some(&point), false, &ty).to_string(), "Point");
        assert_eq!(
            generic_as_text(Some(&circle(2)), false, &ty).to_string(),
            "Circle(radius=2)"
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let ty = shape_ty();
        for v in [Value::Enum(EnumValue::new(1, None)), circle(9)] {
            let bytes = serialize::generic_serialize(&v, &ty).unwrap();
            let back = serialize::generic_deserialize(&bytes, &ty).unwrap();
            assert!(generic_equal(&v, &back, &ty));
        }
    }
}
