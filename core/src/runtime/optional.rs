//! Optional values. Each non-none type picks a none representation that
//! avoids a discriminator where one exists naturally: NaN for floats, the
//! none text/list/table sentinels, tag 0 for enums, null for pointers and
//! functions, and an explicit null value for everything else (the cases that
//! need a trailing `is_none` flag in a C layout).

use crate::error::RuntimeError;
use crate::runtime::enums::EnumValue;
use crate::runtime::list::List;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::table::Table;
use crate::runtime::text::Text;
use crate::runtime::types::{
    generic_as_text, generic_compare, generic_equal, generic_hash, Metamethods,
    TypeDescriptor, TypeTag, Value,
};
use std::cmp::Ordering;
use std::sync::Arc;

/// Whether a value is the none value of its (non-optional) type.
pub fn is_none(obj: &Value, non_optional: &TypeDescriptor) -> bool {
    if let Some(is_none) = non_optional.metamethods.is_none {
        return is_none(obj, non_optional);
    }
    matches!(obj, Value::Null)
}

/// The none value for a (non-optional) type.
pub fn none_value(non_optional: &TypeDescriptor) -> Value {
    match &non_optional.tag {
        TypeTag::Text { .. } => Value::Text(Text::none()),
        TypeTag::List { .. } => Value::List(List::none()),
        TypeTag::Table { .. } => Value::Table(Table::none()),
        TypeTag::Enum(_) => Value::Enum(EnumValue::none()),
        TypeTag::Pointer { .. } => Value::Pointer(None),
        TypeTag::Opaque { name } if name == "Num" => Value::Num(f64::NAN),
        TypeTag::Opaque { name } if name == "Num32" => Value::Num32(f32::NAN),
        _ => Value::Null,
    }
}

fn inner_ty(ty: &TypeDescriptor) -> &Arc<TypeDescriptor> {
    match &ty.tag {
        TypeTag::Optional { inner } => inner,
        _ => panic!("optional metamethod on non-optional descriptor"),
    }
}

fn optional_hash(v: &Value, ty: &TypeDescriptor) -> u64 {
    let inner = inner_ty(ty);
    if is_none(v, inner) {
        0
    } else {
        generic_hash(v, inner)
    }
}

// Two nones are equal and compare equal; a none sorts before any value
fn optional_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    let inner = inner_ty(ty);
    match (is_none(x, inner), is_none(y, inner)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => generic_compare(x, y, inner),
    }
}

fn optional_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    let inner = inner_ty(ty);
    match (is_none(x, inner), is_none(y, inner)) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => generic_equal(x, y, inner),
    }
}

fn optional_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let inner = inner_ty(ty);
    match obj {
        None => generic_as_text(None, colorize, inner).concat(&Text::from_str("?")),
        Some(v) if is_none(v, inner) => {
            if colorize {
                Text::from_str("\x1b[31mnone\x1b[m")
            } else {
                Text::from_str("none")
            }
        }
        Some(v) => generic_as_text(Some(v), colorize, inner),
    }
}

// One presence byte, then the payload if present
fn optional_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let inner = inner_ty(ty);
    if is_none(obj, inner) {
        out.push(0);
        Ok(())
    } else {
        out.push(1);
        serialize::serialize_value(obj, out, inner)
    }
}

fn optional_deserialize(
    input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let inner = inner_ty(ty);
    if input.read_u8()? == 0 {
        Ok(none_value(inner))
    } else {
        serialize::deserialize_value(input, inner)
    }
}

/// Whether a type gets its optional none state "for free" in its own
/// representation (no trailing flag needed).
fn has_natural_sentinel(ty: &TypeDescriptor) -> bool {
    match &ty.tag {
        TypeTag::Text { .. }
        | TypeTag::List { .. }
        | TypeTag::Table { .. }
        | TypeTag::Enum(_)
        | TypeTag::Pointer { .. }
        | TypeTag::Function { .. } => true,
        TypeTag::Opaque { name } => {
            matches!(name.as_str(), "Num" | "Num32" | "Bool" | "Int")
        }
        _ => false,
    }
}

/// Descriptor for an optional wrapping `inner`.
pub fn optional_of(inner: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
    // Types without a natural sentinel carry a trailing is_none flag, padded
    // to the type's alignment
    let (size, align) = if has_natural_sentinel(&inner) {
        (inner.size, inner.align)
    } else {
        let mut size = inner.size + 1;
        if inner.align > 1 && size % inner.align > 0 {
            size += inner.align - (size % inner.align);
        }
        (size, inner.align)
    };
    Arc::new(TypeDescriptor {
        size,
        align,
        tag: TypeTag::Optional { inner },
        metamethods: Metamethods {
            hash: Some(optional_hash),
            compare: Some(optional_compare),
            equal: Some(optional_equal),
            as_text: Some(optional_as_text),
            is_none: Some(|v, ty| is_none(v, inner_ty(ty))),
            serialize: Some(optional_serialize),
            deserialize: Some(optional_deserialize),
        },
    })
}
