//! Runtime type descriptors and the generic operations that dispatch through
//! them. Every value the runtime manipulates is described by a
//! [TypeDescriptor] carrying size, alignment, a structural tag, and a vtable
//! of metamethods. Generic operations consult the vtable and fall back to
//! structural defaults when a slot is empty.

use crate::error::RuntimeError;
use crate::runtime::enums::EnumValue;
use crate::runtime::hashing;
use crate::runtime::int::Int;
use crate::runtime::list::List;
use crate::runtime::moment::Moment;
use crate::runtime::path::PathValue;
use crate::runtime::serialize::ByteReader;
use crate::runtime::structs::StructValue;
use crate::runtime::table::Table;
use crate::runtime::text::Text;
use std::cmp::Ordering;
use std::sync::Arc;

/// A dynamically typed runtime value. The variant in use must always agree
/// with the [TypeDescriptor] passed alongside it; mismatches are programmer
/// errors and panic.
#[derive(Clone, Debug)]
pub enum Value {
    /// The none value for types without a natural sentinel representation
    /// (bools, fixed-width ints, big ints, structs, null pointers/closures).
    Null,
    Bool(bool),
    Byte(u8),
    Int(Int),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Num(f64),
    Num32(f32),
    Text(Text),
    List(List),
    Table(Table),
    Struct(StructValue),
    Enum(EnumValue),
    /// An opaque first-class function handle. Compared by identity; cannot be
    /// serialized.
    Function(Closure),
    /// A heap or stack pointer to another value. Compared by address.
    Pointer(Option<Arc<Value>>),
    Path(PathValue),
    Moment(Moment),
}

/// A two-word function value: an opaque callable identity plus a display
/// name. The runtime only needs identity semantics from these.
#[derive(Clone, Debug)]
pub struct Closure {
    name: Arc<str>,
}

impl Closure {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> usize {
        self.name.as_ptr() as usize
    }
}

pub type HashFn = fn(&Value, &TypeDescriptor) -> u64;
pub type CompareFn = fn(&Value, &Value, &TypeDescriptor) -> Ordering;
pub type EqualFn = fn(&Value, &Value, &TypeDescriptor) -> bool;
pub type AsTextFn = fn(Option<&Value>, bool, &TypeDescriptor) -> Text;
pub type IsNoneFn = fn(&Value, &TypeDescriptor) -> bool;
pub type SerializeFn =
    fn(&Value, &mut Vec<u8>, &TypeDescriptor) -> Result<(), RuntimeError>;
pub type DeserializeFn =
    fn(&mut ByteReader<'_>, &TypeDescriptor) -> Result<Value, RuntimeError>;

/// The metamethod vtable. Any slot may be empty, in which case the structural
/// default applies (byte-style hash/compare/equal; `as_text` has no default
/// and compound types must supply one).
#[derive(Clone, Copy, Default)]
pub struct Metamethods {
    pub hash: Option<HashFn>,
    pub compare: Option<CompareFn>,
    pub equal: Option<EqualFn>,
    pub as_text: Option<AsTextFn>,
    pub is_none: Option<IsNoneFn>,
    pub serialize: Option<SerializeFn>,
    pub deserialize: Option<DeserializeFn>,
}

impl std::fmt::Debug for Metamethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metamethods")
            .field("hash", &self.hash.is_some())
            .field("compare", &self.compare.is_some())
            .field("equal", &self.equal.is_some())
            .field("as_text", &self.as_text.is_some())
            .field("is_none", &self.is_none.is_some())
            .field("serialize", &self.serialize.is_some())
            .field("deserialize", &self.deserialize.is_some())
            .finish()
    }
}

/// Ordered `(name, type)` fields of a struct descriptor.
#[derive(Clone, Debug)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<(String, Arc<TypeDescriptor>)>,
    pub is_secret: bool,
    pub is_opaque: bool,
}

/// Ordered `(name, payload type)` tags of an enum descriptor. Runtime tag
/// values start at 1; tag 0 is reserved for the none value of optional enums.
#[derive(Clone, Debug)]
pub struct EnumInfo {
    pub name: String,
    pub tags: Vec<(String, Option<Arc<TypeDescriptor>>)>,
}

/// Structural identity of a descriptor.
#[derive(Clone, Debug)]
pub enum TypeTag {
    Opaque { name: String },
    Struct(StructInfo),
    Enum(EnumInfo),
    Pointer { sigil: &'static str, pointed: Arc<TypeDescriptor> },
    Text { lang: Option<String> },
    List { item: Arc<TypeDescriptor> },
    Table { key: Arc<TypeDescriptor>, value: Arc<TypeDescriptor> },
    Function { signature: String },
    Optional { inner: Arc<TypeDescriptor> },
    TypeInfo { name: String },
}

/// Runtime description of one concrete type: its layout and its metamethods.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub size: usize,
    pub align: usize,
    pub tag: TypeTag,
    pub metamethods: Metamethods,
}

// Two descriptors are interchangeable iff their tag and payload are
// structurally identical; metamethods are derived from the tag and are not
// part of the identity.
impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size || self.align != other.align {
            return false;
        }
        match (&self.tag, &other.tag) {
            (TypeTag::Opaque { name: a }, TypeTag::Opaque { name: b }) => a == b,
            (TypeTag::Struct(a), TypeTag::Struct(b)) => {
                a.name == b.name
                    && a.is_secret == b.is_secret
                    && a.is_opaque == b.is_opaque
                    && a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(&b.fields)
                        .all(|((an, at), (bn, bt))| an == bn && at == bt)
            }
            (TypeTag::Enum(a), TypeTag::Enum(b)) => {
                a.name == b.name
                    && a.tags.len() == b.tags.len()
                    && a.tags
                        .iter()
                        .zip(&b.tags)
                        .all(|((an, at), (bn, bt))| an == bn && at == bt)
            }
            (
                TypeTag::Pointer { sigil: a, pointed: ap },
                TypeTag::Pointer { sigil: b, pointed: bp },
            ) => a == b && ap == bp,
            (TypeTag::Text { lang: a }, TypeTag::Text { lang: b }) => a == b,
            (TypeTag::List { item: a }, TypeTag::List { item: b }) => a == b,
            (
                TypeTag::Table { key: ak, value: av },
                TypeTag::Table { key: bk, value: bv },
            ) => ak == bk && av == bv,
            (
                TypeTag::Function { signature: a },
                TypeTag::Function { signature: b },
            ) => a == b,
            (TypeTag::Optional { inner: a }, TypeTag::Optional { inner: b }) => {
                a == b
            }
            (TypeTag::TypeInfo { name: a }, TypeTag::TypeInfo { name: b }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl Eq for TypeDescriptor {}

impl TypeDescriptor {
    /// A named opaque type with no metamethods beyond the defaults.
    pub fn opaque(name: impl Into<String>, size: usize, align: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            align,
            tag: TypeTag::Opaque { name: name.into() },
            metamethods: Metamethods::default(),
        })
    }

    /// A pointer descriptor. `sigil` is `"@"` for heap pointers or `"&"` for
    /// stack references.
    pub fn pointer_to(sigil: &'static str, pointed: Arc<TypeDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            size: 8,
            align: 8,
            tag: TypeTag::Pointer { sigil, pointed },
            metamethods: Metamethods {
                hash: Some(pointer_hash),
                compare: Some(pointer_compare),
                equal: Some(pointer_equal),
                as_text: Some(pointer_as_text),
                is_none: Some(|v, _| matches!(v, Value::Pointer(None) | Value::Null)),
                serialize: Some(cannot_serialize),
                deserialize: Some(cannot_deserialize),
            },
        })
    }

    /// A function type descriptor. Functions hash/compare by identity and
    /// refuse serialization.
    pub fn function(signature: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            size: 16,
            align: 8,
            tag: TypeTag::Function { signature: signature.into() },
            metamethods: Metamethods {
                hash: Some(function_hash),
                compare: Some(function_compare),
                equal: Some(function_equal),
                as_text: Some(function_as_text),
                is_none: Some(|v, _| matches!(v, Value::Null)),
                serialize: Some(cannot_serialize),
                deserialize: Some(cannot_deserialize),
            },
        })
    }

    /// The descriptor describing type descriptors themselves.
    pub fn type_info(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            size: 8,
            align: 8,
            tag: TypeTag::TypeInfo { name },
            metamethods: Metamethods {
                as_text: Some(|_, _, ty| match &ty.tag {
                    TypeTag::TypeInfo { name } => Text::from_str(name),
                    _ => unreachable!("TypeInfo descriptor with wrong tag"),
                }),
                ..Metamethods::default()
            },
        })
    }

    /// Short human-readable name for error messages.
    pub fn type_name(&self) -> String {
        match &self.tag {
            TypeTag::Opaque { name } => name.clone(),
            TypeTag::Struct(info) => info.name.clone(),
            TypeTag::Enum(info) => info.name.clone(),
            TypeTag::Pointer { sigil, pointed } => {
                format!("{}{}", sigil, pointed.type_name())
            }
            TypeTag::Text { lang } => {
                lang.clone().unwrap_or_else(|| "Text".into())
            }
            TypeTag::List { item } => format!("[{}]", item.type_name()),
            TypeTag::Table { key, value } => {
                format!("{{{}:{}}}", key.type_name(), value.type_name())
            }
            TypeTag::Function { signature } => signature.clone(),
            TypeTag::Optional { inner } => format!("{}?", inner.type_name()),
            TypeTag::TypeInfo { name } => name.clone(),
        }
    }
}

// ===== Generic dispatch =====

/// Hash a value through its descriptor's metamethod, or the byte-style
/// default.
pub fn generic_hash(obj: &Value, ty: &TypeDescriptor) -> u64 {
    if let Some(hash) = ty.metamethods.hash {
        return hash(obj, ty);
    }
    default_hash(obj)
}

/// Compare two values of the same type. Total order; the default is the
/// structural analogue of a byte comparison.
pub fn generic_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    if let Some(compare) = ty.metamethods.compare {
        return compare(x, y, ty);
    }
    default_compare(x, y)
}

/// Equality check, short-circuiting through the compare default when no
/// dedicated equality metamethod exists.
pub fn generic_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    if let Some(equal) = ty.metamethods.equal {
        return equal(x, y, ty);
    }
    generic_compare(x, y, ty) == Ordering::Equal
}

/// Render a value as Text. Compound types must supply a metamethod; there is
/// no structural default.
pub fn generic_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    match ty.metamethods.as_text {
        Some(as_text) => as_text(obj, colorize, ty),
        None => panic!("No text metamethod provided for type {}", ty.type_name()),
    }
}

// ===== Structural defaults =====

fn default_hash(obj: &Value) -> u64 {
    match obj {
        Value::Null => 0,
        Value::Bool(b) => hashing::siphash(&[*b as u8]),
        Value::Byte(b) => hashing::siphash(&[*b]),
        Value::Int8(x) => hashing::siphash(&x.to_le_bytes()),
        Value::Int16(x) => hashing::siphash(&x.to_le_bytes()),
        Value::Int32(x) => hashing::siphash(&x.to_le_bytes()),
        Value::Int64(x) => hashing::siphash(&x.to_le_bytes()),
        Value::Num(x) => hashing::siphash(&x.to_bits().to_le_bytes()),
        Value::Num32(x) => hashing::siphash(&x.to_bits().to_le_bytes()),
        Value::Pointer(p) => hashing::siphash(
            &(p.as_ref().map(Arc::as_ptr).unwrap_or(std::ptr::null()) as usize)
                .to_le_bytes(),
        ),
        Value::Function(c) => hashing::siphash(&c.identity().to_le_bytes()),
        other => panic!(
            "no default hash for compound value {other:?}; descriptor must supply one"
        ),
    }
}

fn default_compare(x: &Value, y: &Value) -> Ordering {
    match (x, y) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Byte(a), Value::Byte(b)) => a.cmp(b),
        (Value::Int8(a), Value::Int8(b)) => a.cmp(b),
        (Value::Int16(a), Value::Int16(b)) => a.cmp(b),
        (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
        (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
        (Value::Num(a), Value::Num(b)) => a.total_cmp(b),
        (Value::Num32(a), Value::Num32(b)) => a.total_cmp(b),
        (Value::Pointer(a), Value::Pointer(b)) => {
            let pa = a.as_ref().map(Arc::as_ptr).unwrap_or(std::ptr::null()) as usize;
            let pb = b.as_ref().map(Arc::as_ptr).unwrap_or(std::ptr::null()) as usize;
            pa.cmp(&pb)
        }
        (Value::Function(a), Value::Function(b)) => {
            a.identity().cmp(&b.identity())
        }
        (a, b) => panic!(
            "no default comparison for values {a:?} and {b:?}; descriptor must supply one"
        ),
    }
}

// ===== Pointer/function metamethods =====

fn pointer_hash(v: &Value, _ty: &TypeDescriptor) -> u64 {
    default_hash(v)
}

fn pointer_compare(x: &Value, y: &Value, _ty: &TypeDescriptor) -> Ordering {
    default_compare(x, y)
}

fn pointer_equal(x: &Value, y: &Value, _ty: &TypeDescriptor) -> bool {
    default_compare(x, y) == Ordering::Equal
}

fn pointer_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let TypeTag::Pointer { sigil, pointed } = &ty.tag else {
        unreachable!("pointer metamethod on non-pointer descriptor")
    };
    match obj {
        None => Text::from_str(&format!("{}{}", sigil, pointed.type_name())),
        Some(Value::Pointer(Some(inner))) => {
            let inner_text = generic_as_text(Some(inner), colorize, pointed);
            Text::from_str(sigil).concat(&inner_text)
        }
        Some(_) => Text::from_str(&format!("!{}", pointed.type_name())),
    }
}

fn function_hash(v: &Value, _ty: &TypeDescriptor) -> u64 {
    default_hash(v)
}

fn function_compare(x: &Value, y: &Value, _ty: &TypeDescriptor) -> Ordering {
    default_compare(x, y)
}

fn function_equal(x: &Value, y: &Value, _ty: &TypeDescriptor) -> bool {
    default_compare(x, y) == Ordering::Equal
}

fn function_as_text(obj: Option<&Value>, _colorize: bool, ty: &TypeDescriptor) -> Text {
    let TypeTag::Function { signature } = &ty.tag else {
        unreachable!("function metamethod on non-function descriptor")
    };
    match obj {
        Some(Value::Function(c)) => Text::from_str(c.name()),
        _ => Text::from_str(signature),
    }
}

pub(crate) fn cannot_serialize(
    _obj: &Value,
    _out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    Err(RuntimeError::SerializationUnsupported { type_name: ty.type_name() })
}

pub(crate) fn cannot_deserialize(
    _input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    Err(RuntimeError::SerializationUnsupported { type_name: ty.type_name() })
}

// ===== Bool descriptor =====

use once_cell::sync::Lazy;

/// The `Bool` type descriptor.
pub static BOOL: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 1,
        align: 1,
        tag: TypeTag::Opaque { name: "Bool".into() },
        metamethods: Metamethods {
            as_text: Some(bool_as_text),
            serialize: Some(bool_serialize),
            deserialize: Some(bool_deserialize),
            ..Metamethods::default()
        },
    })
});

/// The `Byte` type descriptor.
pub static BYTE: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 1,
        align: 1,
        tag: TypeTag::Opaque { name: "Byte".into() },
        metamethods: Metamethods {
            as_text: Some(byte_as_text),
            serialize: Some(byte_serialize),
            deserialize: Some(byte_deserialize),
            ..Metamethods::default()
        },
    })
});

fn bool_as_text(obj: Option<&Value>, colorize: bool, _ty: &TypeDescriptor) -> Text {
    let body = match obj {
        None => "Bool",
        Some(Value::Bool(true)) => "yes",
        Some(Value::Bool(false)) => "no",
        Some(other) => panic!("expected Bool, got {other:?}"),
    };
    if colorize && obj.is_some() {
        Text::from_str(&format!("\x1b[35m{body}\x1b[m"))
    } else {
        Text::from_str(body)
    }
}

fn bool_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    _ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    match obj {
        Value::Bool(b) => {
            out.push(*b as u8);
            Ok(())
        }
        other => panic!("expected Bool, got {other:?}"),
    }
}

fn bool_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(input.read_u8()? != 0))
}

fn byte_as_text(obj: Option<&Value>, _colorize: bool, _ty: &TypeDescriptor) -> Text {
    match obj {
        None => Text::from_str("Byte"),
        Some(Value::Byte(b)) => Text::from_str(&format!("0x{b:02X}")),
        Some(other) => panic!("expected Byte, got {other:?}"),
    }
}

fn byte_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    _ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    match obj {
        Value::Byte(b) => {
            out.push(*b);
            Ok(())
        }
        other => panic!("expected Byte, got {other:?}"),
    }
}

fn byte_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    Ok(Value::Byte(input.read_u8()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_structural_equality() {
        let a = TypeDescriptor::opaque("Blob", 8, 8);
        let b = TypeDescriptor::opaque("Blob", 8, 8);
        let c = TypeDescriptor::opaque("Other", 8, 8);
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_default_hash_equal_values_agree() {
        let x = Value::Int64(42);
        let y = Value::Int64(42);
        let ty = TypeDescriptor::opaque("Int64", 8, 8);
        assert_eq!(generic_hash(&x, &ty), generic_hash(&y, &ty));
        assert!(generic_equal(&x, &y, &ty));
    }

    #[test]
    fn test_bool_text() {
        assert_eq!(
            generic_as_text(Some(&Value::Bool(true)), false, &BOOL).to_string(),
            "yes"
        );
        assert_eq!(
            generic_as_text(Some(&Value::Bool(false)), false, &BOOL).to_string(),
            "no"
        );
    }

    #[test]
    fn test_pointer_serialization_fails() {
        let ty = TypeDescriptor::pointer_to("@", BOOL.clone());
        let mut out = Vec::new();
        let err = (ty.metamethods.serialize.unwrap())(
            &Value::Pointer(Some(Arc::new(Value::Bool(true)))),
            &mut out,
            &ty,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::SerializationUnsupported { .. }));
    }
}
