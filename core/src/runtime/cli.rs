//! Descriptor-driven command-line argument parsing. A program provides a
//! flag spec per argument; the parser recognizes `--flag`, `--no-flag` (bools
//! only), `--flag=value`, `--flag value`, `-xyz` short clusters, a literal
//! `--` marker, and positional arguments. List-typed flags consume successive
//! non-flag tokens; table-typed flags take `key=value` tokens.

use crate::runtime::int::Int;
use crate::runtime::intx;
use crate::runtime::list::List;
use crate::runtime::num;
use crate::runtime::path::PathValue;
use crate::runtime::table::Table;
use crate::runtime::text::Text;
use crate::runtime::types::{TypeDescriptor, TypeTag, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// One argument in a program's CLI grammar.
#[derive(Clone, Debug)]
pub struct ArgSpec {
    /// Long flag name (and the key in the parsed result)
    pub name: String,
    pub ty: Arc<TypeDescriptor>,
    pub short: Option<char>,
    pub required: bool,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, ty: Arc<TypeDescriptor>) -> Self {
        Self { name: name.into(), ty, short: None, required: false }
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ArgError {
    #[error("Unrecognized argument: {0}")]
    Unrecognized(String),
    #[error("Missing a value for --{0}")]
    MissingValue(String),
    #[error("Missing required argument: --{0}")]
    MissingRequired(String),
    #[error("Couldn't parse {text:?} as a value for --{flag}")]
    BadValue { flag: String, text: String },
    #[error("Table argument --{0} requires key=value entries")]
    BadTableEntry(String),
}

fn is_bool(ty: &TypeDescriptor) -> bool {
    matches!(&ty.tag, TypeTag::Opaque { name } if name == "Bool")
}

/// Parse one token as a value of the given type.
pub fn parse_value(text: &str, ty: &TypeDescriptor) -> Option<Value> {
    match &ty.tag {
        TypeTag::Optional { inner } => parse_value(text, inner),
        TypeTag::Text { .. } => Some(Value::Text(Text::from_str(text))),
        TypeTag::List { item } => {
            // A single-token list value: one element
            Some(Value::List(List::from_vec(vec![parse_value(text, item)?])))
        }
        TypeTag::Opaque { name } => match name.as_str() {
            "Bool" => match text {
                "yes" | "true" | "on" | "1" => Some(Value::Bool(true)),
                "no" | "false" | "off" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            "Int" => Int::from_str(text).map(Value::Int),
            "Int8" => intx::parse::<i8>(text).map(Value::Int8),
            "Int16" => intx::parse::<i16>(text).map(Value::Int16),
            "Int32" => intx::parse::<i32>(text).map(Value::Int32),
            "Int64" => intx::parse::<i64>(text).map(Value::Int64),
            "Num" => num::parse(text).map(Value::Num),
            "Num32" => num::parse(text).map(|n| Value::Num32(n as f32)),
            "Path" => Some(Value::Path(PathValue::from_str(text))),
            _ => None,
        },
        _ => None,
    }
}

fn is_flag_token(token: &str) -> bool {
    token.starts_with('-')
        && matches!(token.chars().nth(1), Some(c) if !c.is_ascii_digit())
}

struct Parser<'a> {
    specs: &'a [ArgSpec],
    result: HashMap<String, Value>,
    positionals: Vec<String>,
}

impl<'a> Parser<'a> {
    fn spec_by_name(&self, name: &str) -> Option<&'a ArgSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn spec_by_short(&self, short: char) -> Option<&'a ArgSpec> {
        self.specs.iter().find(|s| s.short == Some(short))
    }

    fn set(&mut self, spec: &ArgSpec, text: &str) -> Result<(), ArgError> {
        let value = parse_value(text, &spec.ty).ok_or_else(|| {
            ArgError::BadValue { flag: spec.name.clone(), text: text.into() }
        })?;
        self.result.insert(spec.name.clone(), value);
        Ok(())
    }

    /// Consume successive non-flag tokens into a list or table flag.
    fn consume_multi(
        &mut self,
        spec: &ArgSpec,
        args: &[String],
        i: &mut usize,
    ) -> Result<bool, ArgError> {
        match &spec.ty.tag {
            TypeTag::List { item } => {
                let mut items = Vec::new();
                while *i < args.len() && !is_flag_token(&args[*i]) {
                    let value =
                        parse_value(&args[*i], item).ok_or_else(|| {
                            ArgError::BadValue {
                                flag: spec.name.clone(),
                                text: args[*i].clone(),
                            }
                        })?;
                    items.push(value);
                    *i += 1;
                }
                if items.is_empty() {
                    return Err(ArgError::MissingValue(spec.name.clone()));
                }
                self.result
                    .insert(spec.name.clone(), Value::List(List::from_vec(items)));
                Ok(true)
            }
            TypeTag::Table { key, value } => {
                let mut table = Table::new();
                let mut any = false;
                while *i < args.len() && !is_flag_token(&args[*i]) {
                    let token = &args[*i];
                    let (k, v) = token
                        .split_once('=')
                        .ok_or_else(|| ArgError::BadTableEntry(spec.name.clone()))?;
                    let parsed_key = parse_value(k, key).ok_or_else(|| {
                        ArgError::BadValue { flag: spec.name.clone(), text: k.into() }
                    })?;
                    let parsed_value = parse_value(v, value).ok_or_else(|| {
                        ArgError::BadValue { flag: spec.name.clone(), text: v.into() }
                    })?;
                    table
                        .set(parsed_key, parsed_value, &spec.ty)
                        .map_err(|_| ArgError::BadTableEntry(spec.name.clone()))?;
                    any = true;
                    *i += 1;
                }
                if !any {
                    return Err(ArgError::BadTableEntry(spec.name.clone()));
                }
                self.result.insert(spec.name.clone(), Value::Table(table));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Parse command-line tokens against a grammar. Returns the parsed values
/// keyed by spec name; bool flags default to false, everything else must be
/// provided if marked required.
pub fn parse_args(
    specs: &[ArgSpec],
    args: &[String],
) -> Result<HashMap<String, Value>, ArgError> {
    let mut parser =
        Parser { specs, result: HashMap::new(), positionals: Vec::new() };
    let mut i = 0;
    let mut literal_only = false;

    while i < args.len() {
        let arg = &args[i];
        i += 1;

        if literal_only || !is_flag_token(arg) {
            parser.positionals.push(arg.clone());
            continue;
        }
        if arg == "--" {
            literal_only = true;
            continue;
        }

        if let Some(long) = arg.strip_prefix("--") {
            if let Some((name, value)) = long.split_once('=') {
                let spec = parser
                    .spec_by_name(name)
                    .ok_or_else(|| ArgError::Unrecognized(arg.clone()))?;
                parser.set(spec, value)?;
                continue;
            }
            if let Some(spec) = parser.spec_by_name(long) {
                if is_bool(&spec.ty) {
                    parser.result.insert(spec.name.clone(), Value::Bool(true));
                } else if !parser.consume_multi(spec, args, &mut i)? {
                    if i >= args.len() {
                        return Err(ArgError::MissingValue(spec.name.clone()));
                    }
                    parser.set(spec, &args[i])?;
                    i += 1;
                }
                continue;
            }
            if let Some(negated) = long.strip_prefix("no-") {
                if let Some(spec) = parser.spec_by_name(negated) {
                    if is_bool(&spec.ty) {
                        parser.result.insert(spec.name.clone(), Value::Bool(false));
                        continue;
                    }
                }
            }
            return Err(ArgError::Unrecognized(arg.clone()));
        }

        // Short cluster: every char must be a flag; only the last may take
        // a value
        let cluster: Vec<char> = arg[1..].chars().collect();
        for (ci, &c) in cluster.iter().enumerate() {
            let spec = parser
                .spec_by_short(c)
                .ok_or_else(|| ArgError::Unrecognized(format!("-{c}")))?;
            if is_bool(&spec.ty) {
                parser.result.insert(spec.name.clone(), Value::Bool(true));
            } else if ci == cluster.len() - 1 {
                if !parser.consume_multi(spec, args, &mut i)? {
                    if i >= args.len() {
                        return Err(ArgError::MissingValue(spec.name.clone()));
                    }
                    parser.set(spec, &args[i])?;
                    i += 1;
                }
            } else {
                return Err(ArgError::MissingValue(spec.name.clone()));
            }
        }
    }

    // Positionals fill unset non-bool specs in declaration order
    let mut positionals = parser.positionals.clone().into_iter();
    for spec in specs {
        if parser.result.contains_key(&spec.name) || is_bool(&spec.ty) {
            continue;
        }
        if let Some(token) = positionals.next() {
            parser.set(spec, &token)?;
        }
    }
    if let Some(extra) = positionals.next() {
        return Err(ArgError::Unrecognized(extra));
    }

    for spec in specs {
        if parser.result.contains_key(&spec.name) {
            continue;
        }
        if is_bool(&spec.ty) {
            parser.result.insert(spec.name.clone(), Value::Bool(false));
        } else if spec.required {
            return Err(ArgError::MissingRequired(spec.name.clone()));
        }
    }

    Ok(parser.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::int::INT;
    use crate::runtime::list::list_of;
    use crate::runtime::table::table_of;
    use crate::runtime::text::TEXT;
    use crate::runtime::types::BOOL;
    use pretty_assertions::assert_eq;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_long_flags() {
        let specs = [
            ArgSpec::new("verbose", BOOL.clone()),
            ArgSpec::new("count", INT.clone()),
        ];
        let parsed =
            parse_args(&specs, &strings(&["--verbose", "--count=3"])).unwrap();
        assert!(matches!(parsed["verbose"], Value::Bool(true)));
        assert!(matches!(&parsed["count"], Value::Int(i) if i.to_string() == "3"));

        let parsed = parse_args(&specs, &strings(&["--count", "7"])).unwrap();
        assert!(matches!(&parsed["count"], Value::Int(i) if i.to_string() == "7"));
        assert!(matches!(parsed["verbose"], Value::Bool(false)));
    }

    #[test]
    fn test_no_prefix_for_bools() {
        let specs = [ArgSpec::new("color", BOOL.clone())];
        let parsed = parse_args(&specs, &strings(&["--no-color"])).unwrap();
        assert!(matches!(parsed["color"], Value::Bool(false)));
        // --no-flag only applies to bools
        let specs = [ArgSpec::new("count", INT.clone())];
        assert!(parse_args(&specs, &strings(&["--no-count"])).is_err());
    }

    #[test]
    fn test_short_clusters() {
        let specs = [
            ArgSpec::new("all", BOOL.clone()).short('a'),
            ArgSpec::new("long", BOOL.clone()).short('l'),
            ArgSpec::new("out", TEXT.clone()).short('o'),
        ];
        let parsed = parse_args(&specs, &strings(&["-alo", "file.txt"])).unwrap();
        assert!(matches!(parsed["all"], Value::Bool(true)));
        assert!(matches!(parsed["long"], Value::Bool(true)));
        assert!(
            matches!(&parsed["out"], Value::Text(t) if t.to_string() == "file.txt")
        );
    }

    #[test]
    fn test_list_flags_consume_tokens() {
        let specs = [
            ArgSpec::new("files", list_of(TEXT.clone())),
            ArgSpec::new("verbose", BOOL.clone()),
        ];
        let parsed = parse_args(
            &specs,
            &strings(&["--files", "a.txt", "b.txt", "--verbose"]),
        )
        .unwrap();
        match &parsed["files"] {
            Value::List(list) => assert_eq!(list.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
        assert!(matches!(parsed["verbose"], Value::Bool(true)));
    }

    #[test]
    fn test_table_flags_require_key_value() {
        let specs = [ArgSpec::new("env", table_of(TEXT.clone(), TEXT.clone()))];
        let parsed =
            parse_args(&specs, &strings(&["--env", "A=1", "B=2"])).unwrap();
        match &parsed["env"] {
            Value::Table(table) => assert_eq!(table.len(), 2),
            other => panic!("expected table, got {other:?}"),
        }
        assert!(parse_args(&specs, &strings(&["--env", "notkv"])).is_err());
    }

    #[test]
    fn test_double_dash_and_positionals() {
        let specs = [
            ArgSpec::new("input", TEXT.clone()).required(),
            ArgSpec::new("verbose", BOOL.clone()),
        ];
        let parsed = parse_args(&specs, &strings(&["--", "--verbose"])).unwrap();
        assert!(
            matches!(&parsed["input"], Value::Text(t) if t.to_string() == "--verbose"),
            "after -- everything is positional"
        );
        assert!(matches!(parsed["verbose"], Value::Bool(false)));
    }

    #[test]
    fn test_required_and_unrecognized() {
        let specs = [ArgSpec::new("input", TEXT.clone()).required()];
        assert_eq!(
            parse_args(&specs, &[]),
            Err(ArgError::MissingRequired("input".into()))
        );
        assert!(parse_args(&specs, &strings(&["--bogus"])).is_err());
        assert!(parse_args(&specs, &strings(&["a", "b"])).is_err());
    }
}
