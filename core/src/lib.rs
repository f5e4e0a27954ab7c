//! Parser and runtime value library for the Tomo language. The two halves
//! of this crate are:
//!
//! - a hand-written, indentation-sensitive recursive-descent parser that
//!   turns Tomo source text into a spanned AST (including the interpolated
//!   text sublanguage with user-defined quoting), and
//! - the runtime value model: type descriptors with metamethod vtables, and
//!   the concrete compound types they describe (rope texts, copy-on-write
//!   lists, insertion-ordered hash tables with Brent's variation, big
//!   integers with an inline fast path, structs/enums, optionals, paths,
//!   and moments).
//!
//! ```
//! use tomo::parse_expression_str;
//!
//! let ast = parse_expression_str("1 + 2 * x").unwrap();
//! println!("{ast:?}");
//! ```
//!
//! Parsing a file goes through [parse_file], which memoizes results in a
//! bounded process-wide cache.

#![deny(clippy::all)]

pub mod ast;
mod consts;
pub mod error;
mod parse;
pub mod runtime;
pub mod source;

pub use consts::{MAX_TEXT_DEPTH, PARSE_CACHE_SIZE};
pub use parse::{parse_expression_source, parse_file_source, parse_type_source};

use ast::{AstNode, TypeNode};
use error::{ParseError, WithSource};
use once_cell::sync::Lazy;
use rand::Rng;
use source::SourceFile;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

static PARSE_CACHE: Lazy<Mutex<HashMap<String, Arc<AstNode>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Parse a file by path, consulting the process-wide parse cache. A path of
/// the form `<name>text` is treated as an in-memory file named `<name>`.
/// The cache holds at most [PARSE_CACHE_SIZE] entries; when full, a
/// uniformly random entry is evicted.
pub fn parse_file(path: &str) -> Result<Arc<AstNode>, WithSource<ParseError>> {
    if let Some(cached) = PARSE_CACHE.lock().unwrap().get(path) {
        log::debug!("parse cache hit for {path}");
        return Ok(cached.clone());
    }

    let file = if let Some(end) = path.strip_prefix('<').and_then(|_| path.find('>'))
    {
        SourceFile::spoof(&path[..=end], &path[end + 1..])
    } else {
        SourceFile::load(path).map_err(|err| {
            let spoofed = SourceFile::spoof(path, "");
            WithSource::new(
                vec![error::SourceErrorWrapper::new(
                    ParseError::Syntax { message: format!("Couldn't read file: {err}") },
                    source::Span::default(),
                    &spoofed.text,
                )],
                spoofed.text,
            )
        })?
    };

    let ast = Arc::new(parse_file_source(&file)?);

    let mut cache = PARSE_CACHE.lock().unwrap();
    if cache.len() >= PARSE_CACHE_SIZE {
        // Evict a uniformly random entry
        let index = rand::thread_rng().gen_range(0..cache.len());
        if let Some(victim) = cache.keys().nth(index).cloned() {
            log::debug!("parse cache evicting {victim}");
            cache.remove(&victim);
        }
    }
    cache.insert(path.to_string(), ast.clone());
    Ok(ast)
}

/// Parse a standalone expression string.
pub fn parse_expression_str(text: &str) -> Result<AstNode, WithSource<ParseError>> {
    let file = SourceFile::spoof("<expression>", text);
    parse_expression_source(&file)
}

/// Parse a standalone type string.
pub fn parse_type_str(text: &str) -> Result<TypeNode, WithSource<ParseError>> {
    let file = SourceFile::spoof("<type>", text);
    parse_type_source(&file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expression_str() {
        assert!(parse_expression_str("1 + 2").is_ok());
        assert!(parse_expression_str("1 +").is_err());
    }

    #[test]
    fn test_parse_type_str() {
        assert!(parse_type_str("[Int]").is_ok());
        assert!(parse_type_str("{Text:Int}").is_ok());
        assert!(parse_type_str("???").is_err());
    }

    #[test]
    fn test_parse_file_caches_spoofed_files() {
        let first = parse_file("<cache-test>x := 1").unwrap();
        let second = parse_file("<cache-test>x := 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
