//! Term, suffix-chain, and infix expression parsers, plus collection
//! literals and control-flow expressions.

use super::text::{parse_path_literal, parse_text_literal};
use super::toplevel::{parse_args, parse_block, parse_declaration};
use super::{
    advance, end_of_line, get_id, get_indent, match_separator, match_str,
    match_word, no_match, node, parse_type, parser_err, respan, spaces,
    whitespace, ParseResult, PError, RawSpan,
};
use crate::ast::{
    Ast, AstNode, BinOp, CallArg, IntBits, Node, NumBits, WhenClause,
};
use crate::consts::RADIANS_PER_DEGREE;
use crate::source::Span;

/// Run a sub-parser after skipping spaces, treating a recoverable error as
/// "not present" and letting failures propagate.
pub(crate) fn try_parse<'a, T>(
    input: RawSpan<'a>,
    parser: impl FnOnce(RawSpan<'a>) -> ParseResult<'a, T>,
) -> Result<Option<(RawSpan<'a>, T)>, nom::Err<PError<'a>>> {
    let pos = spaces(input);
    match parser(pos) {
        Ok(ok) => Ok(Some(ok)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Like [try_parse], but a missing parse is an unrecoverable error.
pub(crate) fn expect_parse<'a, T>(
    start: RawSpan<'a>,
    input: RawSpan<'a>,
    parser: impl FnOnce(RawSpan<'a>) -> ParseResult<'a, T>,
    message: &str,
) -> ParseResult<'a, T> {
    match try_parse(input, parser)? {
        Some(ok) => Ok(ok),
        None => parser_err(start, end_of_line(&input), message),
    }
}

/// Require a closing delimiter (after optional spaces).
pub(crate) fn expect_closing<'a>(
    input: RawSpan<'a>,
    close: &str,
    message: &str,
) -> ParseResult<'a, ()> {
    let pos = spaces(input);
    match match_str(pos, close) {
        Some(after) => Ok((after, ())),
        None => {
            let eol = end_of_line(&pos);
            let next_close = pos
                .fragment()
                .find(close)
                .map(|i| pos.location_offset() + i)
                .unwrap_or(eol);
            parser_err(pos, eol.min(next_close), message)
        }
    }
}

/// Build a node covering `[start_offset, end)`.
fn node_from(start_offset: usize, end: &RawSpan, ast: Ast) -> AstNode {
    Box::new(Node(
        ast,
        Span::from_offsets(end.extra.file, start_offset, end.location_offset()),
    ))
}

/// Build a node that starts where an existing node starts.
fn extend_node(lhs: &AstNode, end: &RawSpan, ast: Ast) -> AstNode {
    node_from(lhs.1.offset, end, ast)
}

// ===== Literals =====

pub(crate) fn parse_int(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let mut pos = input;
    if let Some(after) = match_str(pos, "-") {
        pos = after;
    }
    if !pos.fragment().starts_with(|c: char| c.is_ascii_digit()) {
        return no_match(input);
    }
    fn digit_run<'a>(pos: RawSpan<'a>, digits: &str) -> RawSpan<'a> {
        let n = pos
            .fragment()
            .bytes()
            .take_while(|&b| digits.as_bytes().contains(&b))
            .count();
        advance(pos, n)
    }
    let after_digits = if let Some(after) = match_str(pos, "0x") {
        digit_run(after, "0123456789abcdefABCDEF_")
    } else if let Some(after) = match_str(pos, "0b") {
        digit_run(after, "01_")
    } else if let Some(after) = match_str(pos, "0o") {
        digit_run(after, "01234567_")
    } else {
        digit_run(pos, "0123456789_")
    };
    let raw = &input.fragment()
        [..after_digits.location_offset() - input.location_offset()];
    let digits: String = raw.chars().filter(|&c| c != '_').collect();
    let mut pos = after_digits;

    // Looks like a float literal; let parse_num have it
    if pos.fragment().starts_with('e') || pos.fragment().starts_with('f') {
        return no_match(input);
    }

    if let Some(after) = match_str(pos, "%") {
        let n = digits.parse::<f64>().unwrap_or(0.0) / 100.0;
        return Ok((after, node(start, &after, Ast::Num { value: n, bits: NumBits::F64 })));
    }
    if let Some(after) = match_str(pos, "deg") {
        let n = digits.parse::<f64>().unwrap_or(0.0) * RADIANS_PER_DEGREE;
        return Ok((after, node(start, &after, Ast::Num { value: n, bits: NumBits::F64 })));
    }

    if let Some(after) = match_str(pos, "_") {
        pos = after;
    }
    let mut bits = IntBits::Unspecified;
    for (suffix, parsed_bits) in [
        ("i64", IntBits::I64),
        ("i32", IntBits::I32),
        ("i16", IntBits::I16),
        ("i8", IntBits::I8),
    ] {
        if let Some(after) = match_str(pos, suffix) {
            bits = parsed_bits;
            pos = after;
            break;
        }
    }

    Ok((pos, node(start, &pos, Ast::Int { digits, bits })))
}

pub(crate) fn parse_num(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let mut pos = input;
    let negative = if let Some(after) = match_str(pos, "-") {
        pos = after;
        true
    } else {
        false
    };
    let frag = pos.fragment();
    let first = frag.chars().next().unwrap_or('\0');
    if !first.is_ascii_digit() && first != '.' {
        return no_match(input);
    }
    if first == '.' && !frag[1..].starts_with(|c: char| c.is_ascii_digit()) {
        return no_match(input);
    }

    let digits = "0123456789_";
    let mut len = frag
        .bytes()
        .take_while(|&b| digits.as_bytes().contains(&b))
        .count();
    if frag[len..].starts_with("..") {
        return no_match(input);
    } else if frag[len..].starts_with('.') {
        len += 1 + frag[len + 1..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
    } else if !frag[len..].starts_with(['e', 'f', '%']) {
        return no_match(input);
    }
    if frag[len..].starts_with('e') {
        len += 1 + frag[len + 1..]
            .bytes()
            .take_while(|&b| b == b'-' || b == b'_' || b.is_ascii_digit())
            .count();
    }
    let cleaned: String =
        frag[..len].chars().filter(|&c| c != '_').collect();
    let mut value = cleaned.parse::<f64>().unwrap_or(f64::NAN);
    pos = advance(pos, len);
    if negative {
        value = -value;
    }

    let mut bits = NumBits::Unspecified;
    if let Some(after) = match_str(pos, "_") {
        pos = after;
    }
    if let Some(after) = match_str(pos, "f64") {
        bits = NumBits::F64;
        pos = after;
    } else if let Some(after) = match_str(pos, "f32") {
        bits = NumBits::F32;
        pos = after;
    }

    if let Some(after) = match_str(pos, "%") {
        value /= 100.0;
        pos = after;
    } else if let Some(after) = match_str(pos, "deg") {
        value *= RADIANS_PER_DEGREE;
        pos = after;
    }

    Ok((pos, node(start, &pos, Ast::Num { value, bits })))
}

fn parse_bool(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    if let Some(after) = match_word(input, "yes") {
        return Ok((after, node(start, &after, Ast::Bool(true))));
    }
    if let Some(after) = match_word(input, "no") {
        return Ok((after, node(start, &after, Ast::Bool(false))));
    }
    no_match(input)
}

pub(crate) fn parse_var(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    match get_id(input) {
        Some((after, name)) => Ok((after, node(start, &after, Ast::Var(name)))),
        None => no_match(input),
    }
}

fn parse_none(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "!") else {
        return no_match(input);
    };
    let Ok((after, ty)) = parse_type(pos) else {
        return no_match(input);
    };
    Ok((after, node(start, &after, Ast::None(ty))))
}

// ===== Prefix operators =====

fn parse_negative(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "-") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let (after, term) =
        expect_parse(start, pos, parse_term, "I expected an expression for this '-'")?;
    Ok((after, node(start, &after, Ast::Negative(term))))
}

fn parse_not(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "not") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let (after, term) =
        expect_parse(start, pos, parse_term, "I expected an expression for this 'not'")?;
    Ok((after, node(start, &after, Ast::Not(term))))
}

/// `@` and `&` bind tighter than any binary operator, but only consume a
/// tight suffix chain (index/call/field) of the following term.
fn parse_pointer_prefix(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let (pos, is_heap) = if let Some(after) = match_str(input, "@") {
        (after, true)
    } else if let Some(after) = match_str(input, "&") {
        (after, false)
    } else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let sigil = if is_heap { "@" } else { "&" };
    let (mut pos, mut term) = expect_parse(
        start,
        pos,
        parse_term_no_suffix,
        &format!("I expected an expression for this '{sigil}'"),
    )?;
    loop {
        if let Some((after, suffixed)) = apply_suffix(pos, &term, parse_index_suffix)? {
            pos = after;
            term = suffixed;
            continue;
        }
        if let Some((after, suffixed)) = apply_suffix(pos, &term, parse_fncall_suffix)? {
            pos = after;
            term = suffixed;
            continue;
        }
        if let Some((after, suffixed)) = apply_suffix(pos, &term, parse_field_suffix)? {
            pos = after;
            term = suffixed;
            continue;
        }
        break;
    }
    let ast = if is_heap {
        Ast::HeapAllocate(term)
    } else {
        Ast::StackReference(term)
    };
    let wrapped = node(start, &pos, ast);
    if let Some((after, optioned)) = apply_suffix(pos, &wrapped, parse_optional_suffix)? {
        return Ok((after, optioned));
    }
    Ok((pos, wrapped))
}

// ===== Parenthesized expressions =====

fn parse_parens(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let pos = spaces(input);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };
    let (pos, _) = whitespace(pos);
    let Some((pos, expr)) = try_parse(pos, parse_extended_expr)? else {
        return no_match(input);
    };
    let (after, ()) = expect_closing(
        pos,
        ")",
        "I wasn't able to parse the rest of this expression",
    )?;
    // The span grows to include the parens
    Ok((after, respan(expr, start, &after)))
}

// ===== Collection literals =====

fn parse_list(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "[") else {
        return no_match(input);
    };
    let (mut pos, _) = whitespace(pos);

    let mut item_type = None;
    if let Some(after) = match_str(pos, ":") {
        let (after_ty, ty) = match parse_type(spaces(after)) {
            Ok(ok) => ok,
            Err(_) => {
                return parser_err(
                    pos,
                    end_of_line(&pos),
                    "I couldn't parse a type for this list",
                )
            }
        };
        item_type = Some(ty);
        let (after_ws, _) = whitespace(after_ty);
        pos = after_ws;
    }

    let mut items = Vec::new();
    loop {
        let Some((mut item_pos, mut item)) = try_parse(pos, parse_extended_expr)? else {
            break;
        };
        while let Some((after, suffixed)) =
            apply_suffix(item_pos, &item, parse_comprehension_suffix)?
        {
            item_pos = after;
            item = suffixed;
        }
        items.push(item);
        pos = item_pos;
        match match_separator(pos) {
            Some(after) => pos = after,
            None => break,
        }
    }
    let (pos, _) = whitespace(pos);
    let (after, ()) =
        expect_closing(pos, "]", "I wasn't able to parse the rest of this list")?;

    if item_type.is_none() && items.is_empty() {
        return parser_err(
            start,
            after.location_offset(),
            "Empty lists must specify what type they would contain (e.g. [:Int])",
        );
    }
    Ok((after, node(start, &after, Ast::List { item_type, items })))
}

fn parse_table(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "{") else {
        return no_match(input);
    };
    let (mut pos, _) = whitespace(pos);

    let mut key_type = None;
    let mut value_type = None;
    if let Some(after) = match_str(pos, ":") {
        let (after_key, kty) = match parse_type(spaces(after)) {
            Ok(ok) => ok,
            Err(_) => {
                return parser_err(
                    pos,
                    end_of_line(&pos),
                    "I couldn't parse a key type for this table",
                )
            }
        };
        let (after_key, _) = whitespace(after_key);
        let Some(after_colon) = match_str(after_key, ":") else {
            // `{:T}` is a set literal, not a table
            return no_match(input);
        };
        let (after_value, vty) = match parse_type(spaces(after_colon)) {
            Ok(ok) => ok,
            Err(_) => {
                return parser_err(
                    after_key,
                    end_of_line(&after_key),
                    "I couldn't parse a value type for this table",
                )
            }
        };
        key_type = Some(kty);
        value_type = Some(vty);
        let (after_ws, _) = whitespace(after_value);
        pos = after_ws;
        if let Some(after) = match_str(pos, ",") {
            pos = after;
        }
    }

    let mut entries = Vec::new();
    loop {
        let entry_start = pos;
        let Some((key_pos, key)) = try_parse(pos, parse_extended_expr)? else {
            break;
        };
        let (key_pos, _) = whitespace(key_pos);
        let Some(after_colon) = match_str(key_pos, ":") else {
            // No colon after the first element: this is a set literal
            return no_match(input);
        };
        let (value_pos, value) = expect_parse(
            after_colon,
            spaces(after_colon),
            parse_expr,
            "I couldn't parse the value for this table entry",
        )?;
        let mut entry =
            node(entry_start, &value_pos, Ast::TableEntry { key, value });
        let mut entry_pos = value_pos;
        while let Some((after, suffixed)) =
            apply_suffix(entry_pos, &entry, parse_comprehension_suffix)?
        {
            entry_pos = after;
            entry = suffixed;
        }
        entries.push(entry);
        pos = entry_pos;
        match match_separator(pos) {
            Some(after) => pos = after,
            None => break,
        }
    }

    if key_type.is_none() && value_type.is_none() && entries.is_empty() {
        return no_match(input);
    }

    let (mut pos, _) = whitespace(pos);

    let mut fallback = None;
    if let Some(after) = match_str(pos, ";") {
        let (mut attr_pos, _) = whitespace(after);
        loop {
            let attr_start = attr_pos;
            let Some(after_word) = match_word(attr_pos, "fallback") else {
                break;
            };
            let (after_word, _) = whitespace(after_word);
            let Some(after_eq) = match_str(after_word, "=") else {
                return parser_err(
                    attr_start,
                    after_word.location_offset(),
                    "I expected an '=' after 'fallback'",
                );
            };
            if fallback.is_some() {
                return parser_err(
                    attr_start,
                    after_eq.location_offset(),
                    "This table already has a fallback",
                );
            }
            let (after_value, value) = expect_parse(
                attr_start,
                spaces(after_eq),
                parse_expr,
                "I expected a fallback table",
            )?;
            fallback = Some(value);
            attr_pos = after_value;
            let (next, _) = whitespace(attr_pos);
            match match_str(next, ";") {
                Some(after) => {
                    let (next, _) = whitespace(after);
                    attr_pos = next;
                }
                None => break,
            }
        }
        pos = attr_pos;
    }

    let (pos, _) = whitespace(pos);
    let (after, ()) =
        expect_closing(pos, "}", "I wasn't able to parse the rest of this table")?;
    Ok((
        after,
        node(start, &after, Ast::Table { key_type, value_type, entries, fallback }),
    ))
}

fn parse_set(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "{") else {
        return no_match(input);
    };
    let (mut pos, _) = whitespace(pos);

    let mut item_type = None;
    if let Some(after) = match_str(pos, ":") {
        let (after_ty, ty) = match parse_type(spaces(after)) {
            Ok(ok) => ok,
            Err(_) => {
                return parser_err(
                    pos,
                    end_of_line(&pos),
                    "I couldn't parse an item type for this set",
                )
            }
        };
        let (after_ty, _) = whitespace(after_ty);
        if match_str(after_ty, ":").is_some() {
            return no_match(input);
        }
        item_type = Some(ty);
        pos = after_ty;
    }

    let mut items = Vec::new();
    loop {
        let Some((mut item_pos, mut item)) = try_parse(pos, parse_extended_expr)? else {
            break;
        };
        let (checked, _) = whitespace(item_pos);
        if match_str(checked, ":").is_some() {
            return no_match(input);
        }
        while let Some((after, suffixed)) =
            apply_suffix(item_pos, &item, parse_comprehension_suffix)?
        {
            item_pos = after;
            item = suffixed;
        }
        items.push(item);
        pos = item_pos;
        match match_separator(pos) {
            Some(after) => pos = after,
            None => break,
        }
    }

    if item_type.is_none() && items.is_empty() {
        return no_match(input);
    }

    let (pos, _) = whitespace(pos);
    let (after, ()) =
        expect_closing(pos, "}", "I wasn't able to parse the rest of this set")?;
    Ok((after, node(start, &after, Ast::Set { item_type, items })))
}

// ===== Reductions =====

fn empty_var(at: RawSpan, name: &str) -> AstNode {
    Box::new(Node(
        Ast::Var(name.into()),
        Span::from_offsets(at.extra.file, at.location_offset(), at.location_offset()),
    ))
}

fn parse_reduction(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "(") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let combo_start = pos;
    let Some((mut pos, op)) = match_binary_operator(pos) else {
        return no_match(input);
    };

    let lhs = empty_var(pos, "$reduction");
    let rhs = empty_var(pos, "$iter_value");
    let combination = if matches!(op, BinOp::Min | BinOp::Max) {
        let (key, after_key) = parse_dollar_key(pos)?;
        pos = after_key;
        let ast = if op == BinOp::Min {
            Ast::Min { lhs, rhs, key }
        } else {
            Ast::Max { lhs, rhs, key }
        };
        node(combo_start, &pos, ast)
    } else {
        node(combo_start, &pos, Ast::BinaryOp { op, lhs, rhs })
    };

    let pos = spaces(pos);
    let Some(pos) = match_str(pos, ")") else {
        return no_match(input);
    };

    let Some((mut iter_pos, mut iter)) = try_parse(pos, parse_extended_expr)? else {
        return no_match(input);
    };
    while let Some((after, suffixed)) =
        apply_suffix(iter_pos, &iter, parse_comprehension_suffix)?
    {
        iter_pos = after;
        iter = suffixed;
    }

    let mut fallback = None;
    let mut pos = iter_pos;
    if let Some(after_else) = match_word(pos, "else") {
        let Some(after_colon) = match_str(spaces(after_else), ":") else {
            return parser_err(pos, end_of_line(&pos), "I expected a ':' here");
        };
        let (after_value, value) = expect_parse(
            after_else,
            spaces(after_colon),
            parse_expr,
            "I couldn't parse the expression after this 'else'",
        )?;
        fallback = Some(value);
        pos = after_value;
    }

    Ok((
        pos,
        node(start, &pos, Ast::Reduction { combination, iter, fallback }),
    ))
}

/// The optional key of a `_min_`/`_max_` operator: a suffix chain hung off
/// the implicit `$` variable. A bare `$` means no key.
fn parse_dollar_key<'a>(
    pos: RawSpan<'a>,
) -> Result<(Option<AstNode>, RawSpan<'a>), nom::Err<PError<'a>>> {
    let mut key = empty_var(pos, "$");
    let mut key_pos = pos;
    let mut progressed = false;
    loop {
        let mut any = false;
        for suffix in [
            parse_index_suffix,
            parse_field_suffix,
            parse_method_call_suffix,
            parse_fncall_suffix,
            parse_optional_suffix,
        ] {
            if let Some((after, suffixed)) = apply_suffix(key_pos, &key, suffix)? {
                key_pos = after;
                key = suffixed;
                any = true;
                progressed = true;
                break;
            }
        }
        if !any {
            break;
        }
    }
    if progressed {
        Ok((Some(key), key_pos))
    } else {
        Ok((None, pos))
    }
}

// ===== Suffixes =====

type SuffixParser =
    for<'a> fn(RawSpan<'a>, &AstNode) -> ParseResult<'a, AstNode>;

/// Apply one suffix parser at the current position; recoverable errors mean
/// "no such suffix here".
fn apply_suffix<'a>(
    pos: RawSpan<'a>,
    lhs: &AstNode,
    suffix: SuffixParser,
) -> Result<Option<(RawSpan<'a>, AstNode)>, nom::Err<PError<'a>>> {
    match suffix(pos, lhs) {
        Ok(ok) => Ok(Some(ok)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn parse_index_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    let Some(pos) = match_str(input, "[") else {
        return no_match(input);
    };
    let (pos, _) = whitespace(pos);
    let (pos, index) = match try_parse(pos, parse_extended_expr)? {
        Some((after, index)) => (after, Some(index)),
        None => (pos, None),
    };
    let (pos, _) = whitespace(pos);
    let (pos, unchecked) = match match_str(pos, ";") {
        Some(after) => match match_word(after, "unchecked") {
            Some(after) => (after, true),
            None => (after, false),
        },
        None => (pos, false),
    };
    let (after, ()) =
        expect_closing(pos, "]", "I wasn't able to parse the rest of this index")?;
    Ok((
        after,
        extend_node(lhs, &after, Ast::Index { indexed: lhs.clone(), index, unchecked }),
    ))
}

fn parse_field_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    let (pos, _) = whitespace(input);
    let Some(pos) = match_str(pos, ".") else {
        return no_match(input);
    };
    // ".." is a range/continuation, not a field access
    if pos.fragment().starts_with('.') {
        return no_match(input);
    }
    let (pos, _) = whitespace(pos);
    let (pos, dollar) = match match_str(pos, "$") {
        Some(after) => (after, true),
        None => (pos, false),
    };
    let Some((after, field)) = get_id(pos) else {
        return no_match(input);
    };
    let field = if dollar { format!("${field}") } else { field };
    Ok((
        after,
        extend_node(lhs, &after, Ast::FieldAccess { fielded: lhs.clone(), field }),
    ))
}

fn parse_optional_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    let Some(after) = match_str(input, "?") else {
        return no_match(input);
    };
    Ok((after, extend_node(lhs, &after, Ast::Optional(lhs.clone()))))
}

/// Parse call arguments up to (but not including) the closing paren.
fn parse_call_args(input: RawSpan) -> ParseResult<Vec<CallArg>> {
    let mut args = Vec::new();
    let (mut pos, _) = whitespace(input);
    loop {
        let arg_start = pos;
        let mut name = None;
        if let Some((after_name, id)) = get_id(pos) {
            let (after_name, _) = whitespace(after_name);
            if !after_name.fragment().starts_with("==") {
                if let Some(after_eq) = match_str(after_name, "=") {
                    name = Some(id);
                    pos = after_eq;
                }
            }
        }
        match try_parse(pos, parse_expr)? {
            Some((after, value)) => {
                args.push(CallArg { name, value });
                pos = after;
            }
            None => {
                if name.is_some() {
                    return parser_err(
                        arg_start,
                        end_of_line(&arg_start),
                        "I expected an argument here",
                    );
                }
                pos = arg_start;
                break;
            }
        }
        match match_separator(pos) {
            Some(after) => pos = after,
            None => break,
        }
    }
    let (pos, _) = whitespace(pos);
    Ok((pos, args))
}

pub(crate) fn parse_fncall_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    // No space is allowed between a function and its argument list
    let Some(pos) = match_str(input, "(") else {
        return no_match(input);
    };
    let (pos, args) = parse_call_args(pos)?;
    let Some(after) = match_str(pos, ")") else {
        return parser_err(
            input,
            pos.location_offset(),
            "This parenthesis is unclosed",
        );
    };
    Ok((
        after,
        extend_node(lhs, &after, Ast::FunctionCall { func: lhs.clone(), args }),
    ))
}

pub(crate) fn parse_method_call_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    let pos = spaces(input);
    let Some(pos) = match_str(pos, ":") else {
        return no_match(input);
    };
    let Some((pos, name)) = get_id(pos) else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };
    let (pos, args) = parse_call_args(pos)?;
    let Some(after) = match_str(pos, ")") else {
        return parser_err(
            input,
            pos.location_offset(),
            "This parenthesis is unclosed",
        );
    };
    Ok((
        after,
        extend_node(
            lhs,
            &after,
            Ast::MethodCall { target: lhs.clone(), name, args },
        ),
    ))
}

pub(crate) fn parse_comprehension_suffix<'a>(
    input: RawSpan<'a>,
    lhs: &AstNode,
) -> ParseResult<'a, AstNode> {
    let (pos, _) = whitespace(input);
    let Some(mut pos) = match_word(pos, "for") else {
        return no_match(input);
    };
    let mut vars = Vec::new();
    loop {
        if let Some((after, var)) = try_parse(pos, parse_var)? {
            vars.push(var);
            pos = after;
        }
        let trimmed = spaces(pos);
        match match_str(trimmed, ",") {
            Some(after) => pos = after,
            None => break,
        }
    }
    let Some(pos) = match_word(pos, "in") else {
        return parser_err(input, end_of_line(&pos), "I expected an 'in' for this 'for'");
    };
    let (pos, iter) = expect_parse(
        input,
        pos,
        parse_expr,
        "I expected an iterable value for this 'for'",
    )?;
    let (mut pos, mut filter) = (pos, None);
    let (peeked, _) = whitespace(pos);
    if let Some(after_if) = match_word(peeked, "if") {
        let (after, condition) = expect_parse(
            peeked,
            after_if,
            parse_expr,
            "I expected a condition for this 'if'",
        )?;
        filter = Some(condition);
        pos = after;
    }
    Ok((
        pos,
        extend_node(
            lhs,
            &pos,
            Ast::Comprehension { expr: lhs.clone(), vars, iter, filter },
        ),
    ))
}

/// `<statement> if <condition>`: wraps a statement in a conditional.
pub(crate) fn parse_optional_conditional_suffix<'a>(
    input: RawSpan<'a>,
    stmt: &AstNode,
) -> ParseResult<'a, AstNode> {
    let Some(pos) = match_word(input, "if") else {
        return no_match(input);
    };
    let (pos, condition) = expect_parse(
        input,
        pos,
        parse_expr,
        "I expected a condition for this 'if'",
    )?;
    Ok((
        pos,
        extend_node(
            stmt,
            &pos,
            Ast::If { condition, body: stmt.clone(), else_body: None },
        ),
    ))
}

// ===== Terms =====

pub(crate) fn parse_term_no_suffix(input: RawSpan) -> ParseResult<AstNode> {
    let pos = spaces(input);
    for parser in [
        parse_none,
        parse_num,
        parse_int,
        parse_negative,
        parse_pointer_prefix,
        parse_bool,
        parse_text_literal,
        parse_path_literal,
        parse_lambda,
        parse_parens,
        parse_table,
        parse_set,
        parse_var,
        parse_list,
        parse_reduction,
        parse_pass,
        parse_defer,
        parse_skip,
        parse_stop,
        parse_return,
        parse_not,
        super::toplevel::parse_extern,
        super::toplevel::parse_inline_c,
    ] {
        match parser(pos) {
            Ok(ok) => return Ok(ok),
            Err(nom::Err::Error(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    no_match(input)
}

pub(crate) fn parse_term(input: RawSpan) -> ParseResult<AstNode> {
    let (mut pos, mut term) = parse_term_no_suffix(input)?;
    loop {
        let mut any = false;
        for suffix in [
            parse_index_suffix,
            parse_field_suffix,
            parse_method_call_suffix,
            parse_fncall_suffix,
            parse_optional_suffix,
        ] {
            if let Some((after, suffixed)) = apply_suffix(pos, &term, suffix)? {
                pos = after;
                term = suffixed;
                any = true;
                break;
            }
        }
        if !any {
            break;
        }
    }
    Ok((pos, term))
}

// ===== Infix expressions =====

fn match_binary_operator(input: RawSpan) -> Option<(RawSpan, BinOp)> {
    let frag = input.fragment();
    let mut chars = frag.chars();
    match chars.next()? {
        '+' => {
            if frag.starts_with("++") {
                Some((advance(input, 2), BinOp::Concat))
            } else {
                Some((advance(input, 1), BinOp::Plus))
            }
        }
        '-' => {
            // `fn -5` is a negative literal argument, not a subtraction
            let offset = input.location_offset();
            let before = input.extra.file.text.as_bytes().get(offset.wrapping_sub(1));
            let after = frag.as_bytes().get(1);
            if after != Some(&b' ') && before == Some(&b' ') {
                return None;
            }
            Some((advance(input, 1), BinOp::Minus))
        }
        '*' => Some((advance(input, 1), BinOp::Multiply)),
        '/' => Some((advance(input, 1), BinOp::Divide)),
        '^' => Some((advance(input, 1), BinOp::Power)),
        '<' => {
            if frag.starts_with("<=") {
                Some((advance(input, 2), BinOp::Le))
            } else if frag.starts_with("<>") {
                Some((advance(input, 2), BinOp::Cmp))
            } else if frag.starts_with("<<") {
                Some((advance(input, 2), BinOp::LeftShift))
            } else {
                Some((advance(input, 1), BinOp::Lt))
            }
        }
        '>' => {
            if frag.starts_with(">=") {
                Some((advance(input, 2), BinOp::Ge))
            } else if frag.starts_with(">>") {
                Some((advance(input, 2), BinOp::RightShift))
            } else {
                Some((advance(input, 1), BinOp::Gt))
            }
        }
        _ => {
            if frag.starts_with("!=") {
                Some((advance(input, 2), BinOp::Ne))
            } else if frag.starts_with("==") && !frag.starts_with("===") {
                Some((advance(input, 2), BinOp::Eq))
            } else if let Some(after) = match_word(input, "and") {
                Some((after, BinOp::And))
            } else if let Some(after) = match_word(input, "or") {
                Some((after, BinOp::Or))
            } else if let Some(after) = match_word(input, "xor") {
                Some((after, BinOp::Xor))
            } else if let Some(after) = match_word(input, "mod1") {
                Some((after, BinOp::Mod1))
            } else if let Some(after) = match_word(input, "mod") {
                Some((after, BinOp::Mod))
            } else if let Some(after) = match_word(input, "_min_") {
                Some((after, BinOp::Min))
            } else if let Some(after) = match_word(input, "_max_") {
                Some((after, BinOp::Max))
            } else {
                None
            }
        }
    }
}

/// Pratt-style precedence climbing: parse a term, then greedily take
/// operators that bind at least as tightly as `min_tightness`, recursing for
/// the right-hand side at one level tighter.
fn parse_infix_expr(input: RawSpan, min_tightness: u8) -> ParseResult<AstNode> {
    let Some((mut pos, mut lhs)) = try_parse(input, parse_term)? else {
        return no_match(input);
    };
    loop {
        let trimmed = spaces(pos);
        let Some((after_op, op)) = match_binary_operator(trimmed) else {
            break;
        };
        if op.tightness() < min_tightness {
            break;
        }

        let (key, after_key) = if matches!(op, BinOp::Min | BinOp::Max) {
            parse_dollar_key(after_op)?
        } else {
            (None, after_op)
        };

        let rhs_start = spaces(after_key);
        let Some((after_rhs, rhs)) =
            try_parse(rhs_start, |i| parse_infix_expr(i, op.tightness() + 1))?
        else {
            break;
        };

        let start_offset = lhs.1.offset;
        match op {
            BinOp::Min => {
                let combined =
                    node_from(start_offset, &after_rhs, Ast::Min { lhs, rhs, key });
                return Ok((after_rhs, combined));
            }
            BinOp::Max => {
                let combined =
                    node_from(start_offset, &after_rhs, Ast::Max { lhs, rhs, key });
                return Ok((after_rhs, combined));
            }
            _ => {
                lhs = node_from(
                    start_offset,
                    &after_rhs,
                    Ast::BinaryOp { op, lhs, rhs },
                );
                pos = after_rhs;
            }
        }
    }
    Ok((pos, lhs))
}

pub(crate) fn parse_expr(input: RawSpan) -> ParseResult<AstNode> {
    parse_infix_expr(input, 0)
}

// ===== Control flow =====

fn parse_if(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let starting_indent = get_indent(&input)?;
    let Some(pos) = match_word(input, "if") else {
        return no_match(input);
    };
    let (pos, condition) = match try_parse(pos, parse_declaration)? {
        Some(ok) => ok,
        None => expect_parse(
            start,
            pos,
            parse_expr,
            "I expected to find a condition for this 'if'",
        )?,
    };
    let (pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "I expected a body for this 'if' statement",
    )?;

    let (peeked, _) = whitespace(pos);
    let mut else_body = None;
    let mut end = pos;
    if get_indent(&peeked)? == starting_indent {
        if let Some(after_else) = match_word(peeked, "else") {
            let else_start = peeked;
            match try_parse(after_else, parse_if)? {
                Some((after, nested)) => {
                    else_body = Some(nested);
                    end = after;
                }
                None => {
                    let (after, block) = expect_parse(
                        else_start,
                        after_else,
                        parse_block,
                        "I expected a body for this 'else'",
                    )?;
                    else_body = Some(block);
                    end = after;
                }
            }
        }
    }
    Ok((end, node(start, &end, Ast::If { condition, body, else_body })))
}

fn parse_when(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let starting_indent = get_indent(&input)?;
    let Some(pos) = match_word(input, "when") else {
        return no_match(input);
    };
    let (pos, subject) = match try_parse(pos, parse_declaration)? {
        Some(ok) => ok,
        None => expect_parse(
            start,
            pos,
            parse_expr,
            "I expected to find an expression for this 'when'",
        )?,
    };

    let mut clauses = Vec::new();
    let mut pos = pos;
    loop {
        let (peeked, _) = whitespace(pos);
        if get_indent(&peeked)? != starting_indent {
            break;
        }
        let Some(clause_pos) = match_word(peeked, "is") else {
            break;
        };
        let clause_pos = spaces(clause_pos);
        let (mut clause_pos, tag_name, mut args) =
            if let Some(after_at) = match_str(clause_pos, "@") {
                let tag = node(clause_pos, &after_at, Ast::Var("@".into()));
                let after_at = spaces(after_at);
                match try_parse(after_at, parse_var)? {
                    Some((after, var)) => (after, tag, vec![var]),
                    None => (after_at, tag, Vec::new()),
                }
            } else {
                let (after, tag) = expect_parse(
                    start,
                    clause_pos,
                    parse_var,
                    "I expected a tag name here",
                )?;
                (spaces(after), tag, Vec::new())
            };
        if let Some(mut arg_pos) = match_str(clause_pos, "(") {
            loop {
                let (next, _) = whitespace(arg_pos);
                let Some((after, var)) = try_parse(next, parse_var)? else {
                    arg_pos = next;
                    break;
                };
                args.push(var);
                let (next, _) = whitespace(after);
                match match_str(next, ",") {
                    Some(after_comma) => arg_pos = after_comma,
                    None => {
                        arg_pos = next;
                        break;
                    }
                }
            }
            let (after, ()) = expect_closing(
                arg_pos,
                ")",
                "I was expecting a ')' to finish this pattern's arguments",
            )?;
            clause_pos = after;
        }
        let checked = spaces(clause_pos);
        if !checked.fragment().starts_with(':') {
            return parser_err(
                checked,
                checked.location_offset(),
                "I expected a colon ':' after this clause",
            );
        }
        let (after_body, body) = expect_parse(
            start,
            clause_pos,
            parse_block,
            "I expected a body for this 'when' clause",
        )?;
        clauses.push(WhenClause { tag_name, args, body });
        pos = after_body;
    }

    let mut else_body = None;
    let (peeked, _) = whitespace(pos);
    if get_indent(&peeked)? == starting_indent {
        if let Some(after_else) = match_word(peeked, "else") {
            let (after, block) = expect_parse(
                peeked,
                after_else,
                parse_block,
                "I expected a body for this 'else'",
            )?;
            else_body = Some(block);
            pos = after;
        }
    }

    Ok((pos, node(start, &pos, Ast::When { subject, clauses, else_body })))
}

fn parse_for(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "for") else {
        return no_match(input);
    };
    let starting_indent = get_indent(&pos)?;
    let mut pos = spaces(pos);
    let mut vars = Vec::new();
    loop {
        if let Some((after, var)) = try_parse(pos, parse_var)? {
            vars.push(var);
            pos = after;
        }
        let trimmed = spaces(pos);
        match match_str(trimmed, ",") {
            Some(after) => pos = after,
            None => break,
        }
    }
    let Some(pos) = match_word(pos, "in") else {
        return parser_err(start, end_of_line(&pos), "I expected an 'in' for this 'for'");
    };
    let (pos, iter) = expect_parse(
        start,
        pos,
        parse_expr,
        "I expected an iterable value for this 'for'",
    )?;
    let (mut pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "I expected a body for this 'for'",
    )?;

    let mut empty = None;
    let (peeked, _) = whitespace(pos);
    if let Some(after_else) = match_word(peeked, "else") {
        if get_indent(&peeked)? == starting_indent {
            let (after, block) = expect_parse(
                peeked,
                after_else,
                parse_block,
                "I expected a body for this 'else'",
            )?;
            empty = Some(block);
            pos = after;
        }
    }
    Ok((pos, node(start, &pos, Ast::For { vars, iter, body, empty })))
}

fn parse_while(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "while") else {
        return no_match(input);
    };

    // Shorthand: `while when ...` loops until no clause matches
    if match_word(pos, "when").is_some() {
        let (after, when) = expect_parse(
            start,
            pos,
            parse_when,
            "I expected a 'when' block after this",
        )?;
        let when = match *when {
            Node(Ast::When { subject, clauses, else_body }, span) => {
                let else_body = else_body.or_else(|| {
                    Some(Box::new(Node(
                        Ast::Stop { target: None },
                        Span { offset: span.offset + span.length, ..span },
                    )))
                });
                Box::new(Node(Ast::When { subject, clauses, else_body }, span))
            }
            other => Box::new(other),
        };
        return Ok((
            after,
            node(start, &after, Ast::While { condition: None, body: when }),
        ));
    }

    let (pos, condition) = expect_parse(
        start,
        pos,
        parse_expr,
        "I don't see a viable condition for this 'while'",
    )?;
    let (pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "I expected a body for this 'while'",
    )?;
    Ok((
        pos,
        node(start, &pos, Ast::While { condition: Some(condition), body }),
    ))
}

fn parse_do(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "do") else {
        return no_match(input);
    };
    let (pos, body) =
        expect_parse(start, pos, parse_block, "I expected a body for this 'do'")?;
    // A do-block is just a block with its own scope
    Ok((pos, respan(body, start, &pos)))
}

fn parse_repeat(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "repeat") else {
        return no_match(input);
    };
    let (pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "I expected a body for this 'repeat'",
    )?;
    Ok((pos, node(start, &pos, Ast::Repeat { body })))
}

fn parse_defer(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "defer") else {
        return no_match(input);
    };
    let (pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "I expected a block to be deferred here",
    )?;
    Ok((pos, node(start, &pos, Ast::Defer { body })))
}

fn parse_pass(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    match match_word(input, "pass") {
        Some(after) => Ok((after, node(start, &after, Ast::Pass))),
        None => no_match(input),
    }
}

fn loop_target(input: RawSpan) -> (RawSpan, Option<String>) {
    if let Some(after) = match_word(input, "for") {
        return (after, Some("for".into()));
    }
    if let Some(after) = match_word(input, "while") {
        return (after, Some("while".into()));
    }
    match get_id(input) {
        Some((after, id)) => (after, Some(id)),
        None => (input, None),
    }
}

fn parse_skip(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "skip") else {
        return no_match(input);
    };
    let (pos, target) = loop_target(pos);
    let skip = node(start, &pos, Ast::Skip { target });
    match apply_suffix(pos, &skip, parse_optional_conditional_suffix)? {
        Some((after, conditional)) => Ok((after, conditional)),
        None => Ok((pos, skip)),
    }
}

fn parse_stop(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "stop") else {
        return no_match(input);
    };
    let (pos, target) = loop_target(pos);
    let stop = node(start, &pos, Ast::Stop { target });
    match apply_suffix(pos, &stop, parse_optional_conditional_suffix)? {
        Some((after, conditional)) => Ok((after, conditional)),
        None => Ok((pos, stop)),
    }
}

fn parse_return(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "return") else {
        return no_match(input);
    };
    let (pos, value) = match try_parse(pos, parse_expr)? {
        Some((after, value)) => (after, Some(value)),
        None => (pos, None),
    };
    let ret = node(start, &pos, Ast::Return { value });
    match apply_suffix(pos, &ret, parse_optional_conditional_suffix)? {
        Some((after, conditional)) => Ok((after, conditional)),
        None => Ok((pos, ret)),
    }
}

pub(crate) fn parse_lambda(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "func") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };
    let (pos, args) = parse_args(pos, false)?;
    let pos = spaces(pos);
    let (pos, ()) = expect_closing(
        pos,
        ")",
        "I was expecting a ')' to finish this anonymous function's arguments",
    )?;
    let (pos, body) = match try_parse(pos, parse_block)? {
        Some(ok) => ok,
        None => (pos, node(pos, &pos, Ast::Block(Vec::new()))),
    };
    let id = input.extra.lambda_id.get();
    input.extra.lambda_id.set(id + 1);
    Ok((pos, node(start, &pos, Ast::Lambda { id, args, body })))
}

/// An expression, possibly one of the block forms (`if`, `when`, `for`,
/// `while`, `repeat`, `do`).
pub(crate) fn parse_extended_expr(input: RawSpan) -> ParseResult<AstNode> {
    for parser in
        [parse_for, parse_while, parse_if, parse_when, parse_repeat, parse_do]
    {
        match try_parse(input, parser)? {
            Some(ok) => return Ok(ok),
            None => continue,
        }
    }
    parse_expr(input)
}
