//! The text-literal sublanguage: quoted strings with user-definable quote
//! pairs and interpolation characters, standalone backslash escapes, the
//! multi-line indentation policy, and path literals.

use super::expr::{expect_closing, expect_parse};
use super::{
    advance, end_of_line, get_id, get_indent, match_str, newline_with_indentation,
    no_match, node, parser_err, ParseResult, RawSpan,
};
use crate::ast::{Ast, AstNode};

const INTERP_CHARS: &str = "~!@#$%^&*+=\\?";
const QUOTE_CHARS: &str = "\"'`|/;([{<";

/// The closing delimiter that matches an opening quote character.
fn closing_quote(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        other => other,
    }
}

/// Decode one backslash escape sequence, returning the decoded string and
/// the position after it.
fn unescape(input: RawSpan) -> ParseResult<String> {
    debug_assert!(input.fragment().starts_with('\\'));
    let rest = &input.fragment()[1..];
    let simple = |n: usize, s: &str| -> ParseResult<String> {
        Ok((advance(input, 1 + n), s.to_string()))
    };
    match rest.chars().next() {
        Some('a') => simple(1, "\x07"),
        Some('b') => simple(1, "\x08"),
        Some('e') => simple(1, "\x1b"),
        Some('f') => simple(1, "\x0c"),
        Some('n') => simple(1, "\n"),
        Some('r') => simple(1, "\r"),
        Some('t') => simple(1, "\t"),
        Some('v') => simple(1, "\x0b"),
        Some('_') => simple(1, " "),
        Some('U') if rest[1..].starts_with('[') => {
            // \U[CODEPOINT NAME]
            let name_start = 2;
            let len = rest[name_start..]
                .find(['\r', '\n', ']'])
                .unwrap_or(rest.len() - name_start);
            if !rest[name_start + len..].starts_with(']') {
                return parser_err(
                    input,
                    input.location_offset() + 1 + name_start + len,
                    "Missing closing ']'",
                );
            }
            let name = &rest[name_start..name_start + len];
            match unicode_names2::character(name) {
                Some(ch) => {
                    Ok((advance(input, 1 + name_start + len + 1), ch.to_string()))
                }
                None => parser_err(
                    input,
                    input.location_offset() + 2 + name_start + len,
                    format!("Invalid unicode codepoint name: {name:?}"),
                ),
            }
        }
        Some('U') => {
            let hex_len = rest[1..]
                .bytes()
                .take_while(|b| b.is_ascii_hexdigit())
                .count();
            let code = u32::from_str_radix(&rest[1..1 + hex_len], 16).ok();
            match code.and_then(char::from_u32) {
                Some(ch) => Ok((advance(input, 2 + hex_len), ch.to_string())),
                None => parser_err(
                    input,
                    input.location_offset() + 2 + hex_len,
                    "Invalid unicode codepoint",
                ),
            }
        }
        Some('x')
            if rest.len() >= 3
                && rest.as_bytes()[1].is_ascii_hexdigit()
                && rest.as_bytes()[2].is_ascii_hexdigit() =>
        {
            let byte = u8::from_str_radix(&rest[1..3], 16)
                .expect("two hex digits");
            Ok((advance(input, 4), (byte as char).to_string()))
        }
        Some(c)
            if ('0'..='7').contains(&c)
                && rest.len() >= 3
                && rest.as_bytes()[..3].iter().all(|b| (b'0'..=b'7').contains(b)) =>
        {
            let value = u32::from_str_radix(&rest[..3], 8).unwrap_or(0);
            let ch = char::from_u32(value).unwrap_or('\u{FFFD}');
            Ok((advance(input, 4), ch.to_string()))
        }
        Some(c) => {
            // Any other escaped character is itself, verbatim
            Ok((advance(input, 1 + c.len_utf8()), c.to_string()))
        }
        None => parser_err(
            input,
            input.location_offset() + 1,
            "Missing escape sequence after backslash",
        ),
    }
}

/// Parse a text literal: a run of standalone escapes, or a (possibly
/// custom-quoted, possibly multi-line) interpolated string.
pub(crate) fn parse_text_literal(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;

    // A run of escape sequences is its own literal, e.g. `\n\t`
    if input.fragment().starts_with('\\') {
        let mut pos = input;
        let mut decoded = String::new();
        while pos.fragment().starts_with('\\') {
            let (after, piece) = unescape(pos)?;
            decoded.push_str(&piece);
            pos = after;
        }
        return Ok((pos, node(start, &pos, Ast::TextLiteral(decoded))));
    }

    let (mut pos, open_quote, close_quote, open_interp, lang) =
        if let Some(after) = match_str(input, "\"") {
            (after, '"', '"', Some('$'), None)
        } else if let Some(after) = match_str(input, "`") {
            (after, '`', '`', Some('$'), None)
        } else if let Some(after) = match_str(input, "'") {
            (after, '\'', '\'', None, None)
        } else if let Some(after) = match_str(input, "$") {
            let mut lang: Option<String> = None;
            let mut cursor = after;
            if let Some((after_id, id)) = get_id(cursor) {
                lang = Some(id);
                cursor = after_id;
            }
            let mut interp = Some('$');
            if let Some(after_dollar) = match_str(cursor, "$") {
                // `$$` disables interpolation
                interp = None;
                cursor = after_dollar;
            } else {
                let next = cursor.fragment().chars().next().unwrap_or('\0');
                if INTERP_CHARS.contains(next) {
                    interp = Some(next);
                    cursor = advance(cursor, next.len_utf8());
                } else if next == '(' {
                    // Shell command interpolation uses `@`
                    interp = Some('@');
                }
            }
            let quote = cursor.fragment().chars().next().unwrap_or('\0');
            if !QUOTE_CHARS.contains(quote) {
                return parser_err(
                    cursor,
                    cursor.location_offset() + quote.len_utf8().max(1),
                    "This is not a valid string quotation character. Valid characters are: \"'`|/;([{<",
                );
            }
            cursor = advance(cursor, quote.len_utf8());
            if lang.is_none() && quote == '/' {
                lang = Some("Pattern".into());
            } else if lang.is_none() && quote == '(' {
                lang = Some("Shell".into());
            }
            (cursor, quote, closing_quote(quote), interp, lang)
        } else {
            return no_match(input);
        };

    let starting_indent = get_indent(&pos)?;
    let string_indent = starting_indent + 1;
    let nesting_quotes = close_quote != open_quote;

    let mut children: Vec<AstNode> = Vec::new();
    let mut chunk = String::new();
    let mut chunk_start = pos;
    let mut depth = 1;
    let mut leading_newline = false;

    while !pos.fragment().is_empty() && depth > 0 {
        let ch = pos.fragment().chars().next().expect("non-empty");
        if open_interp == Some(ch) {
            // Interpolation
            let interp_start = pos;
            if !chunk.is_empty() {
                children.push(node(
                    chunk_start,
                    &pos,
                    Ast::TextLiteral(std::mem::take(&mut chunk)),
                ));
            }
            let after_sigil = advance(pos, ch.len_utf8());
            if after_sigil.fragment().starts_with([' ', '\t']) {
                return parser_err(
                    after_sigil,
                    after_sigil.location_offset() + 1,
                    "Whitespace is not allowed before an interpolation here",
                );
            }
            let (after, interp) = expect_parse(
                interp_start,
                after_sigil,
                super::parse_term_no_suffix,
                "I expected an interpolation term here",
            )?;
            children.push(interp);
            pos = after;
            chunk_start = pos;
        } else if !leading_newline && ch == open_quote && nesting_quotes {
            // Nested opening of the quote pair
            if get_indent(&pos)? == starting_indent {
                depth += 1;
            }
            chunk.push(ch);
            pos = advance(pos, ch.len_utf8());
        } else if !leading_newline && ch == close_quote {
            if get_indent(&pos)? == starting_indent {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            chunk.push(ch);
            pos = advance(pos, ch.len_utf8());
        } else if let Some(after) = newline_with_indentation(pos, string_indent) {
            // An indented content line
            if !leading_newline && chunk.is_empty() && children.is_empty() {
                leading_newline = true;
            } else {
                chunk.push('\n');
            }
            pos = after;
        } else if let Some(after) = newline_with_indentation(pos, starting_indent) {
            if after.fragment().starts_with(close_quote) {
                pos = after;
                break;
            }
            let dots = after
                .fragment()
                .bytes()
                .take_while(|&b| b == b'.')
                .count();
            if dots >= 2 {
                // `..` at the opener's indent continues the line
                pos = advance(after, dots);
            } else {
                return parser_err(
                    after,
                    end_of_line(&after),
                    "This multi-line string should be either indented or have '..' at the front",
                );
            }
        } else {
            chunk.push(ch);
            pos = advance(pos, ch.len_utf8());
        }
    }

    if !chunk.is_empty() {
        children.push(node(
            chunk_start,
            &pos,
            Ast::TextLiteral(std::mem::take(&mut chunk)),
        ));
    }

    let (after, ()) = expect_closing(
        pos,
        &close_quote.to_string(),
        &format!("I was expecting a '{close_quote}' to finish this string"),
    )?;
    Ok((after, node(start, &after, Ast::TextJoin { lang, children })))
}

/// Parse a path literal: `(~/...)`, `(./...)`, `(../...)`, or `(/...)`,
/// with `$` interpolation and backslash escapes.
pub(crate) fn parse_path_literal(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let matched = ["(~/", "(./", "(../", "(/"]
        .iter()
        .find_map(|prefix| match_str(input, prefix));
    let Some(after_prefix) = matched else {
        return no_match(input);
    };

    // The path's text includes the prefix (minus the paren)
    let mut chunk_start = advance(input, 1);
    let mut pos = after_prefix;
    let mut children: Vec<AstNode> = Vec::new();
    let mut chunk = String::new();
    let mut paren_depth = 1;

    let flush =
        |chunk: &mut String, children: &mut Vec<AstNode>, from: RawSpan, to: &RawSpan| {
            let pending =
                &from.fragment()[..to.location_offset() - from.location_offset()];
            chunk.push_str(pending);
            if !chunk.is_empty() {
                children.push(node(
                    from,
                    to,
                    Ast::TextLiteral(std::mem::take(chunk)),
                ));
            }
        };

    loop {
        let Some(ch) = pos.fragment().chars().next() else {
            break;
        };
        match ch {
            '\\' => {
                // Escape: the next character is taken verbatim
                let pending = &chunk_start.fragment()
                    [..pos.location_offset() - chunk_start.location_offset()];
                chunk.push_str(pending);
                let after = advance(pos, 1);
                if let Some(escaped) = after.fragment().chars().next() {
                    chunk.push(escaped);
                    pos = advance(after, escaped.len_utf8());
                } else {
                    pos = after;
                }
                chunk_start = pos;
            }
            '$' => {
                let interp_start = pos;
                flush(&mut chunk, &mut children, chunk_start, &pos);
                let after_sigil = advance(pos, 1);
                if after_sigil.fragment().starts_with([' ', '\t']) {
                    return parser_err(
                        after_sigil,
                        after_sigil.location_offset() + 1,
                        "Whitespace is not allowed before an interpolation here",
                    );
                }
                let (after, interp) = expect_parse(
                    interp_start,
                    after_sigil,
                    super::parse_term_no_suffix,
                    "I expected an interpolation term here",
                )?;
                children.push(interp);
                pos = after;
                chunk_start = pos;
            }
            '(' => {
                paren_depth += 1;
                pos = advance(pos, 1);
            }
            ')' => {
                paren_depth -= 1;
                if paren_depth == 0 {
                    break;
                }
                pos = advance(pos, 1);
            }
            _ => {
                pos = advance(pos, ch.len_utf8());
            }
        }
    }

    flush(&mut chunk, &mut children, chunk_start, &pos);
    let (after, ()) =
        expect_closing(pos, ")", "I was expecting a ')' to finish this path")?;
    Ok((
        after,
        node(start, &after, Ast::TextJoin { lang: Some("Path".into()), children }),
    ))
}
