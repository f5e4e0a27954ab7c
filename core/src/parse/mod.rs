//! Recursive-descent parser for Tomo source. There is no separate lexer:
//! parsers work directly on located spans of the raw text, returning a
//! recoverable error to let the caller try an alternative, or an
//! unrecoverable failure carrying a message and source span. Indentation is
//! significant: one indent level is four spaces or one tab, never mixed on a
//! line.

mod expr;
mod text;
mod toplevel;

pub(crate) use expr::{
    parse_expr, parse_extended_expr, parse_term, parse_term_no_suffix,
};
pub(crate) use toplevel::parse_file_body;

use crate::ast::{AstNode, Node, TypeAst, TypeNode};
use crate::consts::{KEYWORDS, SPACES_PER_INDENT};
use crate::error::{ParseError, SourceErrorWrapper, WithSource};
use crate::source::{SourceFile, Span};
use nom::error::{ContextError, ErrorKind, ParseError as NomParseError};
use nom::IResult;
use nom_locate::LocatedSpan;
use std::cell::Cell;

/// Shared parsing context, carried in every span: the file being parsed and
/// the counter for anonymous function IDs.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Ctx<'a> {
    pub file: &'a SourceFile,
    pub lambda_id: &'a Cell<i64>,
}

pub(crate) type RawSpan<'a> = LocatedSpan<&'a str, Ctx<'a>>;
pub(crate) type ParseResult<'a, T> = IResult<RawSpan<'a>, T, PError<'a>>;

/// Parser error: a stack of nom error locations for recoverable errors, plus
/// an optional rich message and end offset for unrecoverable ones.
#[derive(Debug)]
pub(crate) struct PError<'a> {
    pub errors: Vec<(RawSpan<'a>, ErrorKind)>,
    pub message: Option<String>,
    pub end: Option<usize>,
}

impl<'a> NomParseError<RawSpan<'a>> for PError<'a> {
    fn from_error_kind(input: RawSpan<'a>, kind: ErrorKind) -> Self {
        PError { errors: vec![(input, kind)], message: None, end: None }
    }

    fn append(input: RawSpan<'a>, kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, kind));
        other
    }
}

impl<'a> ContextError<RawSpan<'a>> for PError<'a> {
    fn add_context(_input: RawSpan<'a>, ctx: &'static str, mut other: Self) -> Self {
        if other.message.is_none() {
            other.message = Some(ctx.to_string());
        }
        other
    }
}

/// A recoverable "this parser doesn't apply here" error, for backtracking.
pub(crate) fn no_match<'a, T>(input: RawSpan<'a>) -> ParseResult<'a, T> {
    Err(nom::Err::Error(PError::from_error_kind(input, ErrorKind::Alt)))
}

/// An unrecoverable parse error with a highlighted span and message. No
/// caller recovers from these; they propagate straight out of the parse.
pub(crate) fn parser_err<'a, T>(
    at: RawSpan<'a>,
    end: usize,
    message: impl Into<String>,
) -> ParseResult<'a, T> {
    Err(nom::Err::Failure(PError {
        errors: vec![(at, ErrorKind::Fail)],
        message: Some(message.into()),
        end: Some(end),
    }))
}

// ===== Position primitives =====

/// Move a span forward by `n` bytes.
pub(crate) fn advance(input: RawSpan, n: usize) -> RawSpan {
    input.take_split(n).0
}

use nom::InputTake;

/// The byte offset of the end of the current line.
pub(crate) fn end_of_line(input: &RawSpan) -> usize {
    let offset = input.location_offset();
    offset
        + input
            .fragment()
            .find(['\r', '\n'])
            .unwrap_or(input.fragment().len())
}

/// Consume spaces and tabs.
pub(crate) fn spaces(input: RawSpan) -> RawSpan {
    let n = input
        .fragment()
        .bytes()
        .take_while(|&b| b == b' ' || b == b'\t')
        .count();
    advance(input, n)
}

/// Consume a `#` comment, up to (not including) the line ending.
pub(crate) fn comment(input: RawSpan) -> Option<RawSpan> {
    if input.fragment().starts_with('#') {
        let n = input
            .fragment()
            .find(['\r', '\n'])
            .unwrap_or(input.fragment().len());
        Some(advance(input, n))
    } else {
        None
    }
}

/// Consume any mix of spaces, newlines, and comments. Returns the new
/// position and whether any newlines were crossed.
pub(crate) fn whitespace(mut input: RawSpan) -> (RawSpan, bool) {
    let mut crossed_newline = false;
    loop {
        let trimmed = spaces(input);
        let after_newlines = {
            let n = trimmed
                .fragment()
                .bytes()
                .take_while(|&b| b == b'\r' || b == b'\n')
                .count();
            if n > 0 {
                crossed_newline = true;
            }
            advance(trimmed, n)
        };
        let next = match comment(after_newlines) {
            Some(after) => after,
            None => after_newlines,
        };
        if next.location_offset() == input.location_offset() {
            return (next, crossed_newline);
        }
        input = next;
    }
}

/// Match an exact string, without consuming surrounding whitespace.
pub(crate) fn match_str<'a>(input: RawSpan<'a>, target: &str) -> Option<RawSpan<'a>> {
    input
        .fragment()
        .starts_with(target)
        .then(|| advance(input, target.len()))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Match a whole word: the exact string, not followed by an identifier
/// character. Leading spaces are skipped.
pub(crate) fn match_word<'a>(input: RawSpan<'a>, word: &str) -> Option<RawSpan<'a>> {
    let input = spaces(input);
    let after = match_str(input, word)?;
    match after.fragment().chars().next() {
        Some(c) if is_ident_continue(c) => None,
        _ => Some(after),
    }
}

/// Read a word (identifier-shaped, keywords included). Leading spaces are
/// skipped.
pub(crate) fn get_word(input: RawSpan) -> Option<(RawSpan, String)> {
    let input = spaces(input);
    let mut chars = input.fragment().char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return None,
    }
    let end = input
        .fragment()
        .char_indices()
        .find(|&(_, c)| !is_ident_continue(c))
        .map(|(i, _)| i)
        .unwrap_or(input.fragment().len());
    let word = input.fragment()[..end].to_string();
    Some((advance(input, end), word))
}

/// Read an identifier: a word that isn't a reserved keyword.
pub(crate) fn get_id(input: RawSpan) -> Option<(RawSpan, String)> {
    let (after, word) = get_word(input)?;
    if KEYWORDS.contains(&word.as_str()) {
        return None;
    }
    Some((after, word))
}

/// Either commas or newlines (plus comments) separate collection elements.
pub(crate) fn match_separator(input: RawSpan) -> Option<RawSpan> {
    let mut pos = input;
    let mut separators = 0;
    loop {
        let n = pos
            .fragment()
            .bytes()
            .take_while(|&b| b == b'\r' || b == b'\n' || b == b',')
            .count();
        if n > 0 {
            separators += n;
            pos = advance(pos, n);
            continue;
        }
        if let Some(after) = comment(pos) {
            pos = after;
            continue;
        }
        let trimmed = spaces(pos);
        if trimmed.location_offset() != pos.location_offset() {
            pos = trimmed;
            continue;
        }
        break;
    }
    (separators > 0).then_some(pos)
}

// ===== Indentation =====

/// Indentation level of the line containing `pos`: spaces must come in
/// multiples of four, tabs count one each, and mixing is an error.
pub(crate) fn get_indent<'a>(input: &RawSpan<'a>) -> Result<usize, nom::Err<PError<'a>>> {
    let file = input.extra.file;
    let line_start = file.line_start(input.location_offset());
    let line = file.get_line(file.line_number(input.location_offset())).unwrap_or("");
    if line.starts_with(' ') {
        let space_count = line.bytes().take_while(|&b| b == b' ').count();
        if space_count % SPACES_PER_INDENT != 0 {
            return Err(failure_at(
                *input,
                line_start + space_count,
                format!(
                    "Indentation must be a multiple of 4 spaces, not {space_count}"
                ),
            ));
        }
        let indent = space_count / SPACES_PER_INDENT;
        if line[space_count..].starts_with('\t') {
            return Err(failure_at(
                *input,
                line_start + space_count + 1,
                "This is a tab following spaces, and you can't mix tabs and spaces",
            ));
        }
        Ok(indent)
    } else if line.starts_with('\t') {
        let tab_count = line.bytes().take_while(|&b| b == b'\t').count();
        if line[tab_count..].starts_with(' ') {
            return Err(failure_at(
                *input,
                line_start + tab_count + 1,
                "This is a space following tabs, and you can't mix tabs and spaces",
            ));
        }
        Ok(tab_count)
    } else {
        Ok(0)
    }
}

fn failure_at<'a>(
    at: RawSpan<'a>,
    end: usize,
    message: impl Into<String>,
) -> nom::Err<PError<'a>> {
    nom::Err::Failure(PError {
        errors: vec![(at, ErrorKind::Fail)],
        message: Some(message.into()),
        end: Some(end),
    })
}

/// Move into an indented block: skip whitespace and land on the next line if
/// it is indented exactly one level deeper than the current one. None when
/// there is no such block.
pub(crate) fn indent<'a>(
    input: RawSpan<'a>,
) -> Result<Option<RawSpan<'a>>, nom::Err<PError<'a>>> {
    let starting_indent = get_indent(&input)?;
    let (after, _) = whitespace(input);
    let file = input.extra.file;
    let next_line_start = file.line_start(after.location_offset());
    if next_line_start <= input.location_offset() {
        return Ok(None);
    }
    let at_line = advance(input, next_line_start - input.location_offset());
    if get_indent(&at_line)? != starting_indent + 1 {
        return Ok(None);
    }
    let skip = at_line
        .fragment()
        .bytes()
        .take_while(|&b| b == b' ' || b == b'\t')
        .count();
    Ok(Some(advance(at_line, skip)))
}

/// Match a newline followed by at least `target` levels of indentation,
/// consuming exactly that much indentation. Empty lines match with no
/// indentation requirement.
pub(crate) fn newline_with_indentation(
    input: RawSpan,
    target: usize,
) -> Option<RawSpan> {
    let mut pos = input;
    if pos.fragment().starts_with('\r') {
        pos = advance(pos, 1);
    }
    if !pos.fragment().starts_with('\n') {
        return None;
    }
    pos = advance(pos, 1);
    match pos.fragment().chars().next() {
        None | Some('\r') | Some('\n') => return Some(pos),
        _ => {}
    }
    if pos.fragment().starts_with(' ') {
        let space_count = pos.fragment().bytes().take_while(|&b| b == b' ').count();
        if space_count >= SPACES_PER_INDENT * target {
            return Some(advance(pos, SPACES_PER_INDENT * target));
        }
    } else {
        let tab_count = pos.fragment().bytes().take_while(|&b| b == b'\t').count();
        if tab_count >= target {
            return Some(advance(pos, target));
        }
    }
    None
}

// ===== Node plumbing =====

/// Build a spanned node from start/end positions.
pub(crate) fn node(start: RawSpan, end: &RawSpan, ast: crate::ast::Ast) -> AstNode {
    Box::new(Node(
        ast,
        Span::from_offsets(
            start.extra.file,
            start.location_offset(),
            end.location_offset(),
        ),
    ))
}

pub(crate) fn type_node(start: RawSpan, end: &RawSpan, ty: TypeAst) -> TypeNode {
    Box::new(Node(
        ty,
        Span::from_offsets(
            start.extra.file,
            start.location_offset(),
            end.location_offset(),
        ),
    ))
}

/// Re-span an existing node (e.g. to make a parenthesized expression's span
/// include the parens).
pub(crate) fn respan(node: AstNode, start: RawSpan, end: &RawSpan) -> AstNode {
    let Node(ast, _) = *node;
    Box::new(Node(
        ast,
        Span::from_offsets(
            start.extra.file,
            start.location_offset(),
            end.location_offset(),
        ),
    ))
}

// ===== Type annotations =====

pub(crate) fn parse_type(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let (mut pos, ty) = parse_non_optional_type(input)?;
    let trimmed = spaces(pos);
    if let Some(after) = match_str(trimmed, "?") {
        let wrapped = type_node(start, &after, TypeAst::Optional(ty));
        pos = after;
        return Ok((pos, wrapped));
    }
    Ok((pos, ty))
}

pub(crate) fn parse_non_optional_type(input: RawSpan) -> ParseResult<TypeNode> {
    for parser in [
        parse_pointer_type,
        parse_list_type,
        parse_table_or_set_type,
        parse_func_type,
        parse_type_name,
    ] {
        match parser(input) {
            Ok(ok) => return Ok(ok),
            Err(nom::Err::Error(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    // Parenthesized type
    let start = input;
    if let Some(open) = match_str(input, "(") {
        let (inner_pos, _) = whitespace(open);
        let (pos, ty) = parse_type(inner_pos)?;
        let (pos, _) = whitespace(pos);
        let Some(after) = match_str(pos, ")") else {
            return parser_err(
                pos,
                end_of_line(&pos),
                "I wasn't able to parse the rest of this type",
            );
        };
        // Keep the payload but extend the span to cover the parens
        let Node(inner, _) = *ty;
        return Ok((after, type_node(start, &after, inner)));
    }
    no_match(input)
}

fn parse_pointer_type(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let (is_stack, pos) = if let Some(after) = match_str(input, "@") {
        (false, after)
    } else if let Some(after) = match_str(input, "&") {
        (true, after)
    } else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let is_readonly = match_str(pos, "%").is_some();
    let pos = if is_readonly { advance(pos, 1) } else { pos };
    let pos = spaces(pos);
    let (pos, pointed) = match parse_non_optional_type(pos) {
        Ok(ok) => ok,
        Err(_) => {
            return parser_err(
                start,
                pos.location_offset(),
                "I couldn't parse a pointer type after this point",
            )
        }
    };
    let ptr = type_node(
        start,
        &pos,
        TypeAst::Pointer { pointed, is_stack, is_readonly },
    );
    let trimmed = spaces(pos);
    if let Some(after) = match_str(trimmed, "?") {
        return Ok((after, type_node(start, &after, TypeAst::Optional(ptr))));
    }
    Ok((pos, ptr))
}

fn parse_list_type(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let Some(pos) = match_str(input, "[") else {
        return no_match(input);
    };
    let (pos, item) = match parse_type(pos) {
        Ok(ok) => ok,
        Err(_) => {
            return parser_err(
                start,
                pos.location_offset(),
                "I couldn't parse a list item type after this point",
            )
        }
    };
    let pos = spaces(pos);
    let Some(after) = match_str(pos, "]") else {
        return parser_err(
            pos,
            end_of_line(&pos),
            "I wasn't able to parse the rest of this list type",
        );
    };
    Ok((after, type_node(start, &after, TypeAst::List(item))))
}

fn parse_table_or_set_type(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let Some(pos) = match_str(input, "{") else {
        return no_match(input);
    };
    let (pos, _) = whitespace(pos);
    let (pos, key) = parse_type(pos)?;
    let (pos, _) = whitespace(pos);
    if let Some(pos) = match_str(pos, ":") {
        let (pos, value) = match parse_type(pos) {
            Ok(ok) => ok,
            Err(_) => {
                return parser_err(
                    start,
                    pos.location_offset(),
                    "I couldn't parse the rest of this table type",
                )
            }
        };
        let (pos, _) = whitespace(pos);
        let Some(after) = match_str(pos, "}") else {
            return parser_err(
                pos,
                end_of_line(&pos),
                "I wasn't able to parse the rest of this table type",
            );
        };
        Ok((after, type_node(start, &after, TypeAst::Table { key, value })))
    } else {
        let Some(after) = match_str(pos, "}") else {
            return parser_err(
                pos,
                end_of_line(&pos),
                "I wasn't able to parse the rest of this set type",
            );
        };
        Ok((after, type_node(start, &after, TypeAst::Set(key))))
    }
}

fn parse_func_type(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let Some(pos) = match_word(input, "func") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };
    let (pos, args) = toplevel::parse_args(pos, true)?;
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, ")") else {
        return parser_err(
            pos,
            end_of_line(&pos),
            "I wasn't able to parse the rest of this function type",
        );
    };
    let trimmed = spaces(pos);
    let (pos, ret) = if let Some(after_arrow) = match_str(trimmed, "->") {
        match parse_type(spaces(after_arrow)) {
            Ok((pos, ret)) => (pos, Some(ret)),
            Err(_) => (pos, None),
        }
    } else {
        (pos, None)
    };
    Ok((pos, type_node(start, &pos, TypeAst::Function { args, ret })))
}

fn parse_type_name(input: RawSpan) -> ParseResult<TypeNode> {
    let start = input;
    let Some((mut pos, mut name)) = get_id(input) else {
        return no_match(input);
    };
    loop {
        let trimmed = spaces(pos);
        let Some(after_dot) = match_str(trimmed, ".") else {
            break;
        };
        let Some((after, next)) = get_id(after_dot) else {
            break;
        };
        name = format!("{name}.{next}");
        pos = after;
    }
    Ok((pos, type_node(start, &pos, TypeAst::Var(name))))
}

// ===== Entry points =====

fn run_parser<'a, T>(
    file: &'a SourceFile,
    lambda_id: &'a Cell<i64>,
    parser: impl FnOnce(RawSpan<'a>) -> ParseResult<'a, T>,
    what: &str,
) -> Result<(RawSpan<'a>, T), WithSource<ParseError>> {
    let ctx = Ctx { file, lambda_id };
    let input = RawSpan::new_extra(&file.text, ctx);
    match parser(input) {
        Ok(ok) => Ok(ok),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let (span_start, span_end, message) = match (&e.message, e.errors.first()) {
                (Some(message), Some((at, _))) => (
                    at.location_offset(),
                    e.end.unwrap_or_else(|| {
                        at.location_offset()
                            + at.fragment().find('\n').unwrap_or(at.fragment().len())
                    }),
                    message.clone(),
                ),
                (Some(message), None) => (0, 0, message.clone()),
                (None, Some((at, _))) => (
                    at.location_offset(),
                    at.location_offset(),
                    format!("I couldn't parse this {what}"),
                ),
                (None, None) => (0, 0, format!("I couldn't parse this {what}")),
            };
            let span = Span::from_offsets(file, span_start, span_end.max(span_start));
            Err(WithSource::new(
                vec![SourceErrorWrapper::new(
                    ParseError::Syntax { message },
                    span,
                    &file.text,
                )],
                file.text.clone(),
            ))
        }
        Err(nom::Err::Incomplete(_)) => unreachable!("only possible in streaming mode"),
    }
}

/// Parse a whole file into a top-level block.
pub fn parse_file_source(file: &SourceFile) -> Result<AstNode, WithSource<ParseError>> {
    let lambda_id = Cell::new(0);
    let (_, ast) = run_parser(
        file,
        &lambda_id,
        |input| {
            // Skip a shebang line
            let pos = match match_str(input, "#!") {
                Some(after) => {
                    let n = after
                        .fragment()
                        .find(['\r', '\n'])
                        .unwrap_or(after.fragment().len());
                    advance(after, n)
                }
                None => input,
            };
            let (pos, _) = whitespace(pos);
            let (pos, ast) = parse_file_body(pos)?;
            let (pos, _) = whitespace(pos);
            if !pos.fragment().is_empty() {
                return parser_err(
                    pos,
                    end_of_line(&pos),
                    "I expect all top-level statements to be declarations of some kind",
                );
            }
            Ok((pos, ast))
        },
        "file",
    )?;
    Ok(ast)
}

/// Parse a standalone expression string.
pub fn parse_expression_source(
    file: &SourceFile,
) -> Result<AstNode, WithSource<ParseError>> {
    let lambda_id = Cell::new(0);
    let (_, ast) = run_parser(
        file,
        &lambda_id,
        |input| {
            let (pos, _) = whitespace(input);
            let (pos, ast) = parse_extended_expr(pos)?;
            let (pos, _) = whitespace(pos);
            if !pos.fragment().is_empty() {
                return parser_err(
                    pos,
                    pos.location_offset() + pos.fragment().len(),
                    "I couldn't parse this part of the expression",
                );
            }
            Ok((pos, ast))
        },
        "expression",
    )?;
    Ok(ast)
}

/// Parse a standalone type string.
pub fn parse_type_source(file: &SourceFile) -> Result<TypeNode, WithSource<ParseError>> {
    let lambda_id = Cell::new(0);
    let (_, ty) = run_parser(
        file,
        &lambda_id,
        |input| {
            let (pos, _) = whitespace(input);
            let (pos, ty) = parse_type(pos)?;
            let (pos, _) = whitespace(pos);
            if !pos.fragment().is_empty() {
                return parser_err(
                    pos,
                    pos.location_offset() + pos.fragment().len(),
                    "I couldn't parse this part of the type",
                );
            }
            Ok((pos, ty))
        },
        "type",
    )?;
    Ok(ty)
}
