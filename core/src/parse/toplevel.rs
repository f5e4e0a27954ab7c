//! Blocks, statements, declarations, and top-level definitions. Top-level
//! forms (`struct`, `enum`, `lang`, `func`, `use`, `!link`, `inline C`) are
//! only legal at file scope or inside a type's namespace block; using one
//! inside a function body is reported with an explanatory span.

use super::expr::{
    expect_closing, expect_parse, parse_optional_conditional_suffix, try_parse,
};
use super::{
    advance, end_of_line, get_id, get_indent, indent, match_separator,
    match_str, match_word, no_match, node, parse_expr, parse_extended_expr,
    parse_term, parse_type, parser_err, spaces, whitespace, ParseResult,
    PError, RawSpan,
};
use crate::ast::{Arg, Ast, AstNode, BinOp, EnumTagDef, IntBits};
use crate::runtime::int::Int;

// ===== Blocks =====

/// A colon followed by either an inline `;`-separated statement sequence or
/// an indented block of statements one level deeper.
pub(crate) fn parse_block(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, ":") else {
        return no_match(input);
    };

    if let Some(block_pos) = indent(pos)? {
        return parse_indented_statements(start, block_pos);
    }

    // Inline block: statements separated by semicolons on the same line
    let mut statements = Vec::new();
    let mut pos = spaces(pos);
    loop {
        let Some((after, stmt)) = try_parse(pos, parse_statement)? else {
            break;
        };
        statements.push(stmt);
        pos = spaces(after);
        match match_str(pos, ";") {
            Some(after) => pos = after,
            None => break,
        }
    }
    Ok((pos, node(start, &pos, Ast::Block(statements))))
}

fn parse_indented_statements<'a>(
    start: RawSpan<'a>,
    block_pos: RawSpan<'a>,
) -> ParseResult<'a, AstNode> {
    let block_indent = get_indent(&block_pos)?;
    let mut statements = Vec::new();
    let (mut pos, _) = whitespace(block_pos);
    while !pos.fragment().is_empty() {
        let Some((after_stmt, stmt)) = try_parse(pos, parse_statement)? else {
            let line_start = pos;
            for (keyword, what) in [
                ("struct", "Struct definitions"),
                ("enum", "Enum definitions"),
                ("func", "Function definitions"),
                ("use", "'use' statements"),
            ] {
                if match_word(pos, keyword).is_some() {
                    return parser_err(
                        line_start,
                        end_of_line(&line_start),
                        format!("{what} are only allowed at the top level"),
                    );
                }
            }
            let trimmed = spaces(pos);
            if !trimmed.fragment().is_empty()
                && !trimmed.fragment().starts_with(['\r', '\n'])
            {
                return parser_err(
                    trimmed,
                    end_of_line(&trimmed),
                    "I couldn't parse this line",
                );
            }
            break;
        };
        statements.push(stmt);
        let (next, _) = whitespace(after_stmt);

        // Two statements on one line (with no newline between) is an error
        let between = &after_stmt.fragment()
            [..next.location_offset() - after_stmt.location_offset()];
        if !between.contains('\n') {
            if !next.fragment().is_empty() {
                return parser_err(
                    next,
                    end_of_line(&next),
                    "I don't know how to parse the rest of this line",
                );
            }
            pos = after_stmt;
            break;
        }

        if next.fragment().is_empty() || get_indent(&next)? != block_indent {
            pos = after_stmt;
            break;
        }
        pos = next;
    }
    Ok((pos, node(start, &pos, Ast::Block(statements))))
}

// ===== Statements =====

pub(crate) fn parse_statement(input: RawSpan) -> ParseResult<AstNode> {
    for parser in [parse_declaration, parse_doctest, parse_say] {
        match try_parse(input, parser)? {
            Some(ok) => return Ok(ok),
            None => continue,
        }
    }

    let (mut pos, mut stmt) = match try_parse(input, parse_update)? {
        Some(ok) => ok,
        None => match try_parse(input, parse_assignment)? {
            Some(ok) => ok,
            None => parse_extended_expr(input)?,
        },
    };

    loop {
        let progressed = match &stmt.0 {
            Ast::Var(_) => {
                let mut advanced = None;
                for suffix in [
                    super::expr::parse_method_call_suffix,
                    super::expr::parse_fncall_suffix,
                ] {
                    match suffix(pos, &stmt) {
                        Ok(ok) => {
                            advanced = Some(ok);
                            break;
                        }
                        Err(nom::Err::Error(_)) => continue,
                        Err(err) => return Err(err),
                    }
                }
                advanced
            }
            Ast::FunctionCall { .. } => {
                match parse_optional_conditional_suffix(pos, &stmt) {
                    Ok(ok) => Some(ok),
                    Err(nom::Err::Error(_)) => None,
                    Err(err) => return Err(err),
                }
            }
            _ => None,
        };
        match progressed {
            Some((after, new_stmt)) => {
                pos = after;
                stmt = new_stmt;
            }
            None => break,
        }
    }
    Ok((pos, stmt))
}

/// `x := value`
pub(crate) fn parse_declaration(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some((pos, var)) = try_parse(input, super::expr::parse_var)? else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, ":=") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    match try_parse(pos, parse_extended_expr)? {
        Some((after, value)) => {
            Ok((after, node(start, &after, Ast::Declare { var, value })))
        }
        None => {
            if try_parse(pos, parse_use)?.is_some() {
                parser_err(
                    start,
                    end_of_line(&pos),
                    "'use' statements are only allowed at the top level of a file",
                )
            } else {
                parser_err(pos, end_of_line(&pos), "This is not a valid expression")
            }
        }
    }
}

/// A declaration at file scope, which may also bind a `use` import.
fn parse_top_declaration(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some((pos, var)) = try_parse(input, super::expr::parse_var)? else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, ":=") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let (after, value) = match try_parse(pos, parse_use)? {
        Some(ok) => ok,
        None => match try_parse(pos, parse_extended_expr)? {
            Some(ok) => ok,
            None => {
                return parser_err(
                    pos,
                    end_of_line(&pos),
                    "This declaration value didn't parse",
                )
            }
        },
    };
    Ok((after, node(start, &after, Ast::Declare { var, value })))
}

fn parse_update(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some((pos, lhs)) = try_parse(input, parse_expr)? else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let ops = [
        ("+=", BinOp::Plus),
        ("++=", BinOp::Concat),
        ("-=", BinOp::Minus),
        ("*=", BinOp::Multiply),
        ("/=", BinOp::Divide),
        ("^=", BinOp::Power),
        ("and=", BinOp::And),
        ("or=", BinOp::Or),
        ("xor=", BinOp::Xor),
    ];
    let Some((pos, op)) = ops
        .iter()
        .find_map(|(sym, op)| match_str(pos, sym).map(|after| (after, *op)))
    else {
        return no_match(input);
    };
    let (after, rhs) = expect_parse(
        start,
        pos,
        parse_extended_expr,
        "I expected an expression here",
    )?;
    Ok((after, node(start, &after, Ast::UpdateAssign { op, lhs, rhs })))
}

fn parse_assignment(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let mut targets = Vec::new();
    let mut pos = input;
    loop {
        let Some((after, target)) = try_parse(pos, parse_term)? else {
            break;
        };
        targets.push(target);
        let trimmed = spaces(after);
        match match_str(trimmed, ",") {
            Some(after_comma) => {
                let (next, _) = whitespace(after_comma);
                pos = next;
            }
            None => {
                pos = after;
                break;
            }
        }
    }
    if targets.is_empty() {
        return no_match(input);
    }

    let trimmed = spaces(pos);
    let Some(after_eq) = match_str(trimmed, "=") else {
        return no_match(input);
    };
    if after_eq.fragment().starts_with('=') {
        return no_match(input); // == comparison
    }

    let mut values = Vec::new();
    let mut pos = after_eq;
    loop {
        let Some((after, value)) = try_parse(pos, parse_extended_expr)? else {
            break;
        };
        values.push(value);
        let trimmed = spaces(after);
        match match_str(trimmed, ",") {
            Some(after_comma) => {
                let (next, _) = whitespace(after_comma);
                pos = next;
            }
            None => {
                pos = after;
                break;
            }
        }
    }
    Ok((pos, node(start, &pos, Ast::Assign { targets, values })))
}

// ===== Argument lists =====

/// Parse a parameter list: batches of names sharing a type (`x, y : Int`) or
/// a default value (`x = 10`). With `allow_unnamed`, bare types declare
/// anonymous parameters (used by function types).
pub(crate) fn parse_args(
    input: RawSpan,
    allow_unnamed: bool,
) -> ParseResult<Vec<Arg>> {
    let mut args = Vec::new();
    let mut pos = input;
    loop {
        let batch_start = pos;
        let mut names: Vec<Option<String>> = Vec::new();
        let mut default = None;
        let mut ty = None;
        loop {
            let (next, _) = whitespace(pos);
            let name_start = next;
            let Some((after_name, name)) = get_id(next) else {
                break;
            };
            let (after_name_ws, _) = whitespace(after_name);
            if !after_name_ws.fragment().starts_with("==") {
                if let Some(after_eq) = match_str(after_name_ws, "=") {
                    let (after_value, value) = expect_parse(
                        after_name_ws,
                        spaces(after_eq),
                        parse_term,
                        "I expected a value after this '='",
                    )?;
                    default = Some(value);
                    names.push(Some(name));
                    pos = after_value;
                    break;
                }
            }
            if let Some(after_colon) = match_str(after_name_ws, ":") {
                let (after_ty, parsed) = match parse_type(spaces(after_colon)) {
                    Ok(ok) => ok,
                    Err(_) => {
                        return parser_err(
                            after_name_ws,
                            end_of_line(&after_name_ws),
                            "I expected a type here",
                        )
                    }
                };
                ty = Some(parsed);
                names.push(Some(name));
                pos = after_ty;
                break;
            }
            if allow_unnamed {
                if let Ok((after_ty, parsed)) = parse_type(name_start) {
                    ty = Some(parsed);
                    names.push(None);
                    pos = after_ty;
                }
                break;
            }
            names.push(Some(name));
            let trimmed = spaces(after_name);
            match match_str(trimmed, ",") {
                Some(after_comma) => pos = after_comma,
                None => {
                    pos = after_name;
                    break;
                }
            }
        }
        if names.is_empty() {
            break;
        }
        if default.is_none() && ty.is_none() {
            let described = names
                .iter()
                .flatten()
                .next()
                .cloned()
                .unwrap_or_default();
            return parser_err(
                batch_start,
                pos.location_offset(),
                format!(
                    "I expected a ':' and type, or '=' and a default value after this parameter ({described})"
                ),
            );
        }
        for name in names {
            args.push(Arg { name, ty: ty.clone(), default: default.clone() });
        }
        match match_separator(pos) {
            Some(after) => pos = after,
            None => break,
        }
    }
    Ok((pos, args))
}

// ===== Definitions =====

fn parse_func_def(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "func") else {
        return no_match(input);
    };
    let Some((pos, name)) = try_parse(pos, super::expr::parse_var)? else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };
    let (pos, args) = parse_args(pos, false)?;
    let (mut pos, _) = whitespace(pos);

    let mut is_inline = false;
    let mut cache: Option<AstNode> = None;
    if let Some(after_semi) = match_str(pos, ";") {
        pos = after_semi;
        loop {
            let (next, _) = whitespace(pos);
            let flag_start = next;
            if let Some(after) = match_word(next, "inline") {
                is_inline = true;
                pos = after;
            } else if let Some(after) = match_word(next, "cached") {
                if cache.is_none() {
                    cache = Some(node(
                        after,
                        &after,
                        Ast::Int { digits: "-1".into(), bits: IntBits::Unspecified },
                    ));
                }
                pos = after;
            } else if let Some(after) = match_word(next, "cache_size") {
                let (after_ws, _) = whitespace(after);
                let Some(after_eq) = match_str(after_ws, "=") else {
                    return parser_err(
                        flag_start,
                        after_ws.location_offset(),
                        "I expected a value for 'cache_size'",
                    );
                };
                let (after_value, value) = expect_parse(
                    start,
                    spaces(after_eq),
                    parse_expr,
                    "I expected a maximum size for the cache",
                )?;
                cache = Some(value);
                pos = after_value;
            } else {
                pos = next;
                break;
            }
            match match_separator(pos) {
                Some(after) => pos = after,
                None => break,
            }
        }
    }

    let (pos, ()) = expect_closing(
        pos,
        ")",
        "I wasn't able to parse the rest of this function definition",
    )?;

    let trimmed = spaces(pos);
    let (pos, ret_type) = if let Some(after_arrow) = match_str(trimmed, "->") {
        match parse_type(spaces(after_arrow)) {
            Ok((after, ty)) => (after, Some(ty)),
            Err(_) => (pos, None),
        }
    } else {
        (pos, None)
    };

    let (pos, body) = expect_parse(
        start,
        pos,
        parse_block,
        "This function needs a body block",
    )?;
    Ok((
        pos,
        node(
            start,
            &pos,
            Ast::FunctionDef { name, args, ret_type, body, cache, is_inline },
        ),
    ))
}

/// Parse an optional `: <namespace>` after a type definition: declarations
/// indented one level past `starting_indent`.
fn parse_optional_namespace<'a>(
    input: RawSpan<'a>,
    starting_indent: usize,
) -> Result<(RawSpan<'a>, AstNode), nom::Err<PError<'a>>> {
    if let Some(after_colon) = match_str(input, ":") {
        let (ns_pos, _) = whitespace(after_colon);
        if !ns_pos.fragment().is_empty() && get_indent(&ns_pos)? > starting_indent {
            let (after, ns) = parse_namespace(ns_pos)?;
            return Ok((after, ns));
        }
    }
    Ok((input, node(input, &input, Ast::Block(Vec::new()))))
}

fn parse_struct_def(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "struct") else {
        return no_match(input);
    };
    let starting_indent = get_indent(&pos)?;
    let pos = spaces(pos);
    let Some((pos, name)) = get_id(pos) else {
        return parser_err(
            start,
            pos.location_offset(),
            "I expected a name for this struct",
        );
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return parser_err(
            pos,
            pos.location_offset(),
            "I expected a '(' and a list of fields here",
        );
    };
    let (pos, fields) = parse_args(pos, false)?;
    let (mut pos, _) = whitespace(pos);

    let mut secret = false;
    if let Some(after_semi) = match_str(pos, ";") {
        let (mut flag_pos, _) = whitespace(after_semi);
        loop {
            if let Some(after) = match_word(flag_pos, "secret") {
                secret = true;
                flag_pos = after;
            } else {
                break;
            }
            match match_separator(flag_pos) {
                Some(after) => flag_pos = after,
                None => break,
            }
        }
        pos = flag_pos;
    }

    let (pos, ()) = expect_closing(
        pos,
        ")",
        "I wasn't able to parse the rest of this struct",
    )?;
    let (pos, namespace) = parse_optional_namespace(pos, starting_indent)?;
    Ok((
        pos,
        node(start, &pos, Ast::StructDef { name, fields, namespace, secret }),
    ))
}

fn parse_enum_def(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "enum") else {
        return no_match(input);
    };
    let starting_indent = get_indent(&pos)?;
    let pos = spaces(pos);
    let Some((pos, name)) = get_id(pos) else {
        return parser_err(
            start,
            pos.location_offset(),
            "I expected a name for this enum",
        );
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, "(") else {
        return no_match(input);
    };

    let mut tags: Vec<EnumTagDef> = Vec::new();
    let mut next_value: i64 = 0;
    let (mut pos, _) = whitespace(pos);
    loop {
        let tag_start = spaces(pos);
        let Some((after_name, tag_name)) = get_id(tag_start) else {
            break;
        };
        let mut tag_pos = spaces(after_name);

        let mut fields = Vec::new();
        let mut secret = false;
        if let Some(after_paren) = match_str(tag_pos, "(") {
            let (field_pos, _) = whitespace(after_paren);
            let (field_pos, parsed) = parse_args(field_pos, false)?;
            let (mut field_pos, _) = whitespace(field_pos);
            if let Some(after_semi) = match_str(field_pos, ";") {
                let (flag_pos, _) = whitespace(after_semi);
                if let Some(after) = match_word(flag_pos, "secret") {
                    secret = true;
                    let (next, _) = whitespace(after);
                    field_pos = next;
                } else {
                    field_pos = flag_pos;
                }
            }
            let (after, ()) = expect_closing(
                field_pos,
                ")",
                "I wasn't able to parse the rest of this tagged union member",
            )?;
            fields = parsed;
            tag_pos = after;
        }

        let trimmed = spaces(tag_pos);
        if let Some(after_eq) = match_str(trimmed, "=") {
            let (after_value, value_node) = expect_parse(
                tag_start,
                spaces(after_eq),
                super::expr::parse_int,
                "I expected an integer literal after this '='",
            )?;
            if let Ast::Int { digits, .. } = &value_node.0 {
                next_value = Int::from_str(digits)
                    .and_then(|i| i.to_i64(false).ok())
                    .unwrap_or(next_value);
            }
            tag_pos = after_value;
        }

        if tags.iter().any(|t| t.value == next_value) {
            return parser_err(
                tag_start,
                tag_pos.location_offset(),
                format!(
                    "This tag value ({next_value}) is a duplicate of an earlier tag value"
                ),
            );
        }
        tags.push(EnumTagDef { name: tag_name, value: next_value, fields, secret });
        next_value += 1;

        match match_separator(tag_pos) {
            Some(after) => pos = after,
            None => {
                pos = tag_pos;
                break;
            }
        }
    }

    let (pos, _) = whitespace(pos);
    let (pos, ()) = expect_closing(
        pos,
        ")",
        "I wasn't able to parse the rest of this enum definition",
    )?;
    let (pos, namespace) = parse_optional_namespace(pos, starting_indent)?;
    Ok((pos, node(start, &pos, Ast::EnumDef { name, tags, namespace })))
}

fn parse_lang_def(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "lang") else {
        return no_match(input);
    };
    let starting_indent = get_indent(&pos)?;
    let pos = spaces(pos);
    let Some((pos, name)) = get_id(pos) else {
        return parser_err(
            start,
            pos.location_offset(),
            "I expected a name for this lang",
        );
    };
    let pos = spaces(pos);
    let (pos, namespace) = parse_optional_namespace(pos, starting_indent)?;
    Ok((pos, node(start, &pos, Ast::LangDef { name, namespace })))
}

pub(crate) fn parse_extern(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "extern") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some((pos, name)) = get_id(pos) else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let Some(pos) = match_str(pos, ":") else {
        return parser_err(
            start,
            pos.location_offset(),
            "I couldn't get a type for this extern",
        );
    };
    let (pos, ty) = match parse_type(spaces(pos)) {
        Ok(ok) => ok,
        Err(_) => {
            return parser_err(
                start,
                end_of_line(&pos),
                "I couldn't parse the type for this extern",
            )
        }
    };
    Ok((pos, node(start, &pos, Ast::Extern { name, ty })))
}

pub(crate) fn parse_inline_c(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "inline") else {
        return no_match(input);
    };
    let Some(pos) = match_word(pos, "C") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let (mut pos, open) = if let Some(after) = match_str(pos, "(") {
        (after, '(')
    } else if let Some(after) = match_str(pos, "{") {
        (after, '{')
    } else {
        return parser_err(
            start,
            pos.location_offset(),
            "I expected a '(' or '{' here",
        );
    };

    let base_indent = get_indent(&pos)?;
    let (mut line_pos, _) = whitespace(pos);
    let mut code = String::new();
    while !line_pos.fragment().is_empty() && get_indent(&line_pos)? > base_indent {
        let line_len = line_pos
            .fragment()
            .find(['\r', '\n'])
            .unwrap_or(line_pos.fragment().len());
        code.push_str(&line_pos.fragment()[..line_len]);
        code.push('\n');
        pos = advance(line_pos, line_len);
        let (after, moved) = whitespace(pos);
        if !moved && after.location_offset() == pos.location_offset() {
            break;
        }
        line_pos = after;
        pos = after;
    }

    let close = if open == '(' { ")" } else { "}" };
    let (pos, ()) = expect_closing(
        pos,
        close,
        "I wasn't able to parse the rest of this inline C",
    )?;
    let pos = spaces(pos);
    let (pos, ty) = if open == '(' {
        let Some(after_colon) = match_str(pos, ":") else {
            return parser_err(
                start,
                pos.location_offset(),
                "This inline C needs to have a type after it",
            );
        };
        match parse_type(spaces(after_colon)) {
            Ok((after, ty)) => (after, Some(ty)),
            Err(_) => {
                return parser_err(
                    start,
                    end_of_line(&pos),
                    "I couldn't parse the type for this inline C",
                )
            }
        }
    } else {
        (pos, None)
    };
    Ok((pos, node(start, &pos, Ast::InlineCCode { code, ty })))
}

fn parse_use(input: RawSpan) -> ParseResult<AstNode> {
    use crate::ast::UseKind;
    let start = input;
    let Some(pos) = match_word(input, "use") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let name_len = pos
        .fragment()
        .find([' ', '\t', '\r', '\n', ';'])
        .unwrap_or(pos.fragment().len());
    if name_len == 0 {
        return parser_err(
            start,
            pos.location_offset(),
            "There is no module name here to use",
        );
    }
    let name = pos.fragment()[..name_len].to_string();
    let mut pos = advance(pos, name_len);
    while let Some(after) = match_str(pos, ";") {
        pos = after;
    }
    let what = if name.starts_with('<') {
        UseKind::Header
    } else if name.starts_with("./")
        || name.starts_with('/')
        || name.starts_with("../")
        || name.starts_with("~/")
    {
        UseKind::Local
    } else if name.ends_with(".so") {
        UseKind::SharedObject
    } else {
        UseKind::Module
    };
    Ok((pos, node(start, &pos, Ast::Use { path: name, what })))
}

fn parse_linker(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_word(input, "!link") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let len = pos
        .fragment()
        .find(['\r', '\n'])
        .unwrap_or(pos.fragment().len());
    let directive = pos.fragment()[..len].to_string();
    let pos = advance(pos, len);
    Ok((pos, node(start, &pos, Ast::LinkerDirective(directive))))
}

fn parse_doctest(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, ">>") else {
        return no_match(input);
    };
    let pos = spaces(pos);
    let (pos, expr) = expect_parse(
        start,
        pos,
        parse_statement,
        "I couldn't parse the expression for this doctest",
    )?;
    let (peeked, _) = whitespace(pos);
    let (pos, output) = if let Some(after_eq) = match_str(peeked, "=") {
        let out_start = spaces(after_eq);
        let line_len = out_start
            .fragment()
            .find(['\r', '\n'])
            .unwrap_or(out_start.fragment().len());
        if line_len == 0 {
            return parser_err(
                out_start,
                out_start.location_offset(),
                "You're missing expected output here",
            );
        }
        let output = out_start.fragment()[..line_len].trim_end().to_string();
        (advance(out_start, line_len), Some(output))
    } else {
        (pos, None)
    };
    Ok((pos, node(start, &pos, Ast::DocTest { expr, output })))
}

/// `!! message with $interpolations`, printing to stdout.
fn parse_say(input: RawSpan) -> ParseResult<AstNode> {
    let start = input;
    let Some(pos) = match_str(input, "!!") else {
        return no_match(input);
    };
    let mut pos = spaces(pos);
    let mut chunks: Vec<AstNode> = Vec::new();
    let mut chunk = String::new();
    let mut chunk_start = pos;
    loop {
        let Some(ch) = pos.fragment().chars().next() else {
            break;
        };
        if ch == '$' {
            let interp_start = pos;
            if !chunk.is_empty() {
                chunks.push(node(
                    chunk_start,
                    &pos,
                    Ast::TextLiteral(std::mem::take(&mut chunk)),
                ));
            }
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
                parse_term,
                "I expected an interpolation term here",
            )?;
            chunks.push(interp);
            pos = after;
            chunk_start = pos;
        } else if ch == '\r' || ch == '\n' {
            break;
        } else {
            chunk.push(ch);
            pos = advance(pos, ch.len_utf8());
        }
    }
    if !chunk.is_empty() {
        chunks.push(node(chunk_start, &pos, Ast::TextLiteral(chunk)));
    }
    Ok((pos, node(start, &pos, Ast::PrintStatement(chunks))))
}

// ===== Namespaces and the file body =====

fn namespace_statement(input: RawSpan, top_level: bool) -> ParseResult<AstNode> {
    for parser in [
        parse_struct_def,
        parse_enum_def,
        parse_lang_def,
        parse_func_def,
        parse_use,
        parse_linker,
        parse_extern,
        parse_inline_c,
    ] {
        match try_parse(input, parser)? {
            Some(ok) => return Ok(ok),
            None => continue,
        }
    }
    if top_level {
        parse_top_declaration(input)
    } else {
        parse_declaration(input)
    }
}

fn parse_declarations<'a>(
    input: RawSpan<'a>,
    expected_indent: usize,
    top_level: bool,
) -> ParseResult<'a, AstNode> {
    let start = input;
    let (mut pos, _) = whitespace(input);
    let mut statements = Vec::new();
    loop {
        let (next, _) = whitespace(pos);
        if next.fragment().is_empty() {
            pos = next;
            break;
        }
        if get_indent(&next)? != expected_indent {
            break;
        }
        match try_parse(next, |i| namespace_statement(i, top_level))? {
            Some((after, stmt)) => {
                statements.push(stmt);
                pos = after;
            }
            None => break,
        }
    }
    Ok((pos, node(start, &pos, Ast::Block(statements))))
}

fn parse_namespace(input: RawSpan) -> ParseResult<AstNode> {
    let expected_indent = get_indent(&input)?;
    parse_declarations(input, expected_indent, false)
}

/// Every top-level statement of a file: definitions and declarations at
/// indent zero.
pub(crate) fn parse_file_body(input: RawSpan) -> ParseResult<AstNode> {
    parse_declarations(input, 0, true)
}
