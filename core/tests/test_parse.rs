//! Integration tests for the parser. Each test parses a program (or a
//! standalone expression) and checks the AST shape or the reported error.

use pretty_assertions::assert_eq;
use tomo::ast::{Ast, AstNode, BinOp};
use tomo::{parse_expression_str, parse_file_source, parse_type_str};
use tomo::source::SourceFile;

fn parse_program(src: &str) -> AstNode {
    let file = SourceFile::spoof("<test>", src);
    match parse_file_source(&file) {
        Ok(ast) => ast,
        Err(err) => panic!("Failed to parse:\n{src}\nError: {err:#}"),
    }
}

fn expect_parse_error(src: &str, expected_substring: &str) {
    let file = SourceFile::spoof("<test>", src);
    match parse_file_source(&file) {
        Ok(ast) => panic!("Expected a parse error for:\n{src}\nGot: {ast:?}"),
        Err(err) => {
            let message = format!("{err}");
            assert!(
                message.contains(expected_substring),
                "error {message:?} doesn't mention {expected_substring:?}"
            );
        }
    }
}

fn top_statements(ast: &AstNode) -> &[AstNode] {
    match &ast.0 {
        Ast::Block(statements) => statements,
        other => panic!("expected a block, got {other:?}"),
    }
}

#[test]
fn test_declaration() {
    let ast = parse_program("x := 42\n");
    let statements = top_statements(&ast);
    assert_eq!(statements.len(), 1);
    match &statements[0].0 {
        Ast::Declare { var, value } => {
            assert_eq!(var.0, Ast::Var("x".into()));
            assert_eq!(
                value.0,
                Ast::Int { digits: "42".into(), bits: tomo::ast::IntBits::Unspecified }
            );
        }
        other => panic!("expected a declaration, got {other:?}"),
    }
}

#[test]
fn test_source_spans_are_byte_exact() {
    let ast = parse_program("x := 1 + 2\n");
    let statements = top_statements(&ast);
    let span = statements[0].1;
    assert_eq!(span.offset, 0);
    assert_eq!(span.length, "x := 1 + 2".len());
    assert_eq!(span.start_line, 1);
    assert_eq!(span.start_col, 1);
}

#[test]
fn test_operator_precedence() {
    let ast = parse_expression_str("1 + 2 * 3").unwrap();
    match &ast.0 {
        Ast::BinaryOp { op: BinOp::Plus, rhs, .. } => {
            assert!(matches!(rhs.0, Ast::BinaryOp { op: BinOp::Multiply, .. }));
        }
        other => panic!("expected + at the root, got {other:?}"),
    }

    let ast = parse_expression_str("1 * 2 + 3").unwrap();
    match &ast.0 {
        Ast::BinaryOp { op: BinOp::Plus, lhs, .. } => {
            assert!(matches!(lhs.0, Ast::BinaryOp { op: BinOp::Multiply, .. }));
        }
        other => panic!("expected + at the root, got {other:?}"),
    }

    // Comparisons bind looser than arithmetic
    let ast = parse_expression_str("1 + 2 == 3").unwrap();
    assert!(matches!(ast.0, Ast::BinaryOp { op: BinOp::Eq, .. }));

    // Boolean operators are loosest of all
    let ast = parse_expression_str("a == b and c == d").unwrap();
    assert!(matches!(ast.0, Ast::BinaryOp { op: BinOp::And, .. }));

    // Same-tightness operators associate left
    let ast = parse_expression_str("a - b - c").unwrap();
    match &ast.0 {
        Ast::BinaryOp { op: BinOp::Minus, lhs, .. } => {
            assert!(matches!(lhs.0, Ast::BinaryOp { op: BinOp::Minus, .. }));
        }
        other => panic!("expected - at the root, got {other:?}"),
    }
}

#[test]
fn test_minus_disambiguation() {
    // `a-b` and `a - b` subtract...
    assert!(matches!(
        parse_expression_str("a-b").unwrap().0,
        Ast::BinaryOp { op: BinOp::Minus, .. }
    ));
    assert!(matches!(
        parse_expression_str("a - b").unwrap().0,
        Ast::BinaryOp { op: BinOp::Minus, .. }
    ));
    // ...but `a -b` looks like a negative literal argument, so the
    // expression ends after `a`
    assert!(parse_expression_str("a -b").is_err());
}

#[test]
fn test_int_and_num_literals() {
    for (src, digits, bits) in [
        ("123", "123", tomo::ast::IntBits::Unspecified),
        ("0xff", "0xff", tomo::ast::IntBits::Unspecified),
        ("1_000_000", "1000000", tomo::ast::IntBits::Unspecified),
        ("-5", "-5", tomo::ast::IntBits::Unspecified),
        ("7_i32", "7", tomo::ast::IntBits::I32),
        ("42_i8", "42", tomo::ast::IntBits::I8),
    ] {
        match parse_expression_str(src).unwrap().0 {
            Ast::Int { digits: d, bits: b } => {
                assert_eq!(d, digits, "{src}");
                assert_eq!(b, bits, "{src}");
            }
            other => panic!("{src}: expected an int, got {other:?}"),
        }
    }

    match parse_expression_str("1.5").unwrap().0 {
        Ast::Num { value, .. } => assert_eq!(value, 1.5),
        other => panic!("expected a num, got {other:?}"),
    }
    match parse_expression_str("50%").unwrap().0 {
        Ast::Num { value, .. } => assert_eq!(value, 0.5),
        other => panic!("expected a num, got {other:?}"),
    }
    match parse_expression_str("2.5e3").unwrap().0 {
        Ast::Num { value, .. } => assert_eq!(value, 2500.0),
        other => panic!("expected a num, got {other:?}"),
    }
    match parse_expression_str("90deg").unwrap().0 {
        Ast::Num { value, .. } => {
            assert!((value - std::f64::consts::FRAC_PI_2).abs() < 1e-12)
        }
        other => panic!("expected a num, got {other:?}"),
    }
}

#[test]
fn test_interpolated_text_with_custom_quoting() {
    // The motivating example: a custom-quoted JS snippet
    let ast = parse_expression_str("$js<const x = {$name};>").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang, children } => {
            assert_eq!(lang.as_deref(), Some("js"));
            assert_eq!(children.len(), 3);
            assert_eq!(children[0].0, Ast::TextLiteral("const x = {".into()));
            assert_eq!(children[1].0, Ast::Var("name".into()));
            assert_eq!(children[2].0, Ast::TextLiteral("};".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }
}

#[test]
fn test_plain_text_interpolation() {
    let ast = parse_expression_str("\"x = $x!\"").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang: None, children } => {
            assert_eq!(children.len(), 3);
            assert_eq!(children[0].0, Ast::TextLiteral("x = ".into()));
            assert_eq!(children[1].0, Ast::Var("x".into()));
            assert_eq!(children[2].0, Ast::TextLiteral("!".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }

    // Single quotes disable interpolation
    let ast = parse_expression_str("'x = $x!'").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang: None, children } => {
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].0, Ast::TextLiteral("x = $x!".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }

    // `$$` disables interpolation for custom-quoted text
    let ast = parse_expression_str("$$\"cost: $5\"").unwrap();
    match &ast.0 {
        Ast::TextJoin { children, .. } => {
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].0, Ast::TextLiteral("cost: $5".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }
}

#[test]
fn test_custom_interpolation_sigil() {
    let ast = parse_expression_str("$@\"hello @name\"").unwrap();
    match &ast.0 {
        Ast::TextJoin { children, .. } => {
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].0, Ast::TextLiteral("hello ".into()));
            assert_eq!(children[1].0, Ast::Var("name".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }
}

#[test]
fn test_implicit_langs() {
    let ast = parse_expression_str("$/[0-9]+/").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang, children } => {
            assert_eq!(lang.as_deref(), Some("Pattern"));
            assert_eq!(children[0].0, Ast::TextLiteral("[0-9]+".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }

    let ast = parse_expression_str("$(echo hi)").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang, children } => {
            assert_eq!(lang.as_deref(), Some("Shell"));
            assert_eq!(children[0].0, Ast::TextLiteral("echo hi".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }
}

#[test]
fn test_nested_quote_pairs() {
    // The angle brackets nest: only the balanced closer ends the text
    let ast = parse_expression_str("$<a <b> c>").unwrap();
    match &ast.0 {
        Ast::TextJoin { children, .. } => {
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].0, Ast::TextLiteral("a <b> c".into()));
        }
        other => panic!("expected a text join, got {other:?}"),
    }
}

#[test]
fn test_escape_sequences() {
    let ast = parse_expression_str(r"\n\t").unwrap();
    assert_eq!(ast.0, Ast::TextLiteral("\n\t".into()));

    let ast = parse_expression_str(r"\x41").unwrap();
    assert_eq!(ast.0, Ast::TextLiteral("A".into()));

    let ast = parse_expression_str(r"\101").unwrap();
    assert_eq!(ast.0, Ast::TextLiteral("A".into()));

    let ast = parse_expression_str(r"\U[WAVING HAND SIGN]").unwrap();
    assert_eq!(ast.0, Ast::TextLiteral("\u{1F44B}".into()));

    let ast = parse_expression_str(r"\U1F44B").unwrap();
    assert_eq!(ast.0, Ast::TextLiteral("\u{1F44B}".into()));
}

#[test]
fn test_multiline_text_with_continuation() {
    // A `..` line at the opener's indent continues without a newline
    let ast = parse_program("msg := \"hello\n.. world!\"\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::Declare { var, value } => {
            assert_eq!(var.0, Ast::Var("msg".into()));
            match &value.0 {
                Ast::TextJoin { children, .. } => {
                    assert_eq!(children.len(), 1);
                    assert_eq!(
                        children[0].0,
                        Ast::TextLiteral("hello world!".into())
                    );
                }
                other => panic!("expected a text join, got {other:?}"),
            }
        }
        other => panic!("expected a declaration, got {other:?}"),
    }
}

#[test]
fn test_multiline_text_with_indented_contents() {
    let ast = parse_program("msg := \"\n    hello\n    world\n\"\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::Declare { value, .. } => match &value.0 {
            Ast::TextJoin { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].0, Ast::TextLiteral("hello\nworld".into()));
            }
            other => panic!("expected a text join, got {other:?}"),
        },
        other => panic!("expected a declaration, got {other:?}"),
    }
}

#[test]
fn test_unindented_multiline_text_is_an_error() {
    expect_parse_error(
        "msg := \"hello\nworld\"\n",
        "indented or have '..'",
    );
}

#[test]
fn test_path_literals() {
    let ast = parse_expression_str("(/usr/bin)").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang, children } => {
            assert_eq!(lang.as_deref(), Some("Path"));
            assert_eq!(children[0].0, Ast::TextLiteral("/usr/bin".into()));
        }
        other => panic!("expected a path, got {other:?}"),
    }

    let ast = parse_expression_str("(~/docs/$name.txt)").unwrap();
    match &ast.0 {
        Ast::TextJoin { lang, children } => {
            assert_eq!(lang.as_deref(), Some("Path"));
            assert_eq!(children.len(), 3);
            assert_eq!(children[0].0, Ast::TextLiteral("~/docs/".into()));
            assert_eq!(children[1].0, Ast::Var("name".into()));
            assert_eq!(children[2].0, Ast::TextLiteral(".txt".into()));
        }
        other => panic!("expected a path, got {other:?}"),
    }
}

#[test]
fn test_collection_literals() {
    let ast = parse_expression_str("[1, 2, 3]").unwrap();
    match &ast.0 {
        Ast::List { items, item_type: None } => assert_eq!(items.len(), 3),
        other => panic!("expected a list, got {other:?}"),
    }

    let ast = parse_expression_str("[:Int]").unwrap();
    match &ast.0 {
        Ast::List { items, item_type: Some(_) } => assert!(items.is_empty()),
        other => panic!("expected a typed empty list, got {other:?}"),
    }

    let ast = parse_expression_str("{1: 10, 2: 20}").unwrap();
    match &ast.0 {
        Ast::Table { entries, fallback: None, .. } => assert_eq!(entries.len(), 2),
        other => panic!("expected a table, got {other:?}"),
    }

    let ast = parse_expression_str("{1: 10; fallback=t}").unwrap();
    match &ast.0 {
        Ast::Table { fallback: Some(_), .. } => {}
        other => panic!("expected a table with fallback, got {other:?}"),
    }

    let ast = parse_expression_str("{1, 2, 3}").unwrap();
    match &ast.0 {
        Ast::Set { items, .. } => assert_eq!(items.len(), 3),
        other => panic!("expected a set, got {other:?}"),
    }

    let ast = parse_expression_str("{:Int:Text}").unwrap();
    assert!(matches!(&ast.0, Ast::Table { entries, .. } if entries.is_empty()));
}

#[test]
fn test_empty_untyped_list_is_an_error() {
    expect_parse_error("x := []\n", "Empty lists must specify");
}

#[test]
fn test_comprehensions() {
    let ast = parse_expression_str("[x * 2 for x in xs if x > 0]").unwrap();
    match &ast.0 {
        Ast::List { items, .. } => match &items[0].0 {
            Ast::Comprehension { vars, filter, .. } => {
                assert_eq!(vars.len(), 1);
                assert!(filter.is_some());
            }
            other => panic!("expected a comprehension, got {other:?}"),
        },
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn test_reductions() {
    let ast = parse_expression_str("(+) nums").unwrap();
    match &ast.0 {
        Ast::Reduction { combination, fallback: None, .. } => {
            assert!(matches!(
                combination.0,
                Ast::BinaryOp { op: BinOp::Plus, .. }
            ));
        }
        other => panic!("expected a reduction, got {other:?}"),
    }

    let ast = parse_expression_str("(_max_.size) shapes else: 0").unwrap();
    match &ast.0 {
        Ast::Reduction { combination, fallback: Some(_), .. } => {
            assert!(matches!(combination.0, Ast::Max { key: Some(_), .. }));
        }
        other => panic!("expected a reduction, got {other:?}"),
    }
}

#[test]
fn test_suffix_chains() {
    let ast = parse_expression_str("point.x").unwrap();
    assert!(matches!(&ast.0, Ast::FieldAccess { field, .. } if field == "x"));

    let ast = parse_expression_str("xs[1]").unwrap();
    assert!(matches!(ast.0, Ast::Index { unchecked: false, .. }));

    let ast = parse_expression_str("xs[1; unchecked]").unwrap();
    assert!(matches!(ast.0, Ast::Index { unchecked: true, .. }));

    let ast = parse_expression_str("f(1, x=2)").unwrap();
    match &ast.0 {
        Ast::FunctionCall { args, .. } => {
            assert_eq!(args.len(), 2);
            assert!(args[0].name.is_none());
            assert_eq!(args[1].name.as_deref(), Some("x"));
        }
        other => panic!("expected a call, got {other:?}"),
    }

    let ast = parse_expression_str("list:insert(10)").unwrap();
    assert!(matches!(&ast.0, Ast::MethodCall { name, .. } if name == "insert"));

    let ast = parse_expression_str("maybe?").unwrap();
    assert!(matches!(ast.0, Ast::Optional(_)));

    // A chain applies left to right
    let ast = parse_expression_str("a.b[1]:c(2)").unwrap();
    assert!(matches!(ast.0, Ast::MethodCall { .. }));
}

#[test]
fn test_prefix_operators() {
    let ast = parse_expression_str("not done").unwrap();
    assert!(matches!(ast.0, Ast::Not(_)));

    let ast = parse_expression_str("-x").unwrap();
    assert!(matches!(ast.0, Ast::Negative(_)));

    let ast = parse_expression_str("@point.x").unwrap();
    // `@` consumes the suffix chain of the following term
    assert!(matches!(ast.0, Ast::HeapAllocate(_)));

    let ast = parse_expression_str("&value").unwrap();
    assert!(matches!(ast.0, Ast::StackReference(_)));

    let ast = parse_expression_str("!Int").unwrap();
    assert!(matches!(ast.0, Ast::None(_)));
}

#[test]
fn test_min_max_operators() {
    let ast = parse_expression_str("a _min_ b").unwrap();
    assert!(matches!(ast.0, Ast::Min { key: None, .. }));

    let ast = parse_expression_str("a _max_.size b").unwrap();
    match &ast.0 {
        Ast::Max { key: Some(key), .. } => {
            assert!(matches!(&key.0, Ast::FieldAccess { field, .. } if field == "size"));
        }
        other => panic!("expected a keyed max, got {other:?}"),
    }
}

#[test]
fn test_control_flow() {
    let ast = parse_program(
        "func main():\n    if x > 1:\n        pass\n    else:\n        pass\n",
    );
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => {
                assert!(matches!(
                    body_statements[0].0,
                    Ast::If { else_body: Some(_), .. }
                ));
            }
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }

    let ast = parse_program(
        "func main():\n    for k, v in table:\n        pass\n    while x < 10:\n        x += 1\n    repeat:\n        stop if done\n",
    );
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => {
                assert_eq!(body_statements.len(), 3);
                assert!(
                    matches!(&body_statements[0].0, Ast::For { vars, .. } if vars.len() == 2)
                );
                assert!(matches!(
                    body_statements[1].0,
                    Ast::While { condition: Some(_), .. }
                ));
                assert!(matches!(body_statements[2].0, Ast::Repeat { .. }));
            }
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_when_clauses() {
    let ast = parse_program(
        "func main():\n    when shape\n    is Circle(r):\n        pass\n    is Point:\n        pass\n    else:\n        pass\n",
    );
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => match &body_statements[0].0 {
                Ast::When { clauses, else_body, .. } => {
                    assert_eq!(clauses.len(), 2);
                    assert_eq!(clauses[0].args.len(), 1);
                    assert!(else_body.is_some());
                }
                other => panic!("expected a when, got {other:?}"),
            },
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_assignments() {
    let ast = parse_program("func main():\n    a, b = 1, 2\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => match &body_statements[0].0 {
                Ast::Assign { targets, values } => {
                    assert_eq!(targets.len(), 2);
                    assert_eq!(values.len(), 2);
                }
                other => panic!("expected an assignment, got {other:?}"),
            },
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }

    let ast = parse_program("func main():\n    x += 1\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => {
                assert!(matches!(
                    body_statements[0].0,
                    Ast::UpdateAssign { op: BinOp::Plus, .. }
                ));
            }
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_struct_and_enum_definitions() {
    let ast = parse_program("struct Point(x:Num, y:Num)\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::StructDef { name, fields, secret, .. } => {
            assert_eq!(name, "Point");
            assert_eq!(fields.len(), 2);
            assert!(!secret);
        }
        other => panic!("expected a struct def, got {other:?}"),
    }

    let ast = parse_program("enum Shape(Point, Circle(radius:Num), Square(size:Num)=5)\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::EnumDef { name, tags, .. } => {
            assert_eq!(name, "Shape");
            assert_eq!(tags.len(), 3);
            assert_eq!(tags[0].value, 0);
            assert_eq!(tags[1].value, 1);
            assert_eq!(tags[2].value, 5);
            assert_eq!(tags[1].fields.len(), 1);
        }
        other => panic!("expected an enum def, got {other:?}"),
    }
}

#[test]
fn test_duplicate_enum_tag_values_are_an_error() {
    expect_parse_error("enum Bad(A=1, B=1)\n", "duplicate");
}

#[test]
fn test_function_definition_modifiers() {
    let ast = parse_program("func fib(n:Int; cached)->Int:\n    return n\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { cache, is_inline, ret_type, .. } => {
            assert!(cache.is_some());
            assert!(!is_inline);
            assert!(ret_type.is_some());
        }
        other => panic!("expected a function def, got {other:?}"),
    }

    let ast = parse_program("func tiny(; inline):\n    pass\n");
    let statements = top_statements(&ast);
    assert!(matches!(
        statements[0].0,
        Ast::FunctionDef { is_inline: true, .. }
    ));
}

#[test]
fn test_shared_type_parameter_batches() {
    let ast = parse_program("func add(x, y : Int)->Int:\n    return x\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { args, .. } => {
            assert_eq!(args.len(), 2);
            assert_eq!(args[0].name.as_deref(), Some("x"));
            assert_eq!(args[1].name.as_deref(), Some("y"));
            assert!(args[0].ty.is_some());
            assert!(args[1].ty.is_some());
        }
        other => panic!("expected a function def, got {other:?}"),
    }
}

#[test]
fn test_use_classification() {
    use tomo::ast::UseKind;
    for (src, expected) in [
        ("m := use ./sibling.tm\n", UseKind::Local),
        ("m := use mymodule\n", UseKind::Module),
        ("m := use libfoo.so\n", UseKind::SharedObject),
        ("m := use <stdio.h>\n", UseKind::Header),
    ] {
        let ast = parse_program(src);
        let statements = top_statements(&ast);
        match &statements[0].0 {
            Ast::Declare { value, .. } => match &value.0 {
                Ast::Use { what, .. } => assert_eq!(*what, expected, "{src}"),
                other => panic!("{src}: expected a use, got {other:?}"),
            },
            other => panic!("{src}: expected a declaration, got {other:?}"),
        }
    }
}

#[test]
fn test_top_level_only_forms() {
    expect_parse_error(
        "func main():\n    use foo\n",
        "only allowed at the top level",
    );
    expect_parse_error(
        "func main():\n    struct Point(x:Num)\n",
        "only allowed at the top level",
    );
}

#[test]
fn test_indentation_must_be_four_spaces() {
    expect_parse_error(
        "func main():\n   pass\n",
        "multiple of 4 spaces",
    );
}

#[test]
fn test_mixing_tabs_and_spaces_is_an_error() {
    expect_parse_error(
        "func main():\n    \tpass\n",
        "can't mix tabs and spaces",
    );
}

#[test]
fn test_doctests_and_print_statements() {
    let ast = parse_program("func main():\n    >> 1 + 2\n    = 3\n    !! sum is $total\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => {
                match &body_statements[0].0 {
                    Ast::DocTest { output, .. } => {
                        assert_eq!(output.as_deref(), Some("3"));
                    }
                    other => panic!("expected a doctest, got {other:?}"),
                }
                match &body_statements[1].0 {
                    Ast::PrintStatement(chunks) => {
                        assert_eq!(chunks.len(), 2);
                        assert_eq!(chunks[0].0, Ast::TextLiteral("sum is ".into()));
                        assert_eq!(chunks[1].0, Ast::Var("total".into()));
                    }
                    other => panic!("expected a print statement, got {other:?}"),
                }
            }
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_linker_and_extern_and_inline_c() {
    let ast = parse_program("!link -lm\nextern sqrt:func(n:Num)->Num\n");
    let statements = top_statements(&ast);
    assert!(matches!(&statements[0].0, Ast::LinkerDirective(d) if d == "-lm"));
    assert!(matches!(&statements[1].0, Ast::Extern { name, .. } if name == "sqrt"));
}

#[test]
fn test_lambda() {
    let ast = parse_expression_str("func(x:Int): x").unwrap();
    match &ast.0 {
        Ast::Lambda { args, .. } => assert_eq!(args.len(), 1),
        other => panic!("expected a lambda, got {other:?}"),
    }
}

#[test]
fn test_namespaces() {
    let ast = parse_program(
        "struct Point(x:Num, y:Num):\n    zero := Point(0, 0)\n    func dot(a:Point, b:Point)->Num:\n        return a.x\n",
    );
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::StructDef { namespace, .. } => match &namespace.0 {
            Ast::Block(ns_statements) => {
                assert_eq!(ns_statements.len(), 2);
                assert!(matches!(ns_statements[0].0, Ast::Declare { .. }));
                assert!(matches!(ns_statements[1].0, Ast::FunctionDef { .. }));
            }
            other => panic!("expected a namespace block, got {other:?}"),
        },
        other => panic!("expected a struct def, got {other:?}"),
    }
}

#[test]
fn test_type_annotations() {
    assert!(parse_type_str("Int").is_ok());
    assert!(parse_type_str("[Int]").is_ok());
    assert!(parse_type_str("{Text:Int}").is_ok());
    assert!(parse_type_str("{Int}").is_ok());
    assert!(parse_type_str("@Point").is_ok());
    assert!(parse_type_str("&Point?").is_ok());
    assert!(parse_type_str("func(x:Int)->Num").is_ok());
    assert!(parse_type_str("Foo.Bar").is_ok());
    assert!(parse_type_str("[{Text:Int}?]").is_ok());
}

#[test]
fn test_shebang_is_skipped() {
    let ast = parse_program("#!/usr/bin/env tomo\nx := 1\n");
    assert_eq!(top_statements(&ast).len(), 1);
}

#[test]
fn test_comments_are_skipped() {
    let ast = parse_program("# a comment\nx := 1 # trailing\ny := 2\n");
    assert_eq!(top_statements(&ast).len(), 2);
}

#[test]
fn test_inline_block() {
    let ast = parse_program("func main():\n    if yes: x := 1; y := 2\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => match &body_statements[0].0 {
                Ast::If { body, .. } => match &body.0 {
                    Ast::Block(inline) => assert_eq!(inline.len(), 2),
                    other => panic!("expected an inline block, got {other:?}"),
                },
                other => panic!("expected an if, got {other:?}"),
            },
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_conditional_statement_suffixes() {
    let ast = parse_program("func main():\n    return 1 if done\n");
    let statements = top_statements(&ast);
    match &statements[0].0 {
        Ast::FunctionDef { body, .. } => match &body.0 {
            Ast::Block(body_statements) => {
                // `return 1 if done` wraps the return in a conditional
                assert!(matches!(body_statements[0].0, Ast::If { .. }));
            }
            other => panic!("expected a block, got {other:?}"),
        },
        other => panic!("expected a function, got {other:?}"),
    }
}
