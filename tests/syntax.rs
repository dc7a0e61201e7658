use calla::{
    ast::{CaptureMode, CaptureSpec, ExprKind, StmtKind, TypeExprKind},
    diagnostics::DiagnosticKind,
    lexer::{Lexer, TokenKind},
    parser::parse_program,
};

fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::new(source)
        .tokenize()
        .expect("lexing should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn lexes_capture_list_tokens() {
    assert_eq!(
        kinds("[&x, y](n: int) -> int"),
        vec![
            TokenKind::LBracket,
            TokenKind::Ampersand,
            TokenKind::Identifier,
            TokenKind::Comma,
            TokenKind::Identifier,
            TokenKind::RBracket,
            TokenKind::LParen,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn distinguishes_single_and_double_operators() {
    assert_eq!(
        kinds("= == & && | || ! !="),
        vec![
            TokenKind::Assign,
            TokenKind::EqualEqual,
            TokenKind::Ampersand,
            TokenKind::DoubleAmpersand,
            TokenKind::Pipe,
            TokenKind::DoublePipe,
            TokenKind::Bang,
            TokenKind::BangEqual,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn skips_nested_block_comments() {
    assert_eq!(
        kinds("1 /* outer /* inner */ still */ 2"),
        vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let err = Lexer::new("\"oops").tokenize().expect_err("should fail");
    assert_eq!(err.kind, DiagnosticKind::Lexer);
}

#[test]
fn splits_float_and_int_literals() {
    let tokens = Lexer::new("1.5 15").tokenize().expect("lex");
    assert_eq!(tokens[0].lexeme, "1.5");
    assert_eq!(tokens[1].lexeme, "15");
}

#[test]
fn parses_lambda_with_mixed_captures() {
    let program = parse_program("var f = [a, &b](n: int) mut -> int { return n; };")
        .expect("parse should succeed");
    let StmtKind::VarDecl {
        initializer: Some(init),
        ..
    } = &program.items[0].kind
    else {
        panic!("expected var declaration");
    };
    let ExprKind::Lambda(lambda) = &init.kind else {
        panic!("expected lambda initializer");
    };
    assert!(lambda.mutable);
    assert_eq!(lambda.captures.len(), 2);
    assert!(matches!(
        lambda.captures[0],
        CaptureSpec::Named {
            mode: CaptureMode::ByValue,
            ..
        }
    ));
    assert!(matches!(
        lambda.captures[1],
        CaptureSpec::Named {
            mode: CaptureMode::ByReference,
            ..
        }
    ));
}

#[test]
fn rejects_capture_all_mixed_with_named() {
    let err = parse_program("var f = [=, x]() { };").expect_err("should fail");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("capture-all"));
}

#[test]
fn parses_box_type_annotation() {
    let program = parse_program("var mut op: box fn(int) -> int;").expect("parse");
    let StmtKind::VarDecl {
        mutable,
        annotation: Some(annotation),
        initializer,
        ..
    } = &program.items[0].kind
    else {
        panic!("expected var declaration");
    };
    assert!(*mutable);
    assert!(initializer.is_none());
    assert!(matches!(annotation.kind, TypeExprKind::BoxFn { .. }));
}

#[test]
fn rejects_nested_function_declarations() {
    let err = parse_program("fn outer() { fn inner() { } }").expect_err("should fail");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("top level"));
}

#[test]
fn functor_declares_fields_and_params() {
    let program = parse_program("functor Adder(total: int)(n: int) -> int { return total; }")
        .expect("parse");
    let StmtKind::Functor(decl) = &program.items[0].kind else {
        panic!("expected functor declaration");
    };
    assert_eq!(decl.name, "Adder");
    assert_eq!(decl.fields.len(), 1);
    assert_eq!(decl.params.len(), 1);
}
