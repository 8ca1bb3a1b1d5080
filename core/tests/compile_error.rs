//! Integration tests for programs that fail before execution begins: lexer,
//! parser, or checker diagnostics.

use prescribe::config::RunConfig;
use prescribe::{run_source, ErrorKind, WhitespaceTokenizer};

fn expect_error(src: &str, kind: ErrorKind) {
    let mut input = WhitespaceTokenizer::new("");
    let err = run_source(src, &mut input, &RunConfig::default())
        .err()
        .unwrap_or_else(|| panic!("expected a diagnostic, program ran to completion"));
    assert_eq!(err.kind, kind, "{}", err);
}

#[test]
fn unterminated_string_literal_is_a_syntax_error() {
    let src = "PROGRAM P\n  OUTPUT \"unterminated\nENDPROGRAM\n";
    expect_error(src, ErrorKind::SyntaxError);
}

#[test]
fn missing_endprogram_is_a_syntax_error() {
    let src = "PROGRAM P\n  OUTPUT 1\n";
    expect_error(src, ErrorKind::SyntaxError);
}

#[test]
fn use_of_undeclared_name_is_a_name_error() {
    let src = "PROGRAM P\n  OUTPUT Undeclared\nENDPROGRAM\n";
    expect_error(src, ErrorKind::NameError);
}

#[test]
fn assigning_string_to_integer_is_a_type_error() {
    let src = "PROGRAM P\n  DECLARE X : INTEGER\n  X <- \"hello\"\nENDPROGRAM\n";
    expect_error(src, ErrorKind::TypeError);
}

#[test]
fn for_next_name_mismatch_is_a_syntax_error() {
    let src = "PROGRAM P\n  FOR I <- 1 TO 3\n    OUTPUT I\n  NEXT J\nENDPROGRAM\n";
    expect_error(src, ErrorKind::SyntaxError);
}

#[test]
fn calling_a_function_with_wrong_arity_is_a_type_error() {
    let src = r#"
PROGRAM P
  FUNCTION Add(A : INTEGER, B : INTEGER) RETURNS INTEGER
    RETURN A + B
  ENDFUNCTION

  OUTPUT Add(1)
ENDPROGRAM
"#;
    expect_error(src, ErrorKind::TypeError);
}

#[test]
fn byref_argument_requires_an_lvalue() {
    let src = r#"
PROGRAM P
  PROCEDURE Inc(BYREF X : INTEGER)
    X <- X + 1
  ENDPROCEDURE

  CALL Inc(5)
ENDPROGRAM
"#;
    expect_error(src, ErrorKind::TypeError);
}
