//! Integration tests for programs that type-check but fail at run time.

use prescribe::config::RunConfig;
use prescribe::{run_source, ErrorKind, WhitespaceTokenizer};

fn expect_runtime_error(src: &str, kind: ErrorKind, line: usize) {
    let mut input = WhitespaceTokenizer::new("");
    let err = run_source(src, &mut input, &RunConfig::default())
        .err()
        .unwrap_or_else(|| panic!("expected a runtime error, program ran to completion"));
    assert_eq!(err.kind, kind, "{}", err);
    assert_eq!(err.line, line, "{}", err);
}

#[test]
fn scenario_d_null_pointer_dereference() {
    let src = "PROGRAM P\n  DECLARE P : POINTER TO INTEGER\n  P <- NULL\n  OUTPUT ^P\nENDPROGRAM\n";
    expect_runtime_error(src, ErrorKind::RuntimeError, 4);
}

#[test]
fn property_no_observed_integer_outside_i32_range() {
    let src = "PROGRAM P\n  DECLARE X : INTEGER\n  X <- 2147483647\n  X <- X + 1\nENDPROGRAM\n";
    expect_runtime_error(src, ErrorKind::RangeError, 4);
}

#[test]
fn null_class_reference_method_call_is_a_runtime_error() {
    let src = r#"
PROGRAM P
  CLASS Animal
    PUBLIC
    FUNCTION Speak() RETURNS STRING
      RETURN "base"
    ENDFUNCTION
  ENDCLASS

  DECLARE A : Animal
  A <- NULL
  OUTPUT A.Speak()
ENDPROGRAM
"#;
    expect_runtime_error(src, ErrorKind::RuntimeError, 12);
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let src = "PROGRAM P\n  OUTPUT 1 DIV 0\nENDPROGRAM\n";
    expect_runtime_error(src, ErrorKind::RuntimeError, 2);
}

#[test]
fn array_index_out_of_bounds_is_a_range_error() {
    let src = "PROGRAM P\n  DECLARE A : ARRAY[1:3] OF INTEGER\n  OUTPUT A[5]\nENDPROGRAM\n";
    expect_runtime_error(src, ErrorKind::RangeError, 3);
}
