//! Integration tests for programs that run to completion, covering
//! `spec.md` §8's concrete end-to-end scenarios and the universal
//! properties that are most naturally exercised as whole programs.

use prescribe::config::RunConfig;
use prescribe::{run_source, WhitespaceTokenizer};

/// Runs `src` against `stdin`, expecting it to complete; panics with the
/// diagnostic otherwise.
fn expect_output(src: &str, stdin: &str, expected: &str) {
    let mut input = WhitespaceTokenizer::new(stdin);
    let outcome = run_source(src, &mut input, &RunConfig::default())
        .unwrap_or_else(|e| panic!("expected success, got: {}", e));
    assert_eq!(outcome.output, expected);
}

#[test]
fn scenario_a_average_of_n_scores() {
    let src = r#"
PROGRAM AverageScores
  DECLARE Count : INTEGER
  DECLARE Sum   : INTEGER
  DECLARE Score : INTEGER
  DECLARE Avg   : REAL
  Sum <- 0
  INPUT Count
  FOR i <- 1 TO Count
    INPUT Score
    Sum <- Sum + Score
  NEXT i
  Avg <- REAL(Sum) / REAL(Count)
  OUTPUT "Average = " & STRING(Avg)
ENDPROGRAM
"#;
    expect_output(src, "3 10 20 30", "Average = 20\n");
}

#[test]
fn scenario_b_euclidean_mod_of_negative_dividend() {
    let src = "PROGRAM P\n  OUTPUT -7 MOD 3\nENDPROGRAM\n";
    expect_output(src, "", "2\n");
}

#[test]
fn scenario_c_boolean_operators_do_not_short_circuit() {
    let src = r#"
PROGRAM P
  DECLARE Count : INTEGER
  Count <- 0

  FUNCTION F() RETURNS BOOLEAN
    Count <- Count + 1
    RETURN FALSE
  ENDFUNCTION

  FUNCTION G() RETURNS BOOLEAN
    Count <- Count + 1
    RETURN FALSE
  ENDFUNCTION

  DECLARE Dummy : BOOLEAN
  Dummy <- F() AND G()
  OUTPUT Count
ENDPROGRAM
"#;
    expect_output(src, "", "2\n");
}

#[test]
fn scenario_e_virtual_dispatch_through_inheritance() {
    let src = r#"
PROGRAM P
  CLASS Animal
    PUBLIC
    FUNCTION Speak() RETURNS STRING
      RETURN "base"
    ENDFUNCTION
  ENDCLASS

  CLASS Dog EXTENDS Animal
    PUBLIC
    FUNCTION Speak() RETURNS STRING
      RETURN "woof"
    ENDFUNCTION
  ENDCLASS

  DECLARE A : Animal
  A <- NEW Dog()
  OUTPUT A.Speak()
ENDPROGRAM
"#;
    expect_output(src, "", "woof\n");
}

#[test]
fn scenario_f_random_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "prescribe_integration_round_trip_{}.dat",
        std::process::id()
    ));
    let path_str = path.to_str().unwrap().replace('\\', "\\\\");
    let src = format!(
        r#"
PROGRAM P
  TYPE Rec = RECORD
    N : INTEGER
    D : DATE
  ENDRECORD

  DECLARE F : RANDOMFILE OF Rec
  DECLARE R : Rec
  OPENFILE(F, "{}", "RANDOM")
  R.N <- 7
  R.D <- DATE("2024-02-29")
  SEEK(F, 1)
  PUTRECORD(F, R)
  CLOSEFILE(F)
  OPENFILE(F, "{}", "RANDOM")
  SEEK(F, 1)
  GETRECORD(F, R)
  CLOSEFILE(F)
  OUTPUT STRING(R.N) & " " & STRING(R.D)
ENDPROGRAM
"#,
        path_str, path_str
    );
    expect_output(&src, "", "7 2024-02-29\n");
    std::fs::remove_file(&path).ok();
}

#[test]
fn property_array_assignment_copies_scalars() {
    let src = r#"
PROGRAM P
  DECLARE A : ARRAY[1:3] OF INTEGER
  DECLARE B : ARRAY[1:3] OF INTEGER
  A[1] <- 1
  A[2] <- 2
  A[3] <- 3
  B <- A
  A[1] <- 99
  OUTPUT B[1]
ENDPROGRAM
"#;
    expect_output(src, "", "1\n");
}

#[test]
fn property_case_stops_at_first_match() {
    let src = r#"
PROGRAM P
  DECLARE X : INTEGER
  X <- 2
  CASE OF X
    1 : OUTPUT "one"
    2 : OUTPUT "two"
    OTHERWISE : OUTPUT "other"
  ENDCASE
ENDPROGRAM
"#;
    expect_output(src, "", "two\n");
}

#[test]
fn property_for_loop_zero_trip_when_start_exceeds_end() {
    let src = r#"
PROGRAM P
  DECLARE I : INTEGER
  DECLARE Ran : INTEGER
  Ran <- 0
  FOR I <- 5 TO 1
    Ran <- Ran + 1
  NEXT I
  OUTPUT Ran
ENDPROGRAM
"#;
    expect_output(src, "", "0\n");
}

#[test]
fn property_deterministic_prng_matches_first_lcg_state() {
    let src = "PROGRAM P\n  OUTPUT RAND()\nENDPROGRAM\n";
    let expected_state = (1_103_515_245u64 * 1 + 12_345) % (1u64 << 31);
    let expected = expected_state as f64 / (1u64 << 31) as f64;
    let mut input = WhitespaceTokenizer::new("");
    let outcome = run_source(src, &mut input, &RunConfig::default()).unwrap();
    let got: f64 = outcome.output.trim().parse().unwrap();
    assert!((got - expected).abs() < 1e-9);
}
