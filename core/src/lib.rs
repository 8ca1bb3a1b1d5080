//! Prescribe/Lucid: lexer, parser, semantic analyzer, and tree-walking
//! interpreter for a small statically typed pedagogical language styled
//! after Cambridge A-Level pseudocode.
//!
//! The public surface is deliberately small: [`run_source`] drives the
//! whole pipeline (lex → parse → check → interpret) over one source string
//! and an [`interp::InputSource`], producing either the program's stdout
//! text or the single diagnostic line the external interface contract
//! requires. [`container`] splits a `.prsd` document into the independent
//! blocks that get run this way; the `cli` crate is the thin shell that
//! wires both together over real files and stdio.

#![deny(unused_must_use)]

#[macro_use]
extern crate validator_derive;

pub mod ast;
pub mod checker;
pub mod config;
pub mod consteval;
pub mod container;
pub mod date;
pub mod error;
pub mod fileio;
pub mod interp;
pub mod lexer;
pub mod numeric;
pub mod parser;
pub mod stdlib;
pub mod store;
pub mod symbol;
pub mod token;
pub mod types;
pub mod util;
pub mod value;

pub use config::{Valid, RunConfig};
pub use error::{ErrorKind, PrResult, PrescribeError};
pub use interp::{InputSource, RunOutcome, WhitespaceTokenizer};
pub use validator; // consumers implementing their own Valid<T>-backed specs may need this

/// Runs the full pipeline over one Prescribe source block: lex, parse,
/// check, then interpret against `input`, producing the program's output
/// or the first diagnostic raised by any phase.
pub fn run_source(
    source: &str,
    input: &mut dyn InputSource,
    config: &RunConfig,
) -> PrResult<RunOutcome> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse(&tokens)?;
    interp::run(&program, input, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_source_end_to_end() {
        let src = "PROGRAM P\n  OUTPUT \"hi\"\nENDPROGRAM\n";
        let mut input = WhitespaceTokenizer::new("");
        let outcome = run_source(src, &mut input, &RunConfig::default()).unwrap();
        assert_eq!(outcome.output, "hi\n");
    }

    #[test]
    fn test_run_source_reports_syntax_error() {
        let src = "PROGRAM P\n  OUTPUT\nENDPROGRAM\n";
        let mut input = WhitespaceTokenizer::new("");
        let err = run_source(src, &mut input, &RunConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }
}
