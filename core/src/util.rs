//! Source spans and small formatting helpers shared across the pipeline.

use std::fmt::{self, Display, Formatter};

/// Macro that wraps a body, executing it only when `DEBUG=true` is set in
/// the environment. Compiles away entirely in release builds.
///
/// ```
/// use prescribe::debug;
/// debug!(println!("Hello!"));
/// ```
#[macro_export]
macro_rules! debug {
    ($arg:expr) => {
        #[cfg(debug_assertions)]
        {
            if let Ok(debug_val) = std::env::var("DEBUG") {
                if debug_val.to_lowercase().as_str() == "true" {
                    $arg
                }
            }
        }
    };
}

/// The location of some piece of source code, from one line/column to
/// another (inclusive start, exclusive end column, following the lexer's
/// own cursor convention).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    /// A zero-width span at the given line, used for synthetic nodes (e.g.
    /// default-initialized values) that don't come from a specific bit of
    /// source text.
    pub fn at_line(line: usize) -> Self {
        Self {
            start_line: line,
            start_col: 1,
            end_line: line,
            end_col: 1,
        }
    }

    /// Merge two spans into one spanning from the start of `self` to the end
    /// of `other`.
    pub fn to(&self, other: Span) -> Span {
        Span {
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} to {}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

/// A generic container pairing a piece of AST/token data with its source
/// [Span]. Every node in the lexer/parser/checker pipeline carries one of
/// these so diagnostics can always point back at source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned::new(f(self.value), self.span)
    }

    pub fn as_ref(&self) -> Spanned<&T> {
        Spanned::new(&self.value, self.span)
    }
}

/// Renders the line of `src` that `span` starts on, followed by a `^^^`
/// underline beneath the spanned columns. Used for `{:#}`-alternate
/// formatting of diagnostics in tools that want more than the one-line
/// summary (e.g. an editor integration); the CLI itself only prints the
/// summary line per the external interface contract.
pub fn fmt_src_highlights(
    f: &mut Formatter<'_>,
    span: &Span,
    src: &str,
) -> fmt::Result {
    if let Some(line) = src.lines().nth(span.start_line.saturating_sub(1)) {
        writeln!(f)?;
        writeln!(f, "{}", line)?;
        let start_col = span.start_col.saturating_sub(1);
        let width = if span.start_line == span.end_line {
            span.end_col.saturating_sub(span.start_col).max(1)
        } else {
            1
        };
        write!(f, "{}{}", " ".repeat(start_col), "^".repeat(width))?;
    }
    Ok(())
}
