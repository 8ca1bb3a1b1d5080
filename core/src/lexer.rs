//! Turns Prescribe source text into a [Vec<Token>]. Grounded on
//! `gdlk::parse`'s use of `nom`/`nom_locate` to track line/column while
//! recognizing lexical primitives (digits, identifiers, quoted strings);
//! unlike the teacher (which lexes and parses in a single nom pass, fine for
//! its one-instruction-per-line grammar), this spec keeps lexing as its own
//! standalone component, returning a flat token vector for the
//! recursive-descent parser to consume.

use crate::{
    error::PrescribeError,
    token::{Token, TokenKind, ARROW_CHAR, KEYWORDS, OPERATORS},
    util::Span,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, one_of},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{pair, tuple},
    IResult,
};
use nom_locate::LocatedSpan;

type RawSpan<'a> = LocatedSpan<&'a str>;
type LResult<'a, T> = IResult<RawSpan<'a>, T>;

const MAX_IDENT_LEN: usize = 64;

fn span_of(start: RawSpan, end: RawSpan) -> Span {
    Span {
        start_line: start.location_line() as usize,
        start_col: start.get_column(),
        end_line: end.location_line() as usize,
        end_col: end.get_column(),
    }
}

/// Skips whitespace and `//` line comments. Always succeeds (may consume
/// nothing).
fn skip_trivia(mut input: RawSpan) -> RawSpan {
    loop {
        let start_len = input.fragment().len();
        // whitespace
        while let Some(c) = input.fragment().chars().next() {
            if c.is_whitespace() {
                input = take_one(input);
            } else {
                break;
            }
        }
        // comment
        if input.fragment().starts_with("//") {
            while let Some(c) = input.fragment().chars().next() {
                if c == '\n' {
                    break;
                }
                input = take_one(input);
            }
        }
        if input.fragment().len() == start_len {
            return input;
        }
    }
}

/// Advances the cursor by exactly one `char` (not byte), keeping
/// `nom_locate`'s line/column bookkeeping intact.
fn take_one(input: RawSpan) -> RawSpan {
    let c_len = input
        .fragment()
        .chars()
        .next()
        .map(|c| c.len_utf8())
        .unwrap_or(0);
    if c_len == 0 {
        return input;
    }
    input.slice_from(c_len)
}

// `LocatedSpan` doesn't expose a direct "slice from byte offset" helper in
// the public API we rely on here, so we implement it via `nom`'s `Slice`.
trait SliceFrom<'a> {
    fn slice_from(self, n: usize) -> RawSpan<'a>;
}

impl<'a> SliceFrom<'a> for RawSpan<'a> {
    fn slice_from(self, n: usize) -> RawSpan<'a> {
        use nom::Slice;
        self.slice(n..)
    }
}

fn ident_raw(input: RawSpan) -> LResult<RawSpan> {
    recognize(pair(alpha1, many0(alt((alphanumeric1, tag("_"))))))(input)
}

/// Recognizes a full numeric literal (integer or real) and reports whether a
/// fractional part or exponent was present.
fn number_raw(input: RawSpan) -> LResult<(RawSpan, bool)> {
    let (rest, (_, frac, exp)) = tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input)?;
    let is_real = frac.is_some() || exp.is_some();
    Ok((rest, (rest, is_real)))
}

/// Decodes the escape sequences shared by string and char literals. `raw` is
/// the literal's content between the quotes (already stripped of them).
/// Returns `None` on an invalid escape or a non-ASCII unescaped byte.
fn decode_escapes(raw: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                '\'' => out.push('\''),
                'x' => {
                    let h1 = chars.next()?;
                    let h2 = chars.next()?;
                    let byte = u8::from_str_radix(&format!("{}{}", h1, h2), 16).ok()?;
                    out.push(byte as char);
                }
                _ => return None,
            }
        } else if c.is_ascii() {
            out.push(c);
        } else {
            return None;
        }
    }
    Some(out)
}

/// Lexes the whole source buffer into a flat token vector, terminated by a
/// single [TokenKind::Eof] token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, PrescribeError> {
    let mut input = RawSpan::new(source);
    let mut tokens = Vec::new();

    loop {
        input = skip_trivia(input);
        if input.fragment().is_empty() {
            tokens.push(Token::new(
                TokenKind::Eof,
                Span::at_line(input.location_line() as usize),
            ));
            return Ok(tokens);
        }

        let start = input;
        let c = input.fragment().chars().next().unwrap();

        // String literal
        if c == '"' {
            let after_quote = take_one(input);
            let mut cursor = after_quote;
            let mut raw = String::new();
            loop {
                match cursor.fragment().chars().next() {
                    None => {
                        return Err(PrescribeError::syntax(
                            start.location_line() as usize,
                            "unterminated string literal",
                        ))
                    }
                    Some('"') => {
                        cursor = take_one(cursor);
                        break;
                    }
                    Some('\\') => {
                        raw.push('\\');
                        cursor = take_one(cursor);
                        if let Some(nc) = cursor.fragment().chars().next() {
                            raw.push(nc);
                            cursor = take_one(cursor);
                            if nc == 'x' {
                                for _ in 0..2 {
                                    if let Some(hc) = cursor.fragment().chars().next() {
                                        raw.push(hc);
                                        cursor = take_one(cursor);
                                    }
                                }
                            }
                        }
                    }
                    Some(other) => {
                        raw.push(other);
                        cursor = take_one(cursor);
                    }
                }
            }
            let decoded = decode_escapes(&raw).ok_or_else(|| {
                PrescribeError::syntax(
                    start.location_line() as usize,
                    "invalid escape sequence or non-ASCII character in string literal",
                )
            })?;
            let span = span_of(start, cursor);
            tokens.push(Token::new(TokenKind::Str(decoded), span));
            input = cursor;
            continue;
        }

        // Char literal
        if c == '\'' {
            let after_quote = take_one(input);
            let mut cursor = after_quote;
            let mut raw = String::new();
            loop {
                match cursor.fragment().chars().next() {
                    None => {
                        return Err(PrescribeError::syntax(
                            start.location_line() as usize,
                            "unterminated char literal",
                        ))
                    }
                    Some('\'') => {
                        cursor = take_one(cursor);
                        break;
                    }
                    Some('\\') => {
                        raw.push('\\');
                        cursor = take_one(cursor);
                        if let Some(nc) = cursor.fragment().chars().next() {
                            raw.push(nc);
                            cursor = take_one(cursor);
                            if nc == 'x' {
                                for _ in 0..2 {
                                    if let Some(hc) = cursor.fragment().chars().next() {
                                        raw.push(hc);
                                        cursor = take_one(cursor);
                                    }
                                }
                            }
                        }
                    }
                    Some(other) => {
                        raw.push(other);
                        cursor = take_one(cursor);
                    }
                }
            }
            let decoded = decode_escapes(&raw).ok_or_else(|| {
                PrescribeError::syntax(
                    start.location_line() as usize,
                    "invalid escape sequence or non-ASCII character in char literal",
                )
            })?;
            let mut it = decoded.chars();
            let single = match (it.next(), it.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(PrescribeError::syntax(
                        start.location_line() as usize,
                        "char literal must contain exactly one code point",
                    ))
                }
            };
            let span = span_of(start, cursor);
            tokens.push(Token::new(TokenKind::Char(single), span));
            input = cursor;
            continue;
        }

        // Identifier / keyword / boolean literal
        if c.is_alphabetic() {
            let (rest, raw) = ident_raw(input).map_err(|_| {
                PrescribeError::syntax(start.location_line() as usize, "invalid identifier")
            })?;
            let text = *raw.fragment();
            if text.len() > MAX_IDENT_LEN {
                return Err(PrescribeError::syntax(
                    start.location_line() as usize,
                    format!(
                        "identifier `{}` exceeds the maximum length of {} characters",
                        text, MAX_IDENT_LEN
                    ),
                ));
            }
            let upper = text.to_ascii_uppercase();
            let span = span_of(start, rest);
            let kind = if upper == "TRUE" {
                TokenKind::Bool(true)
            } else if upper == "FALSE" {
                TokenKind::Bool(false)
            } else if KEYWORDS.contains(&upper.as_str()) {
                TokenKind::Keyword(upper)
            } else {
                TokenKind::Ident(text.to_string())
            };
            tokens.push(Token::new(kind, span));
            input = rest;
            continue;
        }

        // Numeric literal
        if c.is_ascii_digit() {
            let (rest, (raw, is_real)) = number_raw(input).map_err(|_| {
                PrescribeError::syntax(start.location_line() as usize, "invalid numeric literal")
            })?;
            let text = {
                let consumed_len = input.fragment().len() - raw.fragment().len();
                &input.fragment()[..consumed_len]
            };
            let span = span_of(start, rest);
            let kind = if is_real {
                let v: f64 = text.parse().map_err(|_| {
                    PrescribeError::syntax(start.location_line() as usize, "invalid real literal")
                })?;
                TokenKind::Real(v)
            } else {
                let v: i64 = text.parse().map_err(|_| {
                    PrescribeError::syntax(
                        start.location_line() as usize,
                        "invalid integer literal",
                    )
                })?;
                if v < i32::MIN as i64 || v > i32::MAX as i64 {
                    return Err(PrescribeError::range(
                        start.location_line() as usize,
                        format!("integer literal `{}` out of 32-bit range", text),
                    ));
                }
                TokenKind::Integer(v as i32)
            };
            tokens.push(Token::new(kind, span));
            input = rest;
            continue;
        }

        // Unicode assignment arrow
        if c == ARROW_CHAR {
            let rest = take_one(input);
            let span = span_of(start, rest);
            tokens.push(Token::new(TokenKind::Op("<-".to_string()), span));
            input = rest;
            continue;
        }

        // Operators (longest match first, table is already ordered that way)
        if let Some(op) = OPERATORS.iter().find(|op| input.fragment().starts_with(*op)) {
            let mut rest = input;
            for _ in 0..op.chars().count() {
                rest = take_one(rest);
            }
            let span = span_of(start, rest);
            tokens.push(Token::new(TokenKind::Op(op.to_string()), span));
            input = rest;
            continue;
        }

        // Delimiters
        if "()[],.:".contains(c) {
            let rest = take_one(input);
            let span = span_of(start, rest);
            tokens.push(Token::new(TokenKind::Delim(c), span));
            input = rest;
            continue;
        }

        return Err(PrescribeError::syntax(
            start.location_line() as usize,
            format!("unexpected character `{}`", c),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("declare DECLARE Declare"),
            vec![
                TokenKind::Keyword("DECLARE".into()),
                TokenKind::Keyword("DECLARE".into()),
                TokenKind::Keyword("DECLARE".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_booleans() {
        assert_eq!(
            kinds("TRUE false"),
            vec![TokenKind::Bool(true), TokenKind::Bool(false), TokenKind::Eof]
        );
    }

    #[test]
    fn test_identifiers_vs_keywords() {
        assert_eq!(
            kinds("Count COUNT1 Count_1"),
            vec![
                TokenKind::Ident("Count".into()),
                TokenKind::Ident("COUNT1".into()),
                TokenKind::Ident("Count_1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_leading_underscore_is_not_an_identifier() {
        let err = tokenize("_x").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("10 3.14 2e10 2.5e-3"),
            vec![
                TokenKind::Integer(10),
                TokenKind::Real(3.14),
                TokenKind::Real(2e10),
                TokenKind::Real(2.5e-3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_negative_literal_is_two_tokens() {
        // Unary minus is a parser concern, not a lexer concern.
        assert_eq!(
            kinds("-10"),
            vec![TokenKind::Op("-".into()), TokenKind::Integer(10), TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\tc\"d""#),
            vec![TokenKind::Str("a\nb\tc\"d".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_hex_escape() {
        assert_eq!(kinds(r#""\x41""#), vec![TokenKind::Str("A".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_invalid_escape_errors() {
        assert!(tokenize(r#""\q""#).is_err());
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(kinds("'x'"), vec![TokenKind::Char('x'), TokenKind::Eof]);
    }

    #[test]
    fn test_multi_char_literal_errors() {
        assert!(tokenize("'xy'").is_err());
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("<- <> <= >= = < > + - * / & ^ @"),
            vec![
                TokenKind::Op("<-".into()),
                TokenKind::Op("<>".into()),
                TokenKind::Op("<=".into()),
                TokenKind::Op(">=".into()),
                TokenKind::Op("=".into()),
                TokenKind::Op("<".into()),
                TokenKind::Op(">".into()),
                TokenKind::Op("+".into()),
                TokenKind::Op("-".into()),
                TokenKind::Op("*".into()),
                TokenKind::Op("/".into()),
                TokenKind::Op("&".into()),
                TokenKind::Op("^".into()),
                TokenKind::Op("@".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_arrow_unicode_synonym() {
        assert_eq!(
            kinds("Sum \u{2190} 0"),
            vec![
                TokenKind::Ident("Sum".into()),
                TokenKind::Op("<-".into()),
                TokenKind::Integer(0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            kinds("()[],.:"),
            vec![
                TokenKind::Delim('('),
                TokenKind::Delim(')'),
                TokenKind::Delim('['),
                TokenKind::Delim(']'),
                TokenKind::Delim(','),
                TokenKind::Delim('.'),
                TokenKind::Delim(':'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("DECLARE X : INTEGER // a trailing comment\n"),
            vec![
                TokenKind::Keyword("DECLARE".into()),
                TokenKind::Ident("X".into()),
                TokenKind::Delim(':'),
                TokenKind::Keyword("INTEGER".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifier_too_long_errors() {
        let long_name = "x".repeat(65);
        assert!(tokenize(&format!("DECLARE {} : INTEGER", long_name)).is_err());
    }

    #[test]
    fn test_span_tracks_lines() {
        let tokens = tokenize("DECLARE X\n: INTEGER").unwrap();
        // "INTEGER" starts on line 2
        let int_tok = tokens
            .iter()
            .find(|t| t.is_keyword("INTEGER"))
            .expect("INTEGER token");
        assert_eq!(int_tok.span.start_line, 2);
    }
}
