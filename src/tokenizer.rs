//! WireScript tokenizer.
//!
//! Lexes raw source into a sequence of located tokens. Whitespace separates
//! tokens and is otherwise insignificant; line comments are retained as
//! tokens so the formatter can reproduce them. The tokenizer performs no
//! semantic classification: every bare word comes out as `Symbol`, and the
//! parser reclassifies against the schema registry (see
//! [`crate::schema::classify_tokens`]).
//!
//! Lexical failures are always fatal to the call that raised them.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, one_of},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{pair, tuple},
    IResult, InputTake,
};
use nom_locate::LocatedSpan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::SourceSpan;

type Input<'a> = LocatedSpan<&'a str>;

// =============================================================================
// TOKEN TYPES
// =============================================================================

/// Token kind.
///
/// The tokenizer emits only lexical kinds; `FormKeyword`, `ElementKeyword`,
/// and `OverlayKeyword` are produced by the registry classification pass that
/// the parser (and editor tooling) runs over the raw stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    LParen,
    RParen,
    /// `wire`, `meta`, `define`, `screen`, `layout`, `repeat` (post-classification)
    FormKeyword,
    /// A registry element type such as `stack` or `text` (post-classification)
    ElementKeyword,
    /// A registry overlay element type such as `modal` (post-classification)
    OverlayKeyword,
    /// Any other bare word
    Symbol,
    /// `:name` - property key or boolean flag, disambiguated by the parser
    KeywordAtom,
    /// `$name` - component parameter reference
    ParamRef,
    /// `#name` - overlay reference
    OverlayRef,
    /// Double-quoted string literal
    Str,
    /// Optionally-signed integer or single-decimal-point decimal
    Number,
    /// `;` line comment, retained for the formatter
    Comment,
}

/// A located token. Immutable once produced; `text` keeps the raw lexeme
/// (quotes and escapes included for strings) so the formatter can re-emit
/// the author's exact spelling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: SourceSpan,
}

impl Token {
    /// Identifier body with any leading sigil (`:`, `$`, `#`) stripped
    pub fn ident(&self) -> &str {
        match self.kind {
            TokenKind::KeywordAtom | TokenKind::ParamRef | TokenKind::OverlayRef => &self.text[1..],
            _ => &self.text,
        }
    }

    /// Unescaped content of a string token (quotes stripped, `\"` and `\\`
    /// resolved). Returns the raw text for non-string tokens.
    pub fn string_content(&self) -> String {
        if self.kind != TokenKind::Str {
            return self.text.clone();
        }
        let inner = &self.text[1..self.text.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}

// =============================================================================
// LEX ERRORS
// =============================================================================

/// Lexical error. Always aborts the tokenize call; the parser and formatter
/// propagate it without attempting recovery.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexError {
    #[error("unterminated string literal starting at {line}:{col}")]
    UnterminatedString { line: u32, col: u32 },

    #[error("malformed number '{text}' at {line}:{col}")]
    MalformedNumber { text: String, line: u32, col: u32 },

    #[error("expected identifier after '{sigil}' at {line}:{col}")]
    BareSigil { sigil: char, line: u32, col: u32 },

    #[error("illegal character '{ch}' at {line}:{col}")]
    IllegalChar { ch: char, line: u32, col: u32 },
}

impl LexError {
    /// Point span at the offending position
    pub fn span(&self) -> SourceSpan {
        let (line, col) = match self {
            LexError::UnterminatedString { line, col }
            | LexError::MalformedNumber { line, col, .. }
            | LexError::BareSigil { line, col, .. }
            | LexError::IllegalChar { line, col, .. } => (*line, *col),
        };
        SourceSpan::point(line, col)
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

/// Tokenize WireScript source into an ordered token sequence.
///
/// Comments are retained as tokens. Every token carries its exact 1-based
/// start and (exclusive) end line/column.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut input = Input::new(source);
    let mut tokens = Vec::new();

    loop {
        input = skip_whitespace(input);
        let first = match input.fragment().chars().next() {
            Some(c) => c,
            None => break,
        };
        let (line, col) = position(&input);

        let (rest, kind, lexeme) = match first {
            '(' => {
                let (rest, lex) = input.take_split(1);
                (rest, TokenKind::LParen, lex)
            }
            ')' => {
                let (rest, lex) = input.take_split(1);
                (rest, TokenKind::RParen, lex)
            }
            ';' => {
                let (rest, lex) = lex_comment(input);
                (rest, TokenKind::Comment, lex)
            }
            '"' => {
                let (rest, lex) = lex_string(input, line, col)?;
                (rest, TokenKind::Str, lex)
            }
            ':' | '$' | '#' => {
                let (rest, lex) = lex_sigil(input, first, line, col)?;
                let kind = match first {
                    ':' => TokenKind::KeywordAtom,
                    '$' => TokenKind::ParamRef,
                    _ => TokenKind::OverlayRef,
                };
                (rest, kind, lex)
            }
            c if c.is_ascii_digit() => {
                let (rest, lex) = lex_number(input, line, col)?;
                (rest, TokenKind::Number, lex)
            }
            '+' | '-' if next_is_digit(&input) => {
                let (rest, lex) = lex_number(input, line, col)?;
                (rest, TokenKind::Number, lex)
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '-' => {
                let (rest, lex) = lex_symbol(input, line, col)?;
                (rest, TokenKind::Symbol, lex)
            }
            other => return Err(LexError::IllegalChar {
                ch: other,
                line,
                col,
            }),
        };

        let (end_line, end_col) = position(&rest);
        tokens.push(Token {
            kind,
            text: lexeme.fragment().to_string(),
            span: SourceSpan::new(line, col, end_line, end_col),
        });
        input = rest;
    }

    Ok(tokens)
}

fn position(input: &Input) -> (u32, u32) {
    (input.location_line(), input.get_utf8_column() as u32)
}

fn next_is_digit(input: &Input) -> bool {
    input
        .fragment()
        .chars()
        .nth(1)
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
}

fn skip_whitespace(input: Input) -> Input {
    match multispace0::<_, nom::error::Error<Input>>(input) {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

fn lex_comment(input: Input) -> (Input, Input) {
    let res: IResult<Input, Input> =
        recognize(pair(char(';'), take_while(|c| c != '\n' && c != '\r')))(input);
    match res {
        Ok((rest, lex)) => (rest, lex),
        // first char is known to be ';', recognize cannot fail
        Err(_) => input.take_split(1),
    }
}

/// Identifier body after a sigil: letter or `_` head, then alphanumerics,
/// `_`, `-`
fn identifier(input: Input) -> IResult<Input, Input> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag("-")))),
    ))(input)
}

/// Bare symbols additionally allow `.` and `/` in the body and may start
/// with `-` (a `-` followed by a digit lexes as a number instead)
fn symbol_body(input: Input) -> IResult<Input, Input> {
    recognize(pair(
        alt((alpha1, tag("_"), tag("-"))),
        many0(alt((alphanumeric1, tag("_"), tag("-"), tag("."), tag("/")))),
    ))(input)
}

fn number_body(input: Input) -> IResult<Input, Input> {
    recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)
}

fn lex_sigil<'a>(
    input: Input<'a>,
    sigil: char,
    line: u32,
    col: u32,
) -> Result<(Input<'a>, Input<'a>), LexError> {
    let res: IResult<Input, Input> = recognize(pair(char(sigil), identifier))(input);
    res.map_err(|_| LexError::BareSigil { sigil, line, col })
}

fn lex_symbol<'a>(
    input: Input<'a>,
    line: u32,
    col: u32,
) -> Result<(Input<'a>, Input<'a>), LexError> {
    let first = input.fragment().chars().next().unwrap_or(' ');
    symbol_body(input).map_err(|_| LexError::IllegalChar {
        ch: first,
        line,
        col,
    })
}

fn lex_number<'a>(
    input: Input<'a>,
    line: u32,
    col: u32,
) -> Result<(Input<'a>, Input<'a>), LexError> {
    let (rest, lex) = number_body(input).map_err(|_| LexError::MalformedNumber {
        text: input.fragment().chars().take(8).collect(),
        line,
        col,
    })?;
    // A second decimal point or a trailing identifier character makes the
    // whole run malformed rather than two adjacent tokens.
    if let Some(next) = rest.fragment().chars().next() {
        if next == '.' || next.is_ascii_alphanumeric() || next == '_' {
            return Err(LexError::MalformedNumber {
                text: format!("{}{}", lex.fragment(), next),
                line,
                col,
            });
        }
    }
    Ok((rest, lex))
}

fn lex_string<'a>(
    input: Input<'a>,
    line: u32,
    col: u32,
) -> Result<(Input<'a>, Input<'a>), LexError> {
    let fragment = input.fragment();
    let mut chars = fragment.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let (rest, lex) = input.take_split(i + 1);
                return Ok((rest, lex));
            }
            '\\' => {
                chars.next();
            }
            _ => {}
        }
    }
    Err(LexError::UnterminatedString { line, col })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_parens_and_symbols() {
        let tokens = tokenize("(wire (screen home))").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::RParen,
                TokenKind::RParen,
            ]
        );
        assert_eq!(tokens[1].text, "wire");
    }

    #[test]
    fn test_sigil_tokens() {
        let tokens = tokenize(":gap $title #settings-modal").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::KeywordAtom);
        assert_eq!(tokens[0].ident(), "gap");
        assert_eq!(tokens[1].kind, TokenKind::ParamRef);
        assert_eq!(tokens[1].ident(), "title");
        assert_eq!(tokens[2].kind, TokenKind::OverlayRef);
        assert_eq!(tokens[2].ident(), "settings-modal");
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 -17 3.14 +8").unwrap();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Number));
        assert_eq!(tokens[1].text, "-17");
        assert_eq!(tokens[2].text, "3.14");
    }

    #[test]
    fn test_malformed_number_two_decimal_points() {
        let err = tokenize("1.2.3").unwrap_err();
        assert!(matches!(err, LexError::MalformedNumber { .. }));
    }

    #[test]
    fn test_malformed_number_trailing_letter() {
        let err = tokenize("12px").unwrap_err();
        assert!(matches!(err, LexError::MalformedNumber { .. }));
    }

    #[test]
    fn test_leading_dash_is_symbol() {
        let tokens = tokenize("-main").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Symbol);
        assert_eq!(tokens[0].text, "-main");
    }

    #[test]
    fn test_string_with_escape() {
        let tokens = tokenize(r#""he said \"hi\"""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, r#""he said \"hi\"""#);
        assert_eq!(tokens[0].string_content(), "he said \"hi\"");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("(text \"hello").unwrap_err();
        assert!(matches!(
            err,
            LexError::UnterminatedString { line: 1, col: 7 }
        ));
    }

    #[test]
    fn test_comment_retained() {
        let tokens = tokenize("; header note\n(wire)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "; header note");
        assert_eq!(tokens[1].kind, TokenKind::LParen);
    }

    #[test]
    fn test_bare_sigil() {
        let err = tokenize("(text :)").unwrap_err();
        assert!(matches!(err, LexError::BareSigil { sigil: ':', .. }));
    }

    #[test]
    fn test_illegal_char() {
        let err = tokenize("(box {)").unwrap_err();
        assert!(matches!(err, LexError::IllegalChar { ch: '{', .. }));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("(wire\n  (meta))").unwrap();
        // `wire` on line 1 starting at column 2
        assert_eq!(tokens[1].span, SourceSpan::new(1, 2, 1, 6));
        // `meta` on line 2 starting at column 4
        assert_eq!(tokens[3].span, SourceSpan::new(2, 4, 2, 8));
    }

    #[test]
    fn test_whitespace_variations() {
        assert_eq!(
            kinds("(text\t:bold\n  \"x\")"),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::KeywordAtom,
                TokenKind::Str,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_empty_source() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   \n\t ").unwrap().is_empty());
    }
}
