//! Canonical formatter.
//!
//! Purely lexical: re-tokenizes the source, builds a paren tree with
//! comments attached, and re-emits canonical text. It never consults the
//! schema registry, so semantically invalid input (unknown types, bad prop
//! values) still formats; only lexical failures and unbalanced parentheses
//! are errors.
//!
//! Canonical layout: two-space indent per nesting level, atom-only lists on
//! one line, container lists keep their head and leading atom run (type name
//! plus scalar props) on the head line and put every remaining item on its
//! own line. Line comments re-emit immediately before the item they
//! preceded in the source. Output is deterministic and idempotent.

use thiserror::Error;
use tracing::debug;

use crate::tokenizer::{tokenize, LexError, Token, TokenKind};

// =============================================================================
// ERRORS
// =============================================================================

/// Formatting failure. Unlike the parser, the formatter has no recovery
/// path; its callers want canonical text or a hard error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormatError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unclosed '(' at {line}:{col}")]
    UnclosedParen { line: u32, col: u32 },
    #[error("unexpected ')' at {line}:{col}")]
    UnexpectedClose { line: u32, col: u32 },
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Format WireScript source into canonical text
pub fn format(source: &str) -> Result<String, FormatError> {
    let tokens = tokenize(source)?;
    debug!(token_count = tokens.len(), "formatting token stream");
    let (items, trailing) = build_tree(tokens)?;

    let mut lines: Vec<String> = Vec::new();
    for item in &items {
        emit_item(&mut lines, item, 0);
    }
    for comment in &trailing {
        lines.push(comment.text.clone());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

// =============================================================================
// TOKEN TREE
// =============================================================================

/// One node of the paren tree, with the comments that preceded it
enum Item {
    Atom {
        comments: Vec<Token>,
        token: Token,
    },
    List {
        comments: Vec<Token>,
        items: Vec<Item>,
        /// Comments left over before the closing paren
        trailing: Vec<Token>,
    },
}

impl Item {
    fn comments(&self) -> &[Token] {
        match self {
            Item::Atom { comments, .. } | Item::List { comments, .. } => comments,
        }
    }

    fn is_plain_atom(&self) -> bool {
        matches!(self, Item::Atom { comments, .. } if comments.is_empty())
    }
}

fn build_tree(tokens: Vec<Token>) -> Result<(Vec<Item>, Vec<Token>), FormatError> {
    let mut cursor = Cursor { tokens, pos: 0 };
    let (items, trailing) = cursor.items()?;
    if let Some(stray) = cursor.peek() {
        // only an unmatched ')' can stop the top-level scan
        return Err(FormatError::UnexpectedClose {
            line: stray.span.start_line,
            col: stray.span.start_col,
        });
    }
    Ok((items, trailing))
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    /// Collect items until a ')' or end of input, attaching each pending
    /// comment to the item that follows it
    fn items(&mut self) -> Result<(Vec<Item>, Vec<Token>), FormatError> {
        let mut items = Vec::new();
        let mut pending: Vec<Token> = Vec::new();
        loop {
            match self.peek().map(|t| t.kind) {
                None | Some(TokenKind::RParen) => return Ok((items, pending)),
                Some(TokenKind::Comment) => pending.push(self.bump()),
                Some(TokenKind::LParen) => {
                    let open = self.bump();
                    let (inner, trailing) = self.items()?;
                    match self.peek().map(|t| t.kind) {
                        Some(TokenKind::RParen) => {
                            self.bump();
                        }
                        _ => {
                            return Err(FormatError::UnclosedParen {
                                line: open.span.start_line,
                                col: open.span.start_col,
                            })
                        }
                    }
                    items.push(Item::List {
                        comments: std::mem::take(&mut pending),
                        items: inner,
                        trailing,
                    });
                }
                Some(_) => items.push(Item::Atom {
                    comments: std::mem::take(&mut pending),
                    token: self.bump(),
                }),
            }
        }
    }
}

// =============================================================================
// EMISSION
// =============================================================================

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn emit_item(lines: &mut Vec<String>, item: &Item, depth: usize) {
    for comment in item.comments() {
        lines.push(format!("{}{}", indent(depth), comment.text));
    }
    match item {
        Item::Atom { token, .. } => {
            lines.push(format!("{}{}", indent(depth), token.text));
        }
        Item::List {
            items, trailing, ..
        } => emit_list(lines, items, trailing, depth),
    }
}

fn emit_list(lines: &mut Vec<String>, items: &[Item], trailing: &[Token], depth: usize) {
    // Atom-only, comment-free lists stay on one line.
    let flat = trailing.is_empty() && items.iter().all(Item::is_plain_atom);
    if flat {
        let words: Vec<&str> = items
            .iter()
            .map(|item| match item {
                Item::Atom { token, .. } => token.text.as_str(),
                Item::List { .. } => "",
            })
            .collect();
        lines.push(format!("{}({})", indent(depth), words.join(" ")));
        return;
    }

    // Head line: the head symbol plus its run of scalar props; each
    // remaining item gets its own line.
    let split = items
        .iter()
        .position(|item| !item.is_plain_atom())
        .unwrap_or(items.len());
    let mut head = format!("{}(", indent(depth));
    for (i, item) in items[..split].iter().enumerate() {
        if let Item::Atom { token, .. } = item {
            if i > 0 {
                head.push(' ');
            }
            head.push_str(&token.text);
        }
    }
    lines.push(head);

    for item in &items[split..] {
        emit_item(lines, item, depth + 1);
    }
    for comment in trailing {
        lines.push(format!("{}{}", indent(depth + 1), comment.text));
    }

    // The closing paren rides on the last content line, but never on a
    // comment line (that would swallow it).
    if trailing.is_empty() {
        if let Some(last) = lines.last_mut() {
            last.push(')');
        }
    } else {
        lines.push(format!("{})", indent(depth)));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flat_list_on_one_line() {
        assert_eq!(
            format("(text   :bold\n  \"hi\")").unwrap(),
            "(text :bold \"hi\")\n"
        );
    }

    #[test]
    fn test_props_stay_on_head_line_children_get_own_lines() {
        let out = format("(wire (screen home \"Home\" (stack :gap 8 (text \"hi\") (text \"bye\"))))")
            .unwrap();
        let expected = "\
(wire
  (screen home \"Home\"
    (stack :gap 8
      (text \"hi\")
      (text \"bye\"))))
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_idempotence() {
        let source = r#"(wire
            ; document meta
            (meta :title "App" :theme dark)
            (screen home "Home" :viewport mobile
                (stack :gap 12
                    ; the greeting
                    (heading :level 1 "Hello")
                    (button :primary :to #about-modal "About"))
                (modal :id about-modal :title "About"
                    (text "fine print"))))"#;
        let once = format(source).unwrap();
        let twice = format(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_comment_attaches_to_following_element() {
        let out = format("(wire (screen s\n; greeting\n(text \"hi\")))").unwrap();
        let lines: Vec<&str> = out.lines().collect();
        let comment_at = lines.iter().position(|l| l.contains("; greeting")).unwrap();
        assert!(lines[comment_at + 1].contains("(text \"hi\")"));
        assert_eq!(lines[comment_at].trim_start(), "; greeting");
    }

    #[test]
    fn test_trailing_comment_keeps_close_paren_off_comment_line() {
        let out = format("(wire (screen s (text \"hi\")\n; end of screen\n))").unwrap();
        assert!(out.contains("; end of screen"));
        for line in out.lines() {
            if line.trim_start().starts_with(';') {
                assert!(!line.ends_with(')'), "close paren on comment line: {}", line);
            }
        }
        // still balanced
        let opens = out.matches('(').count();
        let closes = out.matches(')').count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn test_formats_semantically_invalid_input() {
        // Unknown type and unknown prop are not the formatter's business.
        let out = format("(wire (screen s (bogus-type :nope 7)))").unwrap();
        assert!(out.contains("(bogus-type :nope 7)"));
    }

    #[test]
    fn test_unclosed_paren() {
        match format("(wire (screen s") {
            Err(FormatError::UnclosedParen { line: 1, col: 7 }) => {}
            other => panic!("expected UnclosedParen, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_close() {
        match format("(wire))") {
            Err(FormatError::UnexpectedClose { line: 1, col: 7 }) => {}
            other => panic!("expected UnexpectedClose, got {:?}", other),
        }
    }

    #[test]
    fn test_lex_error_propagates() {
        assert!(matches!(
            format("(text \"oops"),
            Err(FormatError::Lex(_))
        ));
    }

    #[test]
    fn test_string_lexemes_reproduced_exactly() {
        let out = format("(text \"say \\\"hi\\\"\")").unwrap();
        assert_eq!(out, "(text \"say \\\"hi\\\"\")\n");
    }
}
