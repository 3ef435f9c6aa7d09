//! wirescript-core: Compiler front-end for the WireScript wireframe DSL
//!
//! This crate contains the pure compile pipeline with NO I/O or rendering
//! dependencies:
//! - Tokenizer producing located tokens (comments retained)
//! - Process-wide schema registry of element types and their properties
//! - Schema-driven recursive-descent parser with local error recovery
//! - Document-wide semantic validator (references, arity, cycles)
//! - Canonical, comment-preserving, idempotent formatter
//!
//! Rendering, theming, editor integration, and CLI plumbing are external
//! consumers of the types and entry points exported here.

pub mod ast;
pub mod diagnostics;
pub mod formatter;
pub mod parser;
pub mod schema;
pub mod tokenizer;
pub mod validator;

// Re-export commonly used types
pub use ast::{
    ComponentDef, ElementNode, LayoutNode, NodeKind, Prop, Reference, ReferenceKind, ScreenNode,
    SymbolInfo, SymbolKind, Value, WireDocument,
};
pub use diagnostics::{Diagnostic, ErrorKind, Severity, SourceSpan};
pub use formatter::{format, FormatError};
pub use parser::{parse, ParseOutcome};
pub use schema::{classify_tokens, ElementSchema, PropSchema, SchemaRegistry, ValueKind};
pub use tokenizer::{tokenize, LexError, Token, TokenKind};
pub use validator::{validate, ValidationResult};

use tracing::debug;

/// Combined result of the full parse + validate pipeline
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub success: bool,
    pub document: Option<WireDocument>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Parse and, when parsing succeeds, validate WireScript source.
///
/// A failed parse returns its errors with no warnings and no validation
/// pass; the recovered partial document is still included for tooling.
pub fn compile(source: &str) -> CompileResult {
    let outcome = parse(source);
    if !outcome.success {
        debug!(errors = outcome.errors.len(), "compile stopped after parse");
        return CompileResult {
            success: false,
            document: outcome.document,
            errors: outcome.errors,
            warnings: Vec::new(),
        };
    }

    let document = match outcome.document {
        Some(document) => document,
        None => {
            return CompileResult {
                success: false,
                document: None,
                errors: outcome.errors,
                warnings: Vec::new(),
            }
        }
    };

    let result = validate(&document);
    debug!(
        valid = result.valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "compile finished"
    );
    CompileResult {
        success: result.valid,
        document: Some(document),
        errors: result.errors,
        warnings: result.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r#"(wire
        (meta :title "Shop" :theme dark)
        (define ProductCard (params title price)
            (card :pad 12
                (heading :level 3 $title)
                (text :muted $price)
                (button :primary :to product "View")))
        (screen home "Home" :viewport mobile
            (navbar :title "Shop")
            (stack :gap 12
                (ProductCard "Mug" "9.50")
                (ProductCard "Pin" "3.00"))
            (modal :id cart-modal :title "Cart"
                (text "empty"))
            (button :to #cart-modal "Cart"))
        (screen product "Product"
            (link :to home "Back")))"#;

    #[test]
    fn test_compile_clean_fixture() {
        let result = compile(FIXTURE);
        assert!(result.success, "{:?}", result.errors);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        let doc = result.document.unwrap();
        assert_eq!(doc.screens.len(), 2);
        assert_eq!(doc.components.len(), 1);
        assert_eq!(doc.meta_value("theme"), Some(&Value::Symbol("dark".into())));
    }

    #[test]
    fn test_compile_arity_failure_keeps_definition() {
        let result = compile(
            r#"(wire
                (define Card (params title) (box (text $title)))
                (screen s (Card)))"#,
        );
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .any(|e| e.kind == ErrorKind::Arity && e.message.contains("Card")));
        let doc = result.document.unwrap();
        assert_eq!(doc.components.len(), 1);
        assert_eq!(doc.components[0].name, "Card");
    }

    #[test]
    fn test_compile_lex_failure_has_no_document() {
        let result = compile("(wire (text \"oops))");
        assert!(!result.success);
        assert!(result.document.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Lex);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_parse_errors_skip_validation() {
        // Partial document returned, but no validation warnings surface.
        let result = compile("(wire (widget x) (screen s (link :href \"u\" \"t\")))");
        assert!(!result.success);
        assert!(result.warnings.is_empty());
        assert_eq!(result.document.unwrap().screens.len(), 1);
    }

    #[test]
    fn test_format_then_reparse_round_trip() {
        let canonical = format(FIXTURE).unwrap();
        let first = compile(FIXTURE);
        let second = compile(&canonical);
        assert!(second.success, "{:?}", second.errors);
        let a = first.document.unwrap();
        let b = second.document.unwrap();
        // structural equality modulo source spans
        assert_eq!(a.to_wire_string(), b.to_wire_string());
    }

    #[test]
    fn test_format_idempotent_on_fixture() {
        let once = format(FIXTURE).unwrap();
        assert_eq!(format(&once).unwrap(), once);
    }

    #[test]
    fn test_outline_from_partial_parse() {
        let outcome = parse("(wire (screen home (text \"a\")) (widget x) (screen about))");
        assert!(!outcome.success);
        let symbols = outcome.document.unwrap().symbols();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["home", "about"]);
    }
}
