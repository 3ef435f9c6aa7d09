//! Schema registry: the single source of truth for element types and their
//! properties.
//!
//! Built once before first use, read-only afterward, shared by reference
//! across arbitrarily many parse/validate calls with no locking. Element
//! types and their property schemas are data, not hard-coded parser cases:
//! the parser consults the registry to validate and convert prop values
//! while building nodes, and the validator consults it for required-prop
//! checks.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ast::Value;
use crate::tokenizer::{Token, TokenKind};

// =============================================================================
// SCHEMA TYPES
// =============================================================================

/// Value-kind constraint for a property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    /// Bare keyword-atom with no associated value; presence means `true`
    Flag,
    Number,
    Str,
    Symbol,
    /// Navigation target, normalized at parse time into `Value::Reference`
    Reference,
}

/// One recognized property of an element type
#[derive(Clone, Debug, Serialize)]
pub struct PropSchema {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    pub default: Option<Value>,
    /// Replacement hint when the property is recognized but discouraged
    pub deprecated: Option<&'static str>,
}

/// Per-element-type schema
#[derive(Clone, Debug, Serialize)]
pub struct ElementSchema {
    pub name: &'static str,
    pub props: Vec<PropSchema>,
    /// Leaf types whose trailing string/symbol is element text content
    pub text_content: bool,
    /// Overlay-producing types, addressable via `#id`
    pub overlay: bool,
}

impl ElementSchema {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            props: Vec::new(),
            text_content: false,
            overlay: false,
        }
    }

    fn text(mut self) -> Self {
        self.text_content = true;
        self
    }

    fn overlay_type(mut self) -> Self {
        self.overlay = true;
        self
    }

    fn flag(mut self, name: &'static str) -> Self {
        self.props.push(PropSchema {
            name,
            kind: ValueKind::Flag,
            required: false,
            default: Some(Value::Bool(false)),
            deprecated: None,
        });
        self
    }

    fn kv(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.props.push(PropSchema {
            name,
            kind,
            required: false,
            default: None,
            deprecated: None,
        });
        self
    }

    fn required(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.props.push(PropSchema {
            name,
            kind,
            required: true,
            default: None,
            deprecated: None,
        });
        self
    }

    fn with_default(mut self, name: &'static str, kind: ValueKind, default: Value) -> Self {
        self.props.push(PropSchema {
            name,
            kind,
            required: false,
            default: Some(default),
            deprecated: None,
        });
        self
    }

    fn deprecated(mut self, name: &'static str, kind: ValueKind, hint: &'static str) -> Self {
        self.props.push(PropSchema {
            name,
            kind,
            required: false,
            default: None,
            deprecated: Some(hint),
        });
        self
    }

    /// Schema for a property name, if recognized for this element type
    pub fn prop(&self, name: &str) -> Option<&PropSchema> {
        self.props.iter().find(|p| p.name == name)
    }

    /// Names of all required properties
    pub fn required_props(&self) -> impl Iterator<Item = &PropSchema> {
        self.props.iter().filter(|p| p.required)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Form keywords that head non-element forms
pub const FORM_KEYWORDS: &[&str] = &["wire", "meta", "define", "screen", "layout", "repeat"];

/// Process-wide, immutable registry of element schemas
#[derive(Debug, Serialize)]
pub struct SchemaRegistry {
    elements: HashMap<&'static str, ElementSchema>,
}

impl SchemaRegistry {
    /// The shared registry instance, built on first access
    pub fn global() -> &'static SchemaRegistry {
        static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::build);
        &REGISTRY
    }

    /// Schema for an element type, or `None` for an unknown type
    pub fn element(&self, name: &str) -> Option<&ElementSchema> {
        self.elements.get(name)
    }

    pub fn is_form_keyword(&self, name: &str) -> bool {
        FORM_KEYWORDS.contains(&name)
    }

    pub fn is_element_type(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn is_overlay_type(&self, name: &str) -> bool {
        self.elements.get(name).map(|e| e.overlay).unwrap_or(false)
    }

    /// All registered element type names, sorted
    pub fn element_types(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.elements.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn build() -> SchemaRegistry {
        use ValueKind::*;
        let n = |v: i64| Value::Number(Decimal::from(v));
        let sym = |s: &str| Value::Symbol(s.to_string());

        let table = vec![
            // containers
            ElementSchema::new("stack")
                .with_default("gap", Number, n(0))
                .kv("align", Symbol)
                .kv("pad", Number),
            ElementSchema::new("row")
                .with_default("gap", Number, n(0))
                .kv("align", Symbol)
                .kv("pad", Number)
                .flag("wrap"),
            ElementSchema::new("grid")
                .with_default("cols", Number, n(2))
                .kv("gap", Number),
            ElementSchema::new("box")
                .kv("pad", Number)
                .kv("bg", Symbol)
                .flag("border"),
            ElementSchema::new("card").kv("pad", Number).kv("title", Str),
            ElementSchema::new("list").flag("ordered"),
            ElementSchema::new("section").kv("title", Str),
            ElementSchema::new("navbar").kv("title", Str),
            ElementSchema::new("sidebar").kv("width", Number),
            ElementSchema::new("tabs"),
            ElementSchema::new("tab").required("label", Str),
            ElementSchema::new("form"),
            // text-bearing leaves
            ElementSchema::new("text")
                .text()
                .kv("size", Symbol)
                .kv("align", Symbol)
                .flag("bold")
                .flag("muted")
                .deprecated("color", Symbol, "use theme tokens instead of :color"),
            ElementSchema::new("heading")
                .text()
                .with_default("level", Number, n(1)),
            ElementSchema::new("button")
                .text()
                .kv("to", Reference)
                .flag("primary")
                .flag("secondary")
                .flag("disabled"),
            ElementSchema::new("link")
                .text()
                .kv("to", Reference)
                .deprecated("href", Str, "use :to with a screen or overlay target"),
            ElementSchema::new("badge").text().kv("variant", Symbol),
            ElementSchema::new("label").text().kv("for", Symbol),
            // inputs
            ElementSchema::new("input")
                .kv("placeholder", Str)
                .kv("label", Str)
                .with_default("type", Symbol, sym("text"))
                .flag("disabled"),
            ElementSchema::new("textarea")
                .kv("placeholder", Str)
                .kv("label", Str)
                .with_default("rows", Number, n(3)),
            ElementSchema::new("checkbox").kv("label", Str).flag("checked"),
            ElementSchema::new("radio")
                .kv("label", Str)
                .kv("group", Symbol)
                .flag("checked"),
            ElementSchema::new("select")
                .kv("label", Str)
                .kv("placeholder", Str),
            ElementSchema::new("toggle").kv("label", Str).flag("on"),
            // media and structure
            ElementSchema::new("image")
                .required("src", Str)
                .kv("alt", Str)
                .kv("width", Number)
                .kv("height", Number),
            ElementSchema::new("icon")
                .required("name", Symbol)
                .kv("size", Number),
            ElementSchema::new("divider"),
            ElementSchema::new("spacer").with_default("size", Number, n(8)),
            // overlays, addressable via #id
            ElementSchema::new("modal")
                .overlay_type()
                .required("id", Symbol)
                .kv("title", Str),
            ElementSchema::new("sheet")
                .overlay_type()
                .required("id", Symbol)
                .with_default("side", Symbol, sym("right")),
            ElementSchema::new("toast")
                .overlay_type()
                .required("id", Symbol)
                .kv("variant", Symbol)
                .kv("duration", Number),
            // layout plumbing
            ElementSchema::new("slot").with_default("name", Symbol, sym("content")),
            // repeat heads a form but its count lands in the prop map
            ElementSchema::new("repeat").required("count", Number),
        ];

        SchemaRegistry {
            elements: table.into_iter().map(|e| (e.name, e)).collect(),
        }
    }
}

// =============================================================================
// TOKEN CLASSIFICATION
// =============================================================================

/// Reclassify bare `Symbol` tokens against the registry: form keywords,
/// element types, and overlay element types get their semantic kinds.
///
/// The tokenizer never does this itself; the parser runs it as its first
/// step, and editor tooling (highlighting, outline) can run it over a raw
/// stream without parsing.
pub fn classify_tokens(mut tokens: Vec<Token>) -> Vec<Token> {
    let registry = SchemaRegistry::global();
    for token in &mut tokens {
        if token.kind != TokenKind::Symbol {
            continue;
        }
        if registry.is_form_keyword(&token.text) {
            token.kind = TokenKind::FormKeyword;
        } else if registry.is_overlay_type(&token.text) {
            token.kind = TokenKind::OverlayKeyword;
        } else if registry.is_element_type(&token.text) {
            token.kind = TokenKind::ElementKeyword;
        }
    }
    tokens
}

// =============================================================================
// TESTS
// =============================================================================
