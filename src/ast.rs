//! WireScript document model.
//!
//! The parser produces a [`WireDocument`] aggregate owning, in insertion
//! order, the document meta settings, screens, component definitions, and
//! layouts. Every node carries a source span for editor tooling.
//!
//! Navigation targets are normalized exactly once, at parse time, into the
//! tagged [`Reference`] variant; no downstream consumer re-derives the kind
//! from leading sigils.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceSpan;

// =============================================================================
// VALUES
// =============================================================================

/// Property value - a closed tagged union, matched exhaustively at every
/// consumption site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Exact number: integer or single-decimal-point decimal
    Number(Decimal),
    /// String literal, unescaped
    Str(String),
    /// Bare symbol: `dark`, `mobile`
    Symbol(String),
    /// Keyword atom used as a value: `:center`
    Keyword(String),
    /// Component parameter reference: `$title`
    ParamRef(String),
    /// Normalized navigation target
    Reference(Reference),
    /// Boolean flag value; a bare flag keyword sets `true`
    Bool(bool),
}

/// What a navigation target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Bare symbol target: a screen id
    Screen,
    /// `#name` target: an overlay element id
    Overlay,
    /// `:name` target: an action keyword such as `:close` or `:back`
    Action,
}

/// A resolved-kind navigation reference. The parser builds these; the
/// validator checks that screen and overlay targets resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub id: String,
}

impl Reference {
    pub fn screen(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Screen,
            id: id.into(),
        }
    }

    pub fn overlay(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Overlay,
            id: id.into(),
        }
    }

    pub fn action(id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Action,
            id: id.into(),
        }
    }
}

impl Value {
    // =========================================================================
    // PREDICATES
    // =========================================================================

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    pub fn is_param_ref(&self) -> bool {
        matches!(self, Value::ParamRef(_))
    }

    // =========================================================================
    // EXTRACTORS
    // =========================================================================

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<&str> {
        match self {
            Value::ParamRef(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Identifier text usable as an element id, from symbol or string values
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// Render the value back to WireScript source
    pub fn to_wire_string(&self) -> String {
        match self {
            Value::Number(d) => d.to_string(),
            Value::Str(s) => quote(s),
            Value::Symbol(s) => s.clone(),
            Value::Keyword(k) => format!(":{}", k),
            Value::ParamRef(p) => format!("${}", p),
            Value::Reference(r) => match r.kind {
                ReferenceKind::Screen => r.id.clone(),
                ReferenceKind::Overlay => format!("#{}", r.id),
                ReferenceKind::Action => format!(":{}", r.id),
            },
            Value::Bool(b) => b.to_string(),
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Root aggregate produced by the parser. Partial documents (from recovered
/// parses) still populate whatever forms parsed cleanly, for tooling callers
/// that tolerate partial results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireDocument {
    /// Document settings from `(meta ...)`, in insertion order
    pub meta: Vec<(String, Value)>,
    pub screens: Vec<ScreenNode>,
    pub components: Vec<ComponentDef>,
    pub layouts: Vec<LayoutNode>,
}

impl WireDocument {
    /// Find a screen by id
    pub fn screen(&self, id: &str) -> Option<&ScreenNode> {
        self.screens.iter().find(|s| s.id == id)
    }

    /// Find a component definition by name
    pub fn component(&self, name: &str) -> Option<&ComponentDef> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Find a layout by name
    pub fn layout(&self, name: &str) -> Option<&LayoutNode> {
        self.layouts.iter().find(|l| l.name == name)
    }

    /// Meta setting by key
    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Document symbols for outline providers: name, kind, and span of every
    /// top-level definition, in source order.
    pub fn symbols(&self) -> Vec<SymbolInfo> {
        let mut out = Vec::new();
        for s in &self.screens {
            out.push(SymbolInfo {
                name: s.id.clone(),
                kind: SymbolKind::Screen,
                span: s.span,
            });
        }
        for c in &self.components {
            out.push(SymbolInfo {
                name: c.name.clone(),
                kind: SymbolKind::Component,
                span: c.span,
            });
        }
        for l in &self.layouts {
            out.push(SymbolInfo {
                name: l.name.clone(),
                kind: SymbolKind::Layout,
                span: l.span,
            });
        }
        out.sort_by_key(|s| (s.span.start_line, s.span.start_col));
        out
    }

    /// Render the document back to WireScript source
    pub fn to_wire_string(&self) -> String {
        let mut forms = Vec::new();
        if !self.meta.is_empty() {
            let pairs: Vec<String> = self
                .meta
                .iter()
                .map(|(k, v)| format!(":{} {}", k, v.to_wire_string()))
                .collect();
            forms.push(format!("(meta {})", pairs.join(" ")));
        }
        let mut ordered: Vec<(SourceSpan, String)> = Vec::new();
        for s in &self.screens {
            ordered.push((s.span, s.to_wire_string()));
        }
        for c in &self.components {
            ordered.push((c.span, c.to_wire_string()));
        }
        for l in &self.layouts {
            ordered.push((l.span, l.to_wire_string()));
        }
        ordered.sort_by_key(|(span, _)| (span.start_line, span.start_col));
        forms.extend(ordered.into_iter().map(|(_, text)| text));

        let mut out = String::from("(wire");
        for form in forms {
            out.push_str("\n  ");
            out.push_str(&form);
        }
        out.push(')');
        out
    }
}

/// Outline symbol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Screen,
    Component,
    Layout,
}

/// One outline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub span: SourceSpan,
}

// =============================================================================
// SCREENS, COMPONENTS, LAYOUTS
// =============================================================================

/// `(screen id "Display Name" :viewport tag children...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenNode {
    pub id: String,
    pub name: Option<String>,
    pub viewport: Option<String>,
    pub children: Vec<ElementNode>,
    pub span: SourceSpan,
}

impl ScreenNode {
    pub fn to_wire_string(&self) -> String {
        let mut parts = vec![format!("(screen {}", self.id)];
        if let Some(ref name) = self.name {
            parts.push(quote(name));
        }
        if let Some(ref viewport) = self.viewport {
            parts.push(format!(":viewport {}", viewport));
        }
        for child in &self.children {
            parts.push(child.to_wire_string());
        }
        parts.push(")".to_string());
        join_form(parts)
    }
}

/// `(define Name (params a b) body)` - a reusable, parameterized element
/// template invoked like a built-in element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: ElementNode,
    pub span: SourceSpan,
}

impl ComponentDef {
    pub fn to_wire_string(&self) -> String {
        let params = if self.params.is_empty() {
            "(params)".to_string()
        } else {
            format!("(params {})", self.params.join(" "))
        };
        format!("(define {} {} {})", self.name, params, self.body.to_wire_string())
    }
}

/// `(layout name children...)` - element tree containing `slot` placeholders
/// filled by downstream rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub name: String,
    pub children: Vec<ElementNode>,
    pub span: SourceSpan,
}

impl LayoutNode {
    pub fn to_wire_string(&self) -> String {
        let mut parts = vec![format!("(layout {}", self.name)];
        for child in &self.children {
            parts.push(child.to_wire_string());
        }
        parts.push(")".to_string());
        join_form(parts)
    }
}

// =============================================================================
// ELEMENTS
// =============================================================================

/// One property on an element, with the span of its key/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    pub name: String,
    pub value: Value,
    pub span: SourceSpan,
}

/// Whether a node is a built-in element or a component invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A registry element type
    Element,
    /// Invocation of a `define`d component; arguments are matched
    /// positionally against the component's parameter list
    ComponentCall { arguments: Vec<Value> },
}

/// A node in the wireframe tree. Exclusively owns its children and props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Element type for built-ins, component name for invocations
    pub name: String,
    pub kind: NodeKind,
    pub props: Vec<Prop>,
    pub children: Vec<ElementNode>,
    /// Text content for text-bearing leaves; `Str`, `Symbol`, or `ParamRef`
    pub text: Option<Value>,
    pub span: SourceSpan,
}

impl ElementNode {
    // =========================================================================
    // PREDICATES / ACCESSORS
    // =========================================================================

    pub fn is_component_call(&self) -> bool {
        matches!(self.kind, NodeKind::ComponentCall { .. })
    }

    /// Property value by name
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Is the named boolean flag set?
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.prop(name), Some(Value::Bool(true)))
    }

    /// Positional invocation arguments (empty for built-in elements)
    pub fn arguments(&self) -> &[Value] {
        match &self.kind {
            NodeKind::ComponentCall { arguments } => arguments,
            NodeKind::Element => &[],
        }
    }

    /// Depth-first walk over this node and all descendants
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ElementNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// Render the element back to WireScript source
    pub fn to_wire_string(&self) -> String {
        let mut parts = vec![format!("({}", self.name)];

        // repeat takes its count positionally
        if self.name == "repeat" {
            if let Some(count) = self.prop("count") {
                parts.push(count.to_wire_string());
            }
        } else {
            for prop in &self.props {
                match &prop.value {
                    Value::Bool(true) => parts.push(format!(":{}", prop.name)),
                    Value::Bool(false) => {}
                    other => parts.push(format!(":{} {}", prop.name, other.to_wire_string())),
                }
            }
        }

        for arg in self.arguments() {
            parts.push(arg.to_wire_string());
        }

        if let Some(ref text) = self.text {
            parts.push(text.to_wire_string());
        }

        for child in &self.children {
            parts.push(child.to_wire_string());
        }

        parts.push(")".to_string());
        join_form(parts)
    }
}

/// Join form parts with single spaces, gluing the trailing `)`
fn join_form(parts: Vec<String>) -> String {
    let mut out = String::new();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && !(i == last && part == ")") {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, text: &str) -> ElementNode {
        ElementNode {
            name: name.to_string(),
            kind: NodeKind::Element,
            props: vec![],
            children: vec![],
            text: Some(Value::Str(text.to_string())),
            span: SourceSpan::default(),
        }
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(Value::Number("3.14".parse().unwrap()).to_wire_string(), "3.14");
        assert_eq!(Value::Str("a \"b\"".into()).to_wire_string(), r#""a \"b\"""#);
        assert_eq!(Value::Reference(Reference::overlay("m")).to_wire_string(), "#m");
        assert_eq!(Value::Reference(Reference::action("close")).to_wire_string(), ":close");
        assert_eq!(Value::Reference(Reference::screen("home")).to_wire_string(), "home");
        assert_eq!(Value::ParamRef("title".into()).to_wire_string(), "$title");
    }

    #[test]
    fn test_element_rendering_with_flag() {
        let mut el = leaf("button", "Go");
        el.props.push(Prop {
            name: "primary".into(),
            value: Value::Bool(true),
            span: SourceSpan::default(),
        });
        el.props.push(Prop {
            name: "to".into(),
            value: Value::Reference(Reference::screen("home")),
            span: SourceSpan::default(),
        });
        assert_eq!(el.to_wire_string(), "(button :primary :to home \"Go\")");
    }

    #[test]
    fn test_prop_and_flag_accessors() {
        let mut el = leaf("text", "hi");
        el.props.push(Prop {
            name: "bold".into(),
            value: Value::Bool(true),
            span: SourceSpan::default(),
        });
        assert!(el.flag("bold"));
        assert!(!el.flag("muted"));
        assert!(el.prop("missing").is_none());
    }

    #[test]
    fn test_walk_visits_all() {
        let tree = ElementNode {
            name: "stack".into(),
            kind: NodeKind::Element,
            props: vec![],
            children: vec![leaf("text", "a"), leaf("text", "b")],
            text: None,
            span: SourceSpan::default(),
        };
        let mut names = Vec::new();
        tree.walk(&mut |n| names.push(n.name.clone()));
        assert_eq!(names, vec!["stack", "text", "text"]);
    }

    #[test]
    fn test_symbols_sorted_by_source_order() {
        let doc = WireDocument {
            meta: vec![],
            screens: vec![ScreenNode {
                id: "home".into(),
                name: None,
                viewport: None,
                children: vec![],
                span: SourceSpan::new(5, 3, 6, 4),
            }],
            components: vec![ComponentDef {
                name: "Card".into(),
                params: vec!["title".into()],
                body: leaf("text", "x"),
                span: SourceSpan::new(2, 3, 3, 4),
            }],
            layouts: vec![],
        };
        let symbols = doc.symbols();
        assert_eq!(symbols[0].name, "Card");
        assert_eq!(symbols[0].kind, SymbolKind::Component);
        assert_eq!(symbols[1].name, "home");
    }

    #[test]
    fn test_document_serde_round_trip() {
        let doc = WireDocument {
            meta: vec![("title".into(), Value::Str("App".into()))],
            screens: vec![],
            components: vec![],
            layouts: vec![],
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: WireDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
