//! Schema-driven recursive-descent parser.
//!
//! Consumes the classified token stream, builds a [`WireDocument`], and
//! validates each element's literal properties against the schema registry
//! as it parses. Errors accumulate; apart from a lexical failure or a
//! missing outer `(wire ...)` form, parsing always returns a best-effort
//! partial document for tooling callers that tolerate partial results.
//!
//! Recovery strategy: a malformed form is skipped to its matching close
//! paren and parsing resumes with the next form.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::debug;

use crate::ast::{
    ComponentDef, ElementNode, LayoutNode, NodeKind, Prop, Reference, ScreenNode, Value,
    WireDocument,
};
use crate::diagnostics::{arity_error, Diagnostic, ErrorKind, SourceSpan};
use crate::schema::{classify_tokens, ElementSchema, SchemaRegistry, ValueKind};
use crate::tokenizer::{tokenize, Token, TokenKind};

// =============================================================================
// PUBLIC API
// =============================================================================

/// Result of a parse: best-effort document plus accumulated errors.
///
/// `document` is `None` only when the input failed to lex or the outermost
/// form was not `(wire ...)`.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub success: bool,
    pub document: Option<WireDocument>,
    pub errors: Vec<Diagnostic>,
}

/// Parse WireScript source into a document
pub fn parse(source: &str) -> ParseOutcome {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => {
            return ParseOutcome {
                success: false,
                document: None,
                errors: vec![Diagnostic::error(ErrorKind::Lex, err.to_string(), err.span())],
            }
        }
    };
    parse_tokens(tokens)
}

/// Parse an already-tokenized stream (comments are ignored here; they only
/// matter to the formatter)
pub fn parse_tokens(tokens: Vec<Token>) -> ParseOutcome {
    let mut tokens = classify_tokens(tokens);
    tokens.retain(|t| t.kind != TokenKind::Comment);
    debug!(token_count = tokens.len(), "parsing token stream");
    Parser::new(tokens).run()
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
    registry: &'static SchemaRegistry,
    /// Param counts of components whose `define` form already completed,
    /// for parse-time arity checks; forward references are the validator's job
    component_arity: HashMap<String, usize>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            registry: SchemaRegistry::global(),
            component_arity: HashMap::new(),
        }
    }

    // =========================================================================
    // TOKEN CURSOR
    // =========================================================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eof_span(&self) -> SourceSpan {
        self.tokens.last().map(|t| t.span).unwrap_or_default()
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, span: SourceSpan) {
        self.errors.push(Diagnostic::error(kind, message, span));
    }

    /// Skip tokens until the close paren matching an already-consumed open
    fn skip_to_close(&mut self) {
        let mut depth = 1usize;
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // =========================================================================
    // DOCUMENT
    // =========================================================================

    fn run(mut self) -> ParseOutcome {
        // The outermost form must be `(wire ...)`; anything else aborts with
        // no document.
        let open = match self.peek() {
            Some(t) if t.kind == TokenKind::LParen => self.bump().unwrap_or_default_token(),
            other => {
                let span = other.map(|t| t.span).unwrap_or_default();
                self.error(ErrorKind::Syntax, "expected a '(wire ...)' document form", span);
                return self.fatal();
            }
        };
        match self.bump() {
            Some(head) if head.kind == TokenKind::FormKeyword && head.text == "wire" => {}
            other => {
                let span = other.map(|t| t.span).unwrap_or(open.span);
                self.error(
                    ErrorKind::Syntax,
                    "the outermost form must be headed by 'wire'",
                    span,
                );
                return self.fatal();
            }
        }

        let mut document = WireDocument::default();
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        "unclosed '(wire ...)' form",
                        self.eof_span(),
                    );
                    break;
                }
                Some(TokenKind::RParen) => {
                    self.bump();
                    if let Some(extra) = self.peek() {
                        let span = extra.span;
                        self.error(
                            ErrorKind::Syntax,
                            "unexpected content after the closing of the 'wire' form",
                            span,
                        );
                    }
                    break;
                }
                Some(TokenKind::LParen) => self.top_level_form(&mut document),
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("expected a top-level form, found '{}'", token.text),
                        token.span,
                    );
                }
            }
        }

        let success = self.errors.is_empty();
        ParseOutcome {
            success,
            document: Some(document),
            errors: self.errors,
        }
    }

    fn fatal(self) -> ParseOutcome {
        ParseOutcome {
            success: false,
            document: None,
            errors: self.errors,
        }
    }

    fn top_level_form(&mut self, document: &mut WireDocument) {
        let open = self.bump().unwrap_or_default_token(); // '('
        match self.peek() {
            Some(head) if head.kind == TokenKind::FormKeyword => {
                let head = self.bump().unwrap_or_default_token();
                match head.text.as_str() {
                    "meta" => self.parse_meta(document),
                    "screen" => {
                        if let Some(screen) = self.parse_screen(&open) {
                            document.screens.push(screen);
                        }
                    }
                    "define" => {
                        if let Some(component) = self.parse_define(&open) {
                            self.component_arity
                                .insert(component.name.clone(), component.params.len());
                            document.components.push(component);
                        }
                    }
                    "layout" => {
                        if let Some(layout) = self.parse_layout(&open) {
                            document.layouts.push(layout);
                        }
                    }
                    other => {
                        self.error(
                            ErrorKind::Syntax,
                            format!("'{}' is not a top-level form", other),
                            head.span,
                        );
                        self.skip_to_close();
                    }
                }
            }
            Some(head) => {
                let span = head.span;
                let text = head.text.clone();
                self.error(
                    ErrorKind::Syntax,
                    format!(
                        "unrecognized top-level form '{}' (expected meta, screen, define, or layout)",
                        text
                    ),
                    span,
                );
                self.skip_to_close();
            }
            None => {
                self.error(ErrorKind::Syntax, "unclosed top-level form", open.span);
            }
        }
    }

    // =========================================================================
    // META
    // =========================================================================

    fn parse_meta(&mut self, document: &mut WireDocument) {
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(ErrorKind::Syntax, "unclosed 'meta' form", self.eof_span());
                    return;
                }
                Some(TokenKind::RParen) => {
                    self.bump();
                    return;
                }
                Some(TokenKind::KeywordAtom) => {
                    let key = self.bump().unwrap_or_default_token();
                    match self.peek().cloned() {
                        Some(token)
                            if token.kind == TokenKind::Number
                                && decimal(&token.text).is_none() =>
                        {
                            self.bump();
                            self.error(
                                ErrorKind::Schema,
                                format!("number '{}' is out of range", token.text),
                                token.span,
                            );
                        }
                        Some(token) => match raw_value(&token) {
                            Some(value) => {
                                self.bump();
                                document.meta.push((key.ident().to_string(), value));
                            }
                            None => self.error(
                                ErrorKind::Syntax,
                                format!("expected a value for meta key ':{}'", key.ident()),
                                key.span,
                            ),
                        },
                        None => self.error(
                            ErrorKind::Syntax,
                            format!("expected a value for meta key ':{}'", key.ident()),
                            key.span,
                        ),
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("expected ':key value' pairs in 'meta', found '{}'", token.text),
                        token.span,
                    );
                    if token.kind == TokenKind::LParen {
                        self.skip_to_close();
                    }
                }
            }
        }
    }

    // =========================================================================
    // SCREEN
    // =========================================================================

    fn parse_screen(&mut self, open: &Token) -> Option<ScreenNode> {
        let id = match self.peek() {
            Some(t) if is_word(t.kind) => self.bump().unwrap_or_default_token(),
            other => {
                let span = other.map(|t| t.span).unwrap_or(open.span);
                self.error(ErrorKind::Syntax, "screen requires an identifier", span);
                self.skip_to_close();
                return None;
            }
        };

        let mut name = None;
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Str {
                let token = self.bump().unwrap_or_default_token();
                name = Some(token.string_content());
            }
        }

        let mut viewport = None;
        let mut children = Vec::new();
        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        format!("unclosed 'screen' form for '{}'", id.text),
                        self.eof_span(),
                    );
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::KeywordAtom) => {
                    let key = self.bump().unwrap_or_default_token();
                    if key.ident() == "viewport" {
                        // first occurrence wins, repeats are flagged
                        let duplicate = viewport.is_some();
                        if duplicate {
                            self.error(
                                ErrorKind::Schema,
                                "duplicate property ':viewport' for screen",
                                key.span,
                            );
                        }
                        match self.peek() {
                            Some(t) if is_word(t.kind) => {
                                let token = self.bump().unwrap_or_default_token();
                                if !duplicate {
                                    viewport = Some(token.text);
                                }
                            }
                            _ if duplicate => {}
                            _ => self.error(
                                ErrorKind::Schema,
                                "':viewport' expects a viewport symbol such as mobile or desktop",
                                key.span,
                            ),
                        }
                    } else {
                        self.error(
                            ErrorKind::Schema,
                            format!("unknown property ':{}' for screen", key.ident()),
                            key.span,
                        );
                        self.consume_stray_value();
                    }
                }
                Some(TokenKind::LParen) => {
                    if let Some(child) = self.parse_element() {
                        children.push(child);
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("unexpected token '{}' in screen form", token.text),
                        token.span,
                    );
                }
            }
        }

        Some(ScreenNode {
            id: id.text,
            name,
            viewport,
            children,
            span: open.span.merge(&close),
        })
    }

    // =========================================================================
    // DEFINE
    // =========================================================================

    fn parse_define(&mut self, open: &Token) -> Option<ComponentDef> {
        let name = match self.peek() {
            Some(t) if is_word(t.kind) => self.bump().unwrap_or_default_token().text,
            Some(t) if t.kind == TokenKind::Str => {
                self.bump().unwrap_or_default_token().string_content()
            }
            other => {
                let span = other.map(|t| t.span).unwrap_or(open.span);
                self.error(ErrorKind::Syntax, "define requires a component name", span);
                self.skip_to_close();
                return None;
            }
        };

        let params = match self.parse_params(&name) {
            Some(params) => params,
            None => {
                self.skip_to_close();
                return None;
            }
        };

        let body = match self.peek().map(|t| t.kind) {
            Some(TokenKind::LParen) => self.parse_element(),
            _ => None,
        };
        let body = match body {
            Some(body) => body,
            None => {
                self.error(
                    ErrorKind::Syntax,
                    format!("component '{}' requires a single body element", name),
                    open.span,
                );
                self.skip_to_close();
                return None;
            }
        };

        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        format!("unclosed 'define' form for '{}'", name),
                        self.eof_span(),
                    );
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::LParen) => {
                    let extra = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("component '{}' body must be a single element", name),
                        extra.span,
                    );
                    self.skip_to_close();
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("unexpected token '{}' in define form", token.text),
                        token.span,
                    );
                }
            }
        }

        Some(ComponentDef {
            name,
            params,
            body,
            span: open.span.merge(&close),
        })
    }

    fn parse_params(&mut self, component: &str) -> Option<Vec<String>> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::LParen) => {
                self.bump();
            }
            _ => {
                let span = self.peek().map(|t| t.span).unwrap_or_else(|| self.eof_span());
                self.error(
                    ErrorKind::Syntax,
                    format!("expected '(params ...)' after component name '{}'", component),
                    span,
                );
                return None;
            }
        }
        match self.peek() {
            Some(t) if is_word(t.kind) && t.text == "params" => {
                self.bump();
            }
            other => {
                let span = other.map(|t| t.span).unwrap_or_else(|| self.eof_span());
                self.error(
                    ErrorKind::Syntax,
                    format!("expected '(params ...)' after component name '{}'", component),
                    span,
                );
                self.skip_to_close();
                return None;
            }
        }

        let mut params: Vec<String> = Vec::new();
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(ErrorKind::Syntax, "unclosed 'params' list", self.eof_span());
                    return Some(params);
                }
                Some(TokenKind::RParen) => {
                    self.bump();
                    return Some(params);
                }
                Some(kind) if is_word(kind) || kind == TokenKind::Str => {
                    let token = self.bump().unwrap_or_default_token();
                    let param = if token.kind == TokenKind::Str {
                        token.string_content()
                    } else {
                        token.text.clone()
                    };
                    if params.contains(&param) {
                        self.error(
                            ErrorKind::Reference,
                            format!(
                                "duplicate parameter '{}' in component '{}'",
                                param, component
                            ),
                            token.span,
                        );
                    } else {
                        params.push(param);
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("parameter names must be symbols, found '{}'", token.text),
                        token.span,
                    );
                }
            }
        }
    }

    // =========================================================================
    // LAYOUT
    // =========================================================================

    fn parse_layout(&mut self, open: &Token) -> Option<LayoutNode> {
        let name = match self.peek() {
            Some(t) if is_word(t.kind) => self.bump().unwrap_or_default_token().text,
            other => {
                let span = other.map(|t| t.span).unwrap_or(open.span);
                self.error(ErrorKind::Syntax, "layout requires an identifier", span);
                self.skip_to_close();
                return None;
            }
        };

        let mut children = Vec::new();
        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        format!("unclosed 'layout' form for '{}'", name),
                        self.eof_span(),
                    );
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::LParen) => {
                    if let Some(child) = self.parse_element() {
                        children.push(child);
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("unexpected token '{}' in layout form", token.text),
                        token.span,
                    );
                }
            }
        }

        Some(LayoutNode {
            name,
            children,
            span: open.span.merge(&close),
        })
    }

    // =========================================================================
    // ELEMENTS
    // =========================================================================

    /// Parse one element-producing form; the cursor sits on its '('.
    fn parse_element(&mut self) -> Option<ElementNode> {
        let open = self.bump().unwrap_or_default_token(); // '('

        let head = match self.peek() {
            Some(t) if t.kind == TokenKind::RParen => {
                let span = self.bump().unwrap_or_default_token().span;
                self.error(ErrorKind::Syntax, "empty form", open.span.merge(&span));
                return None;
            }
            Some(t) if is_word(t.kind) => self.bump().unwrap_or_default_token(),
            other => {
                let span = other.map(|t| t.span).unwrap_or(open.span);
                self.error(
                    ErrorKind::Syntax,
                    "expected an element type or component name",
                    span,
                );
                self.skip_to_close();
                return None;
            }
        };

        match head.kind {
            TokenKind::FormKeyword if head.text == "repeat" => self.parse_repeat(&open, &head),
            TokenKind::FormKeyword => {
                self.error(
                    ErrorKind::Syntax,
                    format!("form '{}' is not allowed inside an element tree", head.text),
                    head.span,
                );
                self.skip_to_close();
                None
            }
            TokenKind::ElementKeyword | TokenKind::OverlayKeyword => {
                // The classification pass only produces these kinds for
                // names the registry contains; a miss is a programming
                // error, not malformed input.
                let registry = self.registry;
                let schema = match registry.element(&head.text) {
                    Some(schema) => schema,
                    None => unreachable!(
                        "classified element type '{}' has no registry schema",
                        head.text
                    ),
                };
                self.parse_builtin(&open, &head, schema)
            }
            // Not a registry type: a call to a defined (possibly later-defined)
            // component, matched positionally against its parameter list.
            _ => self.parse_component_call(&open, &head),
        }
    }

    fn parse_builtin(
        &mut self,
        open: &Token,
        head: &Token,
        schema: &ElementSchema,
    ) -> Option<ElementNode> {
        let mut props: Vec<Prop> = Vec::new();
        let mut children = Vec::new();
        let mut text = None;

        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        format!("unclosed '{}' element form", head.text),
                        self.eof_span(),
                    );
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::KeywordAtom) => self.parse_prop(schema, &mut props),
                Some(TokenKind::LParen) => {
                    if let Some(child) = self.parse_element() {
                        children.push(child);
                    }
                }
                Some(kind)
                    if schema.text_content
                        && text.is_none()
                        && (matches!(kind, TokenKind::Str | TokenKind::ParamRef)
                            || is_word(kind)) =>
                {
                    let token = self.bump().unwrap_or_default_token();
                    text = Some(match token.kind {
                        TokenKind::Str => Value::Str(token.string_content()),
                        TokenKind::ParamRef => Value::ParamRef(token.ident().to_string()),
                        _ => Value::Symbol(token.text),
                    });
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!(
                            "unexpected token '{}' in '{}' form",
                            token.text, head.text
                        ),
                        token.span,
                    );
                }
            }
        }

        Some(ElementNode {
            name: head.text.clone(),
            kind: NodeKind::Element,
            props,
            children,
            text,
            span: open.span.merge(&close),
        })
    }

    /// `(repeat N template...)` - the count is positional but lands in the
    /// prop map so the registry's required-prop machinery covers it
    fn parse_repeat(&mut self, open: &Token, head: &Token) -> Option<ElementNode> {
        // The count is positional; a missing count surfaces through the
        // validator's required-prop check.
        let mut props = Vec::new();
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Number {
                let token = self.bump().unwrap_or_default_token();
                match decimal(&token.text) {
                    Some(count) => props.push(Prop {
                        name: "count".to_string(),
                        value: Value::Number(count),
                        span: token.span,
                    }),
                    None => self.error(
                        ErrorKind::Schema,
                        format!("number '{}' is out of range", token.text),
                        token.span,
                    ),
                }
            }
        }

        let mut children = Vec::new();
        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(ErrorKind::Syntax, "unclosed 'repeat' form", self.eof_span());
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::LParen) => {
                    if let Some(child) = self.parse_element() {
                        children.push(child);
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    self.error(
                        ErrorKind::Syntax,
                        format!("unexpected token '{}' in repeat form", token.text),
                        token.span,
                    );
                }
            }
        }

        Some(ElementNode {
            name: head.text.clone(),
            kind: NodeKind::Element,
            props,
            children,
            text: None,
            span: open.span.merge(&close),
        })
    }

    fn parse_component_call(&mut self, open: &Token, head: &Token) -> Option<ElementNode> {
        let mut arguments = Vec::new();
        let mut children = Vec::new();

        let close;
        loop {
            match self.peek().map(|t| t.kind) {
                None => {
                    self.error(
                        ErrorKind::Syntax,
                        format!("unclosed invocation of '{}'", head.text),
                        self.eof_span(),
                    );
                    close = self.eof_span();
                    break;
                }
                Some(TokenKind::RParen) => {
                    close = self.bump().unwrap_or_default_token().span;
                    break;
                }
                Some(TokenKind::LParen) => {
                    if let Some(child) = self.parse_element() {
                        children.push(child);
                    }
                }
                Some(_) => {
                    let token = self.bump().unwrap_or_default_token();
                    if token.kind == TokenKind::Number && decimal(&token.text).is_none() {
                        self.error(
                            ErrorKind::Schema,
                            format!("number '{}' is out of range", token.text),
                            token.span,
                        );
                    } else {
                        match raw_value(&token) {
                            Some(value) => arguments.push(value),
                            None => self.error(
                                ErrorKind::Syntax,
                                format!(
                                    "unexpected token '{}' in invocation of '{}'",
                                    token.text, head.text
                                ),
                                token.span,
                            ),
                        }
                    }
                }
            }
        }

        let span = open.span.merge(&close);
        // Deferred arity check: only possible when the define form already
        // completed; forward references are resolved document-wide by the
        // validator.
        if let Some(&expected) = self.component_arity.get(&head.text) {
            if arguments.len() != expected {
                self.errors
                    .push(arity_error(&head.text, expected, arguments.len(), span));
            }
        }

        Some(ElementNode {
            name: head.text.clone(),
            kind: NodeKind::ComponentCall { arguments },
            props: Vec::new(),
            children,
            text: None,
            span,
        })
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    fn parse_prop(&mut self, schema: &ElementSchema, props: &mut Vec<Prop>) {
        let key = self.bump().unwrap_or_default_token();
        let name = key.ident().to_string();

        let prop_schema = match schema.prop(&name) {
            Some(ps) => ps,
            None => {
                self.error(
                    ErrorKind::Schema,
                    format!("unknown property ':{}' for element '{}'", name, schema.name),
                    key.span,
                );
                self.consume_stray_value();
                return;
            }
        };

        let duplicate = props.iter().any(|p| p.name == name);
        if duplicate {
            self.error(
                ErrorKind::Schema,
                format!("duplicate property ':{}' on '{}'", name, schema.name),
                key.span,
            );
        }

        // Flags carry no value token.
        if prop_schema.kind == ValueKind::Flag {
            if !duplicate {
                props.push(Prop {
                    name,
                    value: Value::Bool(true),
                    span: key.span,
                });
            }
            return;
        }

        // A keyword atom normally starts the next property, but reference
        // props accept `:action` targets as their value.
        let keyword_ok = prop_schema.kind == ValueKind::Reference;
        let value_token = match self.peek() {
            Some(t)
                if !matches!(t.kind, TokenKind::RParen | TokenKind::LParen)
                    && (keyword_ok || t.kind != TokenKind::KeywordAtom) =>
            {
                self.bump().unwrap_or_default_token()
            }
            _ => {
                self.error(
                    ErrorKind::Schema,
                    format!("missing value for property ':{}' on '{}'", name, schema.name),
                    key.span,
                );
                return;
            }
        };

        if value_token.kind == TokenKind::Number && decimal(&value_token.text).is_none() {
            self.error(
                ErrorKind::Schema,
                format!("number '{}' is out of range", value_token.text),
                value_token.span,
            );
            return;
        }

        let converted = self.convert_value(prop_schema.kind, &value_token);
        match converted {
            Some(value) => {
                if !duplicate {
                    props.push(Prop {
                        name,
                        value,
                        span: key.span.merge(&value_token.span),
                    });
                }
            }
            None => {
                self.error(
                    ErrorKind::Schema,
                    format!(
                        "expected {} for property ':{}' on '{}', found '{}'",
                        kind_name(prop_schema.kind),
                        name,
                        schema.name,
                        value_token.text
                    ),
                    key.span.merge(&value_token.span),
                );
            }
        }
    }

    /// Convert a value token to the schema's declared kind. Parameter
    /// references are accepted for any kind; they substitute at instantiation.
    fn convert_value(&self, kind: ValueKind, token: &Token) -> Option<Value> {
        if token.kind == TokenKind::ParamRef {
            return Some(Value::ParamRef(token.ident().to_string()));
        }
        match kind {
            ValueKind::Flag => None,
            ValueKind::Number => match token.kind {
                TokenKind::Number => decimal(&token.text).map(Value::Number),
                _ => None,
            },
            ValueKind::Str => match token.kind {
                TokenKind::Str => Some(Value::Str(token.string_content())),
                _ => None,
            },
            ValueKind::Symbol => {
                if is_word(token.kind) {
                    Some(Value::Symbol(token.text.clone()))
                } else {
                    None
                }
            }
            // Navigation targets are normalized here, exactly once; no
            // downstream consumer re-derives the kind from leading sigils.
            ValueKind::Reference => match token.kind {
                TokenKind::OverlayRef => {
                    Some(Value::Reference(Reference::overlay(token.ident())))
                }
                TokenKind::KeywordAtom => {
                    Some(Value::Reference(Reference::action(token.ident())))
                }
                // Legacy form: a quoted screen id is still accepted and
                // normalized the same way as a bare symbol.
                TokenKind::Str => Some(Value::Reference(Reference::screen(
                    token.string_content(),
                ))),
                kind if is_word(kind) => {
                    Some(Value::Reference(Reference::screen(token.text.clone())))
                }
                _ => None,
            },
        }
    }

    /// After an unknown property name, swallow what looks like its value so
    /// the scan resumes at the next prop or child
    fn consume_stray_value(&mut self) {
        if let Some(t) = self.peek() {
            if matches!(
                t.kind,
                TokenKind::Str | TokenKind::Number | TokenKind::ParamRef | TokenKind::OverlayRef
            ) || is_word(t.kind)
            {
                self.bump();
            }
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Bare-word token kinds: symbols plus everything classification may have
/// upgraded them to
fn is_word(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Symbol
            | TokenKind::ElementKeyword
            | TokenKind::OverlayKeyword
            | TokenKind::FormKeyword
    )
}

/// Raw (schema-independent) conversion for meta values and invocation args
fn raw_value(token: &Token) -> Option<Value> {
    match token.kind {
        TokenKind::Number => decimal(&token.text).map(Value::Number),
        TokenKind::Str => Some(Value::Str(token.string_content())),
        TokenKind::KeywordAtom => Some(Value::Keyword(token.ident().to_string())),
        TokenKind::ParamRef => Some(Value::ParamRef(token.ident().to_string())),
        TokenKind::OverlayRef => Some(Value::Reference(Reference::overlay(token.ident()))),
        kind if is_word(kind) => Some(Value::Symbol(token.text.clone())),
        _ => None,
    }
}

/// Lexically valid numbers can still exceed the 96-bit decimal range;
/// callers report `None` as a schema error rather than corrupting the value
fn decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim_start_matches('+')).ok()
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Flag => "a bare flag",
        ValueKind::Number => "a number",
        ValueKind::Str => "a string",
        ValueKind::Symbol => "a symbol",
        ValueKind::Reference => "a navigation target",
    }
}

/// Fallback for the impossible None from `bump` right after a successful
/// peek; keeps the cursor code free of unwraps on user input.
trait OrDefaultToken {
    fn unwrap_or_default_token(self) -> Token;
}

impl OrDefaultToken for Option<Token> {
    fn unwrap_or_default_token(self) -> Token {
        self.unwrap_or(Token {
            kind: TokenKind::Symbol,
            text: String::new(),
            span: SourceSpan::default(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ReferenceKind;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> WireDocument {
        let outcome = parse(source);
        assert!(
            outcome.success,
            "expected clean parse, got {:?}",
            outcome.errors
        );
        outcome.document.unwrap()
    }

    #[test]
    fn test_minimal_document() {
        let doc = parse_ok("(wire)");
        assert!(doc.screens.is_empty());
        assert!(doc.meta.is_empty());
    }

    #[test]
    fn test_not_a_wire_form() {
        let outcome = parse("(screen home)");
        assert!(!outcome.success);
        assert!(outcome.document.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_lex_error_yields_no_document() {
        let outcome = parse("(wire (screen home (text \"hello");
        assert!(!outcome.success);
        assert!(outcome.document.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Lex);
    }

    #[test]
    fn test_meta() {
        let doc = parse_ok("(wire (meta :title \"My App\" :theme dark :version 2))");
        assert_eq!(doc.meta.len(), 3);
        assert_eq!(doc.meta_value("title"), Some(&Value::Str("My App".into())));
        assert_eq!(doc.meta_value("theme"), Some(&Value::Symbol("dark".into())));
    }

    #[test]
    fn test_screen_with_viewport_and_children() {
        let doc = parse_ok(
            "(wire (screen home \"Home\" :viewport mobile (stack :gap 8 (text \"hi\"))))",
        );
        let screen = doc.screen("home").unwrap();
        assert_eq!(screen.name.as_deref(), Some("Home"));
        assert_eq!(screen.viewport.as_deref(), Some("mobile"));
        assert_eq!(screen.children.len(), 1);
        let stack = &screen.children[0];
        assert_eq!(stack.name, "stack");
        assert_eq!(
            stack.prop("gap"),
            Some(&Value::Number(Decimal::from(8)))
        );
        assert_eq!(stack.children[0].text, Some(Value::Str("hi".into())));
    }

    #[test]
    fn test_flag_and_kv_props() {
        let doc = parse_ok("(wire (screen s (button :primary :to home \"Go\")))");
        let button = &doc.screen("s").unwrap().children[0];
        assert!(button.flag("primary"));
        assert!(!button.flag("disabled"));
        assert_eq!(button.text, Some(Value::Str("Go".into())));
    }

    #[test]
    fn test_reference_normalization() {
        let doc = parse_ok(
            "(wire (screen s (button :to #settings-modal \"a\") (button :to :close \"b\") (button :to home \"c\")))",
        );
        let children = &doc.screen("s").unwrap().children;
        let refs: Vec<&Reference> = children
            .iter()
            .map(|c| c.prop("to").unwrap().as_reference().unwrap())
            .collect();
        assert_eq!(refs[0].kind, ReferenceKind::Overlay);
        assert_eq!(refs[0].id, "settings-modal");
        assert_eq!(refs[1].kind, ReferenceKind::Action);
        assert_eq!(refs[1].id, "close");
        assert_eq!(refs[2].kind, ReferenceKind::Screen);
        assert_eq!(refs[2].id, "home");
    }

    #[test]
    fn test_legacy_string_target_normalized_to_screen_ref() {
        let doc = parse_ok("(wire (screen s (link :to \"home\" \"back\")))");
        let link = &doc.screen("s").unwrap().children[0];
        assert_eq!(
            link.prop("to"),
            Some(&Value::Reference(Reference::screen("home")))
        );
    }

    #[test]
    fn test_define_and_backward_invocation_arity() {
        let source = r#"(wire
            (define "Card" (params "title") (box (text $title)))
            (screen s (Card)))"#;
        let outcome = parse(source);
        assert!(!outcome.success);
        let errors: Vec<_> = outcome
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Arity)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Card"));
        // the definition is still in the document
        let doc = outcome.document.unwrap();
        assert_eq!(doc.components.len(), 1);
        assert_eq!(doc.components[0].params, vec!["title"]);
        assert_eq!(
            doc.components[0].body.children[0].text,
            Some(Value::ParamRef("title".into()))
        );
    }

    #[test]
    fn test_forward_invocation_not_checked_at_parse_time() {
        // Arity of forward references is the validator's job.
        let source = r#"(wire
            (screen s (Card "only-one"))
            (define Card (params a b) (box)))"#;
        let outcome = parse(source);
        assert!(outcome.success, "{:?}", outcome.errors);
        let doc = outcome.document.unwrap();
        let call = &doc.screen("s").unwrap().children[0];
        assert!(call.is_component_call());
        assert_eq!(call.arguments(), &[Value::Str("only-one".into())]);
    }

    #[test]
    fn test_unknown_element_becomes_component_call() {
        let doc = parse_ok("(wire (screen s (bogus-type) (text \"still here\")))");
        let children = &doc.screen("s").unwrap().children;
        assert!(children[0].is_component_call());
        assert_eq!(children[1].text, Some(Value::Str("still here".into())));
    }

    #[test]
    fn test_unknown_property() {
        let outcome = parse("(wire (screen s (text :bogus 4 \"x\")))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Schema);
        assert!(outcome.errors[0].message.contains(":bogus"));
        // text content after the stray value still parsed
        let doc = outcome.document.unwrap();
        let text = &doc.screen("s").unwrap().children[0];
        assert_eq!(text.text, Some(Value::Str("x".into())));
    }

    #[test]
    fn test_value_kind_mismatch() {
        let outcome = parse("(wire (screen s (stack :gap \"wide\")))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Schema);
        // element survives without the bad prop
        let doc = outcome.document.unwrap();
        let stack = &doc.screen("s").unwrap().children[0];
        assert!(stack.prop("gap").is_none());
    }

    #[test]
    fn test_duplicate_property() {
        let outcome = parse("(wire (screen s (stack :gap 4 :gap 8)))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("duplicate property"));
        // first occurrence wins
        let doc = outcome.document.unwrap();
        let stack = &doc.screen("s").unwrap().children[0];
        assert_eq!(stack.prop("gap"), Some(&Value::Number(Decimal::from(4))));
    }

    #[test]
    fn test_duplicate_viewport_on_screen() {
        let outcome = parse("(wire (screen s :viewport mobile :viewport desktop))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Schema);
        assert!(outcome.errors[0].message.contains(":viewport"));
        // first occurrence wins
        let doc = outcome.document.unwrap();
        assert_eq!(doc.screen("s").unwrap().viewport.as_deref(), Some("mobile"));
    }

    #[test]
    fn test_prop_number_out_of_range() {
        // one more than the largest representable decimal
        let outcome = parse("(wire (screen s (stack :gap 79228162514264337593543950336)))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Schema);
        assert!(outcome.errors[0].message.contains("out of range"));
        // element survives without the bad prop
        let doc = outcome.document.unwrap();
        assert!(doc.screen("s").unwrap().children[0].prop("gap").is_none());
    }

    #[test]
    fn test_meta_number_out_of_range() {
        let outcome = parse("(wire (meta :version 99999999999999999999999999999999))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("out of range"));
        assert!(outcome.document.unwrap().meta.is_empty());
    }

    #[test]
    fn test_repeat_count_out_of_range() {
        let outcome = parse("(wire (screen s (repeat 79228162514264337593543950336 (box))))");
        assert!(!outcome.success);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.message.contains("out of range")));
        let doc = outcome.document.unwrap();
        assert!(doc.screen("s").unwrap().children[0].prop("count").is_none());
    }

    #[test]
    fn test_unrecognized_top_level_form_recovers() {
        let outcome = parse("(wire (widget x (text \"a\")) (screen home (text \"b\")))");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Syntax);
        // the following well-formed screen still parsed
        let doc = outcome.document.unwrap();
        assert_eq!(doc.screens.len(), 1);
        assert_eq!(doc.screens[0].id, "home");
    }

    #[test]
    fn test_repeat() {
        let doc = parse_ok("(wire (screen s (repeat 3 (box (text \"cell\")))))");
        let repeat = &doc.screen("s").unwrap().children[0];
        assert_eq!(repeat.name, "repeat");
        assert_eq!(
            repeat.prop("count"),
            Some(&Value::Number(Decimal::from(3)))
        );
        assert_eq!(repeat.children.len(), 1);
    }

    #[test]
    fn test_layout_with_slot() {
        let doc = parse_ok("(wire (layout shell (navbar :title \"App\") (slot :name content)))");
        let layout = doc.layout("shell").unwrap();
        assert_eq!(layout.children.len(), 2);
        assert_eq!(layout.children[1].name, "slot");
    }

    #[test]
    fn test_param_ref_as_prop_value() {
        let doc = parse_ok("(wire (define Cell (params w) (sidebar :width $w)))");
        let body = &doc.components[0].body;
        assert_eq!(body.prop("width"), Some(&Value::ParamRef("w".into())));
    }

    #[test]
    fn test_spans_cover_forms() {
        let doc = parse_ok("(wire\n  (screen home\n    (text \"hi\")))");
        let screen = doc.screen("home").unwrap();
        assert_eq!(screen.span.start_line, 2);
        assert_eq!(screen.span.start_col, 3);
        assert_eq!(screen.span.end_line, 3);
        let text = &screen.children[0];
        assert_eq!(text.span.start_line, 3);
    }

    #[test]
    fn test_unclosed_wire_keeps_partial_document() {
        let outcome = parse("(wire (screen home (text \"hi\"))");
        assert!(!outcome.success);
        let doc = outcome.document.unwrap();
        assert_eq!(doc.screens.len(), 1);
    }

    #[test]
    fn test_empty_form_error() {
        let outcome = parse("(wire (screen s ()))");
        assert!(!outcome.success);
        assert!(outcome.errors[0].message.contains("empty form"));
    }
}
