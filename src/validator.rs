//! Document-wide semantic validation.
//!
//! Runs after parsing, over whatever document the parser recovered. Checks
//! that cannot be made on a forward-only token stream live here: duplicate
//! identifiers, screen/overlay reference resolution, arity of calls to
//! forward-defined components, cyclic component references, required
//! properties, and parameter-reference scoping.
//!
//! Errors block `valid`; warnings (deprecated props, unused components) are
//! informational only.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{ComponentDef, ElementNode, ReferenceKind, Value, WireDocument};
use crate::diagnostics::{
    arity_error, cycle_error, duplicate_identifier_error, missing_prop_error,
    unresolved_target_error, Diagnostic, ErrorKind, SourceSpan,
};
use crate::schema::SchemaRegistry;

// =============================================================================
// PUBLIC API
// =============================================================================

/// Validation findings, split into blocking errors and informational warnings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Validate a parsed document
pub fn validate(document: &WireDocument) -> ValidationResult {
    debug!(
        screens = document.screens.len(),
        components = document.components.len(),
        layouts = document.layouts.len(),
        "validating document"
    );
    Validator::new(document).run()
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Parameter scope for element-tree checks: the enclosing component's name
/// and parameter list, absent inside screens and layouts
type ParamScope<'a> = Option<(&'a str, &'a [String])>;

struct Validator<'a> {
    document: &'a WireDocument,
    registry: &'static SchemaRegistry,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    screen_ids: HashSet<&'a str>,
    overlay_ids: HashSet<&'a str>,
    /// First definition wins; later duplicates are flagged but not resolved to
    components: HashMap<&'a str, &'a ComponentDef>,
    invoked: HashSet<&'a str>,
}

impl<'a> Validator<'a> {
    fn new(document: &'a WireDocument) -> Self {
        Self {
            document,
            registry: SchemaRegistry::global(),
            errors: Vec::new(),
            warnings: Vec::new(),
            screen_ids: HashSet::new(),
            overlay_ids: HashSet::new(),
            components: HashMap::new(),
            invoked: HashSet::new(),
        }
    }

    fn run(mut self) -> ValidationResult {
        self.collect_identifiers();
        self.collect_overlay_ids();

        for screen in &self.document.screens {
            for child in &screen.children {
                self.check_tree(child, None);
            }
        }
        for layout in &self.document.layouts {
            for child in &layout.children {
                self.check_tree(child, None);
            }
        }
        for component in &self.document.components {
            self.check_tree(&component.body, Some((&component.name, &component.params)));
        }

        self.check_cycles();
        self.check_unused_components();

        let valid = self.errors.is_empty();
        ValidationResult {
            valid,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    // =========================================================================
    // IDENTIFIERS
    // =========================================================================

    fn collect_identifiers(&mut self) {
        for screen in &self.document.screens {
            if !self.screen_ids.insert(&screen.id) {
                self.errors
                    .push(duplicate_identifier_error("screen", &screen.id, screen.span));
            }
        }
        for component in &self.document.components {
            if self.components.contains_key(component.name.as_str()) {
                self.errors.push(duplicate_identifier_error(
                    "component",
                    &component.name,
                    component.span,
                ));
            } else {
                self.components.insert(&component.name, component);
            }
        }
        let mut layout_names = HashSet::new();
        for layout in &self.document.layouts {
            if !layout_names.insert(layout.name.as_str()) {
                self.errors
                    .push(duplicate_identifier_error("layout", &layout.name, layout.span));
            }
        }
    }

    /// Overlay targets resolve against overlay-producing elements reachable
    /// from a screen, keyed by their `:id` prop. Component invocations are
    /// expanded through their definitions, so an overlay declared inside an
    /// invoked component body is a valid target.
    fn collect_overlay_ids(&mut self) {
        let mut ids = HashSet::new();
        let mut expanding: HashSet<&'a str> = HashSet::new();
        for screen in &self.document.screens {
            for child in &screen.children {
                self.overlay_ids_in(child, &mut ids, &mut expanding);
            }
        }
        self.overlay_ids = ids;
    }

    fn overlay_ids_in(
        &self,
        node: &'a ElementNode,
        ids: &mut HashSet<&'a str>,
        expanding: &mut HashSet<&'a str>,
    ) {
        if node.is_component_call() {
            // `expanding` cuts off cyclic definitions; the cycle itself is
            // reported by check_cycles.
            if let Some(&definition) = self.components.get(node.name.as_str()) {
                if expanding.insert(definition.name.as_str()) {
                    self.overlay_ids_in(&definition.body, ids, expanding);
                    expanding.remove(definition.name.as_str());
                }
            }
        } else if self.registry.is_overlay_type(&node.name) {
            if let Some(Value::Symbol(id)) = node.prop("id") {
                ids.insert(id.as_str());
            }
        }
        for child in &node.children {
            self.overlay_ids_in(child, ids, expanding);
        }
    }

    // =========================================================================
    // ELEMENT TREES
    // =========================================================================

    fn check_tree(&mut self, root: &'a ElementNode, scope: ParamScope<'a>) {
        let mut nodes = Vec::new();
        root.walk(&mut |node| nodes.push(node));
        for node in nodes {
            self.check_node(node, scope);
        }
    }

    fn check_node(&mut self, node: &'a ElementNode, scope: ParamScope<'a>) {
        for prop in &node.props {
            self.check_value(&prop.value, prop.span, scope);
        }
        if let Some(ref text) = node.text {
            self.check_value(text, node.span, scope);
        }
        for argument in node.arguments() {
            self.check_value(argument, node.span, scope);
        }

        if node.is_component_call() {
            self.check_invocation(node);
        } else {
            self.check_builtin(node);
        }
    }

    fn check_invocation(&mut self, node: &'a ElementNode) {
        let definition = match self.components.get(node.name.as_str()) {
            Some(def) => *def,
            None => {
                self.errors.push(Diagnostic::error(
                    ErrorKind::Schema,
                    format!("unknown element type or component '{}'", node.name),
                    node.span,
                ));
                return;
            }
        };
        self.invoked.insert(&definition.name);

        // Backward references were arity-checked during parsing; only calls
        // that precede their definition in source order are checked here.
        let forward = !definition.span.starts_before(&node.span);
        if forward && node.arguments().len() != definition.params.len() {
            self.errors.push(arity_error(
                &node.name,
                definition.params.len(),
                node.arguments().len(),
                node.span,
            ));
        }
    }

    fn check_builtin(&mut self, node: &'a ElementNode) {
        let schema = match self.registry.element(&node.name) {
            Some(schema) => schema,
            None => return,
        };
        for required in schema.required_props() {
            if node.prop(required.name).is_none() {
                self.errors
                    .push(missing_prop_error(required.name, &node.name, node.span));
            }
        }
        for prop in &node.props {
            if let Some(hint) = schema.prop(&prop.name).and_then(|p| p.deprecated) {
                self.warnings.push(Diagnostic::warning(
                    ErrorKind::Schema,
                    format!(
                        "property ':{}' on '{}' is deprecated: {}",
                        prop.name, node.name, hint
                    ),
                    prop.span,
                ));
            }
        }
    }

    fn check_value(&mut self, value: &Value, span: SourceSpan, scope: ParamScope<'a>) {
        match value {
            Value::Reference(reference) => match reference.kind {
                ReferenceKind::Screen => {
                    if !self.screen_ids.contains(reference.id.as_str()) {
                        self.errors
                            .push(unresolved_target_error("screen", &reference.id, span));
                    }
                }
                ReferenceKind::Overlay => {
                    if !self.overlay_ids.contains(reference.id.as_str()) {
                        self.errors
                            .push(unresolved_target_error("overlay", &reference.id, span));
                    }
                }
                // Action semantics belong to the rendering layer.
                ReferenceKind::Action => {}
            },
            Value::ParamRef(param) => match scope {
                Some((component, params)) => {
                    if !params.iter().any(|p| p == param) {
                        self.errors.push(Diagnostic::error(
                            ErrorKind::Reference,
                            format!(
                                "unknown parameter '${}' in component '{}'",
                                param, component
                            ),
                            span,
                        ));
                    }
                }
                None => {
                    self.errors.push(Diagnostic::error(
                        ErrorKind::Reference,
                        format!(
                            "parameter reference '${}' used outside a component definition",
                            param
                        ),
                        span,
                    ));
                }
            },
            _ => {}
        }
    }

    // =========================================================================
    // COMPONENT CALL GRAPH
    // =========================================================================

    fn check_cycles(&mut self) {
        // Call graph over defined components only; calls to undefined names
        // were already reported as unknown invocations.
        let mut graph: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        for (&name, definition) in &self.components {
            let mut callees = Vec::new();
            definition.body.walk(&mut |node| {
                if node.is_component_call() {
                    if let Some(callee) = self.components.get(node.name.as_str()) {
                        callees.push(callee.name.as_str());
                    }
                }
            });
            graph.insert(name, callees);
        }

        let mut marks: HashMap<&'a str, Mark> = HashMap::new();
        let mut stack: Vec<&'a str> = Vec::new();
        let mut names: Vec<&'a str> = self.components.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            if !marks.contains_key(name) {
                self.visit(name, &graph, &mut marks, &mut stack);
            }
        }
    }

    fn visit(
        &mut self,
        name: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) {
        marks.insert(name, Mark::InProgress);
        stack.push(name);
        if let Some(callees) = graph.get(name) {
            for callee in callees {
                match marks.get(callee) {
                    None => self.visit(callee, graph, marks, stack),
                    Some(Mark::InProgress) => {
                        let start = stack.iter().position(|n| n == callee).unwrap_or(0);
                        let mut members: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        members.push(callee.to_string());
                        let span = self
                            .components
                            .get(callee)
                            .map(|d| d.span)
                            .unwrap_or_default();
                        self.errors.push(cycle_error(&members, span));
                    }
                    Some(Mark::Done) => {}
                }
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
    }

    // =========================================================================
    // WARNINGS
    // =========================================================================

    fn check_unused_components(&mut self) {
        for component in &self.document.components {
            let is_primary = self
                .components
                .get(component.name.as_str())
                .map(|d| std::ptr::eq(*d, component))
                .unwrap_or(false);
            if is_primary && !self.invoked.contains(component.name.as_str()) {
                self.warnings.push(Diagnostic::warning(
                    ErrorKind::Reference,
                    format!("component '{}' is defined but never invoked", component.name),
                    component.span,
                ));
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

// =============================================================================
// TESTS
// =============================================================================
