//
// scope.rs
//
// Free-identifier analysis for a single function
//
// Two passes over the function's syntax tree:
//
// 1. Declarations: every simple identifier bound by a parameter or a variable
//    declaration anywhere inside the function lands in one flat set. Nested
//    lexical scopes are NOT modeled, so a declaration deep inside a block
//    hides every reference to that name in the whole function, including
//    references that appear textually before it.
//
// 2. Usages: every identifier reference whose name is not in that set is a
//    free identifier. One entry per name; a later occurrence overwrites the
//    recorded position but keeps the name's original slot in the ordering.
//
// Destructuring patterns do not bind anything here.
//

use std::collections::HashSet;

use indexmap::IndexMap;
use tree_sitter::Node;

use crate::locator::node_text;
use crate::types::{FreeIdentifier, SourceLocation};

/// Result of analysing one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeAnalysis {
    /// Names bound anywhere inside the function
    pub declared: HashSet<String>,
    /// Free identifiers in first-seen order, each at its last-seen position
    pub free: Vec<FreeIdentifier>,
}

impl ScopeAnalysis {
    pub fn is_closed(&self) -> bool {
        self.free.is_empty()
    }
}

/// Analyse `function` (a function-shaped node) within `content`.
///
/// Subtrees nested deeper than `max_depth` below the function are skipped.
pub fn analyze_function(function: Node, content: &str, max_depth: usize) -> ScopeAnalysis {
    let mut declared = HashSet::new();
    let mut usages: IndexMap<String, SourceLocation> = IndexMap::new();

    let own_name = function.child_by_field_name("name").map(|n| n.id());
    let mut cursor = function.walk();
    let parts: Vec<Node> = function
        .children(&mut cursor)
        .filter(|child| Some(child.id()) != own_name)
        .collect();

    // Parameter nodes are direct children of the function, so the function
    // node's own fields are handled before descending.
    collect_own_parameters(function, content, &mut declared);
    for part in &parts {
        collect_declarations(*part, content, 1, max_depth, &mut declared);
    }
    for part in &parts {
        collect_usages(*part, content, 1, max_depth, &declared, &mut usages);
    }

    let free = usages
        .into_iter()
        .map(|(name, position)| FreeIdentifier { name, position })
        .collect::<Vec<_>>();

    log::trace!(
        "Scope analysis: {} declared, {} free ({})",
        declared.len(),
        free.len(),
        free.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    ScopeAnalysis { declared, free }
}

/// Convenience wrapper returning only the free identifiers.
pub fn free_identifiers(function: Node, content: &str, max_depth: usize) -> Vec<FreeIdentifier> {
    analyze_function(function, content, max_depth).free
}

fn depth_exceeded(node: Node, depth: usize, max_depth: usize) -> bool {
    if depth > max_depth {
        log::warn!(
            "Function nests deeper than {} levels at line {}; subtree ignored",
            max_depth,
            node.start_position().row + 1
        );
        return true;
    }
    false
}

// ============================================================================
// Pass 1: declarations
// ============================================================================

/// The simple identifier bound by a binding position, if any.
///
/// Handles `x`, `...x`, and `x = default`; destructuring yields `None`.
fn binding_identifier(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" => Some(node),
        "rest_pattern" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next()?;
            binding_identifier(inner)
        }
        "assignment_pattern" => binding_identifier(node.child_by_field_name("left")?),
        _ => None,
    }
}

fn declare(node: Option<Node>, content: &str, declared: &mut HashSet<String>) {
    if let Some(ident) = node.and_then(binding_identifier) {
        declared.insert(node_text(ident, content).to_string());
    }
}

/// Parameters of a node that owns a parameter list (`(a, b) =>`, `a =>`,
/// `function (a)`, `run(a) {}`, `(a: T) => U` in a type).
fn collect_own_parameters(function: Node, content: &str, declared: &mut HashSet<String>) {
    // Unparenthesized single arrow parameter
    declare(function.child_by_field_name("parameter"), content, declared);

    let Some(params) = function.child_by_field_name("parameters") else {
        return;
    };
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            // TypeScript wraps every parameter
            "required_parameter" | "optional_parameter" => {
                declare(param.child_by_field_name("pattern"), content, declared);
            }
            // Plain JavaScript-style parameters
            _ => declare(Some(param), content, declared),
        }
    }
}

fn collect_declarations(
    node: Node,
    content: &str,
    depth: usize,
    max_depth: usize,
    declared: &mut HashSet<String>,
) {
    if depth_exceeded(node, depth, max_depth) {
        return;
    }

    match node.kind() {
        "variable_declarator" => declare(node.child_by_field_name("name"), content, declared),
        "catch_clause" => declare(node.child_by_field_name("parameter"), content, declared),
        // `for (const x of xs)` declares; `for (x of xs)` assigns
        "for_in_statement" if node.child_by_field_name("kind").is_some() => {
            declare(node.child_by_field_name("left"), content, declared)
        }
        kind if crate::locator::is_function_kind(kind) => {
            collect_own_parameters(node, content, declared)
        }
        // Methods, constructors, accessors, and signatures in type positions
        _ if node.child_by_field_name("parameters").is_some() => {
            collect_own_parameters(node, content, declared)
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declarations(child, content, depth + 1, max_depth, declared);
    }
}

// ============================================================================
// Pass 2: usages
// ============================================================================

fn is_field_of(node: Node, parent: Node, field: &str) -> bool {
    parent
        .child_by_field_name(field)
        .is_some_and(|child| child.id() == node.id())
}

/// JSX tag names that are not references: closing tags repeat the opening
/// tag, and lowercase names are intrinsic elements.
fn is_jsx_non_reference(node: Node, parent: Node, name: &str) -> bool {
    match parent.kind() {
        "jsx_closing_element" => true,
        "jsx_opening_element" | "jsx_self_closing_element" => {
            is_field_of(node, parent, "name")
                && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        }
        _ => false,
    }
}

fn collect_usages(
    node: Node,
    content: &str,
    depth: usize,
    max_depth: usize,
    declared: &HashSet<String>,
    usages: &mut IndexMap<String, SourceLocation>,
) {
    if depth_exceeded(node, depth, max_depth) {
        return;
    }

    if matches!(node.kind(), "identifier" | "shorthand_property_identifier") {
        record_usage(node, content, declared, usages);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_usages(child, content, depth + 1, max_depth, declared, usages);
    }
}

fn record_usage(
    node: Node,
    content: &str,
    declared: &HashSet<String>,
    usages: &mut IndexMap<String, SourceLocation>,
) {
    let name = node_text(node, content);

    if let Some(parent) = node.parent() {
        if parent.kind() == "member_expression" {
            // `a.b`: `b` names a property, not a binding
            if is_field_of(node, parent, "property") {
                return;
            }
            if is_field_of(node, parent, "object") && declared.contains(name) {
                return;
            }
        }
        if is_jsx_non_reference(node, parent, name) {
            return;
        }
    }

    if declared.contains(name) {
        return;
    }

    let position = SourceLocation::from_point(node.start_position(), content);
    // IndexMap::insert keeps the key's slot and replaces the value
    usages.insert(name.to_string(), position);
}
