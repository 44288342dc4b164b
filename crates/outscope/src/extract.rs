//
// extract.rs
//
// Syntactic extraction of a definition's value text
//

use anyhow::{bail, Result};
use tree_sitter::{Node, Point};

use crate::locator::{node_text, ParsedFile};
use crate::lsp::uri_to_path;
use crate::parser_pool::Dialect;
use crate::types::{DefinitionResult, SourceLocation, TextRange};
use crate::utf16::{line_at, utf16_column_to_byte_offset};

/// Text reported when the declaration's value cannot be shown syntactically.
pub const UNRESOLVED_VALUE: &str = "<unresolved>";

fn contains(node: Node, point: Point) -> bool {
    node.start_position() <= point && point <= node.end_position()
}

/// Smallest named node whose span contains `point`, inclusively.
///
/// Descends into the first named child containing the point until no child
/// does, or until `max_depth` levels have been descended.
pub fn covering_node<'t>(root: Node<'t>, point: Point, max_depth: usize) -> Node<'t> {
    let mut node = root;
    for _ in 0..max_depth {
        let mut cursor = node.walk();
        let next = node
            .named_children(&mut cursor)
            .find(|child| contains(*child, point));
        match next {
            Some(child) => node = child,
            None => return node,
        }
    }
    log::warn!(
        "Covering-node search stopped at depth {} (line {})",
        max_depth,
        point.row + 1
    );
    node
}

fn is_function_declaration(kind: &str) -> bool {
    matches!(kind, "function_declaration" | "generator_function_declaration")
}

fn declarator_value<'a>(declarator: Node, content: &'a str) -> Option<&'a str> {
    declarator
        .child_by_field_name("value")
        .map(|value| node_text(value, content))
}

/// Value text for the covering node of a definition site.
///
/// Never empty; falls back to [`UNRESOLVED_VALUE`].
pub fn definition_text(node: Node, content: &str) -> String {
    let text = match node.kind() {
        "variable_declarator" => declarator_value(node, content),
        kind if is_function_declaration(kind) || kind == "arrow_function" => {
            Some(node_text(node, content))
        }
        "identifier" => node.parent().and_then(|parent| match parent.kind() {
            kind if is_function_declaration(kind) => Some(node_text(parent, content)),
            "variable_declarator" => declarator_value(parent, content),
            _ => None,
        }),
        _ => None,
    };

    match text {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            log::trace!("No extractable value for {} node", node.kind());
            UNRESOLVED_VALUE.to_string()
        }
    }
}

/// Tree-sitter point (byte column) for a UTF-16 location, if it lies in the file.
fn point_in(content: &str, location: SourceLocation) -> Option<Point> {
    let row = location.line as usize;
    if row >= content.split('\n').count() {
        return None;
    }
    let line = line_at(content, row);
    Some(Point::new(
        row,
        utf16_column_to_byte_offset(line, location.character),
    ))
}

/// Extract the value text for `range` from an already parsed file.
pub fn extract_from_source(source: &ParsedFile, range: TextRange, max_depth: usize) -> Result<String> {
    let Some(point) = point_in(&source.content, range.start) else {
        bail!(
            "definition position {}:{} is outside {}",
            range.start.line + 1,
            range.start.character + 1,
            source.path.display()
        );
    };
    let node = covering_node(source.root(), point, max_depth);
    Ok(definition_text(node, &source.content))
}

/// Read and parse the file named by `uri`, then extract the value text of
/// the declaration starting at `range.start`.
pub async fn extract_definition(uri: &str, range: TextRange, max_depth: usize) -> Result<DefinitionResult> {
    let path = uri_to_path(uri)?;
    let source = ParsedFile::read(&path, Dialect::for_any_path(&path)).await?;
    let text = extract_from_source(&source, range, max_depth)?;
    Ok(DefinitionResult {
        uri: uri.to_string(),
        range,
        text,
    })
}
