//
// types.rs
//
// Positions, ranges, and the records produced by an expansion
//

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_lsp::lsp_types;

use crate::utf16::{byte_offset_to_utf16_column, line_at};

/// Zero-based position in a document. `character` counts UTF-16 code units,
/// matching the language server protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub character: u32,
}

impl SourceLocation {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Convert a tree-sitter point (byte column) into a UTF-16 location.
    pub fn from_point(point: tree_sitter::Point, content: &str) -> Self {
        let line_text = line_at(content, point.row);
        Self {
            line: point.row as u32,
            character: byte_offset_to_utf16_column(line_text, point.column),
        }
    }

    /// One-based line/column for the public result.
    pub fn to_one_based(self) -> LineColumn {
        LineColumn {
            line: self.line + 1,
            column: self.character + 1,
        }
    }
}

impl From<lsp_types::Position> for SourceLocation {
    fn from(p: lsp_types::Position) -> Self {
        Self::new(p.line, p.character)
    }
}

impl From<SourceLocation> for lsp_types::Position {
    fn from(loc: SourceLocation) -> Self {
        lsp_types::Position::new(loc.line, loc.character)
    }
}

/// Zero-based range; `start <= end` in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl TextRange {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        debug_assert!(start <= end, "range start must not follow its end");
        Self { start, end }
    }

    /// Range of a syntax node, with UTF-16 columns.
    pub fn of_node(node: tree_sitter::Node, content: &str) -> Self {
        Self::new(
            SourceLocation::from_point(node.start_position(), content),
            SourceLocation::from_point(node.end_position(), content),
        )
    }

    pub fn to_one_based(self) -> LineColumnRange {
        LineColumnRange {
            start: self.start.to_one_based(),
            end: self.end.to_one_based(),
        }
    }
}

impl From<lsp_types::Range> for TextRange {
    fn from(r: lsp_types::Range) -> Self {
        let start = SourceLocation::from(r.start);
        let end = SourceLocation::from(r.end);
        // Servers occasionally report inverted ranges; normalize rather than trust them.
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }
}

/// A name referenced by a function but bound outside of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeIdentifier {
    pub name: String,
    /// Position of the last occurrence visited.
    pub position: SourceLocation,
}

/// A resolved definition with its syntactically extracted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionResult {
    pub uri: String,
    pub range: TextRange,
    pub text: String,
}

impl DefinitionResult {
    fn to_public(&self) -> ResolvedDefinition {
        ResolvedDefinition {
            uri: self.uri.clone(),
            range: self.range.to_one_based(),
            text: self.text.clone(),
        }
    }
}

// ============================================================================
// Public (one-based) result records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColumnRange {
    pub start: LineColumn,
    pub end: LineColumn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDefinition {
    pub uri: String,
    pub range: LineColumnRange,
    pub text: String,
}

/// One free identifier of the expanded function together with its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub name: String,
    pub position: LineColumn,
    pub definition: ResolvedDefinition,
}

impl ContextEntry {
    pub fn new(identifier: &FreeIdentifier, definition: &DefinitionResult) -> Self {
        Self {
            name: identifier.name.clone(),
            position: identifier.position.to_one_based(),
            definition: definition.to_public(),
        }
    }
}

/// The located function plus everything it depends on from outside its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionResult {
    pub file: PathBuf,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub context: Vec<ContextEntry>,
}

impl ExpansionResult {
    pub fn new(file: PathBuf, range: TextRange, context: Vec<ContextEntry>) -> Self {
        let range = range.to_one_based();
        Self {
            file,
            start_line: range.start.line,
            start_column: range.start.column,
            end_line: range.end.line,
            end_column: range.end.column,
            context,
        }
    }
}
