//
// locator.rs
//
// Find the function whose source text equals a target snippet
//

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tree_sitter::{Node, Tree};

use crate::config::ExpanderConfig;
use crate::parser_pool::{self, Dialect};
use crate::types::TextRange;
use crate::walker::walk_sources;

/// Node kinds that count as "function-shaped" for matching.
pub const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    // Older grammar releases name anonymous function expressions `function`
    "function",
    "arrow_function",
];

pub fn is_function_kind(kind: &str) -> bool {
    FUNCTION_KINDS.contains(&kind)
}

/// A source file held together with its syntax tree.
pub struct ParsedFile {
    pub path: PathBuf,
    pub content: String,
    pub tree: Tree,
    pub dialect: Dialect,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("dialect", &self.dialect)
            .field("bytes", &self.content.len())
            .finish()
    }
}

impl ParsedFile {
    pub fn parse(path: PathBuf, content: String, dialect: Dialect) -> Result<Self> {
        let tree = parser_pool::parse(dialect, &content)
            .ok_or_else(|| anyhow!("tree-sitter produced no tree for {}", path.display()))?;
        Ok(Self {
            path,
            content,
            tree,
            dialect,
        })
    }

    /// Read and parse `path` from disk.
    pub async fn read(path: &Path, dialect: Dialect) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(path.to_path_buf(), content, dialect)
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source slice spanned by `node`.
    pub fn text(&self, node: Node) -> &str {
        node_text(node, &self.content)
    }
}

pub(crate) fn node_text<'a>(node: Node, content: &'a str) -> &'a str {
    &content[node.byte_range()]
}

/// The function located for one expansion. Owned by a single call.
#[derive(Debug)]
pub struct FunctionMatch {
    pub source: ParsedFile,
    pub range: TextRange,
    byte_range: Range<usize>,
}

impl FunctionMatch {
    pub fn file(&self) -> &Path {
        &self.source.path
    }

    /// The matched function node.
    ///
    /// The first function-shaped node in pre-order with the recorded span is
    /// the node that matched, since matching also stops at the first hit.
    pub fn node(&self) -> Option<Node<'_>> {
        let byte_range = self.byte_range.clone();
        find_preorder(self.source.root(), usize::MAX, &mut |node| {
            is_function_kind(node.kind()) && node.byte_range() == byte_range
        })
    }
}

/// Pre-order search returning the first node satisfying `pred`.
///
/// Children of a node are only visited when the node itself does not match,
/// and subtrees deeper than `max_depth` are not explored.
fn find_preorder<'t, F>(node: Node<'t>, max_depth: usize, pred: &mut F) -> Option<Node<'t>>
where
    F: FnMut(Node<'t>) -> bool,
{
    fn visit<'t, F>(node: Node<'t>, depth: usize, max_depth: usize, pred: &mut F) -> Option<Node<'t>>
    where
        F: FnMut(Node<'t>) -> bool,
    {
        if pred(node) {
            return Some(node);
        }
        if depth >= max_depth {
            log::warn!(
                "Syntax tree deeper than {} levels at line {}; subtree not searched",
                max_depth,
                node.start_position().row + 1
            );
            return None;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(found) = visit(child, depth + 1, max_depth, pred) {
                return Some(found);
            }
        }
        None
    }
    visit(node, 0, max_depth, pred)
}

/// First function-shaped node (pre-order) whose trimmed text equals `snippet`.
pub fn find_function_node<'t>(
    root: Node<'t>,
    content: &str,
    snippet: &str,
    max_depth: usize,
) -> Option<Node<'t>> {
    let snippet = snippet.trim();
    if snippet.is_empty() {
        return None;
    }
    find_preorder(root, max_depth, &mut |node| {
        is_function_kind(node.kind()) && node_text(node, content).trim() == snippet
    })
}

/// Search a single parsed file for the snippet.
pub fn search_file(source: ParsedFile, snippet: &str, max_depth: usize) -> Option<FunctionMatch> {
    let (range, byte_range) = {
        let node = find_function_node(source.root(), &source.content, snippet, max_depth)?;
        (TextRange::of_node(node, &source.content), node.byte_range())
    };
    log::debug!(
        "Matched function in {} at {}:{}",
        source.path.display(),
        range.start.line + 1,
        range.start.character + 1
    );
    Some(FunctionMatch {
        source,
        range,
        byte_range,
    })
}

/// Walk `search_root` and return the first function matching `snippet`.
///
/// Files are visited in the walker's deterministic order and the walk stops
/// at the first file containing a match. Files that cannot be read or parsed
/// are skipped.
pub async fn locate_function(
    search_root: &Path,
    snippet: &str,
    config: &ExpanderConfig,
) -> Option<FunctionMatch> {
    let snippet = snippet.trim();
    if snippet.is_empty() {
        log::warn!("Empty snippet; nothing to locate");
        return None;
    }

    for path in walk_sources(search_root, &config.ignored_dirs) {
        let Some(dialect) = Dialect::for_source_path(&path) else {
            continue;
        };
        log::trace!("Searching file: {}", path.display());
        let source = match ParsedFile::read(&path, dialect).await {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        if let Some(found) = search_file(source, snippet, config.max_tree_depth) {
            return Some(found);
        }
    }

    log::debug!("No function matching the snippet under {}", search_root.display());
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceLocation;
    use std::fs;
    use tempfile::TempDir;

    const HANDLER: &str = r#"(c) => {
  return c.text("ok");
}"#;

    fn parsed(content: &str) -> ParsedFile {
        ParsedFile::parse(PathBuf::from("mem.ts"), content.to_string(), Dialect::TypeScript)
            .unwrap()
    }

    #[test]
    fn test_matches_arrow_function_argument() {
        let content = format!("app.get(\"/\", {HANDLER});\n");
        let found = search_file(parsed(&content), HANDLER, 512).expect("match");
        assert_eq!(found.range.start, SourceLocation::new(0, 13));
        assert_eq!(found.range.end, SourceLocation::new(2, 1));
        assert_eq!(found.node().unwrap().kind(), "arrow_function");
    }

    #[test]
    fn test_matches_function_declaration() {
        let decl = "function add(a: number, b: number): number {\n  return a + b;\n}";
        let content = format!("const x = 1;\n\n{decl}\n");
        let found = search_file(parsed(&content), decl, 512).expect("match");
        assert_eq!(found.range.start, SourceLocation::new(2, 0));
        assert_eq!(found.node().unwrap().kind(), "function_declaration");
    }

    #[test]
    fn test_matches_anonymous_function_expression() {
        let expr = "function (req) {\n  return req;\n}";
        let content = format!("const handler = {expr};\n");
        let found = search_file(parsed(&content), expr, 512).expect("match");
        assert!(is_function_kind(found.node().unwrap().kind()));
        assert_eq!(found.range.start, SourceLocation::new(0, 16));
    }

    #[test]
    fn test_snippet_is_trimmed_before_comparison() {
        let content = format!("app.get(\"/\", {HANDLER});\n");
        let padded = format!("\n\n   {HANDLER}  \n");
        assert!(search_file(parsed(&content), &padded, 512).is_some());
    }

    #[test]
    fn test_internal_whitespace_difference_misses() {
        let content = format!("app.get(\"/\", {HANDLER});\n");
        let reindented = HANDLER.replace("  return", "    return");
        assert!(search_file(parsed(&content), &reindented, 512).is_none());
    }

    #[test]
    fn test_nested_function_found_when_outer_differs() {
        // Pre-order visits the outer arrow first; only the inner text matches.
        let inner = "() => 1";
        let content = format!("const f = () => {{ const g = {inner}; return g; }};\n");
        let found = search_file(parsed(&content), inner, 512).expect("match");
        assert_eq!(found.range.start, SourceLocation::new(0, 28));
    }

    #[test]
    fn test_first_of_duplicate_matches_in_file() {
        let content = "a(() => 1);\nb(() => 1);\n";
        let found = search_file(parsed(content), "() => 1", 512).expect("match");
        assert_eq!(found.range.start.line, 0);
    }

    #[test]
    fn test_columns_are_utf16() {
        let content = "g(\"é😀\", () => 1);\n";
        let found = search_file(parsed(content), "() => 1", 512).expect("match");
        // g ( " é 😀(2) " , space = 9 UTF-16 units
        assert_eq!(found.range.start, SourceLocation::new(0, 9));
    }

    #[test]
    fn test_empty_snippet_never_matches() {
        assert!(search_file(parsed("function f() {}"), "   ", 512).is_none());
    }

    #[test]
    fn test_depth_guard_stops_search() {
        let content = format!("x(() => {{ y({HANDLER}); }});\n");
        assert!(search_file(parsed(&content), HANDLER, 512).is_some());
        assert!(search_file(parsed(&content), HANDLER, 2).is_none());
    }

    #[tokio::test]
    async fn test_locate_first_file_in_walk_order_wins() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b.ts"), format!("x({HANDLER});\n")).unwrap();
        fs::write(dir.path().join("a/z.ts"), format!("\n\ny({HANDLER});\n")).unwrap();

        let found = locate_function(dir.path(), HANDLER, &ExpanderConfig::default())
            .await
            .expect("match");
        assert_eq!(found.file(), dir.path().join("a/z.ts"));
        assert_eq!(found.range.start, SourceLocation::new(2, 2));
    }

    #[tokio::test]
    async fn test_locate_missing_snippet_is_none() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;\n").unwrap();
        let found = locate_function(dir.path(), "() => 42", &ExpanderConfig::default()).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_locate_skips_unreadable_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), [0xff_u8, 0xfe, 0x00]).unwrap();
        fs::write(dir.path().join("b.ts"), format!("x({HANDLER});\n")).unwrap();
        let found = locate_function(dir.path(), HANDLER, &ExpanderConfig::default())
            .await
            .expect("match");
        assert_eq!(found.file(), dir.path().join("b.ts"));
    }
}
