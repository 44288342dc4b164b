//! In-process definition providers for tests.
//!
//! [`TextSearchProvider`] answers definition requests by scanning the
//! requesting file for a `const`/`let`/`var`/`function` declaration of the
//! identifier under the cursor. It is enough to drive the expansion pipeline
//! over single-file fixtures without a language server.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::lsp::{uri_to_path, DefinitionProvider, ProviderFactory};
use crate::types::SourceLocation;
use crate::utf16::{byte_offset_to_utf16_column, line_at, utf16_column_to_byte_offset};

const DECLARATION_KEYWORDS: &[&str] = &["const ", "let ", "var ", "function "];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Identifier starting at byte `start` of `line`.
fn identifier_at(line: &str, start: usize) -> Option<&str> {
    let rest = line.get(start..)?;
    let len = rest
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    (len > 0).then(|| &rest[..len])
}

/// First `keyword name` declaration in `content`, as a UTF-16 range over `name`.
pub fn find_declaration(content: &str, name: &str) -> Option<Range> {
    for (row, line) in content.lines().enumerate() {
        for keyword in DECLARATION_KEYWORDS {
            let needle = format!("{keyword}{name}");
            let mut search_from = 0;
            while let Some(found) = line[search_from..].find(&needle) {
                let at = search_from + found;
                let start = at + keyword.len();
                let end = start + name.len();
                let boundary_before = line[..at].chars().next_back().map_or(true, |c| !is_ident_char(c));
                let boundary_after = line[end..].chars().next().map_or(true, |c| !is_ident_char(c));
                if boundary_before && boundary_after {
                    return Some(Range::new(
                        Position::new(row as u32, byte_offset_to_utf16_column(line, start)),
                        Position::new(row as u32, byte_offset_to_utf16_column(line, end)),
                    ));
                }
                search_from = end;
            }
        }
    }
    None
}

#[derive(Default)]
pub struct TextSearchProvider {
    failing: HashSet<String>,
    opened: Mutex<Vec<PathBuf>>,
    requests: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl TextSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests for these names fail with an error.
    pub fn failing_on<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DefinitionProvider for TextSearchProvider {
    async fn open_document(&self, path: &Path) -> Result<()> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn definition(&self, uri: &Url, position: SourceLocation) -> Result<Option<Location>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let path = uri_to_path(uri.as_str())?;
        let content = tokio::fs::read_to_string(&path).await?;
        let line = line_at(&content, position.line as usize);
        let start = utf16_column_to_byte_offset(line, position.character);
        let name = identifier_at(line, start)
            .ok_or_else(|| anyhow!("no identifier at {}:{}", position.line, position.character))?;

        if self.failing.contains(name) {
            return Err(anyhow!("simulated failure resolving {name}"));
        }
        Ok(find_declaration(&content, name).map(|range| Location::new(uri.clone(), range)))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared provider, or fails every creation.
pub struct StaticFactory {
    provider: Option<Arc<dyn DefinitionProvider>>,
    created: AtomicUsize,
}

impl StaticFactory {
    pub fn new(provider: Arc<dyn DefinitionProvider>) -> Self {
        Self {
            provider: Some(provider),
            created: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            provider: None,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of `create` calls, successful or not.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFactory for StaticFactory {
    async fn create(&self, project_root: &Path) -> Result<Arc<dyn DefinitionProvider>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.provider
            .clone()
            .ok_or_else(|| anyhow!("no provider available for {}", project_root.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_declaration_respects_word_boundaries() {
        let content = "const PASSPHRASES_OLD = 1;\nconst PASSPHRASES = [];\n";
        let range = find_declaration(content, "PASSPHRASES").unwrap();
        assert_eq!(range.start, Position::new(1, 6));
        assert_eq!(range.end, Position::new(1, 17));
    }

    #[test]
    fn test_find_declaration_function() {
        let content = "app.get('/', h);\n\nfunction helperFunction(req) {}\n";
        let range = find_declaration(content, "helperFunction").unwrap();
        assert_eq!(range.start, Position::new(2, 9));
    }

    #[test]
    fn test_find_declaration_requires_keyword_boundary() {
        assert!(find_declaration("reconst x = 1;\n", "x").is_none());
        assert!(find_declaration("const x = 1;\n", "y").is_none());
    }

    #[test]
    fn test_identifier_at() {
        assert_eq!(identifier_at("  foo.bar()", 2), Some("foo"));
        assert_eq!(identifier_at("  foo", 1), None);
        assert_eq!(identifier_at("$x + 1", 0), Some("$x"));
    }
}
