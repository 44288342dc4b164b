//
// follow_import.rs
//
// Static fallback: resolve a name through a relative `import` without a
// language server
//

use std::path::{Path, PathBuf};

use tree_sitter::Node;

use crate::extract::definition_text;
use crate::locator::{node_text, ParsedFile};
use crate::lsp::path_to_uri;
use crate::parser_pool::Dialect;
use crate::types::{DefinitionResult, TextRange};

/// What an import binds locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedName {
    /// `import name from "./m"`
    Default,
    /// `import { exported } from "./m"` or `import { exported as name } from "./m"`
    Named(String),
}

/// A top-level import binding `local` from a module specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub imported: ImportedName,
    pub specifier: String,
}

impl ImportBinding {
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../")
    }
}

fn string_value(node: Node, content: &str) -> String {
    let text = node_text(node, content);
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// Find the top-level import that binds `local` in `root`.
pub fn find_import(root: Node, content: &str, local: &str) -> Option<ImportBinding> {
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "import_statement" {
            continue;
        }
        let Some(source) = statement.child_by_field_name("source") else {
            continue;
        };
        let mut clause_cursor = statement.walk();
        let Some(clause) = statement
            .named_children(&mut clause_cursor)
            .find(|n| n.kind() == "import_clause")
        else {
            continue;
        };
        if let Some(imported) = imported_name(clause, content, local) {
            return Some(ImportBinding {
                imported,
                specifier: string_value(source, content),
            });
        }
    }
    None
}

fn imported_name(clause: Node, content: &str, local: &str) -> Option<ImportedName> {
    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" if node_text(part, content) == local => return Some(ImportedName::Default),
            "named_imports" => {
                let mut spec_cursor = part.walk();
                for spec in part.named_children(&mut spec_cursor) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let exported = string_value(name, content);
                    let bound = spec
                        .child_by_field_name("alias")
                        .map(|alias| node_text(alias, content).to_string())
                        .unwrap_or_else(|| exported.clone());
                    if bound == local {
                        return Some(ImportedName::Named(exported));
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Candidate files for a relative specifier, in lookup order.
pub fn module_candidates(importing_dir: &Path, specifier: &str) -> Vec<PathBuf> {
    let base = importing_dir.join(specifier);
    if base
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "ts" || e == "tsx")
    {
        return vec![base];
    }
    let mut with_ts = base.clone().into_os_string();
    with_ts.push(".ts");
    let mut with_tsx = base.clone().into_os_string();
    with_tsx.push(".tsx");
    vec![
        PathBuf::from(with_ts),
        PathBuf::from(with_tsx),
        base.join("index.ts"),
        base.join("index.tsx"),
    ]
}

async fn resolve_module(importing_dir: &Path, specifier: &str) -> Option<PathBuf> {
    for candidate in module_candidates(importing_dir, specifier) {
        if let Ok(meta) = tokio::fs::metadata(&candidate).await {
            if meta.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn first_declarator(declaration: Node) -> Option<Node> {
    let mut cursor = declaration.walk();
    let first = declaration
        .named_children(&mut cursor)
        .find(|n| n.kind() == "variable_declarator");
    first
}

/// Declaration node for `name` if `declaration` declares it.
fn declares<'t>(declaration: Node<'t>, content: &str, name: &str) -> Option<Node<'t>> {
    match declaration.kind() {
        "function_declaration" | "generator_function_declaration" => declaration
            .child_by_field_name("name")
            .filter(|n| node_text(*n, content) == name)
            .map(|_| declaration),
        "lexical_declaration" | "variable_declaration" => first_declarator(declaration).filter(|d| {
            d.child_by_field_name("name")
                .is_some_and(|n| node_text(n, content) == name)
        }),
        _ => None,
    }
}

fn is_default_export(statement: Node) -> bool {
    let mut cursor = statement.walk();
    let found = statement.children(&mut cursor).any(|c| c.kind() == "default");
    found
}

/// Top-level declaration of `name`, exported or not.
fn top_level_declaration<'t>(root: Node<'t>, content: &str, name: &str) -> Option<Node<'t>> {
    let mut cursor = root.walk();
    let statements: Vec<Node<'t>> = root.named_children(&mut cursor).collect();
    statements.into_iter().find_map(|statement| {
        let declaration = if statement.kind() == "export_statement" {
            statement.child_by_field_name("declaration")?
        } else {
            statement
        };
        declares(declaration, content, name)
    })
}

/// Exported declaration matching `imported` in a module's syntax tree.
pub fn find_export<'t>(root: Node<'t>, content: &str, imported: &ImportedName) -> Option<Node<'t>> {
    let mut cursor = root.walk();
    let exports: Vec<Node<'t>> = root
        .named_children(&mut cursor)
        .filter(|n| n.kind() == "export_statement")
        .collect();

    match imported {
        ImportedName::Named(name) => exports.into_iter().find_map(|statement| {
            if is_default_export(statement) {
                return None;
            }
            declares(statement.child_by_field_name("declaration")?, content, name)
        }),
        ImportedName::Default => {
            let statement = exports.into_iter().find(|s| is_default_export(*s))?;
            if let Some(declaration) = statement.child_by_field_name("declaration") {
                return Some(declaration);
            }
            let value = statement.child_by_field_name("value")?;
            match value.kind() {
                "identifier" => top_level_declaration(root, content, node_text(value, content)),
                kind if crate::locator::is_function_kind(kind) => Some(value),
                _ => None,
            }
        }
    }
}

/// `export default function () {}` may surface as a function expression,
/// which the definition classifier does not cover.
fn export_text(declaration: Node, content: &str) -> String {
    if crate::locator::is_function_kind(declaration.kind()) {
        node_text(declaration, content).to_string()
    } else {
        definition_text(declaration, content)
    }
}

/// Resolve `name`, as used in `importing`, through a relative import.
///
/// Returns `None` for names not bound by a relative import, or when the
/// module or its export cannot be found.
pub async fn resolve_import(importing: &ParsedFile, name: &str) -> Option<DefinitionResult> {
    let binding = find_import(importing.root(), &importing.content, name)?;
    if !binding.is_relative() {
        log::trace!("{} comes from package {}; not followed", name, binding.specifier);
        return None;
    }

    let importing_dir = importing.path.parent()?;
    let Some(module) = resolve_module(importing_dir, &binding.specifier).await else {
        log::debug!(
            "Module {} imported by {} not found",
            binding.specifier,
            importing.path.display()
        );
        return None;
    };

    let target = match ParsedFile::read(&module, Dialect::for_any_path(&module)).await {
        Ok(target) => target,
        Err(e) => {
            log::warn!("Cannot follow import of {}: {:#}", name, e);
            return None;
        }
    };

    let declaration = find_export(target.root(), &target.content, &binding.imported)?;
    let uri = path_to_uri(&module).ok()?;
    log::debug!("Resolved {} statically in {}", name, module.display());
    Some(DefinitionResult {
        uri: uri.to_string(),
        range: TextRange::of_node(declaration, &target.content),
        text: export_text(declaration, &target.content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    async fn importing(root: &Path, content: &str) -> ParsedFile {
        let path = write(root, "src/index.ts", content);
        ParsedFile::read(&path, Dialect::TypeScript).await.unwrap()
    }

    #[tokio::test]
    async fn test_named_import_resolves_exported_const() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/consts.ts", "export const LIMIT = 10, OTHER = 2;\n");
        let file = importing(dir.path(), "import { LIMIT } from \"./consts\";\n").await;

        let def = resolve_import(&file, "LIMIT").await.expect("resolved");
        assert_eq!(def.text, "10");
        assert!(def.uri.ends_with("/src/consts.ts"));
        assert_eq!(def.range.start.line, 0);
        assert_eq!(def.range.start.character, 13);

        // Only the first declarator is considered
        let file = importing(dir.path(), "import { OTHER } from \"./consts\";\n").await;
        assert!(resolve_import(&file, "OTHER").await.is_none());
    }

    #[tokio::test]
    async fn test_aliased_import_looks_up_exported_name() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/util/format.ts",
            "export function format(s: string) {\n  return s.trim();\n}\n",
        );
        let file = importing(
            dir.path(),
            "import { format as fmt } from './util/format';\n",
        )
        .await;

        let def = resolve_import(&file, "fmt").await.expect("resolved");
        assert_eq!(def.text, "function format(s: string) {\n  return s.trim();\n}");
        assert!(resolve_import(&file, "format").await.is_none());
    }

    #[tokio::test]
    async fn test_default_import_follows_identifier() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/app/index.ts",
            "const app = createApp();\nexport default app;\n",
        );
        let file = importing(dir.path(), "import app from \"./app\";\n").await;

        let def = resolve_import(&file, "app").await.expect("resolved");
        assert_eq!(def.text, "createApp()");
        assert!(def.uri.ends_with("/src/app/index.ts"));
    }

    #[tokio::test]
    async fn test_default_function_declaration() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "lib/handler.tsx",
            "export default function handler() {\n  return 1;\n}\n",
        );
        let file = importing(dir.path(), "import handler from \"../lib/handler\";\n").await;

        let def = resolve_import(&file, "handler").await.expect("resolved");
        assert!(def.text.starts_with("function handler()"));
    }

    #[tokio::test]
    async fn test_package_imports_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let file = importing(dir.path(), "import { Hono } from \"hono\";\n").await;
        assert!(resolve_import(&file, "Hono").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_module_or_export_is_none() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.ts", "export const a = 1;\n");
        let file = importing(
            dir.path(),
            "import { b } from \"./a\";\nimport { c } from \"./missing\";\n",
        )
        .await;
        assert!(resolve_import(&file, "b").await.is_none());
        assert!(resolve_import(&file, "c").await.is_none());
        assert!(resolve_import(&file, "notImported").await.is_none());
    }

    #[test]
    fn test_module_candidates_order() {
        let dir = Path::new("/p/src");
        let candidates = module_candidates(dir, "./lib/x");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/p/src/./lib/x.ts"),
                PathBuf::from("/p/src/./lib/x.tsx"),
                PathBuf::from("/p/src/./lib/x/index.ts"),
                PathBuf::from("/p/src/./lib/x/index.tsx"),
            ]
        );
        assert_eq!(
            module_candidates(dir, "./y.tsx"),
            vec![PathBuf::from("/p/src/./y.tsx")]
        );
    }

    #[test]
    fn test_find_import_default_and_named() {
        let content = "import def, { a, b as c } from \"./m\";\n";
        let file =
            ParsedFile::parse(PathBuf::from("mem.ts"), content.to_string(), Dialect::TypeScript)
                .unwrap();
        let root = file.root();
        assert_eq!(
            find_import(root, content, "def").unwrap().imported,
            ImportedName::Default
        );
        assert_eq!(
            find_import(root, content, "c").unwrap().imported,
            ImportedName::Named("b".to_string())
        );
        assert_eq!(find_import(root, content, "a").unwrap().specifier, "./m");
        assert!(find_import(root, content, "b").is_none());
    }
}
