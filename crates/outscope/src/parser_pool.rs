//
// parser_pool.rs
//
// Thread-local parser pool for efficient parser reuse
//

use std::cell::RefCell;
use std::path::Path;

use tree_sitter::{Parser, Tree};

/// Source extensions recognized by the walker and locator.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx"];

/// Grammar flavour used to parse a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
}

impl Dialect {
    /// Dialect for a recognized source file, `None` for anything else.
    pub fn for_source_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") => Some(Dialect::TypeScript),
            Some("tsx") => Some(Dialect::Tsx),
            _ => None,
        }
    }

    /// Dialect for an arbitrary file a definition may live in.
    ///
    /// Definitions can point into `.d.ts`, `.js` or `.jsx` files; the
    /// TypeScript grammar is a superset of plain JavaScript, JSX needs TSX.
    pub fn for_any_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") | Some("jsx") => Dialect::Tsx,
            _ => Dialect::TypeScript,
        }
    }

    /// LSP language identifier for `textDocument/didOpen`.
    pub fn language_id(self) -> &'static str {
        match self {
            Dialect::TypeScript => "typescript",
            Dialect::Tsx => "typescriptreact",
        }
    }
}

fn new_parser(language: tree_sitter::Language) -> Parser {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .expect("Failed to set TypeScript language");
    parser
}

thread_local! {
    static TS_PARSER: RefCell<Parser> =
        RefCell::new(new_parser(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()));
    static TSX_PARSER: RefCell<Parser> =
        RefCell::new(new_parser(tree_sitter_typescript::LANGUAGE_TSX.into()));
}

/// Execute a function with a thread-local parser instance for `dialect`.
/// The parser is reused across calls on the same thread.
pub fn with_parser<F, R>(dialect: Dialect, f: F) -> R
where
    F: FnOnce(&mut Parser) -> R,
{
    match dialect {
        Dialect::TypeScript => TS_PARSER.with(|parser| f(&mut parser.borrow_mut())),
        Dialect::Tsx => TSX_PARSER.with(|parser| f(&mut parser.borrow_mut())),
    }
}

/// Parse `content` with the pooled parser for `dialect`.
pub fn parse(dialect: Dialect, content: &str) -> Option<Tree> {
    with_parser(dialect, |parser| parser.parse(content, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_source_path() {
        assert_eq!(
            Dialect::for_source_path(Path::new("src/index.ts")),
            Some(Dialect::TypeScript)
        );
        assert_eq!(
            Dialect::for_source_path(Path::new("App.tsx")),
            Some(Dialect::Tsx)
        );
        assert_eq!(Dialect::for_source_path(Path::new("main.js")), None);
        assert_eq!(Dialect::for_source_path(Path::new("README")), None);
    }

    #[test]
    fn test_dialect_for_any_path_falls_back_to_typescript() {
        assert_eq!(
            Dialect::for_any_path(Path::new("lib.dom.d.ts")),
            Dialect::TypeScript
        );
        assert_eq!(Dialect::for_any_path(Path::new("x.js")), Dialect::TypeScript);
        assert_eq!(Dialect::for_any_path(Path::new("x.jsx")), Dialect::Tsx);
    }

    #[test]
    fn test_parser_initialized_with_typescript_language() {
        let tree = parse(Dialect::TypeScript, "const x: number = 1;").expect("parse");
        let root = tree.root_node();
        assert_eq!(root.kind(), "program");
        assert!(!root.has_error());
        assert_eq!(root.child(0).map(|n| n.kind()), Some("lexical_declaration"));
    }

    #[test]
    fn test_tsx_parser_accepts_jsx() {
        let code = "const el = <div className=\"a\">{value}</div>;";
        let tree = parse(Dialect::Tsx, code).expect("parse");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_parser_reuse_on_same_thread() {
        let a = parse(Dialect::TypeScript, "let a = 1;");
        let b = parse(Dialect::Tsx, "let b = 2;");
        let c = parse(Dialect::TypeScript, "function c() {}");
        assert!(a.is_some() && b.is_some() && c.is_some());
        assert_eq!(
            c.unwrap().root_node().child(0).map(|n| n.kind()),
            Some("function_declaration")
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn ts_snippet() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z][a-z0-9_]{0,5}".prop_map(|name| format!("const v_{} = 1;", name)),
            "[a-z][a-z0-9_]{0,5}".prop_map(|name| format!("function f_{}(x) {{ return x; }}", name)),
            "[a-z][a-z0-9_]{0,5}".prop_map(|name| format!("const g_{} = (a) => a + 1;", name)),
            Just("let x = 1;\nlet y = 2;".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every parse on the same thread succeeds regardless of what the
        /// pooled parser saw before.
        #[test]
        fn prop_parser_instance_reuse(
            snippets in prop::collection::vec(ts_snippet(), 1..10)
        ) {
            for snippet in &snippets {
                let tree = parse(Dialect::TypeScript, snippet);
                prop_assert!(tree.is_some(), "Parser should successfully parse: {}", snippet);
                prop_assert!(!tree.unwrap().root_node().has_error());
            }
        }
    }
}
