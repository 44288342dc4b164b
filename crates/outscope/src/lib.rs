// lib.rs - Function expansion for TypeScript projects
//
// Locates a function by its source text, collects the identifiers it uses
// from outside its own scope, and resolves each one to the text of its
// definition through a language server. The `outscope` binary in main.rs
// is a thin wrapper around `expand::Expander`.

pub mod config;
pub mod expand;
pub mod extract;
pub mod follow_import;
pub mod locator;
pub mod lsp;
pub mod parser_pool;
pub mod perf;
pub mod scope;
pub mod types;
pub mod utf16;
pub mod walker;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use config::ExpanderConfig;
pub use expand::{expand_function, Expander};
pub use types::{ContextEntry, ExpansionResult};
