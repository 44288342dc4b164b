//! Expansion over generated multi-file workspaces.
//!
//! Workspaces come from `test_utils::fixture_workspace`; definitions are
//! answered by the in-process `TextSearchProvider`, and names imported from
//! sibling modules are resolved through the static relative-import fallback.
//!
//! Run with: `cargo test -p outscope --features test-support --test fixture_workspaces`

use std::sync::Arc;

use outscope::test_utils::fake_provider::{StaticFactory, TextSearchProvider};
use outscope::test_utils::fixture_workspace::{
    create_fixture_workspace, function_snippet, module_path, FixtureConfig,
};
use outscope::{Expander, ExpanderConfig, ExpansionResult};

fn expander(follow_relative_imports: bool) -> (Expander, Arc<StaticFactory>) {
    let provider = Arc::new(TextSearchProvider::new());
    let factory = Arc::new(StaticFactory::new(provider));
    let config = ExpanderConfig {
        follow_relative_imports,
        ..ExpanderConfig::default()
    };
    (Expander::with_factory(config, factory.clone()), factory)
}

fn entry_text<'a>(result: &'a ExpansionResult, name: &str) -> Option<&'a str> {
    result
        .context
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.definition.text.as_str())
}

#[tokio::test]
async fn test_every_generated_function_is_located_in_its_module() {
    let config = FixtureConfig::small();
    let workspace = create_fixture_workspace(&config);
    let (expander, _) = expander(false);

    for i in [0, 4, config.file_count - 1] {
        for f in [0, config.functions_per_file - 1] {
            let snippet = function_snippet(i, f, &config);
            let result = expander
                .expand(workspace.path(), workspace.path(), &snippet)
                .await
                .unwrap_or_else(|| panic!("func_{i}_{f} should be found"));
            assert_eq!(result.file, workspace.path().join(module_path(i)));
            // `export ` precedes every generated function.
            assert_eq!(result.start_column, 8);
        }
    }
    expander.shutdown().await;
}

#[tokio::test]
async fn test_local_constant_resolves_and_globals_are_omitted() {
    let config = FixtureConfig::small();
    let workspace = create_fixture_workspace(&config);
    let (expander, factory) = expander(false);

    let last = config.file_count - 1;
    let result = expander
        .expand(workspace.path(), workspace.path(), &function_snippet(last, 1, &config))
        .await
        .unwrap();

    let names: Vec<_> = result.context.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![format!("CONST_{last}_0")]);
    assert_eq!(entry_text(&result, &format!("CONST_{last}_0")), Some("1"));
    assert_eq!(factory.created(), 1);
    expander.shutdown().await;
}

#[tokio::test]
async fn test_imported_name_needs_relative_import_fallback() {
    let config = FixtureConfig::small();
    let workspace = create_fixture_workspace(&config);
    let snippet = function_snippet(0, 0, &config);

    let (without, _) = expander(false);
    let result = without
        .expand(workspace.path(), workspace.path(), &snippet)
        .await
        .unwrap();
    assert_eq!(entry_text(&result, "CHAIN_1"), None);
    without.shutdown().await;

    let (with, _) = expander(true);
    let result = with
        .expand(workspace.path(), workspace.path(), &snippet)
        .await
        .unwrap();
    let names: Vec<_> = result.context.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["CONST_0_0", "CHAIN_1"]);
    assert_eq!(entry_text(&result, "CHAIN_1"), Some("10"));
    let chain = result.context.iter().find(|e| e.name == "CHAIN_1").unwrap();
    assert!(chain.definition.uri.ends_with(&module_path(1)));
    with.shutdown().await;
}

#[tokio::test]
async fn test_chain_end_has_no_import() {
    let config = FixtureConfig::small();
    let workspace = create_fixture_workspace(&config);
    let (expander, _) = expander(true);

    let end = config.import_chain_depth;
    let result = expander
        .expand(workspace.path(), workspace.path(), &function_snippet(end, 0, &config))
        .await
        .unwrap();
    assert_eq!(entry_text(&result, &format!("CHAIN_{}", end + 1)), None);
    assert_eq!(result.context.len(), 1);
    expander.shutdown().await;
}

#[tokio::test]
async fn test_medium_workspace_expansion_is_deterministic() {
    let config = FixtureConfig::medium();
    let workspace = create_fixture_workspace(&config);
    let (expander, factory) = expander(true);
    let snippet = function_snippet(7, 3, &config);

    let first = expander
        .expand(workspace.path(), workspace.path(), &snippet)
        .await
        .unwrap();
    for _ in 0..3 {
        let again = expander
            .expand(workspace.path(), workspace.path(), &snippet)
            .await
            .unwrap();
        assert_eq!(first, again);
    }
    assert_eq!(entry_text(&first, "CHAIN_8"), Some("80"));
    assert_eq!(factory.created(), 1);
    expander.shutdown().await;
}
