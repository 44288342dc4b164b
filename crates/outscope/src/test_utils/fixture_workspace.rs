//! Deterministic fixture workspace generator for tests.
//!
//! Generates synthetic TypeScript workspaces with controlled characteristics:
//! file count, functions and constants per file, relative import chains,
//! and extra top-level statements.
//!
//! All output is deterministic (no randomness) so tests are reproducible.

use std::fmt::Write;
use std::path::Path;
use tempfile::TempDir;

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub file_count: usize,
    pub functions_per_file: usize,
    pub constants_per_file: usize,
    pub import_chain_depth: usize,
    pub extra_lines_per_file: usize,
}

impl FixtureConfig {
    /// Small workspace: 10 files, 5 functions each, import chain depth 3.
    pub fn small() -> Self {
        Self {
            file_count: 10,
            functions_per_file: 5,
            constants_per_file: 2,
            import_chain_depth: 3,
            extra_lines_per_file: 5,
        }
    }

    /// Medium workspace: 50 files, 10 functions each, import chain depth 10.
    pub fn medium() -> Self {
        Self {
            file_count: 50,
            functions_per_file: 10,
            constants_per_file: 4,
            import_chain_depth: 10,
            extra_lines_per_file: 10,
        }
    }
}

/// Relative path of generated module `index`.
pub fn module_path(index: usize) -> String {
    format!("src/module_{index:03}.ts")
}

/// Source text of function `func_i` in module `index`, exactly as written
/// after its `export` keyword.
///
/// Every function reads the module's first constant (when the module has
/// one) and, for modules inside the import chain, the next module's
/// `CHAIN_<index+1>` export.
pub fn function_snippet(index: usize, func_i: usize, config: &FixtureConfig) -> String {
    let mut body = String::new();
    writeln!(
        body,
        "function func_{index}_{func_i}(x: number, y: number = {}): number {{",
        func_i + 1
    )
    .unwrap();
    if config.constants_per_file > 0 {
        writeln!(body, "  const result = x + y * CONST_{index}_0;").unwrap();
    } else {
        writeln!(body, "  const result = x + y;").unwrap();
    }
    writeln!(body, "  if (Number.isNaN(result)) {{").unwrap();
    writeln!(body, "    return 0;").unwrap();
    writeln!(body, "  }}").unwrap();
    if imports_next(index, config) {
        writeln!(body, "  return result + CHAIN_{};", index + 1).unwrap();
    } else {
        writeln!(body, "  return result;").unwrap();
    }
    body.push('}');
    body
}

fn imports_next(index: usize, config: &FixtureConfig) -> bool {
    index < config.import_chain_depth && index + 1 < config.file_count
}

/// Generate the content of a single module deterministically.
fn generate_module_content(index: usize, config: &FixtureConfig) -> String {
    let mut content = String::new();

    // module_0 imports module_1, module_1 imports module_2, ...
    if imports_next(index, config) {
        writeln!(
            content,
            "import {{ CHAIN_{next} }} from \"./module_{next:03}\";",
            next = index + 1
        )
        .unwrap();
        content.push('\n');
    }

    writeln!(content, "export const CHAIN_{index} = {};", index * 10).unwrap();
    for const_i in 0..config.constants_per_file {
        writeln!(content, "const CONST_{index}_{const_i} = {};", const_i + 1).unwrap();
    }
    content.push('\n');

    for func_i in 0..config.functions_per_file {
        content.push_str("export ");
        content.push_str(&function_snippet(index, func_i, config));
        content.push_str("\n\n");
    }

    for line_i in 0..config.extra_lines_per_file {
        writeln!(content, "export let var_{index}_{line_i} = {};", line_i + 1).unwrap();
    }

    content
}

/// Create a temporary fixture workspace from the given configuration.
///
/// The directory is cleaned up when the `TempDir` is dropped. Calling this
/// twice with the same `FixtureConfig` produces byte-identical files.
pub fn create_fixture_workspace(config: &FixtureConfig) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    write_fixture_workspace(temp_dir.path(), config);
    temp_dir
}

/// Write fixture files into an existing directory.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) {
    std::fs::create_dir_all(dir.join("src"))
        .unwrap_or_else(|e| panic!("Failed to create fixture src directory: {}", e));
    for i in 0..config.file_count {
        let content = generate_module_content(i, config);
        let relative = module_path(i);
        std::fs::write(dir.join(&relative), &content)
            .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", relative, e));
    }
}
