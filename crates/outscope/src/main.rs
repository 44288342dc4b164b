//
// main.rs
//
// Command-line entry point: one expansion, printed as JSON
//

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use outscope::{Expander, ExpanderConfig};

fn print_usage() {
    println!(
        "outscope {}, expands a TypeScript function with the definitions it depends on.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: outscope --project <DIR> --search <DIR> (--snippet <TEXT> | --snippet-file <PATH>) [OPTIONS]

Available options:

--project <DIR>              Project root handed to the language server
--search <DIR>               Directory searched for the function
--snippet <TEXT>             Exact source text of the function
--snippet-file <PATH>        Read the function's source text from a file
--server <COMMAND>           Language server command line (default: npx typescript-language-server --stdio)
--config <PATH>              JSON settings file (camelCase keys)
--version                    Print the version
--help                       Print this help message

Environment:

OUTSCOPE_SERVER              Language server command line, overridden by --server
OUTSCOPE_PERF                Log stage timings (1 or verbose)
RUST_LOG                     Log filter (e.g. outscope=debug)

"#
    );
}

#[derive(Debug, Default)]
struct Args {
    project: Option<PathBuf>,
    search: Option<PathBuf>,
    snippet: Option<String>,
    snippet_file: Option<PathBuf>,
    server: Option<String>,
    config: Option<PathBuf>,
}

enum Command {
    Run(Args),
    Help,
    Version,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Command> {
    let mut args = Args::default();

    while let Some(arg) = argv.next() {
        let mut value = |flag: &str| {
            argv.next()
                .ok_or_else(|| anyhow!("Missing value for '{flag}'"))
        };
        match arg.as_str() {
            "--project" => args.project = Some(PathBuf::from(value(&arg)?)),
            "--search" => args.search = Some(PathBuf::from(value(&arg)?)),
            "--snippet" => args.snippet = Some(value(&arg)?),
            "--snippet-file" => args.snippet_file = Some(PathBuf::from(value(&arg)?)),
            "--server" => args.server = Some(value(&arg)?),
            "--config" => args.config = Some(PathBuf::from(value(&arg)?)),
            "--version" => return Ok(Command::Version),
            "--help" => return Ok(Command::Help),
            other => bail!("Unknown argument: '{other}'"),
        }
    }

    Ok(Command::Run(args))
}

/// Split a server command line into executable and arguments.
fn apply_server(config: &mut ExpanderConfig, command_line: &str) {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    if let Some(command) = parts.next() {
        config.server_command = command;
        config.server_args = parts.collect();
    }
}

fn build_config(args: &Args) -> Result<ExpanderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let settings: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            ExpanderConfig::from_json(&settings)
        }
        None => ExpanderConfig::default(),
    };

    if let Ok(server) = env::var("OUTSCOPE_SERVER") {
        apply_server(&mut config, &server);
    }
    if let Some(server) = &args.server {
        apply_server(&mut config, server);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let args = match parse_args(argv)? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            println!("outscope {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Run(args) => args,
    };

    let (Some(project), Some(search)) = (args.project.clone(), args.search.clone()) else {
        print_usage();
        bail!("--project and --search are required");
    };
    let snippet = match (&args.snippet, &args.snippet_file) {
        (Some(snippet), None) => snippet.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snippet file {}", path.display()))?,
        _ => bail!("exactly one of --snippet or --snippet-file is required"),
    };

    env_logger::init();

    let config = build_config(&args)?;
    let expander = Expander::new(config);
    let result = expander.expand(&project, &search, &snippet).await;
    expander.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_full_invocation() {
        let Command::Run(args) = parse(&[
            "--project", "/p", "--search", "/p/src", "--snippet", "() => 1", "--server",
            "typescript-language-server --stdio",
        ])
        .unwrap() else {
            panic!("expected run");
        };
        assert_eq!(args.project, Some(PathBuf::from("/p")));
        assert_eq!(args.search, Some(PathBuf::from("/p/src")));
        assert_eq!(args.snippet.as_deref(), Some("() => 1"));
        assert_eq!(args.server.as_deref(), Some("typescript-language-server --stdio"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--project"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }

    #[test]
    fn test_help_and_version() {
        assert!(matches!(parse(&["--help"]).unwrap(), Command::Help));
        assert!(matches!(parse(&["--project", "/p", "--version"]).unwrap(), Command::Version));
    }

    #[test]
    fn test_server_override_splits_arguments() {
        let mut config = ExpanderConfig::default();
        apply_server(&mut config, "typescript-language-server --stdio --log-level 4");
        assert_eq!(config.server_command, "typescript-language-server");
        assert_eq!(config.server_args, vec!["--stdio", "--log-level", "4"]);

        apply_server(&mut config, "   ");
        assert_eq!(config.server_command, "typescript-language-server");
    }

    #[test]
    fn test_config_file_is_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("outscope.json");
        std::fs::write(&path, r#"{"requestTimeoutMs": 2000, "ignoredDirs": ["node_modules"]}"#)
            .unwrap();
        let args = Args {
            config: Some(path),
            server: Some("tsls --stdio".to_string()),
            ..Args::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.request_timeout, std::time::Duration::from_millis(2000));
        assert_eq!(config.ignored_dirs, vec!["node_modules"]);
        assert_eq!(config.server_command, "tsls");
    }
}
