//
// config.rs
//
// Configuration for function expansion
//

use std::time::Duration;

/// Default depth guard for syntax-tree traversals.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 512;

/// Expansion configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExpanderConfig {
    /// Executable that starts the language server
    pub server_command: String,
    /// Arguments passed to `server_command`
    pub server_args: Vec<String>,
    /// Upper bound for a single protocol request
    pub request_timeout: Duration,
    /// How long to wait for the server to exit after `shutdown`/`exit`
    pub shutdown_timeout: Duration,
    /// Maximum syntax-tree depth explored by analysis passes
    pub max_tree_depth: usize,
    /// Resolve identifiers the server could not resolve through relative imports
    pub follow_relative_imports: bool,
    /// Directory names the walker never descends into
    pub ignored_dirs: Vec<String>,
}

impl Default for ExpanderConfig {
    /// Defaults spawn `npx typescript-language-server --stdio`, bound each request
    /// to 30 seconds, and leave the static import fallback disabled.
    ///
    /// # Examples
    ///
    /// ```
    /// use outscope::config::ExpanderConfig;
    /// let cfg = ExpanderConfig::default();
    /// assert_eq!(cfg.server_command, "npx");
    /// assert!(!cfg.follow_relative_imports);
    /// ```
    fn default() -> Self {
        Self {
            server_command: "npx".to_string(),
            server_args: vec![
                "typescript-language-server".to_string(),
                "--stdio".to_string(),
            ],
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            follow_relative_imports: false,
            ignored_dirs: Vec::new(),
        }
    }
}

impl ExpanderConfig {
    /// Build a configuration from a camelCase JSON settings object.
    ///
    /// Only keys present in `settings` override the defaults:
    /// `serverCommand`, `serverArgs`, `requestTimeoutMs`, `shutdownTimeoutMs`,
    /// `maxTreeDepth`, `followRelativeImports`, `ignoredDirs`.
    ///
    /// # Examples
    ///
    /// ```
    /// use outscope::config::ExpanderConfig;
    /// let cfg = ExpanderConfig::from_json(&serde_json::json!({
    ///     "serverCommand": "typescript-language-server",
    ///     "serverArgs": ["--stdio"],
    ///     "followRelativeImports": true
    /// }));
    /// assert_eq!(cfg.server_args, vec!["--stdio".to_string()]);
    /// assert!(cfg.follow_relative_imports);
    /// ```
    pub fn from_json(settings: &serde_json::Value) -> Self {
        let mut config = Self::default();

        if let Some(v) = settings.get("serverCommand").and_then(|v| v.as_str()) {
            if !v.trim().is_empty() {
                config.server_command = v.to_string();
            }
        }
        if let Some(args) = settings.get("serverArgs").and_then(|v| v.as_array()) {
            config.server_args = args
                .iter()
                .filter_map(|a| a.as_str())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = settings.get("requestTimeoutMs").and_then(|v| v.as_u64()) {
            if v > 0 {
                config.request_timeout = Duration::from_millis(v);
            }
        }
        if let Some(v) = settings.get("shutdownTimeoutMs").and_then(|v| v.as_u64()) {
            config.shutdown_timeout = Duration::from_millis(v);
        }
        if let Some(v) = settings.get("maxTreeDepth").and_then(|v| v.as_u64()) {
            if v > 0 {
                config.max_tree_depth = v as usize;
            }
        }
        if let Some(v) = settings
            .get("followRelativeImports")
            .and_then(|v| v.as_bool())
        {
            config.follow_relative_imports = v;
        }
        if let Some(dirs) = settings.get("ignoredDirs").and_then(|v| v.as_array()) {
            config.ignored_dirs = dirs
                .iter()
                .filter_map(|d| d.as_str())
                .filter(|s| !s.is_empty() && !s.contains('/') && !s.contains('\\'))
                .map(str::to_string)
                .collect();
        }

        config
    }
}
