//
// expand.rs
//
// Locate a function, find what it references from outside, and resolve
// each of those names to the text of its definition
//

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::config::ExpanderConfig;
use crate::extract::extract_definition;
use crate::follow_import::resolve_import;
use crate::locator::{locate_function, FunctionMatch};
use crate::lsp::{path_to_uri, DefinitionProvider, LanguageServerFactory, ProviderFactory, SessionPool};
use crate::perf::{ExpansionMetrics, TimingGuard};
use crate::scope::free_identifiers;
use crate::types::{ContextEntry, DefinitionResult, ExpansionResult, FreeIdentifier, TextRange};

/// Runs expansions, keeping one definition provider per project root alive
/// between calls. Call [`Expander::shutdown`] when done.
pub struct Expander {
    config: ExpanderConfig,
    pool: SessionPool,
}

impl Expander {
    /// Expander backed by a language server subprocess per project.
    pub fn new(config: ExpanderConfig) -> Self {
        let factory = Arc::new(LanguageServerFactory::new(config.clone()));
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: ExpanderConfig, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            config,
            pool: SessionPool::new(factory),
        }
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }

    /// Expand the function whose text equals `snippet`.
    ///
    /// Searches `search_root` for the function and resolves its free
    /// identifiers through the provider for `project_root`. Returns `None`
    /// when no function matches. Identifiers that cannot be resolved are
    /// left out of the context; failures never surface as errors.
    pub async fn expand(
        &self,
        project_root: &Path,
        search_root: &Path,
        snippet: &str,
    ) -> Option<ExpansionResult> {
        let _total = TimingGuard::with_threshold("expand", 5_000);
        let mut metrics = ExpansionMetrics::new();
        let project_root = absolute(project_root);
        let search_root = absolute(search_root);

        let locate_timer = TimingGuard::new("locate");
        let found = locate_function(&search_root, snippet, &self.config).await?;
        metrics.locate_duration = Some(locate_timer.finish());

        let free = {
            let Some(node) = found.node() else {
                log::warn!("Matched function in {} could not be re-read", found.file().display());
                return None;
            };
            free_identifiers(node, &found.source.content, self.config.max_tree_depth)
        };
        metrics.free_identifiers = free.len();
        log::debug!(
            "{} free identifier(s) in function at {}:{}",
            free.len(),
            found.file().display(),
            found.range.start.line + 1
        );

        let context = if free.is_empty() {
            Vec::new()
        } else {
            let resolve_timer = TimingGuard::new("resolve");
            let context = self.resolve_all(&project_root, &found, &free, &mut metrics).await;
            metrics.resolve_duration = Some(resolve_timer.finish());
            context
        };
        metrics.resolved = context.len();
        metrics.log_summary();

        Some(ExpansionResult::new(found.file().to_path_buf(), found.range, context))
    }

    async fn resolve_all(
        &self,
        project_root: &Path,
        found: &FunctionMatch,
        free: &[FreeIdentifier],
        metrics: &mut ExpansionMetrics,
    ) -> Vec<ContextEntry> {
        let session_timer = TimingGuard::new("session");
        let provider = match self.pool.get_or_create(project_root).await {
            Ok(provider) => Some(provider),
            Err(e) => {
                log::warn!(
                    "No definition provider for {}: {:#}",
                    project_root.display(),
                    e
                );
                None
            }
        };
        metrics.session_start_duration = Some(session_timer.finish());

        let file_uri = match path_to_uri(found.file()) {
            Ok(uri) => Some(uri),
            Err(e) => {
                log::warn!("{:#}", e);
                None
            }
        };

        let provider = match (provider, file_uri) {
            (Some(provider), Some(uri)) => {
                if let Err(e) = provider.open_document(found.file()).await {
                    log::warn!("Failed to open {}: {:#}", found.file().display(), e);
                }
                Some((provider, uri))
            }
            _ => None,
        };

        let mut context = Vec::with_capacity(free.len());
        for identifier in free {
            let mut definition = match &provider {
                Some((provider, uri)) => self.resolve_one(&**provider, uri, identifier).await,
                None => None,
            };
            if definition.is_none() && self.config.follow_relative_imports {
                definition = resolve_import(&found.source, &identifier.name).await;
            }

            match definition {
                Some(definition) => context.push(ContextEntry::new(identifier, &definition)),
                None => log::debug!("No definition for {}; omitted", identifier.name),
            }
        }
        context
    }

    async fn resolve_one(
        &self,
        provider: &dyn DefinitionProvider,
        file_uri: &Url,
        identifier: &FreeIdentifier,
    ) -> Option<DefinitionResult> {
        let location = match provider.definition(file_uri, identifier.position).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                log::debug!("Server has no definition for {}", identifier.name);
                return None;
            }
            Err(e) => {
                log::warn!("Definition request for {} failed: {:#}", identifier.name, e);
                return None;
            }
        };

        match extract_definition(
            location.uri.as_str(),
            TextRange::from(location.range),
            self.config.max_tree_depth,
        )
        .await
        {
            Ok(definition) => Some(definition),
            Err(e) => {
                log::warn!("Cannot extract definition of {}: {:#}", identifier.name, e);
                None
            }
        }
    }

    /// Shut every session down and reap its process.
    pub async fn shutdown(&self) {
        self.pool.shutdown_all().await;
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// One expansion with the default configuration; the language server is
/// shut down before returning.
pub async fn expand_function(
    project_root: &Path,
    search_root: &Path,
    snippet: &str,
) -> Option<ExpansionResult> {
    let expander = Expander::new(ExpanderConfig::default());
    let result = expander.expand(project_root, search_root, snippet).await;
    expander.shutdown().await;
    result
}
