//
// lsp/mod.rs
//
// Definition lookup through an external language server
//

pub mod session;
pub mod transport;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::{Location, Url};

use crate::config::ExpanderConfig;
use crate::types::SourceLocation;

pub use session::{LspSession, SessionState};
pub use transport::Connection;

/// `file://` URI for an absolute path.
pub fn path_to_uri(path: &Path) -> Result<Url> {
    Url::from_file_path(path).map_err(|_| anyhow!("not an absolute path: {}", path.display()))
}

/// Filesystem path named by a `file://` URI.
pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).map_err(|e| anyhow!("invalid URI {uri:?}: {e}"))?;
    url.to_file_path()
        .map_err(|_| anyhow!("not a file URI: {uri}"))
}

/// Anything that can answer "where is the symbol at this position declared?"
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    /// Make `path`'s current content known before querying positions in it.
    async fn open_document(&self, path: &Path) -> Result<()>;

    /// Declaration site of the symbol at `position` (UTF-16, zero-based).
    async fn definition(&self, uri: &Url, position: SourceLocation) -> Result<Option<Location>>;

    async fn shutdown(&self) -> Result<()>;
}

/// Creates one provider per project root.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self, project_root: &Path) -> Result<Arc<dyn DefinitionProvider>>;
}

/// Spawns a language server subprocess per project root.
#[derive(Debug, Clone)]
pub struct LanguageServerFactory {
    config: ExpanderConfig,
}

impl LanguageServerFactory {
    pub fn new(config: ExpanderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProviderFactory for LanguageServerFactory {
    async fn create(&self, project_root: &Path) -> Result<Arc<dyn DefinitionProvider>> {
        let session = LspSession::spawn(project_root, &self.config).await?;
        Ok(Arc::new(session))
    }
}

/// Providers keyed by project root, created on first use.
///
/// Failed creations are not cached. [`SessionPool::shutdown_all`] shuts every
/// provider down and empties the pool.
pub struct SessionPool {
    factory: Arc<dyn ProviderFactory>,
    sessions: Mutex<HashMap<PathBuf, Arc<dyn DefinitionProvider>>>,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, project_root: &Path) -> Result<Arc<dyn DefinitionProvider>> {
        // Held across creation so concurrent callers share one session
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(project_root) {
            return Ok(existing.clone());
        }

        let created = self.factory.create(project_root).await?;
        sessions.insert(project_root.to_path_buf(), created.clone());
        log::info!("Session created for {}", project_root.display());
        Ok(created)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (root, provider) in drained {
            if let Err(e) = provider.shutdown().await {
                log::warn!("Shutting down session for {} failed: {:#}", root.display(), e);
            } else {
                log::info!("Session for {} shut down", root.display());
            }
        }
    }
}
