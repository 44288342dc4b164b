//
// lsp/session.rs
//
// One language-server subprocess and its protocol lifecycle
//

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{
    ClientCapabilities, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    GotoDefinitionParams, GotoDefinitionResponse, InitializeParams, Location,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, Url, WorkspaceFolder,
};

use super::transport::Connection;
use super::{path_to_uri, DefinitionProvider};
use crate::config::ExpanderConfig;
use crate::parser_pool::Dialect;
use crate::types::SourceLocation;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    ShutDown,
}

/// A connection to a TypeScript language server rooted at one project.
pub struct LspSession {
    root: PathBuf,
    connection: Connection,
    state: std::sync::Mutex<SessionState>,
    opened: std::sync::Mutex<HashSet<Url>>,
    child: tokio::sync::Mutex<Option<Child>>,
    stderr_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl LspSession {
    /// Spawn the configured server in `root` and complete the handshake.
    pub async fn spawn(root: &Path, config: &ExpanderConfig) -> Result<Self> {
        log::info!(
            "Starting language server `{} {}` for {}",
            config.server_command,
            config.server_args.join(" "),
            root.display()
        );

        let mut cmd = Command::new(&config.server_command);
        cmd.args(&config.server_args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn `{}`: {e}", config.server_command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("language server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("language server stdout unavailable"))?;
        let stderr_task = child.stderr.take().map(log_stderr);

        let connection = Connection::from_streams(stdout, stdin, config.request_timeout);
        let mut session = Self::new(root, connection, config.shutdown_timeout);
        session.child = tokio::sync::Mutex::new(Some(child));
        session.stderr_task = std::sync::Mutex::new(stderr_task);

        // Dropping the session on failure kills the child
        session.initialize().await?;
        Ok(session)
    }

    /// Run the handshake over an existing connection (no subprocess).
    pub async fn connect(root: &Path, connection: Connection, shutdown_timeout: Duration) -> Result<Self> {
        let session = Self::new(root, connection, shutdown_timeout);
        session.initialize().await?;
        Ok(session)
    }

    fn new(root: &Path, connection: Connection, shutdown_timeout: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            connection,
            state: std::sync::Mutex::new(SessionState::Uninitialized),
            opened: std::sync::Mutex::new(HashSet::new()),
            child: tokio::sync::Mutex::new(None),
            stderr_task: std::sync::Mutex::new(None),
            shutdown_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::ShutDown)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            log::trace!("Session {}: {:?} -> {:?}", self.root.display(), *state, next);
            *state = next;
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SessionState::Ready if !self.connection.is_closed() => Ok(()),
            SessionState::Ready => bail!("language server for {} has exited", self.root.display()),
            other => bail!("session for {} is {:?}", self.root.display(), other),
        }
    }

    async fn initialize(&self) -> Result<()> {
        self.set_state(SessionState::Initializing);

        let root_uri = path_to_uri(&self.root)?;
        let folder_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            capabilities: ClientCapabilities::default(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            initialization_options: Some(json!({
                "preferences": {
                    "allowIncompleteCompletions": true,
                    "includeCompletionsForModuleExports": true,
                    "includeCompletionsWithInsertText": true
                }
            })),
            ..Default::default()
        };

        let result = self
            .connection
            .request("initialize", serde_json::to_value(params)?)
            .await
            .context("initialize request failed")?;
        if let Some(name) = result.pointer("/serverInfo/name").and_then(Value::as_str) {
            log::info!("Connected to {} for {}", name, self.root.display());
        }

        self.connection
            .notify("initialized", json!({}))
            .await
            .context("initialized notification failed")?;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    fn mark_opened(&self, uri: &Url) -> bool {
        match self.opened.lock() {
            Ok(mut opened) => !opened.insert(uri.clone()),
            Err(_) => false,
        }
    }
}

fn log_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => log::debug!("[server stderr] {}", line),
                Ok(None) => break,
                Err(e) => {
                    log::debug!("[server stderr] read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// First location of a definition response, whatever its shape.
pub fn first_location(response: GotoDefinitionResponse) -> Option<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => Some(location),
        GotoDefinitionResponse::Array(locations) => locations.into_iter().next(),
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .next()
            .map(|link| Location::new(link.target_uri, link.target_selection_range)),
    }
}

#[async_trait]
impl DefinitionProvider for LspSession {
    async fn open_document(&self, path: &Path) -> Result<()> {
        self.ensure_ready()?;
        let uri = path_to_uri(path)?;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        // Reopen so the server sees the file's current content
        if self.mark_opened(&uri) {
            let params = DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier::new(uri.clone()),
            };
            self.connection
                .notify("textDocument/didClose", serde_json::to_value(params)?)
                .await?;
        }

        let language_id = Dialect::for_any_path(path).language_id().to_string();
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem::new(uri, language_id, 1, text),
        };
        self.connection
            .notify("textDocument/didOpen", serde_json::to_value(params)?)
            .await
    }

    async fn definition(&self, uri: &Url, position: SourceLocation) -> Result<Option<Location>> {
        self.ensure_ready()?;
        crate::perf::increment_definition_requests();

        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams::new(
                TextDocumentIdentifier::new(uri.clone()),
                position.into(),
            ),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let value = self
            .connection
            .request("textDocument/definition", serde_json::to_value(params)?)
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let response: GotoDefinitionResponse =
            serde_json::from_value(value).context("unexpected definition response shape")?;
        Ok(first_location(response))
    }

    async fn shutdown(&self) -> Result<()> {
        if self.state() == SessionState::ShutDown {
            return Ok(());
        }
        let was_ready = self.state() == SessionState::Ready;
        self.set_state(SessionState::ShutDown);

        if was_ready && !self.connection.is_closed() {
            if let Err(e) = self.connection.request("shutdown", Value::Null).await {
                log::warn!("shutdown request failed for {}: {:#}", self.root.display(), e);
            }
            if let Err(e) = self.connection.notify("exit", Value::Null).await {
                log::debug!("exit notification failed: {:#}", e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => log::info!("Language server exited with {}", status),
                Ok(Err(e)) => log::warn!("Failed to reap language server: {}", e),
                Err(_) => {
                    log::warn!(
                        "Language server did not exit within {:?}; killing it",
                        self.shutdown_timeout
                    );
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill language server: {}", e);
                    }
                }
            }
        }

        if let Ok(mut task) = self.stderr_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
        Ok(())
    }
}
