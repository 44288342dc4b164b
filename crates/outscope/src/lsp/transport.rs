//
// lsp/transport.rs
//
// JSON-RPC 2.0 over Content-Length framed byte streams
//

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// Read one framed message. `Ok(None)` on a clean end of stream between
/// messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if saw_header {
                bail!("stream ended inside a message header");
            }
            return Ok(None);
        }
        saw_header = true;

        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                let len = value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid Content-Length: {:?}", value.trim()))?;
                content_length = Some(len);
            }
        }
    }

    let len = content_length.ok_or_else(|| anyhow!("message header without Content-Length"))?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .context("stream ended inside a message body")?;
    let value = serde_json::from_slice(&body).context("message body is not valid JSON")?;
    Ok(Some(value))
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, value: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(value)?;
    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
        .await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// `error` member of a JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any message the server may send: response, request, or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl IncomingMessage {
    fn response_id(&self) -> Option<i64> {
        if self.method.is_some() {
            return None;
        }
        self.id.as_ref().and_then(Value::as_i64)
    }
}

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;
type PendingTable = Arc<DashMap<i64, oneshot::Sender<std::result::Result<Value, ResponseError>>>>;

/// Releases a pending slot when the waiting request finishes or is dropped.
struct PendingSlot {
    pending: PendingTable,
    id: i64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// A JSON-RPC client connection.
///
/// A background task reads the server's output, routes responses to the
/// waiting request by id, answers server-initiated requests with a `null`
/// result, and logs notifications.
pub struct Connection {
    writer: SharedWriter,
    pending: PendingTable,
    next_id: AtomicI64,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
}

impl Connection {
    pub fn from_streams<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let pending: PendingTable = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            BufReader::new(reader),
            writer.clone(),
            pending.clone(),
            closed.clone(),
        ));

        Self {
            writer,
            pending,
            next_id: AtomicI64::new(1),
            closed,
            request_timeout,
            reader_task,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn send(&self, message: &Value) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_message(&mut **writer, message).await
    }

    /// Send a notification. `Value::Null` params are omitted.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.is_closed() {
            bail!("connection closed; cannot send {method}");
        }
        let mut message = json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        log::debug!("--> {}", method);
        self.send(&message)
            .await
            .with_context(|| format!("failed to send {method}"))
    }

    /// Send a request and wait for its result, bounded by the request timeout.
    ///
    /// On timeout a `$/cancelRequest` notification is sent and the call fails.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _slot = PendingSlot {
            pending: self.pending.clone(),
            id,
        };

        // Checked after registering so a concurrent close cannot strand the slot
        if self.is_closed() {
            bail!("connection closed; cannot send {method}");
        }

        let mut message = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        log::debug!("--> {} (id {})", method, id);
        self.send(&message)
            .await
            .with_context(|| format!("failed to send {method}"))?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(anyhow!(
                "{} failed: {} (code {})",
                method,
                error.message,
                error.code
            )),
            Ok(Err(_)) => Err(anyhow!("connection closed before {method} (id {id}) completed")),
            Err(_) => {
                if let Err(e) = self.notify("$/cancelRequest", json!({ "id": id })).await {
                    log::debug!("Could not cancel request {}: {:#}", id, e);
                }
                Err(anyhow!(
                    "{} (id {}) timed out after {:?}",
                    method,
                    id,
                    self.request_timeout
                ))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop<R>(mut reader: R, writer: SharedWriter, pending: PendingTable, closed: Arc<AtomicBool>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(value)) => dispatch(value, &writer, &pending).await,
            Ok(None) => {
                log::info!("Language server closed its output stream");
                break;
            }
            Err(e) => {
                log::warn!("Language server stream failed: {:#}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every waiting request
    pending.clear();
}

async fn dispatch(value: Value, writer: &SharedWriter, pending: &PendingTable) {
    let message: IncomingMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Ignoring malformed message from server: {}", e);
            return;
        }
    };

    if let Some(id) = message.response_id() {
        log::debug!("<-- response (id {})", id);
        match pending.remove(&id) {
            Some((_, tx)) => {
                let outcome = match message.error {
                    Some(error) => Err(error),
                    None => Ok(message.result.unwrap_or(Value::Null)),
                };
                // The requester may have given up already
                let _ = tx.send(outcome);
            }
            None => log::debug!("Response for unknown or abandoned request {}", id),
        }
        return;
    }

    match (message.method, message.id) {
        (Some(method), Some(id)) => {
            log::debug!("<-- server request {} (answering null)", method);
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": null });
            // The reader must keep draining stdout while a client write holds the lock
            let writer = writer.clone();
            tokio::spawn(async move {
                let mut writer = writer.lock().await;
                if let Err(e) = write_message(&mut **writer, &reply).await {
                    log::warn!("Failed to answer server request {}: {:#}", method, e);
                }
            });
        }
        (Some(method), None) => log::debug!("<-- notification {}", method),
        (None, _) => log::debug!("Ignoring message without method or numeric id"),
    }
}
