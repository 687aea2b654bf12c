//! Newline-delimited JSON-RPC over a pair of byte streams.
//!
//! The [`Transport`] trait is the seam the protocol session talks through;
//! [`StdioTransport`] implements it over the server's stdin/stdout.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// A duplex JSON-RPC message channel.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response with the same id.
    fn send_request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, JsonRpcResponse>;

    /// Send a notification; nothing comes back.
    fn send_notification<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, ()>;

    /// True once the underlying streams have closed.
    fn is_closed(&self) -> bool;
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Async transport over a child's stdin/stdout.
///
/// A writer task owns stdin and a reader task owns stdout; requests are
/// correlated to responses by id. When either side fails, every waiting
/// request resolves to a connection-closed error.
pub struct StdioTransport {
    next_id: AtomicU64,
    write_tx: mpsc::Sender<String>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Start the reader and writer tasks over the given streams.
    pub fn new<W, R>(stdin: W, stdout: R, request_timeout: Duration) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let pending_for_writer = Arc::clone(&pending);
        let closed_for_writer = Arc::clone(&closed);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(msg.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::debug!("MCP server stdin closed: {e}");
                    break;
                }
            }
            mark_closed(&pending_for_writer, &closed_for_writer).await;
        });

        let pending_for_reader = Arc::clone(&pending);
        let closed_for_reader = Arc::clone(&closed);
        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("MCP server stdout read failed: {e}");
                        break;
                    }
                }
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                // Invalid UTF-8 is skipped like any other unparseable line.
                let msg: JsonRpcResponse = match serde_json::from_slice(&line) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to parse MCP message: {e}: {}",
                            String::from_utf8_lossy(&line).trim_end()
                        );
                        continue;
                    }
                };
                if !msg.is_response() {
                    tracing::debug!(method = ?msg.method, "ignoring server-initiated message");
                    continue;
                }
                if let Some(id) = msg.id {
                    let tx = pending_for_reader.lock().await.remove(&id);
                    match tx {
                        Some(tx) => {
                            let _ = tx.send(msg);
                        }
                        None => tracing::debug!(id, "response for unknown request id"),
                    }
                }
            }
            mark_closed(&pending_for_reader, &closed_for_reader).await;
        });

        Self {
            next_id: AtomicU64::new(1),
            write_tx,
            pending,
            closed,
            reader_handle,
            writer_handle,
            request_timeout,
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::Acquire) {
                return Err(McpError::connection_closed(format!(
                    "transport closed before '{method}' was sent"
                )));
            }
            pending.insert(id, tx);
        }

        tracing::debug!(id, method, "sending MCP request");
        if self.write_tx.send(serialized).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpError::connection_closed("writer task has stopped"));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::connection_closed(format!(
                "server closed the connection before answering '{method}'"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::timeout(method, self.request_timeout.as_millis()))
            }
        }
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let serialized = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.write_tx
            .send(serialized)
            .await
            .map_err(|_| McpError::connection_closed("writer task has stopped"))
    }
}

async fn mark_closed(pending: &Pending, closed: &AtomicBool) {
    let mut pending = pending.lock().await;
    closed.store(true, Ordering::Release);
    // Dropping the senders wakes every waiter with a connection-closed error.
    pending.clear();
}

impl Transport for StdioTransport {
    fn send_request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, JsonRpcResponse> {
        Box::pin(self.request(method, params))
    }

    fn send_notification<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, ()> {
        Box::pin(self.notify(method, params))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // Aborting the writer drops stdin, which the server sees as EOF.
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}
