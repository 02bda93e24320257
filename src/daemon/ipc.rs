//! IPC Server for the meditation timer.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket
//! - Request/response handling for timer commands
//! - Streaming of state snapshots to `watch` clients

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::types::{IpcRequest, IpcResponse, ResponseData, TimerState};

use super::error::TimerError;
use super::timer::TimerEngine;

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (4KB)
const MAX_REQUEST_SIZE: usize = 4096;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Connection closed before a request arrived
    #[error("Connection closed by client")]
    ConnectionClosed,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Receives and deserializes an IPC request from the stream.
    ///
    /// Applies a read timeout to prevent blocking indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or deserialization fails.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<IpcRequest> {
        let mut buffer = vec![0u8; MAX_REQUEST_SIZE + 1];

        let read_result = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            stream.read(&mut buffer),
        )
        .await;

        let n = match read_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(IpcError::ReadError(e.to_string()).into()),
            Err(_) => return Err(IpcError::Timeout.into()),
        };

        if n == 0 {
            return Err(IpcError::ConnectionClosed.into());
        }
        if n > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest = serde_json::from_slice(&buffer[..n])
            .with_context(|| "Failed to deserialize IPC request")?;

        Ok(request)
    }

    /// Serializes and sends an IPC response to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let json = serde_json::to_vec(response).context("Failed to serialize IPC response")?;

        stream
            .write_all(&json)
            .await
            .context("Failed to write response")?;
        stream.flush().await.context("Failed to flush response")?;

        Ok(())
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to TimerEngine.
#[derive(Clone)]
pub struct RequestHandler {
    /// Shared reference to the timer engine
    engine: Arc<TimerEngine>,
}

impl RequestHandler {
    /// Creates a new request handler with the given timer engine.
    pub fn new(engine: Arc<TimerEngine>) -> Self {
        Self { engine }
    }

    /// Handles an IPC request and returns the appropriate response.
    ///
    /// `Watch` is answered with the current status; streaming is done by
    /// [`RequestHandler::serve`].
    pub fn handle(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::SetDuration { minutes } => respond(
                self.engine.set_duration(minutes),
                format!("Session length set to {minutes} min"),
            ),
            IpcRequest::Start => respond(self.engine.start(), "Timer started"),
            IpcRequest::Pause => respond(self.engine.pause(), "Timer paused"),
            IpcRequest::Resume => respond(self.engine.resume(), "Timer resumed"),
            IpcRequest::Reset => respond(self.engine.reset(), "Timer reset"),
            IpcRequest::Status | IpcRequest::Watch => {
                let state = self.engine.current_state();
                IpcResponse::success("", Some(ResponseData::from_timer_state(&state)))
            }
        }
    }

    /// Serves one client connection: a single request/response, or a
    /// snapshot stream for `watch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be read or the response
    /// cannot be written.
    pub async fn serve(&self, mut stream: UnixStream) -> Result<()> {
        let request = IpcServer::receive_request(&mut stream).await?;
        debug!("IPC request: {:?}", request);

        if request == IpcRequest::Watch {
            return self.stream_state(stream).await;
        }

        let response = self.handle(request);
        IpcServer::send_response(&mut stream, &response).await
    }

    /// Writes every snapshot as one JSON line until the client disconnects.
    async fn stream_state(&self, mut stream: UnixStream) -> Result<()> {
        let mut subscription = self.engine.subscribe();
        let (mut reader, mut writer) = stream.split();
        let mut scratch = [0u8; 64];

        loop {
            tokio::select! {
                next = subscription.recv() => {
                    let Some(state) = next else { break };
                    let mut line = serde_json::to_vec(&ResponseData::from_timer_state(&state))
                        .context("Failed to serialize snapshot")?;
                    line.push(b'\n');
                    if let Err(e) = writer.write_all(&line).await {
                        debug!("Watcher went away: {}", e);
                        break;
                    }
                }
                read = reader.read(&mut scratch) => {
                    // Watchers never send after the request; EOF means they left.
                    if matches!(read, Ok(0) | Err(_)) {
                        break;
                    }
                }
            }
        }

        debug!("Watch stream closed");
        Ok(())
    }
}

fn respond(result: Result<TimerState, TimerError>, message: impl Into<String>) -> IpcResponse {
    match result {
        Ok(state) => IpcResponse::success(message, Some(ResponseData::from_timer_state(&state))),
        Err(e) => IpcResponse::error(e.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
