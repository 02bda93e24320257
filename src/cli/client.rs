//! IPC Client for communicating with the meditation timer daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Request/response handling
//! - Connection retry logic
//! - Timeout handling
//! - Snapshot streaming for `watch`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::config::default_socket_path;
use crate::types::{IpcRequest, IpcResponse, ResponseData};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (64KB)
const MAX_RESPONSE_SIZE: usize = 65536;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client with the default socket path.
    pub fn new() -> Self {
        Self::with_socket_path(default_socket_path())
    }

    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sets the session length.
    pub async fn set_duration(&self, minutes: u32) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::SetDuration { minutes })
            .await
    }

    /// Sends a start command to the daemon.
    pub async fn start(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Start).await
    }

    /// Sends a pause command to the daemon.
    pub async fn pause(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Pause).await
    }

    /// Sends a resume command to the daemon.
    pub async fn resume(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Resume).await
    }

    /// Sends a reset command to the daemon.
    pub async fn reset(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Reset).await
    }

    /// Sends a status query to the daemon.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Status).await
    }

    /// Follows the countdown, calling `on_update` for every snapshot.
    ///
    /// Returns when the daemon closes the stream.
    pub async fn watch<F>(&self, mut on_update: F) -> Result<()>
    where
        F: FnMut(&ResponseData),
    {
        let mut stream = self.connect().await?;
        let request_json =
            serde_json::to_string(&IpcRequest::Watch).context("Failed to serialize request")?;

        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(request_json.as_bytes()),
        )
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;

        // The write side stays open: closing it tells the daemon we left.
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read snapshot")? {
            let data: ResponseData =
                serde_json::from_str(&line).context("Failed to parse snapshot")?;
            on_update(&data);
        }

        Ok(())
    }

    /// Sends a request to the daemon with retry logic.
    ///
    /// Only transport failures are retried; an error reported by the daemon
    /// is returned as is.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) if response.is_error() => {
                    anyhow::bail!("{}", response.message);
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("Request failed (attempt {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Request was not sent")))
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot connect to the daemon at {:?}. Start it with 'meditimer daemon'",
                    self.socket_path
                )
            })
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = self.connect().await?;

        let request_json = serde_json::to_string(request).context("Failed to serialize request")?;

        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(request_json.as_bytes()),
        )
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;

        timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.flush())
            .await
            .context("Flush timed out")?
            .context("Failed to flush request")?;

        // Shutdown write side to signal end of request
        stream
            .shutdown()
            .await
            .context("Failed to shut down write side")?;

        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];
        let n = timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.read(&mut buffer),
        )
        .await
        .context("Read timed out")?
        .context("Failed to receive response")?;

        if n == 0 {
            anyhow::bail!("The daemon closed the connection without a response");
        }

        let response: IpcResponse =
            serde_json::from_slice(&buffer[..n]).context("Failed to parse response")?;

        Ok(response)
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::UnixListener;
    use tokio::sync::Mutex;

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        // Keep the directory so it's not deleted
        std::mem::forget(dir);
        path
    }

    fn create_mock_server(socket_path: &Path) -> UnixListener {
        let _ = std::fs::remove_file(socket_path);
        UnixListener::bind(socket_path).unwrap()
    }

    fn data(state: &str, remaining: u32, total: u32) -> ResponseData {
        ResponseData {
            state: Some(state.to_string()),
            remaining_seconds: Some(remaining),
            total_seconds: Some(total),
        }
    }

    /// Accepts one connection, records the request and answers with `response`.
    fn spawn_responder(
        listener: UnixListener,
        response: IpcResponse,
    ) -> (
        tokio::task::JoinHandle<()>,
        Arc<Mutex<Option<IpcRequest>>>,
    ) {
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut buffer = vec![0u8; 4096];
            let n = stream.read(&mut buffer).await.unwrap();
            let request: IpcRequest = serde_json::from_slice(&buffer[..n]).unwrap();
            *received_clone.lock().await = Some(request);

            let json = serde_json::to_vec(&response).unwrap();
            stream.write_all(&json).await.unwrap();
            stream.flush().await.unwrap();
        });

        (handle, received)
    }

    // ------------------------------------------------------------------------
    // IpcClient Tests
    // ------------------------------------------------------------------------

    mod client_tests {
        use super::*;

        #[test]
        fn test_with_socket_path() {
            let path = PathBuf::from("/tmp/test.sock");
            let client = IpcClient::with_socket_path(path.clone());
            assert_eq!(client.socket_path(), path.as_path());
        }

        #[test]
        fn test_default_uses_app_dir() {
            let client = IpcClient::default();
            assert!(client.socket_path().ends_with(".meditimer/meditimer.sock"));
        }

        #[tokio::test]
        async fn test_connection_failure() {
            let socket_path = PathBuf::from("/tmp/nonexistent_meditimer_12345.sock");
            let client = IpcClient::with_socket_path(socket_path);

            let result = client.status().await;
            assert!(result.is_err());
            assert!(format!("{:#}", result.unwrap_err()).contains("meditimer daemon"));
        }

        #[tokio::test]
        async fn test_send_status_request() {
            let socket_path = create_temp_socket_path();
            let listener = create_mock_server(&socket_path);
            let (server_handle, received) =
                spawn_responder(listener, IpcResponse::success("", Some(data("idle", 900, 900))));

            let client = IpcClient::with_socket_path(socket_path);
            let response = client.status().await.unwrap();

            assert_eq!(response.status, "success");
            assert_eq!(response.data.unwrap(), data("idle", 900, 900));
            assert_eq!(*received.lock().await, Some(IpcRequest::Status));

            server_handle.await.unwrap();
        }

        #[tokio::test]
        async fn test_send_set_duration_request() {
            let socket_path = create_temp_socket_path();
            let listener = create_mock_server(&socket_path);
            let (server_handle, received) = spawn_responder(
                listener,
                IpcResponse::success("Session length set to 20 min", Some(data("idle", 1200, 1200))),
            );

            let client = IpcClient::with_socket_path(socket_path);
            let response = client.set_duration(20).await.unwrap();

            assert_eq!(response.data.unwrap().total_seconds, Some(1200));
            assert_eq!(
                *received.lock().await,
                Some(IpcRequest::SetDuration { minutes: 20 })
            );

            server_handle.await.unwrap();
        }

        #[tokio::test]
        async fn test_each_command_sends_its_request() {
            let cases = [
                IpcRequest::Start,
                IpcRequest::Pause,
                IpcRequest::Resume,
                IpcRequest::Reset,
            ];

            for expected in cases {
                let socket_path = create_temp_socket_path();
                let listener = create_mock_server(&socket_path);
                let (server_handle, received) =
                    spawn_responder(listener, IpcResponse::success("OK", None));

                let client = IpcClient::with_socket_path(socket_path);
                let response = match expected {
                    IpcRequest::Start => client.start().await,
                    IpcRequest::Pause => client.pause().await,
                    IpcRequest::Resume => client.resume().await,
                    _ => client.reset().await,
                };
                response.unwrap();

                assert_eq!(*received.lock().await, Some(expected));
                server_handle.await.unwrap();
            }
        }

        #[tokio::test]
        async fn test_error_response_is_not_retried() {
            let socket_path = create_temp_socket_path();
            let listener = create_mock_server(&socket_path);
            let (server_handle, _received) = spawn_responder(
                listener,
                IpcResponse::error("cannot resume while idle"),
            );

            let client = IpcClient::with_socket_path(socket_path);
            let result = client.resume().await;

            let error_msg = result.unwrap_err().to_string();
            assert_eq!(error_msg, "cannot resume while idle");

            // A single connection was served.
            server_handle.await.unwrap();
        }
    }

    // ------------------------------------------------------------------------
    // Watch Tests
    // ------------------------------------------------------------------------

    mod watch_tests {
        use super::*;

        #[tokio::test]
        async fn test_watch_reads_until_stream_ends() {
            let socket_path = create_temp_socket_path();
            let listener = create_mock_server(&socket_path);

            let server_handle = tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();

                let mut buffer = vec![0u8; 4096];
                let n = stream.read(&mut buffer).await.unwrap();
                let request: IpcRequest = serde_json::from_slice(&buffer[..n]).unwrap();
                assert_eq!(request, IpcRequest::Watch);

                for snapshot in [data("running", 60, 60), data("running", 59, 60)] {
                    let mut line = serde_json::to_vec(&snapshot).unwrap();
                    line.push(b'\n');
                    stream.write_all(&line).await.unwrap();
                }
            });

            let client = IpcClient::with_socket_path(socket_path);
            let mut seen = Vec::new();
            client
                .watch(|d| seen.push(d.remaining_seconds))
                .await
                .unwrap();

            assert_eq!(seen, vec![Some(60), Some(59)]);
            server_handle.await.unwrap();
        }

        #[tokio::test]
        async fn test_watch_rejects_garbage() {
            let socket_path = create_temp_socket_path();
            let listener = create_mock_server(&socket_path);

            let _server = tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buffer = vec![0u8; 4096];
                let _ = stream.read(&mut buffer).await;
                stream.write_all(b"not json\n").await.unwrap();
            });

            let client = IpcClient::with_socket_path(socket_path);
            assert!(client.watch(|_| {}).await.is_err());
        }
    }
}
