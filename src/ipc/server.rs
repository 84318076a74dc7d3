//! Unix domain socket server for IPC
//!
//! Accepts key input from clients, answers status queries, and pushes
//! dispatcher output to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::behaviors::StickySnapshot;
use crate::dispatch::InputEvent;
use crate::events::OutputEvent;

use super::protocol::{self, DaemonStatus, Notification, ProtocolError, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Shared,
    shutdown_tx: broadcast::Sender<()>,
}

/// Handles cloned into every client task
#[derive(Clone)]
struct Shared {
    state: Arc<RwLock<ServerState>>,
    input_tx: mpsc::Sender<InputEvent>,
    output_tx: broadcast::Sender<OutputEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server forwarding input to `input_tx` and
    /// publishing `output_tx` to subscribers
    pub fn new(
        socket_path: &Path,
        input_tx: mpsc::Sender<InputEvent>,
        output_tx: broadcast::Sender<OutputEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared: Shared {
                state,
                input_tx,
                output_tx,
            },
            shutdown_tx,
        })
    }

    /// Update the sticky modifier state reported by `get_status`
    pub async fn set_sticky_state(&self, snapshot: StickySnapshot) {
        let mut server_state = self.shared.state.write().await;
        let old = server_state.status.sticky;
        server_state.status.sticky = snapshot;

        if old.normal_mode != snapshot.normal_mode {
            info!(normal_mode = snapshot.normal_mode, "IPC server: sticky mode updated");
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = self.shared.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Shared) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a half-read frame is never
        // dropped by the select below
        let (request_tx, mut request_rx) = mpsc::channel(16);
        let reader_task = tokio::spawn(Self::read_requests(reader, request_tx));

        let mut notifications: Option<broadcast::Receiver<OutputEvent>> = None;

        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match request {
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, &shared, &mut notifications).await
                        }
                        Err(e) => Response::error("malformed_request", e.to_string()),
                    };

                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }

                output = next_notification(&mut notifications) => {
                    let notification = match output {
                        Ok(event) => Notification::Output { event },
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber lagged");
                            Notification::Lagged { skipped }
                        }
                        Err(RecvError::Closed) => {
                            notifications = None;
                            continue;
                        }
                    };

                    if let Err(e) = Self::send_message(&mut writer, &notification).await {
                        break Err(e);
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Read length-prefixed requests until EOF or an oversized frame
    async fn read_requests(
        mut reader: OwnedReadHalf,
        request_tx: mpsc::Sender<Result<Request, ProtocolError>>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            let len = match protocol::check_len(u32::from_le_bytes(len_buf) as usize) {
                Ok(len) => len,
                Err(e) => {
                    warn!(%e, "disconnecting client");
                    return Ok(());
                }
            };

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            if request_tx.send(protocol::decode_request(&msg_buf)).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let frame = protocol::encode(msg)?;
        writer.write_all(&frame).await?;
        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        shared: &Shared,
        notifications: &mut Option<broadcast::Receiver<OutputEvent>>,
    ) -> Response {
        if let Some(input) = request.input() {
            if shared.input_tx.send(input).await.is_err() {
                return Response::error("dispatcher_unavailable", "dispatcher is not running");
            }
            shared.state.write().await.status.inputs_accepted += 1;
            return Response::Accepted;
        }

        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = shared.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Subscribe => {
                *notifications = Some(shared.output_tx.subscribe());
                debug!("client subscribed to notifications");
                Response::Subscribed
            }

            Request::KeyPosition { .. } | Request::Keycode { .. } => {
                Response::error("internal", "input request not forwarded")
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Next output for a subscribed client; pending forever when not subscribed
async fn next_notification(
    notifications: &mut Option<broadcast::Receiver<OutputEvent>>,
) -> Result<OutputEvent, RecvError> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
