use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use super::error::CdpError;
use super::transport::{TransportCommand, TransportHandle, spawn_transport};
use super::types::CdpEvent;

/// Configuration for a CDP client connection.
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Timeout for the initial WebSocket connection (default: 10s).
    pub connect_timeout: Duration,
    /// Timeout for individual CDP commands (default: 30s).
    pub command_timeout: Duration,
    /// Capacity of the internal command channel (default: 256).
    pub channel_capacity: usize,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

/// A CDP client connected to a target inspector endpoint over WebSocket.
///
/// This is the main entry point for sending CDP commands and subscribing
/// to events. It communicates with a background transport task that owns
/// the WebSocket connection. The inspector socket belongs to a single
/// child process, so there is no target attachment or session routing:
/// commands and events flow directly over the one connection.
#[derive(Debug)]
pub struct CdpClient {
    handle: TransportHandle,
    config: CdpConfig,
    url: String,
}

impl CdpClient {
    /// Connect to an inspector WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Connection` if the WebSocket handshake fails,
    /// or `CdpError::ConnectionTimeout` if the connection attempt exceeds
    /// the configured timeout.
    pub async fn connect(url: &str, config: CdpConfig) -> Result<Self, CdpError> {
        let handle = spawn_transport(url, config.channel_capacity, config.connect_timeout).await?;

        Ok(Self {
            handle,
            config,
            url: url.to_owned(),
        })
    }

    /// Send a CDP command and await its response.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::CommandTimeout` if the target does not respond
    /// within the configured timeout, `CdpError::Protocol` if the target
    /// returns an error, `CdpError::ConnectionClosed` if the socket closed
    /// with the command outstanding, or `CdpError::Internal` if the
    /// transport task has exited.
    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        let id = self.handle.next_message_id();
        let command = super::types::CdpCommand {
            id,
            method: method.to_owned(),
            params,
        };

        let (response_tx, response_rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.command_timeout;

        self.handle
            .send(TransportCommand::SendCommand {
                command,
                response_tx,
                deadline,
            })
            .await?;

        response_rx
            .await
            .map_err(|_| CdpError::Internal("transport task exited before responding".into()))?
    }

    /// Subscribe to CDP events matching a method name.
    ///
    /// Returns a receiver that yields `CdpEvent` values in the order the
    /// target emits them. The channel ends (yields `None`) when the
    /// socket closes or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn subscribe(&self, method: &str) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        self.handle
            .send(TransportCommand::Subscribe {
                method: method.to_owned(),
                event_tx,
            })
            .await?;
        Ok(event_rx)
    }

    /// Gracefully close the WebSocket connection, failing all pending
    /// waiters.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has already exited.
    pub async fn close(self) -> Result<(), CdpError> {
        self.handle.send(TransportCommand::Shutdown).await
    }

    /// A clonable handle that can close the connection from another task
    /// without consuming the client.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            handle: self.handle.clone(),
        }
    }

    /// Check if the client is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Get the WebSocket URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Closes the connection from outside the client's owner. The target
/// runtime holds its process open while a debugger is attached, so
/// releasing the socket is what lets it finish exiting.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    handle: TransportHandle,
}

impl CloseHandle {
    /// Close the connection, failing all pending waiters. A transport
    /// that is already gone is fine.
    pub async fn close(&self) {
        let _ = self.handle.send(TransportCommand::Shutdown).await;
    }
}
