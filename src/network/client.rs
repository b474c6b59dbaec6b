//! Transport client
//!
//! Owns one connection to a server, the I/O thread that drives it, and the
//! inbox the application drains at its own pace.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime;

use super::connection::{Connection, ConnectionHandle, OwnedMessage};
use super::{resolve_host, NetworkConfig, Port};
use crate::protocol::{Message, MessageId};
use crate::queue::ThreadSafeQueue;

/// Client side of the transport.
///
/// One background thread runs a single-threaded event loop for the lifetime
/// of the connection; all socket completions execute there. Connect and
/// resolution failures are logged, not returned: callers observe the outcome
/// by polling [`is_connected`](Self::is_connected).
pub struct Client<T: MessageId> {
    config: NetworkConfig,
    incoming: Arc<ThreadSafeQueue<OwnedMessage<T>>>,
    connection: Option<ConnectionHandle<T>>,
    io_thread: Option<thread::JoinHandle<()>>,
}

impl<T: MessageId> Client<T> {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            incoming: Arc::new(ThreadSafeQueue::new()),
            connection: None,
            io_thread: None,
        }
    }

    /// Resolve `host` and open a connection to it.
    ///
    /// A no-op when already connected. On resolution failure the client
    /// stays idle; on connect failure or timeout the I/O thread logs the
    /// error and exits, leaving the client disconnected.
    pub fn connect(&mut self, host: &str, port: Port) {
        if self.is_connected() {
            return;
        }
        // Reap a previous event loop whose connection has ended.
        if let Some(thread) = self.io_thread.take() {
            let _ = thread.join();
        }
        self.connection = None;

        tracing::info!(target: "client", "connecting to {host}:{port}");

        let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(target: "client", "failed to build event loop: {e}");
                return;
            }
        };

        let addr = match runtime.block_on(resolve_host(host, port)) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(target: "client", "failed to resolve {host}: {e}");
                return;
            }
        };

        let handle = ConnectionHandle::new(addr);
        let connection_handle = handle.clone();
        let inbox = Arc::clone(&self.incoming);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let io_thread = thread::Builder::new()
            .name("netframe-client".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let stream =
                        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await
                        {
                            Ok(Ok(stream)) => stream,
                            Ok(Err(e)) => {
                                tracing::error!(target: "client", "failed to connect to {addr}: {e}");
                                return;
                            }
                            Err(_) => {
                                tracing::error!(target: "client", "connection to {addr} timed out");
                                return;
                            }
                        };

                    tracing::info!(target: "client", "connected to the server at {addr}");
                    connection_handle.mark_connected();
                    Connection::new(stream, connection_handle, inbox, None, "client")
                        .run()
                        .await;
                });
            });

        match io_thread {
            Ok(io_thread) => {
                self.connection = Some(handle);
                self.io_thread = Some(io_thread);
            }
            Err(e) => {
                tracing::error!(target: "client", "failed to spawn io thread: {e}");
            }
        }
    }

    /// Close the connection and stop the event loop.
    ///
    /// Requests the close first, then joins the I/O thread; the loop only
    /// exits once the socket is shut down, so the close is never abandoned.
    /// Idempotent.
    pub fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        connection.disconnect();

        if let Some(io_thread) = self.io_thread.take() {
            let _ = io_thread.join();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ConnectionHandle::is_connected)
    }

    /// Queue a message for the server.
    ///
    /// Silently dropped when disconnected; nothing is queued for later.
    pub fn send(&self, message: Message<T>) {
        let Some(connection) = &self.connection else {
            return;
        };
        connection.send(message);
    }

    /// The inbox of received messages. The client never drains it itself;
    /// the application pops at its own pace.
    pub fn incoming(&self) -> &ThreadSafeQueue<OwnedMessage<T>> {
        &self.incoming
    }
}

impl<T: MessageId> Drop for Client<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Probe;

    #[test]
    fn new_client_is_disconnected() {
        let client: Client<Probe> = Client::new(NetworkConfig::default());
        assert!(!client.is_connected());
        assert!(client.incoming().is_empty());
    }

    #[test]
    fn connect_to_unresolvable_host_leaves_client_idle() {
        let mut client: Client<Probe> = Client::new(NetworkConfig::default());
        client.connect("host.invalid.", 4000);
        assert!(!client.is_connected());
        client.disconnect();
    }

    #[test]
    fn send_when_disconnected_is_a_noop() {
        let client: Client<Probe> = Client::new(NetworkConfig::default());
        client.send(Message::new(Probe::Ping));
        assert!(client.incoming().is_empty());
    }

    #[test]
    fn disconnect_twice_is_a_noop() {
        let mut client: Client<Probe> = Client::new(NetworkConfig::default());
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }
}
