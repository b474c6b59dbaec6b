//! Transport server
//!
//! Accepts connections, assigns each accepted client a sequential id, and
//! routes received messages into a shared inbox that the application drains
//! with [`Server::process`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::runtime;
use tokio::sync::mpsc;

use super::connection::{Connection, ConnectionHandle, OwnedMessage};
use super::{ClientId, NetworkConfig};
use crate::protocol::{Message, MessageId};
use crate::queue::ThreadSafeQueue;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already running")]
    AlreadyRunning,

    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Application extension points.
///
/// `on_client_connect` and `on_client_disconnect` run on the server's I/O
/// thread and must not block. `on_message` runs on whichever thread calls
/// [`Server::process`].
pub trait ServerHandler<T: MessageId>: Send + Sync {
    /// Accept or deny an incoming connection. The handle carries no id and is
    /// not yet live, so messages sent to it here are dropped; ids are assigned
    /// only after acceptance. Defaults to accepting.
    fn on_client_connect(&self, _connection: &ConnectionHandle<T>) -> bool {
        true
    }

    /// Called exactly once for each accepted connection found dead, before it
    /// is pruned from the roster.
    fn on_client_disconnect(&self, _connection: &ConnectionHandle<T>) {}

    /// Called for every inbox message dispatched by [`Server::process`].
    fn on_message(&self, message: OwnedMessage<T>);
}

/// Server side of the transport.
///
/// One background thread runs the accept loop and every connection's I/O on
/// a single-threaded event loop. The roster is shared with application
/// threads so `send` and `send_all` may be called from anywhere.
pub struct Server<T: MessageId> {
    config: NetworkConfig,
    handler: Arc<dyn ServerHandler<T>>,
    incoming: Arc<ThreadSafeQueue<OwnedMessage<T>>>,
    clients: Arc<Mutex<Vec<ConnectionHandle<T>>>>,
    local_addr: Option<SocketAddr>,
    io_thread: Option<thread::JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl<T: MessageId> Server<T> {
    pub fn new(config: NetworkConfig, handler: Arc<dyn ServerHandler<T>>) -> Self {
        Self {
            config,
            handler,
            incoming: Arc::new(ThreadSafeQueue::new()),
            clients: Arc::new(Mutex::new(Vec::new())),
            local_addr: None,
            io_thread: None,
            shutdown_tx: None,
        }
    }

    /// Bind the listener and start the accept loop on the I/O thread.
    pub fn start(&mut self) -> ServerResult<()> {
        if self.io_thread.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;

        let bind_addr = format!(
            "{}:{}",
            self.config.bind_address.as_deref().unwrap_or("0.0.0.0"),
            self.config.port
        );
        let listener = runtime
            .block_on(TcpListener::bind(&bind_addr))
            .map_err(|source| ServerError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(target: "server", "server listening on {local_addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let clients = Arc::clone(&self.clients);
        let handler = Arc::clone(&self.handler);
        let incoming = Arc::clone(&self.incoming);

        let io_thread = thread::Builder::new()
            .name("netframe-server".to_string())
            .spawn(move || {
                runtime.block_on(accept_loop(listener, clients, handler, incoming, shutdown_rx));
            })?;

        self.local_addr = Some(local_addr);
        self.io_thread = Some(io_thread);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Stop the accept loop and join the I/O thread.
    ///
    /// Connections are not closed individually; tearing down the event loop
    /// cancels their tasks, which closes each socket and marks each handle
    /// disconnected. Idempotent.
    pub fn stop(&mut self) {
        let Some(io_thread) = self.io_thread.take() else {
            return;
        };

        if !self.clients.lock().is_empty() {
            tracing::warn!(target: "server", "stopping server with active clients");
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.try_send(());
        }
        let _ = io_thread.join();
        self.local_addr = None;

        tracing::info!(target: "server", "stopped server");
    }

    /// Send a message to one client.
    ///
    /// A client found disconnected gets the disconnect callback (once) and is
    /// pruned from the roster instead.
    pub fn send(&self, client: &ConnectionHandle<T>, message: Message<T>) {
        if client.is_connected() {
            client.send(message);
        } else {
            if client.take_disconnect_report() {
                self.handler.on_client_disconnect(client);
            }
            self.clients.lock().retain(|c| c != client);
        }
    }

    /// Send a message to every connected client except `except`.
    ///
    /// Clients found disconnected during the pass get the disconnect callback
    /// (once) and are pruned afterward; delivery to the remaining live
    /// clients is unaffected. Broadcast order is roster order.
    pub fn send_all(&self, message: &Message<T>, except: Option<&ConnectionHandle<T>>) {
        // Snapshot the roster so handler callbacks never run under the lock.
        let roster: Vec<_> = self.clients.lock().clone();
        let mut reported = Vec::new();

        for client in &roster {
            if !client.is_connected() {
                tracing::warn!(
                    target: "server",
                    "cannot reach client {:?}, assuming disconnect and removing",
                    client.id()
                );
                if client.take_disconnect_report() {
                    self.handler.on_client_disconnect(client);
                }
                reported.push(client.clone());
                continue;
            }

            if except.is_some_and(|e| e == client) {
                continue;
            }

            client.send(message.clone());
        }

        // Prune exactly the clients reported in this pass. A connection that
        // dies after the snapshot stays in the roster until a later pass
        // reports it.
        if !reported.is_empty() {
            self.clients.lock().retain(|client| !reported.contains(client));
        }
    }

    /// Drain up to `max_messages` (default unbounded) from the inbox on the
    /// calling thread, dispatching each to the handler's `on_message`.
    /// Returns the number of messages processed.
    pub fn process(&self, max_messages: Option<usize>) -> usize {
        let max = max_messages.unwrap_or(usize::MAX);
        let mut processed = 0;
        while processed < max {
            let Some(message) = self.incoming.pop_front() else {
                break;
            };
            self.handler.on_message(message);
            processed += 1;
        }
        processed
    }

    /// Snapshot of the current roster, in accept order.
    pub fn clients(&self) -> Vec<ConnectionHandle<T>> {
        self.clients.lock().clone()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.io_thread.is_some()
    }

    /// The bound listener address, once started. Useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl<T: MessageId> Drop for Server<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept connections until shutdown. Runs on the server's event loop; every
/// accepted connection's task is spawned onto the same loop.
async fn accept_loop<T: MessageId>(
    listener: TcpListener,
    clients: Arc<Mutex<Vec<ConnectionHandle<T>>>>,
    handler: Arc<dyn ServerHandler<T>>,
    incoming: Arc<ThreadSafeQueue<OwnedMessage<T>>>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut next_id: ClientId = 0;

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    tracing::info!(target: "server", "new connection established: {addr}");

                    let handle = ConnectionHandle::new(addr);

                    if handler.on_client_connect(&handle) {
                        let id = next_id;
                        next_id += 1;
                        handle.assign_id(id);
                        handle.mark_connected();
                        tracing::info!(target: "server", "accepted connection. new connection is client {id}");

                        let connection = Connection::new(
                            stream,
                            handle.clone(),
                            Arc::clone(&incoming),
                            Some(handle.clone()),
                            "server",
                        );
                        tokio::spawn(connection.run());
                        clients.lock().push(handle);
                    } else {
                        // Never marked connected, so the handle stays inert
                        // and the dropped stream closes the socket.
                        tracing::warn!(target: "server", "denied connection from {addr}");
                    }
                }
                Err(e) => {
                    tracing::error!(target: "server", "failed to accept connection: {e}");
                }
            },

            _ = shutdown_rx.recv() => {
                tracing::debug!(target: "server", "server shutdown requested");
                break;
            }
        }
    }
}
