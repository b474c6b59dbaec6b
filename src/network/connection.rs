//! Connection handling
//!
//! One task per socket drives both halves of the connection:
//! - the read pipeline: decode header, then body, then push the completed
//!   message to the shared inbox and prime the next read
//! - the write pipeline: drain the outgoing queue, one frame on the wire at
//!   a time, strictly FIFO
//!
//! All I/O completions for a connection execute on the owning endpoint's
//! event-loop thread. Application threads only touch the connection through
//! a [`ConnectionHandle`], which hands work to the loop via the outgoing
//! queue and a wakeup. No read or write deadline is applied at this layer;
//! a stalled peer holds its connection open until the socket is closed.
//! Frames are never cut mid-write, so a close request only takes effect once
//! the in-flight write completes; against a peer that stops reading entirely,
//! a close (and the join behind `disconnect`/`stop`) waits on the socket's
//! send buffer. Embedders needing liveness under that failure mode should
//! layer their own timeouts.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use super::ClientId;
use crate::protocol::{CodecError, Decoder, Encoder, Message, MessageId};
use crate::queue::ThreadSafeQueue;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed mid-frame")]
    Closed,
}

/// A message tagged with the connection that produced it.
///
/// `owner` is a non-owning reply handle, set only for messages received by a
/// server. A client has exactly one peer, so its messages carry `None`.
#[derive(Debug, Clone)]
pub struct OwnedMessage<T: MessageId> {
    pub owner: Option<ConnectionHandle<T>>,
    pub message: Message<T>,
}

/// State shared between a connection task and its handles.
struct Shared<T: MessageId> {
    peer_addr: SocketAddr,
    connected: AtomicBool,
    /// Guards the disconnect callback so it fires at most once.
    disconnect_reported: AtomicBool,
    /// Server-assigned id; set once at accept time, never for client-side
    /// connections.
    id: OnceLock<ClientId>,
    /// Pending outgoing messages, drained only by the I/O task.
    outgoing: ThreadSafeQueue<Message<T>>,
    wake_writer: Notify,
    close: Notify,
}

/// A cloneable handle to a live (or once-live) connection.
///
/// Handles route sends and close requests onto the connection's event loop;
/// they never perform I/O themselves. Equality is identity: two handles are
/// equal when they refer to the same connection.
pub struct ConnectionHandle<T: MessageId> {
    shared: Arc<Shared<T>>,
}

impl<T: MessageId> ConnectionHandle<T> {
    pub(crate) fn new(peer_addr: SocketAddr) -> Self {
        Self {
            shared: Arc::new(Shared {
                peer_addr,
                connected: AtomicBool::new(false),
                disconnect_reported: AtomicBool::new(false),
                id: OnceLock::new(),
                outgoing: ThreadSafeQueue::new(),
                wake_writer: Notify::new(),
                close: Notify::new(),
            }),
        }
    }

    /// The server-assigned client id. `None` for client-side connections and
    /// for host connections that were never accepted.
    pub fn id(&self) -> Option<ClientId> {
        self.shared.id.get().copied()
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    /// Whether the underlying socket is still open.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Queue a message for transmission.
    ///
    /// The message is handed to the connection's event loop and written in
    /// FIFO order. Dropped silently if the connection is closed.
    pub fn send(&self, message: Message<T>) {
        if !self.is_connected() {
            return;
        }
        self.shared.outgoing.push_back(message);
        self.shared.wake_writer.notify_one();
    }

    /// Request the connection be closed from its own event loop.
    ///
    /// Idempotent: repeated calls, or calls on an already-closed connection,
    /// have no further effect.
    pub fn disconnect(&self) {
        self.shared.close.notify_one();
    }

    pub(crate) fn assign_id(&self, id: ClientId) {
        let _ = self.shared.id.set(id);
    }

    pub(crate) fn mark_connected(&self) {
        self.shared.connected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// True exactly once per connection: the first caller gets to report the
    /// disconnect to the application.
    pub(crate) fn take_disconnect_report(&self) -> bool {
        !self.shared.disconnect_reported.swap(true, Ordering::SeqCst)
    }
}

impl<T: MessageId> Clone for ConnectionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: MessageId> PartialEq for ConnectionHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: MessageId> Eq for ConnectionHandle<T> {}

impl<T: MessageId> fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("peer_addr", &self.shared.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Marks the handle disconnected even if the task is cancelled mid-await
/// (e.g. when the owning runtime is torn down).
struct DisconnectGuard<T: MessageId> {
    handle: ConnectionHandle<T>,
}

impl<T: MessageId> Drop for DisconnectGuard<T> {
    fn drop(&mut self) {
        self.handle.mark_disconnected();
    }
}

/// The per-socket I/O state machine.
pub(crate) struct Connection<T: MessageId> {
    stream: TcpStream,
    handle: ConnectionHandle<T>,
    /// Back-reference stamped onto received messages; `Some` on the server
    /// side, `None` on the client side.
    owner: Option<ConnectionHandle<T>>,
    inbox: Arc<ThreadSafeQueue<OwnedMessage<T>>>,
    role: &'static str,
}

impl<T: MessageId> Connection<T> {
    pub(crate) fn new(
        stream: TcpStream,
        handle: ConnectionHandle<T>,
        inbox: Arc<ThreadSafeQueue<OwnedMessage<T>>>,
        owner: Option<ConnectionHandle<T>>,
        role: &'static str,
    ) -> Self {
        Self {
            stream,
            handle,
            owner,
            inbox,
            role,
        }
    }

    /// Drive the connection until the peer closes, an I/O error occurs, or a
    /// close is requested. Consumes the connection; the socket is closed on
    /// the way out.
    pub(crate) async fn run(self) {
        let Connection {
            stream,
            handle,
            owner,
            inbox,
            role,
        } = self;

        let _guard = DisconnectGuard {
            handle: handle.clone(),
        };

        let (mut reader, mut writer) = stream.into_split();
        let mut decoder: Decoder<T> = Decoder::new();
        let mut encoder = Encoder::new();
        let mut read_buf = BytesMut::with_capacity(4096);
        let mut write_buf = BytesMut::with_capacity(4096);
        let shared = &handle.shared;

        loop {
            tokio::select! {
                result = recv_message(&mut reader, &mut decoder, &mut read_buf) => {
                    match result {
                        Ok(Some(message)) => {
                            inbox.push_back(OwnedMessage {
                                owner: owner.clone(),
                                message,
                            });
                        }
                        Ok(None) => {
                            tracing::debug!(role, peer = %shared.peer_addr, "peer closed the connection");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(role, peer = %shared.peer_addr, "failed to read message: {e}");
                            break;
                        }
                    }
                }

                _ = shared.wake_writer.notified() => {
                    if let Err(e) =
                        flush_outgoing(&mut writer, &shared.outgoing, &mut encoder, &mut write_buf).await
                    {
                        tracing::error!(role, peer = %shared.peer_addr, "failed to write message: {e}");
                        break;
                    }
                }

                _ = shared.close.notified() => {
                    tracing::debug!(role, peer = %shared.peer_addr, "connection disconnected");
                    break;
                }
            }
        }

        handle.mark_disconnected();
        let _ = writer.shutdown().await;
    }
}

/// Read until one complete frame is decoded.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary. Safe to
/// drop mid-read: buffered bytes and decoder state survive in the caller.
async fn recv_message<T: MessageId>(
    reader: &mut OwnedReadHalf,
    decoder: &mut Decoder<T>,
    buf: &mut BytesMut,
) -> Result<Option<Message<T>>, ConnectionError> {
    loop {
        if let Some(message) = decoder.decode(buf)? {
            return Ok(Some(message));
        }

        let n = reader.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ConnectionError::Closed);
        }
    }
}

/// Write every queued message, FIFO, one frame at a time.
async fn flush_outgoing<T: MessageId>(
    writer: &mut OwnedWriteHalf,
    outgoing: &ThreadSafeQueue<Message<T>>,
    encoder: &mut Encoder,
    buf: &mut BytesMut,
) -> Result<(), ConnectionError> {
    while let Some(message) = outgoing.pop_front() {
        buf.clear();
        encoder.encode(&message, buf);
        writer.write_all(buf).await?;
        writer.flush().await?;
    }
    Ok(())
}
