// Server-side transport for one open event stream.

use futures::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::{Result, StreamError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a connection handle. Two handles are the same connection
/// only if their ids match, whatever they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub type CloseObserver = Box<dyn FnOnce() + Send + 'static>;

/// Write side of one server-to-client stream, as seen by the registry.
///
/// Implementations must run every registered close observer exactly once
/// when the underlying connection goes away, and immediately if it already
/// has.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Queues one serialized event payload. Framing is the transport's job.
    fn send(&self, payload: &str) -> Result<()>;

    fn on_close(&self, observer: CloseObserver);
}

#[derive(Default)]
struct CloseState {
    closed: bool,
    observers: Vec<CloseObserver>,
}

/// Channel-backed connection used by the HTTP layer. Payloads written with
/// [`Connection::send`] come out of the paired [`ConnectionStream`].
pub struct ChannelConnection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<String>,
    close_state: Mutex<CloseState>,
}

impl ChannelConnection {
    pub fn open() -> (Arc<Self>, ConnectionStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id: ConnectionId::next(),
            sender,
            close_state: Mutex::new(CloseState::default()),
        });
        let stream = ConnectionStream {
            connection: Arc::clone(&connection),
            receiver,
        };
        (connection, stream)
    }

    pub fn is_closed(&self) -> bool {
        self.close_state.lock().closed
    }

    /// Marks the connection closed and fires the observers. Later calls do nothing.
    pub fn close(&self) {
        let observers = {
            let mut state = self.close_state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.observers)
        };

        tracing::debug!(connection = %self.id, "event stream connection closed");
        for observer in observers {
            observer();
        }
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, payload: &str) -> Result<()> {
        if self.is_closed() {
            return Err(StreamError::ConnectionClosed(self.id));
        }
        self.sender
            .send(payload.to_owned())
            .map_err(|_| StreamError::ConnectionClosed(self.id))
    }

    fn on_close(&self, observer: CloseObserver) {
        let mut state = self.close_state.lock();
        if state.closed {
            drop(state);
            observer();
        } else {
            state.observers.push(observer);
        }
    }
}

impl fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read side handed to the HTTP response body. Dropping it (client went
/// away, server shut down) closes the connection.
pub struct ConnectionStream {
    connection: Arc<ChannelConnection>,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ConnectionStream {
    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }
}

impl Stream for ConnectionStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ConnectionStream {
    fn drop(&mut self) {
        self.connection.close();
    }
}
