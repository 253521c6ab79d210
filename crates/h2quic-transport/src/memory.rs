use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Session, StreamId, Substream};

/// One direction of a substream.
#[derive(Default)]
struct Pipe {
    buf: BytesMut,
    /// The writing side has finished; reads report EOF once `buf` drains.
    finished: bool,
    /// The session was closed underneath the pipe.
    aborted: bool,
    reader: Option<Waker>,
}

impl Pipe {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

type SharedPipe = Arc<Mutex<Pipe>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn session_aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "session closed")
}

struct StreamState {
    id: StreamId,
    incoming: SharedPipe,
    outgoing: SharedPipe,
}

/// Both endpoints of one substream.
struct Endpoints {
    server: Arc<StreamState>,
    client: Arc<StreamState>,
}

impl Endpoints {
    fn new(id: StreamId) -> Self {
        let to_server = SharedPipe::default();
        let to_client = SharedPipe::default();
        Self {
            server: Arc::new(StreamState {
                id,
                incoming: Arc::clone(&to_server),
                outgoing: Arc::clone(&to_client),
            }),
            client: Arc::new(StreamState {
                id,
                incoming: to_client,
                outgoing: to_server,
            }),
        }
    }
}

/// A substream endpoint of a [`MemorySession`].
#[derive(Clone)]
pub struct MemoryStream {
    state: Arc<StreamState>,
}

impl MemoryStream {
    /// Returns true if both handles refer to the same stream endpoint.
    pub fn same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Returns true once the read side has been closed.
    pub fn is_read_closed(&self) -> bool {
        lock(&self.state.incoming).finished
    }

    /// Returns true once the local write side has been shut down.
    pub fn is_write_closed(&self) -> bool {
        lock(&self.state.outgoing).finished
    }
}

impl Substream for MemoryStream {
    fn stream_id(&self) -> StreamId {
        self.state.id
    }

    fn close_remote(&self) {
        let mut pipe = lock(&self.state.incoming);
        pipe.finished = true;
        pipe.wake_reader();
        debug!(stream_id = self.state.id, "read side closed");
    }
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut pipe = lock(&self.state.incoming);
        if !pipe.buf.is_empty() {
            let n = pipe.buf.len().min(buf.remaining());
            buf.put_slice(&pipe.buf[..n]);
            pipe.buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        if pipe.finished {
            return Poll::Ready(Ok(()));
        }
        if pipe.aborted {
            return Poll::Ready(Err(session_aborted()));
        }
        pipe.reader = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut pipe = lock(&self.state.outgoing);
        if pipe.aborted {
            return Poll::Ready(Err(session_aborted()));
        }
        if pipe.finished {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("stream {} write side closed", self.state.id),
            )));
        }
        pipe.buf.extend_from_slice(data);
        pipe.wake_reader();
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut pipe = lock(&self.state.outgoing);
        pipe.finished = true;
        pipe.wake_reader();
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("id", &self.state.id)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Server,
    Client,
}

#[derive(Default)]
struct Shared {
    streams: Mutex<HashMap<StreamId, Endpoints>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    close_reason: Mutex<Option<String>>,
}

/// In-process multiplexed session.
///
/// [`MemorySession::pair`] returns the server and client ends of one
/// session. Either end opens a substream lazily on first reference; the peer
/// end sees the same id. Substreams have unbounded buffers and no flow
/// control.
pub struct MemorySession {
    shared: Arc<Shared>,
    side: Side,
}

impl MemorySession {
    /// Create a connected `(server, client)` session pair.
    pub fn pair() -> (Self, Self) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
                side: Side::Server,
            },
            Self {
                shared,
                side: Side::Client,
            },
        )
    }

    /// Whether the session has been closed from either end.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of times [`Session::close`] has been called on this session.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::Acquire)
    }

    /// Reason passed to the first close, if any.
    pub fn close_reason(&self) -> Option<String> {
        lock(&self.shared.close_reason).clone()
    }

    /// Ids of every substream opened so far, ascending.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = lock(&self.shared.streams).keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Session for MemorySession {
    type Stream = MemoryStream;

    fn get_or_open_stream(&self, id: StreamId) -> Result<MemoryStream> {
        let mut streams = lock(&self.shared.streams);
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::SessionClosed);
        }
        let endpoints = streams.entry(id).or_insert_with(|| {
            debug!(stream_id = id, "opening stream");
            Endpoints::new(id)
        });
        let state = match self.side {
            Side::Server => Arc::clone(&endpoints.server),
            Side::Client => Arc::clone(&endpoints.client),
        };
        Ok(MemoryStream { state })
    }

    fn close(&self, reason: Option<&str>) -> Result<()> {
        let streams = lock(&self.shared.streams);
        self.shared.close_calls.fetch_add(1, Ordering::AcqRel);
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("session already closed");
            return Ok(());
        }
        *lock(&self.shared.close_reason) = reason.map(str::to_owned);

        for endpoints in streams.values() {
            for pipe in [&endpoints.server.incoming, &endpoints.server.outgoing] {
                let mut pipe = lock(pipe);
                pipe.aborted = true;
                pipe.wake_reader();
            }
        }

        info!(
            side = ?self.side,
            streams = streams.len(),
            reason = reason.unwrap_or("none"),
            "session closed"
        );
        Ok(())
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("side", &self.side)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn get_or_open_is_idempotent() {
        let (server, _client) = MemorySession::pair();

        let first = server.get_or_open_stream(5).unwrap();
        let second = server.get_or_open_stream(5).unwrap();
        let other = server.get_or_open_stream(7).unwrap();

        assert!(first.same_stream(&second));
        assert!(!first.same_stream(&other));
        assert_eq!(server.stream_ids(), vec![5, 7]);
    }

    #[tokio::test]
    async fn concurrent_get_or_open_returns_one_stream() {
        let (server, _client) = MemorySession::pair();
        let server = Arc::new(server);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let server = Arc::clone(&server);
            tasks.push(tokio::spawn(async move {
                server.get_or_open_stream(9).unwrap()
            }));
        }

        let mut streams = Vec::new();
        for task in tasks {
            streams.push(task.await.unwrap());
        }
        assert!(streams.iter().all(|s| s.same_stream(&streams[0])));
        assert_eq!(server.stream_ids(), vec![9]);
    }

    #[tokio::test]
    async fn bytes_flow_both_ways() {
        let (server, client) = MemorySession::pair();
        let mut s = server.get_or_open_stream(5).unwrap();
        let mut c = client.get_or_open_stream(5).unwrap();

        c.write_all(b"request").await.unwrap();
        s.write_all(b"response").await.unwrap();

        let mut buf = [0u8; 7];
        s.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        let mut buf = [0u8; 8];
        c.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response");
    }

    #[tokio::test]
    async fn shutdown_delivers_eof_to_peer() {
        let (server, client) = MemorySession::pair();
        let mut s = server.get_or_open_stream(5).unwrap();
        let mut c = client.get_or_open_stream(5).unwrap();

        s.write_all(b"body").await.unwrap();
        s.shutdown().await.unwrap();
        assert!(s.is_write_closed());

        let mut out = Vec::new();
        c.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"body");

        let err = s.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn close_remote_reads_zero_bytes() {
        let (server, _client) = MemorySession::pair();
        let mut s = server.get_or_open_stream(5).unwrap();

        s.close_remote();
        assert!(s.is_read_closed());

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_millis(100), s.read(&mut buf))
            .await
            .expect("read should not block")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn close_aborts_pending_reads() {
        let (server, client) = MemorySession::pair();
        let mut s = server.get_or_open_stream(3).unwrap();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            s.read(&mut buf).await
        });
        tokio::task::yield_now().await;

        client.close(Some("bye")).unwrap();

        let err = reader.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert!(server.is_closed());
        assert_eq!(server.close_reason().as_deref(), Some("bye"));
    }

    #[test]
    fn closed_session_rejects_new_streams() {
        let (server, _client) = MemorySession::pair();
        server.close(None).unwrap();
        server.close(None).unwrap();

        assert!(matches!(
            server.get_or_open_stream(5),
            Err(TransportError::SessionClosed)
        ));
        assert_eq!(server.close_calls(), 2);
        assert_eq!(server.close_reason(), None);
    }
}
