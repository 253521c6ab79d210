use std::fmt;
use std::sync::Arc;

use h2quic_frame::stream::stream_name;
use h2quic_frame::HEADER_STREAM_ID;
use h2quic_transport::{Session, Substream};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handler::{Handler, Router};

/// HTTP/2-over-session request server.
///
/// Holds the application handler and configuration; every session handed to
/// it gets its own dispatcher and compression context.
#[derive(Clone)]
pub struct Server {
    handler: Arc<dyn Handler>,
    config: ServerConfig,
}

impl Server {
    /// A server answering every request with `404`.
    pub fn new() -> Self {
        Self {
            handler: Arc::new(Router::default()),
            config: ServerConfig::default(),
        }
    }

    /// Override the request handler.
    pub fn with_handler(mut self, handler: impl Handler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Override the shared handler.
    pub fn with_shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = handler;
        self
    }

    /// Override server behavior config.
    ///
    /// The config is validated when a session is started.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start dispatching if `stream` is the session's header stream.
    ///
    /// Any other stream is left to its request (or to nobody) and `None`
    /// is returned.
    pub fn handle_stream<S: Session>(
        &self,
        session: Arc<S>,
        stream: S::Stream,
    ) -> Result<Option<Connection>> {
        let stream_id = stream.stream_id();
        if stream_id != HEADER_STREAM_ID {
            debug!(stream_id, stream = stream_name(stream_id), "ignoring non-header stream");
            return Ok(None);
        }

        self.start(session, stream).map(Some)
    }

    /// Open the session's header stream and start dispatching on it.
    pub fn serve_session<S: Session>(&self, session: Arc<S>) -> Result<Connection> {
        let stream = session.get_or_open_stream(HEADER_STREAM_ID)?;
        self.start(session, stream)
    }

    fn start<S: Session>(&self, session: Arc<S>, header_stream: S::Stream) -> Result<Connection> {
        self.config.validate()?;
        let tracker = TaskTracker::new();
        let dispatcher = Dispatcher::new(
            session,
            header_stream,
            Arc::clone(&self.handler),
            &self.config,
            tracker.clone(),
        );
        debug!("starting header stream dispatcher");
        Ok(Connection {
            task: tokio::spawn(dispatcher.run()),
            tracker,
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to one session's dispatcher and its request tasks.
#[derive(Debug)]
pub struct Connection {
    task: JoinHandle<Result<()>>,
    tracker: TaskTracker,
}

impl Connection {
    /// Wait for the dispatcher to stop, then for every request it started.
    ///
    /// Returns the dispatcher's result.
    pub async fn join(self) -> Result<()> {
        let result = match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        };
        self.tracker.close();
        self.tracker.wait().await;
        result
    }

    /// Whether the dispatcher has stopped reading the header stream.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}
