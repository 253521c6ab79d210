use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use h2quic_transport::{Session, StreamId};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::RequestError;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Data stream ids whose request is still running.
#[derive(Clone, Default)]
pub(crate) struct ActiveStreams {
    ids: Arc<Mutex<HashSet<StreamId>>>,
}

impl ActiveStreams {
    /// Reserve `id` for one request. Fails while an earlier claim is held.
    pub(crate) fn claim(&self, id: StreamId) -> Result<StreamClaim, RequestError> {
        if !self.lock().insert(id) {
            return Err(RequestError::StreamInUse(id));
        }
        Ok(StreamClaim {
            id,
            streams: self.clone(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<StreamId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its stream id when dropped, including when the handler panics.
pub(crate) struct StreamClaim {
    id: StreamId,
    streams: ActiveStreams,
}

impl Drop for StreamClaim {
    fn drop(&mut self) {
        self.streams.lock().remove(&self.id);
    }
}

/// Closes a session a fixed delay after a request finishes.
pub(crate) struct SessionCloser<S> {
    session: Arc<S>,
    grace: Duration,
}

impl<S: Session> SessionCloser<S> {
    pub(crate) fn new(session: Arc<S>, grace: Duration) -> Self {
        Self { session, grace }
    }

    /// Schedule the close on `tracker` without waiting for it.
    fn schedule(&self, tracker: &TaskTracker) {
        let session = Arc::clone(&self.session);
        let grace = self.grace;
        tracker.spawn(async move {
            tokio::time::sleep(grace).await;
            info!(grace_ms = grace.as_millis() as u64, "closing session after request");
            if let Err(err) = session.close(None) {
                warn!(error = %err, "failed to close session");
            }
        });
    }
}

impl<S> Clone for SessionCloser<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            grace: self.grace,
        }
    }
}

/// Run one request to completion on its own task.
///
/// The response is closed once the handler returns, and then `claim` is
/// released. With a closer set, the session close is scheduled after that.
pub(crate) fn spawn_request<S: Session>(
    tracker: &TaskTracker,
    handler: Arc<dyn Handler>,
    request: Request,
    response: ResponseWriter,
    claim: StreamClaim,
    closer: Option<SessionCloser<S>>,
) {
    let stream_id = response.stream_id();
    let task_tracker = tracker.clone();
    tracker.spawn(async move {
        handler.serve(request, response.clone()).await;

        if let Err(err) = response.close().await {
            warn!(stream_id, error = %err, "failed to finish response");
        }
        drop(claim);
        debug!(stream_id, "request complete");

        if let Some(closer) = closer {
            closer.schedule(&task_tracker);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_claim_is_exclusive_until_dropped() {
        let active = ActiveStreams::default();
        let claim = active.claim(5).unwrap();

        assert_eq!(active.claim(5).err(), Some(RequestError::StreamInUse(5)));
        let other = active.claim(7).unwrap();
        assert_eq!(active.len(), 2);

        drop(claim);
        assert!(active.claim(5).is_ok());
        drop(other);
        assert_eq!(active.len(), 0);
    }
}
