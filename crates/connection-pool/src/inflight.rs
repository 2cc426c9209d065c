//! In-flight request tracking for graceful shutdown

use conduit_core::{ConnectionId, ExchangeId, RequestId, TenantId, Timestamp};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::error::{PoolError, Result};

pub(crate) type PoolKey = (TenantId, ExchangeId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RequestOutcome {
    Completed,
    Failed(String),
}

pub(crate) struct InFlight {
    pub(crate) connection_id: ConnectionId,
    pub(crate) pool: PoolKey,
    pub(crate) started_at: Timestamp,
    pub(crate) done: oneshot::Receiver<RequestOutcome>,
}

pub(crate) type Registry = DashMap<RequestId, InFlight>;

/// Completion handle for a request running on a pooled connection
///
/// Finish it with [`complete`](RequestHandle::complete) or
/// [`fail`](RequestHandle::fail). Dropping it unfinished counts as a failure.
/// Once a shutdown drain has given up on the request both return
/// [`PoolError::RequestCancelled`].
pub struct RequestHandle {
    id: RequestId,
    connection_id: ConnectionId,
    started: Instant,
    registry: Arc<Registry>,
    completion: Option<oneshot::Sender<RequestOutcome>>,
}

impl RequestHandle {
    pub(crate) fn register(
        registry: &Arc<Registry>,
        connection_id: ConnectionId,
        pool: PoolKey,
        now: Timestamp,
    ) -> Self {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        registry.insert(
            id,
            InFlight {
                connection_id,
                pool,
                started_at: now,
                done: rx,
            },
        );
        Self {
            id,
            connection_id,
            started: Instant::now(),
            registry: Arc::clone(registry),
            completion: Some(tx),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn complete(mut self) -> Result<()> {
        self.finish(RequestOutcome::Completed)
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Result<()> {
        self.finish(RequestOutcome::Failed(reason.into()))
    }

    fn finish(&mut self, outcome: RequestOutcome) -> Result<()> {
        let Some(tx) = self.completion.take() else {
            return Ok(());
        };
        // Still registered means no drain is waiting on us
        if self.registry.remove(&self.id).is_some() {
            return Ok(());
        }
        tx.send(outcome)
            .map_err(|_| PoolError::RequestCancelled(self.id))
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        let _ = self.finish(RequestOutcome::Failed("request handle dropped".into()));
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
