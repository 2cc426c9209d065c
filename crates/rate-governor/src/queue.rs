//! Priority-ordered queue of deferred requests

use conduit_core::{RequestId, TenantId, Timestamp};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use crate::types::{Priority, RateCategory};

/// What a deferred request needs to be admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub tenant: TenantId,
    pub category: RateCategory,
    pub priority: Priority,
    /// Units consumed when admitted
    pub weight: u32,
}

impl Admission {
    pub fn new(tenant: impl Into<TenantId>, category: RateCategory, priority: Priority) -> Self {
        Self {
            tenant: tenant.into(),
            category,
            priority,
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }
}

pub type DeferredOp = Box<dyn FnOnce() + Send + 'static>;

/// A request waiting for capacity
pub struct QueuedRequest {
    pub id: RequestId,
    pub admission: Admission,
    pub enqueued_at: Timestamp,
    operation: DeferredOp,
}

impl QueuedRequest {
    pub fn new(admission: Admission, enqueued_at: Timestamp, operation: DeferredOp) -> Self {
        Self {
            id: RequestId::new(),
            admission,
            enqueued_at,
            operation,
        }
    }

    /// Run the deferred operation
    pub fn run(self) {
        (self.operation)()
    }
}

impl fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("admission", &self.admission)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Highest priority first, FIFO within a priority
#[derive(Default)]
pub struct RequestQueue {
    order: PriorityQueue<RequestId, (Priority, Reverse<u64>)>,
    requests: HashMap<RequestId, QueuedRequest>,
    next_seq: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: QueuedRequest) -> RequestId {
        let id = request.id;
        let rank = (request.admission.priority, Reverse(self.next_seq));
        self.next_seq += 1;
        self.order.push(id, rank);
        self.requests.insert(id, request);
        id
    }

    pub fn peek(&self) -> Option<&QueuedRequest> {
        self.order
            .peek()
            .and_then(|(id, _)| self.requests.get(id))
    }

    pub fn pop(&mut self) -> Option<QueuedRequest> {
        let (id, _) = self.order.pop()?;
        self.requests.remove(&id)
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<QueuedRequest> {
        self.order.remove(id)?;
        self.requests.remove(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
