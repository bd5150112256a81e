use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use capitolwatch_common::{AnalysisRequest, CapitolWatchError};

/// Bounded FIFO of pending analysis requests.
///
/// A request for a `(source_type, source_id)` already waiting replaces the
/// pending content in place instead of adding a duplicate.
pub struct AnalysisQueue {
    capacity: usize,
    pending: Mutex<VecDeque<AnalysisRequest>>,
}

impl AnalysisQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, request: AnalysisRequest) -> Result<(), CapitolWatchError> {
        let mut pending = self.pending.lock().await;
        if let Some(existing) = pending
            .iter_mut()
            .find(|r| r.source_type == request.source_type && r.source_id == request.source_id)
        {
            debug!(
                source_type = %request.source_type,
                source_id = request.source_id.as_str(),
                "Coalesced analysis request"
            );
            existing.content = request.content;
            existing.requested_at = request.requested_at;
            return Ok(());
        }
        if pending.len() >= self.capacity {
            warn!(
                source_type = %request.source_type,
                source_id = request.source_id.as_str(),
                capacity = self.capacity,
                "Analysis queue full, dropping request"
            );
            return Err(CapitolWatchError::QueueFull(pending.len()));
        }
        pending.push_back(request);
        Ok(())
    }

    /// Put a failed request back at the end of the queue. Skipped if a newer
    /// request for the same source arrived meanwhile.
    pub async fn requeue(&self, request: AnalysisRequest) -> Result<(), CapitolWatchError> {
        let mut pending = self.pending.lock().await;
        if pending
            .iter()
            .any(|r| r.source_type == request.source_type && r.source_id == request.source_id)
        {
            return Ok(());
        }
        if pending.len() >= self.capacity {
            return Err(CapitolWatchError::QueueFull(pending.len()));
        }
        pending.push_back(request);
        Ok(())
    }

    pub async fn take_batch(&self, n: usize) -> Vec<AnalysisRequest> {
        let mut pending = self.pending.lock().await;
        let n = n.min(pending.len());
        pending.drain(..n).collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
