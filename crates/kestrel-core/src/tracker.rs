use crate::actor::PodCommand;
use crate::engine::NetworkReport;
use crate::CoreError;
use kestrel_schema::{PodId, RequestId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::WeakSender;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct TrackedRequest {
    pod_id: PodId,
    /// Weak so a retired pod's mailbox is not kept alive by its requests.
    owner: WeakSender<PodCommand>,
    deadline: Instant,
    attempt: u32,
    timer: AbortHandle,
}

/// Correlates network completion reports and deadline expiry to suspended
/// pod steps.
///
/// Only outstanding requests are held. Every request leaves the map exactly
/// once: the first of [`complete`](Self::complete) or the deadline timer to
/// take the lock removes it, and the loser finds nothing and does nothing.
/// Request ids are never reissued, so an absent id is a duplicate or late
/// report.
pub struct NetworkTracker {
    requests: Mutex<HashMap<RequestId, TrackedRequest>>,
    timeout: Duration,
}

impl NetworkTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start tracking `request_id` and arm its deadline timer.
    ///
    /// Must be called from within a tokio runtime. Fails if the id is
    /// already outstanding.
    pub fn register(
        self: &Arc<Self>,
        request_id: RequestId,
        pod_id: PodId,
        owner: WeakSender<PodCommand>,
        attempt: u32,
    ) -> Result<Instant, CoreError> {
        let deadline = Instant::now() + self.timeout;
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        if requests.contains_key(&request_id) {
            return Err(CoreError::DuplicateRequest(request_id.into_inner()));
        }

        let tracker = Arc::downgrade(self);
        let timer_id = request_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(tracker) = tracker.upgrade() {
                tracker.expire(&timer_id).await;
            }
        });

        debug!(
            "tracking {request_id} for pod {pod_id} (attempt {attempt}, deadline in {:?})",
            self.timeout
        );
        requests.insert(
            request_id,
            TrackedRequest {
                pod_id,
                owner,
                deadline,
                attempt,
                timer: timer.abort_handle(),
            },
        );
        Ok(deadline)
    }

    /// Settle `request_id` from an external report and forward it to the
    /// owning pod.
    ///
    /// Returns `false` without side effects for unknown or already settled
    /// ids. A request whose pod has been retired is settled and `false` is
    /// returned.
    pub async fn complete(&self, request_id: &RequestId, report: NetworkReport) -> bool {
        let owner = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = requests.remove(request_id) else {
                debug!("ignoring report for unknown or settled request {request_id}");
                return false;
            };
            entry.timer.abort();
            match entry.owner.upgrade() {
                Some(owner) => owner,
                None => {
                    debug!(
                        "pod {} retired before {request_id} completed",
                        entry.pod_id
                    );
                    return false;
                }
            }
        };

        owner
            .send(PodCommand::NetworkReport {
                request_id: request_id.clone(),
                report,
            })
            .await
            .is_ok()
    }

    async fn expire(&self, request_id: &RequestId) {
        let owner = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = requests.remove(request_id) else {
                return;
            };
            warn!(
                "network setup {request_id} for pod {} missed its deadline (attempt {})",
                entry.pod_id, entry.attempt
            );
            entry.owner.upgrade()
        };

        let Some(owner) = owner else {
            debug!("owner of {request_id} retired before its deadline");
            return;
        };
        if owner
            .send(PodCommand::NetworkDeadline {
                request_id: request_id.clone(),
            })
            .await
            .is_err()
        {
            debug!("owner of {request_id} stopped before its deadline was delivered");
        }
    }

    /// Stop tracking an outstanding request without settling it through a
    /// report. Returns whether anything was cancelled.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = requests.remove(request_id) else {
            return false;
        };
        entry.timer.abort();
        debug!("cancelled {request_id}");
        true
    }

    pub fn is_outstanding(&self, request_id: &str) -> bool {
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.contains_key(request_id)
    }

    pub fn deadline(&self, request_id: &str) -> Option<Instant> {
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.get(request_id).map(|r| r.deadline)
    }

    pub fn outstanding_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Disarm every timer and forget every request. Returns how many were
    /// still outstanding.
    pub fn shutdown(&self) -> usize {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let outstanding = requests.len();
        for (_, entry) in requests.drain() {
            entry.timer.abort();
        }
        if outstanding > 0 {
            info!("tracker shut down with {outstanding} outstanding requests");
        }
        outstanding
    }
}
