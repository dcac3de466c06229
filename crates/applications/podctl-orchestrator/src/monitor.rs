//! Pod status tracking
//!
//! Single reads and bounded polling waits against the provider.
//!
//! ## Wait Semantics
//!
//! [`StatusTracker::wait_for_status`] polls on a fixed interval and stops as
//! soon as one of these holds:
//!
//! - the status is one of the targets: [`WaitOutcome::Reached`]
//! - the status is `Error`, or `NotFound` when that is not a target:
//!   [`WaitOutcome::Failed`]. Further polling cannot recover the pod.
//! - the timeout has elapsed: [`WaitOutcome::TimedOut`]
//!
//! Sleeps are clamped to the remaining budget, so a wait returns within
//! `timeout` plus the duration of one status read.

use crate::error::Result;
use podctl_core::{CloudClient, PodStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Reached one of the targets
    Reached(PodStatus),
    /// Reached a terminal-negative status first
    Failed(PodStatus),
    /// Ran out of time
    TimedOut,
}

impl WaitOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, WaitOutcome::Reached(_))
    }
}

/// Reads and polls pod status
pub struct StatusTracker<C: CloudClient> {
    client: Arc<C>,
    poll_interval: Duration,
}

impl<C: CloudClient> StatusTracker<C> {
    pub fn new(client: Arc<C>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Current status. A pod the provider no longer knows is `NotFound`.
    pub async fn get_status(&self, pod_id: &str) -> Result<PodStatus> {
        match self.client.get_instance(pod_id).await {
            Ok(instance) => {
                let status = instance.status();
                debug!(pod_id, raw = ?instance.desired_status, %status, "Read pod status");
                Ok(status)
            }
            Err(e) if e.is_not_found() => Ok(PodStatus::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll until a target status, a terminal-negative status, or the timeout
    pub async fn wait_for_status(
        &self,
        pod_id: &str,
        targets: &[PodStatus],
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        info!(pod_id, ?targets, ?timeout, "Waiting for pod status");
        let started = Instant::now();

        loop {
            let status = self.get_status(pod_id).await?;

            if targets.contains(&status) {
                info!(pod_id, %status, elapsed = ?started.elapsed(), "Pod reached target status");
                return Ok(WaitOutcome::Reached(status));
            }

            if status.is_terminal_negative() {
                info!(pod_id, %status, "Pod reached terminal status while waiting");
                return Ok(WaitOutcome::Failed(status));
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                info!(pod_id, %status, ?timeout, "Timed out waiting for pod status");
                return Ok(WaitOutcome::TimedOut);
            }

            debug!(pod_id, %status, "Pod not there yet");
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }
}
