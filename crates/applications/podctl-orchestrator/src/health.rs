//! Workload endpoint health checks
//!
//! A pod can be RUNNING long before the workload inside it answers HTTP
//! (image pull, model load). The probe polls the pod's public proxy URL until
//! it returns a 2xx status.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Per-request timeout for a single probe
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Checks whether an HTTP endpoint is serving
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// `Ok(true)` on a 2xx answer, `Ok(false)` on any other status.
    /// Connection failures are errors.
    async fn check(&self, url: &str) -> Result<bool>;
}

/// Plain GET probe over reqwest
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(PROBE_REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Probe through a preconfigured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn check(&self, url: &str) -> Result<bool> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.status().is_success())
    }
}

/// Probe `url` until it is healthy or `timeout` elapses
pub async fn wait_for_healthy(
    probe: &dyn EndpointProbe,
    pod_id: &str,
    url: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    info!(pod_id, url, timeout_secs = timeout.as_secs(), "Health checking pod endpoint");
    let start = Instant::now();

    loop {
        match probe.check(url).await {
            Ok(true) => {
                info!(
                    pod_id,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Pod endpoint is healthy"
                );
                return Ok(());
            }
            Ok(false) => debug!(pod_id, "Endpoint answered with a non-success status"),
            Err(e) => debug!(pod_id, error = %e, "Endpoint not reachable yet"),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(OrchestratorError::timeout("health check", pod_id, timeout));
        }
        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}
