//! Pod lifecycle control
//!
//! Every operation re-derives the pod's identity and status from the provider
//! before acting, so repeated invocations are safe:
//!
//! ```text
//! status     find ──► get_status
//! start      find ──► get_status ──► [settle] ──► start ──► wait RUNNING
//!              │                 unsettled, rejected, failed, timed out
//!              │                              │ (deploy flag)
//!              └── absent + deploy flag ──────┴──► deploy
//! stop       find ──► get_status ──► [settle] ──► stop ──► wait STOPPED
//! restart    stop ──► settle delay ──► start
//! deploy     select candidates ──► create on each until one succeeds
//! terminate  find ──► delete
//! health     find ──► probe https://<host>/ until 2xx
//! ```
//!
//! ## GPU Fallback
//!
//! Creation failures are classified. Capacity, funds, and upstream 5xx
//! failures move on to the next candidate. Validation failures (other 4xx)
//! and transport failures abort the deploy, since every other candidate
//! would fail the same way.

use crate::catalogue::GpuSelector;
use crate::config::Config;
use crate::discovery::PodDiscovery;
use crate::error::{OrchestratorError, Result};
use crate::health::{EndpointProbe, HttpProbe, wait_for_healthy};
use crate::monitor::{StatusTracker, WaitOutcome};
use chrono::Utc;
use podctl_core::{
    CloudClient, CloudError, DeploymentRequest, GpuOffering, PodHandle, PodRole, PodStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a pod creation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No spot capacity for the GPU type right now
    Capacity,
    /// Account balance too low for the GPU type
    Funds,
    /// Provider-side failure (5xx)
    Upstream,
    /// The request itself was rejected
    Validation,
    /// No usable answer (network, undecodable body)
    Transport,
}

impl FailureKind {
    /// Whether another GPU type might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FailureKind::Capacity | FailureKind::Funds | FailureKind::Upstream
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Capacity => "capacity",
            FailureKind::Funds => "funds",
            FailureKind::Upstream => "upstream",
            FailureKind::Validation => "validation",
            FailureKind::Transport => "transport",
        }
    }
}

const CAPACITY_PHRASES: &[&str] = &[
    "no instances available",
    "no longer any instances",
    "not enough",
    "unavailable",
    "out of stock",
    "no gpus available",
];

const FUNDS_PHRASES: &[&str] = &["insufficient funds", "insufficient balance", "balance"];

/// Classify a creation failure
pub fn classify(err: &CloudError) -> FailureKind {
    let by_message = |message: &str| {
        let message = message.to_ascii_lowercase();
        if FUNDS_PHRASES.iter().any(|p| message.contains(p)) {
            Some(FailureKind::Funds)
        } else if CAPACITY_PHRASES.iter().any(|p| message.contains(p)) {
            Some(FailureKind::Capacity)
        } else {
            None
        }
    };

    match err {
        CloudError::Api { status, message } => {
            by_message(message.as_str()).unwrap_or(match status {
                409 | 503 => FailureKind::Capacity,
                500..=599 => FailureKind::Upstream,
                _ => FailureKind::Validation,
            })
        }
        CloudError::GraphQl(message) => by_message(message.as_str()).unwrap_or(FailureKind::Validation),
        CloudError::Auth(_) | CloudError::NotFound(_) => FailureKind::Validation,
        CloudError::Transport(_) | CloudError::Decode(_) => FailureKind::Transport,
    }
}

/// What an operation did. `token()` is the machine-readable result.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionReport {
    /// Read-only status query
    Status {
        role: PodRole,
        pod: Option<PodHandle>,
        status: PodStatus,
    },
    /// The pod is running; `changed` is false when it already was
    Running { pod: PodHandle, changed: bool },
    /// The pod is stopped; `changed` is false when it already was
    Stopped { pod: PodHandle, changed: bool },
    /// A new pod was created
    Deployed { pod: PodHandle, gpu: GpuOffering },
    /// The pod was deleted
    Terminated { pod: PodHandle },
    /// The workload endpoint answered
    Healthy { pod: PodHandle },
    /// No pod exists for the role, nothing to do
    Absent { role: PodRole },
}

impl ActionReport {
    /// Single stdout token
    pub fn token(&self) -> String {
        match self {
            ActionReport::Status { status, .. } => status.to_string(),
            ActionReport::Running { .. } => PodStatus::Running.to_string(),
            ActionReport::Stopped { .. } => PodStatus::Stopped.to_string(),
            ActionReport::Deployed { pod, .. } => pod.id.clone(),
            ActionReport::Terminated { .. } => "TERMINATED".to_string(),
            ActionReport::Healthy { .. } => "HEALTHY".to_string(),
            ActionReport::Absent { .. } => PodStatus::NotFound.to_string(),
        }
    }

    /// Pod the operation acted on, if any
    pub fn pod(&self) -> Option<&PodHandle> {
        match self {
            ActionReport::Status { pod, .. } => pod.as_ref(),
            ActionReport::Running { pod, .. }
            | ActionReport::Stopped { pod, .. }
            | ActionReport::Deployed { pod, .. }
            | ActionReport::Terminated { pod }
            | ActionReport::Healthy { pod } => Some(pod),
            ActionReport::Absent { .. } => None,
        }
    }
}

/// Drives pods through their lifecycle for one role at a time
pub struct LifecycleController<C: CloudClient> {
    config: Config,
    client: Arc<C>,
    discovery: PodDiscovery<C>,
    tracker: StatusTracker<C>,
    selector: GpuSelector<C>,
    probe: Box<dyn EndpointProbe>,
}

impl<C: CloudClient> LifecycleController<C> {
    pub fn new(config: Config, client: Arc<C>) -> Result<Self> {
        let discovery = PodDiscovery::new(client.clone(), &config.app_name, config.proxy_port);
        let tracker = StatusTracker::new(client.clone(), config.poll_interval);
        let selector =
            GpuSelector::new(client.clone()).with_min_memory_gb(config.min_gpu_memory_gb);

        Ok(Self {
            discovery,
            tracker,
            selector,
            probe: Box::new(HttpProbe::new()?),
            client,
            config,
        })
    }

    /// Replace the endpoint probe used by [`Self::health`]
    pub fn with_probe(mut self, probe: impl EndpointProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current status of the role's pod. Never mutates.
    pub async fn status(&self, role: PodRole) -> Result<ActionReport> {
        let Some(pod) = self.discovery.find(role).await? else {
            info!(role = %role, "No pod found");
            return Ok(ActionReport::Status {
                role,
                pod: None,
                status: PodStatus::NotFound,
            });
        };

        let status = self.tracker.get_status(&pod.id).await?;
        info!(role = %role, pod_id = %pod.id, host = %pod.network_host, %status, "Pod status");

        Ok(ActionReport::Status {
            role,
            pod: Some(pod),
            status,
        })
    }

    /// Bring the role's pod to RUNNING.
    ///
    /// `start_timeout` bounds the whole operation: waiting out a transitional
    /// status and waiting for RUNNING after the request share one budget.
    pub async fn start(&self, role: PodRole, deploy_if_absent: bool) -> Result<ActionReport> {
        info!(role = %role, deploy_if_absent, "Starting pod");
        let started = Instant::now();
        let timeout = self.config.start_timeout;

        let Some(pod) = self.discovery.find(role).await? else {
            return self.absent_for_start(role, deploy_if_absent).await;
        };

        let status = self.tracker.get_status(&pod.id).await?;
        debug!(pod_id = %pod.id, %status, "Current status");

        let status = match status {
            PodStatus::Unknown | PodStatus::Error => match self.settle(&pod, timeout).await? {
                WaitOutcome::Reached(status) => status,
                WaitOutcome::Failed(PodStatus::NotFound) => PodStatus::NotFound,
                WaitOutcome::Failed(status) => {
                    let err = OrchestratorError::remote_failure("start", &pod.id, status);
                    return self.start_failed(role, &pod, deploy_if_absent, err).await;
                }
                WaitOutcome::TimedOut => {
                    let err = OrchestratorError::timeout("start", &pod.id, timeout);
                    return self.start_failed(role, &pod, deploy_if_absent, err).await;
                }
            },
            status => status,
        };

        match status {
            PodStatus::Running => {
                info!(pod_id = %pod.id, "Pod is already running");
                return Ok(ActionReport::Running {
                    pod,
                    changed: false,
                });
            }
            PodStatus::NotFound => {
                warn!(pod_id = %pod.id, "Pod disappeared before start");
                return self.absent_for_start(role, deploy_if_absent).await;
            }
            _ => {}
        }

        info!(pod_id = %pod.id, "Sending start");
        if let Err(e) = self.client.start_instance(&pod.id).await {
            if matches!(e, CloudError::Api { .. }) {
                return self.start_failed(role, &pod, deploy_if_absent, e.into()).await;
            }
            return Err(e.into());
        }

        match self
            .tracker
            .wait_for_status(
                &pod.id,
                &[PodStatus::Running],
                timeout.saturating_sub(started.elapsed()),
            )
            .await?
        {
            WaitOutcome::Reached(_) => {
                info!(pod_id = %pod.id, url = %pod.url(), "Pod is running");
                Ok(ActionReport::Running { pod, changed: true })
            }
            WaitOutcome::Failed(status) => {
                let err = OrchestratorError::remote_failure("start", &pod.id, status);
                self.start_failed(role, &pod, deploy_if_absent, err).await
            }
            WaitOutcome::TimedOut => {
                let err = OrchestratorError::timeout("start", &pod.id, timeout);
                self.start_failed(role, &pod, deploy_if_absent, err).await
            }
        }
    }

    /// Bring the role's pod to STOPPED. An absent pod counts as stopped.
    ///
    /// `stop_timeout` bounds the whole operation, as for [`Self::start`].
    pub async fn stop(&self, role: PodRole) -> Result<ActionReport> {
        info!(role = %role, "Stopping pod");
        let started = Instant::now();
        let timeout = self.config.stop_timeout;

        let Some(pod) = self.discovery.find(role).await? else {
            info!(role = %role, "No pod to stop");
            return Ok(ActionReport::Absent { role });
        };

        let status = self.tracker.get_status(&pod.id).await?;
        debug!(pod_id = %pod.id, %status, "Current status");

        let status = match status {
            PodStatus::Unknown | PodStatus::Error => match self.settle(&pod, timeout).await? {
                WaitOutcome::Reached(status) => status,
                WaitOutcome::Failed(PodStatus::NotFound) => PodStatus::NotFound,
                WaitOutcome::Failed(status) => {
                    return Err(OrchestratorError::remote_failure("stop", &pod.id, status));
                }
                WaitOutcome::TimedOut => {
                    return Err(OrchestratorError::timeout("stop", &pod.id, timeout));
                }
            },
            status => status,
        };

        match status {
            PodStatus::Stopped => {
                info!(pod_id = %pod.id, "Pod is already stopped");
                return Ok(ActionReport::Stopped {
                    pod,
                    changed: false,
                });
            }
            PodStatus::NotFound => {
                info!(pod_id = %pod.id, "Pod is gone, nothing to stop");
                return Ok(ActionReport::Absent { role });
            }
            _ => {}
        }

        info!(pod_id = %pod.id, "Sending stop");
        self.client.stop_instance(&pod.id).await?;

        match self
            .tracker
            .wait_for_status(
                &pod.id,
                &[PodStatus::Stopped],
                timeout.saturating_sub(started.elapsed()),
            )
            .await?
        {
            WaitOutcome::Reached(_) => {
                info!(pod_id = %pod.id, "Pod is stopped");
                Ok(ActionReport::Stopped { pod, changed: true })
            }
            WaitOutcome::Failed(status) => {
                Err(OrchestratorError::remote_failure("stop", &pod.id, status))
            }
            WaitOutcome::TimedOut => Err(OrchestratorError::timeout("stop", &pod.id, timeout)),
        }
    }

    /// Stop, pause, then start. A failed stop skips the start.
    pub async fn restart(&self, role: PodRole, deploy_if_absent: bool) -> Result<ActionReport> {
        info!(role = %role, "Restarting pod");

        self.stop(role).await?;

        if !self.config.restart_settle.is_zero() {
            debug!(delay = ?self.config.restart_settle, "Waiting before start");
            tokio::time::sleep(self.config.restart_settle).await;
        }

        self.start(role, deploy_if_absent).await
    }

    /// Create a new pod for the role on the cheapest GPU that accepts it
    pub async fn deploy(&self, role: PodRole) -> Result<ActionReport> {
        let existing = self.discovery.find_all(role).await?;
        if !existing.is_empty() {
            warn!(
                role = %role,
                existing = existing.len(),
                "Deploying although the role already has a pod"
            );
        }

        self.deploy_new(role).await
    }

    /// Delete the role's pod. An absent pod is success.
    pub async fn terminate(&self, role: PodRole) -> Result<ActionReport> {
        let Some(pod) = self.discovery.find(role).await? else {
            info!(role = %role, "No pod to terminate");
            return Ok(ActionReport::Absent { role });
        };

        info!(pod_id = %pod.id, "Terminating pod");
        match self.client.delete_instance(&pod.id).await {
            Ok(()) => Ok(ActionReport::Terminated { pod }),
            Err(e) if e.is_not_found() => Ok(ActionReport::Absent { role }),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait until the role's workload answers HTTP
    pub async fn health(&self, role: PodRole, timeout: Duration) -> Result<ActionReport> {
        let pod = self
            .discovery
            .find(role)
            .await?
            .ok_or(OrchestratorError::PodNotFound(role))?;

        wait_for_healthy(
            self.probe.as_ref(),
            &pod.id,
            &pod.url(),
            self.config.health_interval,
            timeout,
        )
        .await?;

        Ok(ActionReport::Healthy { pod })
    }

    async fn absent_for_start(&self, role: PodRole, deploy_if_absent: bool) -> Result<ActionReport> {
        if deploy_if_absent {
            info!(role = %role, "No pod found, deploying");
            self.deploy_new(role).await
        } else {
            Err(OrchestratorError::PodNotFound(role))
        }
    }

    /// Start gave up on an existing pod. With the deploy flag a replacement
    /// is created and the old pod is left in place.
    async fn start_failed(
        &self,
        role: PodRole,
        pod: &PodHandle,
        deploy_if_absent: bool,
        err: OrchestratorError,
    ) -> Result<ActionReport> {
        if !deploy_if_absent {
            return Err(err);
        }
        warn!(pod_id = %pod.id, error = %err, "Pod won't start, deploying a replacement");
        self.deploy_new(role).await
    }

    /// Wait for a transitional or failed pod to become RUNNING or STOPPED.
    /// Nothing is sent to the pod unless this reaches one of the two.
    async fn settle(&self, pod: &PodHandle, timeout: Duration) -> Result<WaitOutcome> {
        info!(pod_id = %pod.id, "Pod is not in a stable state, waiting before acting");

        let outcome = self
            .tracker
            .wait_for_status(&pod.id, &[PodStatus::Running, PodStatus::Stopped], timeout)
            .await?;

        if !outcome.is_reached() {
            warn!(pod_id = %pod.id, ?outcome, "Pod did not settle");
        }
        Ok(outcome)
    }

    fn deployment_request(&self, role: PodRole, candidates: Vec<GpuOffering>) -> DeploymentRequest {
        let name = self.discovery.pod_name(role, Utc::now().timestamp());

        let mut request = DeploymentRequest::new(role, name, &self.config.base_image)
            .with_candidates(candidates)
            .with_disk_size(self.config.disk_size_gb)
            .with_container_disk(self.config.container_disk_gb)
            .with_volume(self.config.volume_for(role).map(str::to_string))
            .with_port(format!("{}/http", self.config.proxy_port));
        request.env_vars = self.config.workload_env(role);
        request
    }

    async fn deploy_new(&self, role: PodRole) -> Result<ActionReport> {
        let max_price = self.config.max_price;
        let candidates = self.selector.select_candidates(max_price).await?;
        if candidates.is_empty() {
            return Err(OrchestratorError::NoAffordableGpu(max_price));
        }

        let request = self.deployment_request(role, candidates);
        info!(
            role = %role,
            name = %request.name,
            candidates = request.gpu_candidates.len(),
            "Deploying new pod"
        );

        let mut attempts = Vec::new();
        for gpu in &request.gpu_candidates {
            debug!(gpu = %gpu.display_name, "Trying GPU");

            match self.client.create_instance(&request, gpu).await {
                Ok(id) => {
                    let pod = self.discovery.handle(&id, role);
                    info!(
                        pod_id = %pod.id,
                        gpu = %gpu.display_name,
                        url = %pod.url(),
                        "Pod created"
                    );
                    return Ok(ActionReport::Deployed {
                        pod,
                        gpu: gpu.clone(),
                    });
                }
                Err(e) => {
                    let kind = classify(&e);
                    if !kind.is_recoverable() {
                        warn!(gpu = %gpu.display_name, kind = kind.as_str(), error = %e, "Pod creation aborted");
                        return Err(OrchestratorError::CreateAborted {
                            gpu: gpu.id.clone(),
                            source: e,
                        });
                    }

                    warn!(gpu = %gpu.display_name, kind = kind.as_str(), error = %e, "GPU unavailable, trying next");
                    attempts.push(format!("{}: {} ({})", gpu.display_name, kind.as_str(), e));
                }
            }
        }

        Err(OrchestratorError::CandidatesExhausted { attempts })
    }
}
