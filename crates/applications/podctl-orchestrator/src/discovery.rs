//! Pod discovery by name prefix
//!
//! Pods carry no tags we control, so role membership is encoded in the pod
//! name: `<app>-<role>-<unix-seconds>`. Discovery lists every pod visible to
//! the credential and keeps the ones whose name starts with `<app>-<role>-`.
//!
//! Nothing is cached. Every call re-reads the provider.

use crate::error::Result;
use podctl_core::{CloudClient, PodHandle, PodRole, RawInstance};
use std::sync::Arc;
use tracing::{debug, warn};

/// Proxy domain serving pod HTTP ports
pub const PROXY_DOMAIN: &str = "proxy.runpod.net";

/// Resolves roles to live pods
pub struct PodDiscovery<C: CloudClient> {
    client: Arc<C>,
    app_name: String,
    proxy_port: u16,
}

impl<C: CloudClient> PodDiscovery<C> {
    pub fn new(client: Arc<C>, app_name: impl Into<String>, proxy_port: u16) -> Self {
        Self {
            client,
            app_name: app_name.into(),
            proxy_port,
        }
    }

    /// Name prefix shared by every pod of a role
    pub fn prefix(&self, role: PodRole) -> String {
        format!("{}-{}-", self.app_name, role)
    }

    /// Unique pod name for a new deployment
    pub fn pod_name(&self, role: PodRole, unix_secs: i64) -> String {
        format!("{}{}", self.prefix(role), unix_secs)
    }

    /// Public proxy host for a pod
    pub fn network_host(&self, pod_id: &str) -> String {
        format!("{}-{}.{}", pod_id, self.proxy_port, PROXY_DOMAIN)
    }

    /// Handle for a pod ID we already know (fresh deployment)
    pub fn handle(&self, pod_id: &str, role: PodRole) -> PodHandle {
        PodHandle::new(pod_id, role, self.network_host(pod_id))
    }

    /// First pod for the role, or `None` when it needs deployment
    pub async fn find(&self, role: PodRole) -> Result<Option<PodHandle>> {
        let matches = self.matching(role).await?;

        if matches.len() > 1 {
            warn!(
                role = %role,
                count = matches.len(),
                "Multiple pods match role, using the first"
            );
        }

        let handle = matches.first().map(|i| self.handle(&i.id, role));
        match &handle {
            Some(h) => debug!(role = %role, pod_id = %h.id, "Resolved pod"),
            None => debug!(role = %role, "No pod for role"),
        }
        Ok(handle)
    }

    /// Every pod for the role, in provider order
    pub async fn find_all(&self, role: PodRole) -> Result<Vec<PodHandle>> {
        Ok(self
            .matching(role)
            .await?
            .iter()
            .map(|i| self.handle(&i.id, role))
            .collect())
    }

    async fn matching(&self, role: PodRole) -> Result<Vec<RawInstance>> {
        let prefix = self.prefix(role);
        let instances = self.client.list_instances().await?;

        Ok(instances
            .into_iter()
            .filter(|i| i.name.starts_with(&prefix))
            .collect())
    }
}
