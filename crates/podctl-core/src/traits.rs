//! Core traits for podctl
//!
//! [`CloudClient`] is the boundary to the GPU cloud provider. The lifecycle
//! controller works through this interface only, never a concrete client.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeploymentRequest, GpuOffering, RawGpu, RawInstance};

/// Authenticated transport to the provider's control API.
///
/// Every call is a single request; implementations must not retry.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// All pods visible to the credential
    async fn list_instances(&self) -> Result<Vec<RawInstance>>;

    /// One pod by ID. A missing pod is `CloudError::NotFound`.
    async fn get_instance(&self, id: &str) -> Result<RawInstance>;

    /// Create a pod for `request` on the given GPU type. Returns the new pod ID.
    async fn create_instance(&self, request: &DeploymentRequest, gpu: &GpuOffering) -> Result<String>;

    /// Resume a stopped pod
    async fn start_instance(&self, id: &str) -> Result<()>;

    /// Stop a running pod (keeps its volume)
    async fn stop_instance(&self, id: &str) -> Result<()>;

    /// Delete a pod for good
    async fn delete_instance(&self, id: &str) -> Result<()>;

    /// Full GPU catalogue with spot prices
    async fn list_gpu_offerings(&self) -> Result<Vec<RawGpu>>;
}
