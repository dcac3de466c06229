//! Core types shared across podctl components

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Logical deployment slot. At most one live pod per role is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodRole {
    Main,
    Branch,
}

impl PodRole {
    /// Lowercase name used in pod names and env keys
    pub fn as_str(&self) -> &'static str {
        match self {
            PodRole::Main => "main",
            PodRole::Branch => "branch",
        }
    }
}

impl fmt::Display for PodRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(PodRole::Main),
            "branch" => Ok(PodRole::Branch),
            _ => Err(ParseError::Role(s.to_string())),
        }
    }
}

/// Lifecycle status of a pod, as far as the orchestrator cares.
///
/// `NotFound` and `Error` are terminal-negative: polling further is pointless.
/// `Running` and `Stopped` are the stable states transitions aim for.
/// `Unknown` is transient and never ends a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodStatus {
    Running,
    Stopped,
    NotFound,
    Error,
    Unknown,
}

impl PodStatus {
    /// Map a raw provider `desiredStatus` string.
    ///
    /// Values the provider may add later land on `Unknown`, never on a
    /// positive state.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => PodStatus::Running,
            "EXITED" | "STOPPED" => PodStatus::Stopped,
            "TERMINATED" => PodStatus::NotFound,
            "FAILED" | "ERROR" | "DEAD" => PodStatus::Error,
            _ => PodStatus::Unknown,
        }
    }

    /// No further polling can change the outcome
    pub fn is_terminal_negative(&self) -> bool {
        matches!(self, PodStatus::NotFound | PodStatus::Error)
    }

    /// Running or Stopped
    pub fn is_stable(&self) -> bool {
        matches!(self, PodStatus::Running | PodStatus::Stopped)
    }

    /// Machine-readable token printed on stdout
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Running => "RUNNING",
            PodStatus::Stopped => "STOPPED",
            PodStatus::NotFound => "NOT_FOUND",
            PodStatus::Error => "ERROR",
            PodStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live pod resolved for a role. Recomputed on every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodHandle {
    /// Provider pod ID
    pub id: String,

    /// Role the pod fills
    pub role: PodRole,

    /// Proxy host serving the workload, e.g. `abc123-5000.proxy.runpod.net`
    pub network_host: String,
}

impl PodHandle {
    pub fn new(id: impl Into<String>, role: PodRole, network_host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            network_host: network_host.into(),
        }
    }

    /// Public HTTPS URL of the workload
    pub fn url(&self) -> String {
        format!("https://{}/", self.network_host)
    }
}

/// Which provider cloud a price (and therefore a rental) comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudType {
    Community,
    Secure,
}

impl CloudType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudType::Community => "COMMUNITY",
            CloudType::Secure => "SECURE",
        }
    }
}

/// A GPU type from the provider catalogue with its spot prices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuOffering {
    /// Provider GPU type ID (e.g. "NVIDIA GeForce RTX 4090")
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// VRAM in GB, when the catalogue reports it
    pub memory_gb: Option<u32>,

    /// Community cloud spot price (USD/hour)
    pub community_spot_price: Option<Decimal>,

    /// Secure cloud spot price (USD/hour)
    pub secure_spot_price: Option<Decimal>,
}

impl GpuOffering {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            memory_gb: None,
            community_spot_price: None,
            secure_spot_price: None,
        }
    }

    pub fn with_memory_gb(mut self, gb: u32) -> Self {
        self.memory_gb = Some(gb);
        self
    }

    pub fn with_community_spot_price(mut self, price: Decimal) -> Self {
        self.community_spot_price = Some(price);
        self
    }

    pub fn with_secure_spot_price(mut self, price: Decimal) -> Self {
        self.secure_spot_price = Some(price);
        self
    }

    /// Community spot price if present, else secure spot price.
    ///
    /// The provider reports `0` when a cloud has no spot capacity for the
    /// type, so non-positive prices count as absent. `None` means unpriced.
    pub fn effective_price(&self) -> Option<(Decimal, CloudType)> {
        let positive = |p: Option<Decimal>| p.filter(|v| *v > Decimal::ZERO);

        positive(self.community_spot_price)
            .map(|p| (p, CloudType::Community))
            .or_else(|| positive(self.secure_spot_price).map(|p| (p, CloudType::Secure)))
    }
}

impl From<RawGpu> for GpuOffering {
    fn from(raw: RawGpu) -> Self {
        Self {
            display_name: raw.display_name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            memory_gb: raw.memory_in_gb,
            community_spot_price: raw.community_spot_price,
            secure_spot_price: raw.secure_spot_price,
        }
    }
}

/// Everything needed to create a pod for a role. Built once per deploy and
/// tried against each GPU candidate in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Role being deployed
    pub role: PodRole,

    /// Unique pod name (`<app>-<role>-<timestamp>`)
    pub name: String,

    /// Container image
    pub image_name: String,

    /// Candidates, cheapest first
    pub gpu_candidates: Vec<GpuOffering>,

    /// Persistent volume size in GB (ignored when a network volume is attached)
    pub disk_size_gb: u32,

    /// Container disk in GB
    pub container_disk_gb: u32,

    /// Network volume to attach
    pub volume_id: Option<String>,

    /// Environment passed to the workload
    pub env_vars: BTreeMap<String, String>,

    /// Exposed ports, provider syntax (e.g. "5000/http")
    pub ports: Vec<String>,
}

impl DeploymentRequest {
    pub fn new(role: PodRole, name: impl Into<String>, image_name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            image_name: image_name.into(),
            gpu_candidates: Vec::new(),
            disk_size_gb: 0,
            container_disk_gb: 0,
            volume_id: None,
            env_vars: BTreeMap::new(),
            ports: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<GpuOffering>) -> Self {
        self.gpu_candidates = candidates;
        self
    }

    pub fn with_disk_size(mut self, gb: u32) -> Self {
        self.disk_size_gb = gb;
        self
    }

    pub fn with_container_disk(mut self, gb: u32) -> Self {
        self.container_disk_gb = gb;
        self
    }

    pub fn with_volume(mut self, volume_id: Option<String>) -> Self {
        self.volume_id = volume_id;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }
}

/// Pod as returned by the provider REST API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstance {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Provider lifecycle string (`RUNNING`, `EXITED`, `TERMINATED`, ...)
    #[serde(default)]
    pub desired_status: Option<String>,

    #[serde(default, alias = "image")]
    pub image_name: Option<String>,
}

impl RawInstance {
    /// Mapped status; a missing status string is `Unknown`
    pub fn status(&self) -> PodStatus {
        self.desired_status
            .as_deref()
            .map(PodStatus::from_provider)
            .unwrap_or(PodStatus::Unknown)
    }
}

/// GPU type as returned by the provider GraphQL catalogue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGpu {
    pub id: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub memory_in_gb: Option<u32>,

    #[serde(default)]
    pub community_spot_price: Option<Decimal>,

    #[serde(default)]
    pub secure_spot_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("main".parse::<PodRole>(), Ok(PodRole::Main));
        assert_eq!(" Branch ".parse::<PodRole>(), Ok(PodRole::Branch));
        assert!("staging".parse::<PodRole>().is_err());
        assert_eq!(PodRole::Branch.to_string(), "branch");
    }

    #[test]
    fn test_status_from_provider() {
        assert_eq!(PodStatus::from_provider("RUNNING"), PodStatus::Running);
        assert_eq!(PodStatus::from_provider("exited"), PodStatus::Stopped);
        assert_eq!(PodStatus::from_provider("STOPPED"), PodStatus::Stopped);
        assert_eq!(PodStatus::from_provider("TERMINATED"), PodStatus::NotFound);
        assert_eq!(PodStatus::from_provider("FAILED"), PodStatus::Error);
        assert_eq!(PodStatus::from_provider("CREATED"), PodStatus::Unknown);
        assert_eq!(PodStatus::from_provider("RESTARTING"), PodStatus::Unknown);
        assert_eq!(PodStatus::from_provider(""), PodStatus::Unknown);
    }

    #[test]
    fn test_status_classes() {
        assert!(PodStatus::Error.is_terminal_negative());
        assert!(PodStatus::NotFound.is_terminal_negative());
        assert!(!PodStatus::Unknown.is_terminal_negative());
        assert!(!PodStatus::Unknown.is_stable());
        assert!(PodStatus::Stopped.is_stable());
        assert_eq!(PodStatus::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn test_effective_price_prefers_community() {
        let gpu = GpuOffering::new("A")
            .with_community_spot_price(Decimal::new(30, 2))
            .with_secure_spot_price(Decimal::new(20, 2));
        assert_eq!(
            gpu.effective_price(),
            Some((Decimal::new(30, 2), CloudType::Community))
        );
    }

    #[test]
    fn test_effective_price_falls_back_to_secure() {
        let gpu = GpuOffering::new("C").with_secure_spot_price(Decimal::new(20, 2));
        assert_eq!(
            gpu.effective_price(),
            Some((Decimal::new(20, 2), CloudType::Secure))
        );

        // Zero community price means no community spot capacity
        let gpu = gpu.with_community_spot_price(Decimal::ZERO);
        assert_eq!(
            gpu.effective_price(),
            Some((Decimal::new(20, 2), CloudType::Secure))
        );
    }

    #[test]
    fn test_unpriced_offering() {
        assert_eq!(GpuOffering::new("X").effective_price(), None);
    }

    #[test]
    fn test_raw_gpu_deserialization() {
        let json = r#"{
            "id": "NVIDIA RTX A4000",
            "displayName": "RTX A4000",
            "memoryInGb": 16,
            "communitySpotPrice": 0.17,
            "secureSpotPrice": null
        }"#;

        let raw: RawGpu = serde_json::from_str(json).unwrap();
        let offering = GpuOffering::from(raw);

        assert_eq!(offering.display_name, "RTX A4000");
        assert_eq!(offering.memory_gb, Some(16));
        assert_eq!(offering.community_spot_price, Some(Decimal::new(17, 2)));
        assert_eq!(offering.secure_spot_price, None);
    }

    #[test]
    fn test_raw_instance_status() {
        let json = r#"{"id": "abc123", "name": "ashoka-main-1", "desiredStatus": "EXITED", "gpuCount": 1}"#;
        let raw: RawInstance = serde_json::from_str(json).unwrap();
        assert_eq!(raw.status(), PodStatus::Stopped);

        let bare = RawInstance {
            id: "x".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.status(), PodStatus::Unknown);
    }

    #[test]
    fn test_deployment_request_builder() {
        let request = DeploymentRequest::new(PodRole::Branch, "ashoka-branch-1", "ollama/ollama:latest")
            .with_disk_size(50)
            .with_container_disk(20)
            .with_volume(Some("vol-1".to_string()))
            .with_env("INACTIVITY_TIMEOUT_SECONDS", "1800")
            .with_port("5000/http");

        assert_eq!(request.disk_size_gb, 50);
        assert_eq!(request.volume_id.as_deref(), Some("vol-1"));
        assert_eq!(request.env_vars["INACTIVITY_TIMEOUT_SECONDS"], "1800");
        assert_eq!(request.ports, vec!["5000/http".to_string()]);
    }
}
