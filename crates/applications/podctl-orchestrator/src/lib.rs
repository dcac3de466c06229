//! # podctl Orchestrator
//!
//! Lifecycle control for spot-priced GPU pods serving an inference workload.
//!
//! ## Architecture
//!
//! ```text
//! CLI ──► LifecycleController ──► PodDiscovery   (role → pod by name prefix)
//!                │            ├─► StatusTracker  (read / bounded polling)
//!                │            ├─► GpuSelector    (affordable GPUs, cheapest first)
//!                │            └─► EndpointProbe  (workload HTTP health)
//!                ▼
//!           CloudClient (RunPod REST + GraphQL)
//! ```
//!
//! Every operation re-reads the provider before mutating; no state is kept
//! between invocations. Each role (`main`, `branch`) maps to at most one live
//! pod through its name.

#![warn(clippy::all)]

pub mod catalogue;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod monitor;
pub mod runpod;

#[cfg(test)]
mod fake;

// Error handling
pub use error::{OrchestratorError, Result};

// Configuration
pub use config::{Config, DEFAULT_ENV_FILE, DEFAULT_GRAPHQL_URL, DEFAULT_REST_URL};

// Lifecycle control
pub use lifecycle::{ActionReport, FailureKind, LifecycleController, classify};

// Building blocks
pub use catalogue::{GpuSelector, rank_offerings};
pub use discovery::{PROXY_DOMAIN, PodDiscovery};
pub use health::{EndpointProbe, HttpProbe, wait_for_healthy};
pub use monitor::{StatusTracker, WaitOutcome};

// Provider client
pub use runpod::{REQUEST_TIMEOUT, RunPodClient};
