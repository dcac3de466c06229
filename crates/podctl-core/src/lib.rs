//! podctl core - shared types and traits
//!
//! This crate defines the abstractions used by the lifecycle orchestrator:
//! - [`CloudClient`] trait (boundary to the GPU cloud provider)
//! - Pod roles, statuses, handles and GPU offerings
//! - Error types

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
