//! spokelink Core Library
//!
//! This library provides core functionality for the spokelink hub client including:
//! - Configuration management
//! - Spoke and health record types
//! - The shared error taxonomy

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::model::{
    DiscoverySettings, DiscoverySource, HealthCheckSettings, RetrySettings, SpokeConfig,
    TlsSettings,
};
pub use error::{Result, SpokeError};
pub use types::{HealthRecord, HealthStatus, SpokeRecord, SPOKE_STATUS_UNKNOWN};
