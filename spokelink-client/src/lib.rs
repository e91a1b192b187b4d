//! spokelink Client Library
//!
//! This library provides the hub-side spoke client including:
//! - Spoke discovery and FQDN resolution
//! - Periodic health checking
//! - Resilient HTTP transport with backoff
//! - Lifecycle management of the background loops

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod spoke;

// Re-export commonly used types
pub use spoke::{
    build_url, generate_fqdn, parse_spoke_list, DiscoveryEngine, DiscoveryStrategy,
    HealthChecker, HealthSummary, HealthTable, ResilientTransport, RetryPolicy, SpokeClient,
    SpokeDirectory, SpokeRequest, STOP_GRACE_PERIOD,
};
pub use spokelink_core::{HealthRecord, HealthStatus, SpokeConfig, SpokeError, SpokeRecord};
