pub mod discovery;
pub mod fqdn;
pub mod health_checker;
pub mod service;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use discovery::{parse_spoke_list, DiscoveryEngine, DiscoveryStrategy, SpokeDirectory};
pub use fqdn::{build_url, generate_fqdn};
pub use health_checker::{HealthChecker, HealthSummary, HealthTable};
pub use service::{SpokeClient, STOP_GRACE_PERIOD};
pub use transport::{is_retryable_status, ResilientTransport, RetryPolicy, SpokeRequest};
