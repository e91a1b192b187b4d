use super::transport::RetryPolicy;
use axum::Router;
use spokelink_core::SpokeConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// 在随机端口上启动一个本地spoke
pub async fn spawn_spoke(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// 短延迟、无抖动的重试策略
pub fn test_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        enabled: true,
        max_retries,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter_enabled: false,
    }
}

/// 走明文HTTP的测试配置
pub fn create_test_config(spoke_list: &str) -> SpokeConfig {
    let mut config = SpokeConfig {
        protocol: "http".to_string(),
        timeout_seconds: 5,
        host_pattern: "agent".to_string(),
        domain_suffix: "example.com".to_string(),
        fqdn_template: "{{.HostPattern}}-{{.ClusterID}}.{{.DomainSuffix}}".to_string(),
        ..SpokeConfig::default()
    };
    config.tls.enabled = false;
    config.discovery.spoke_list = spoke_list.to_string();
    config.health_check.timeout_seconds = 5;
    config.retry.max_retries = 1;
    config.retry.initial_delay_ms = 10;
    config.retry.max_delay_ms = 50;
    config.retry.jitter_enabled = false;
    config
}
