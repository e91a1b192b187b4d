use super::discovery::SpokeDirectory;
use super::fqdn::build_url;
use super::transport::{ResilientTransport, SpokeRequest};
use parking_lot::RwLock;
use reqwest::StatusCode;
use spokelink_core::{HealthRecord, HealthStatus, SpokeConfig, SpokeRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 健康表：集群ID -> 最近一次检查结果
pub type HealthTable = Arc<RwLock<HashMap<String, HealthRecord>>>;

/// 健康检查器
/// 定期检查目录中所有启用的spoke
pub struct HealthChecker {
    config: Arc<SpokeConfig>,
    transport: Arc<ResilientTransport>,
    directory: SpokeDirectory,
    health: HealthTable,
    cancel: CancellationToken,
}

impl HealthChecker {
    /// 创建新的健康检查器
    pub fn new(
        config: Arc<SpokeConfig>,
        transport: Arc<ResilientTransport>,
        directory: SpokeDirectory,
        health: HealthTable,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transport,
            directory,
            health,
            cancel,
        }
    }

    /// 启动健康检查循环，直到取消
    pub async fn run(&self) {
        let period = self.config.health_check_interval();
        info!("Starting health checker with interval: {:?}", period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                written = self.check_all() => {
                    debug!("Health check round completed: {} spokes recorded", written);
                }
            }
        }

        info!("Health checker stopped");
    }

    /// 检查单个spoke，失败以记录形式返回而不是错误
    pub async fn check_one(&self, spoke: &SpokeRecord) -> HealthRecord {
        Self::probe(&self.config, &self.transport, &self.cancel, spoke).await
    }

    /// 检查单个spoke并写入健康表
    ///
    /// 取消之后得到的结果只返回给调用方，不覆盖已有记录。
    pub async fn check_and_record(&self, spoke: &SpokeRecord) -> HealthRecord {
        let record = self.check_one(spoke).await;
        if self.cancel.is_cancelled() {
            debug!("Not recording health result for {} after cancellation", spoke.cluster_id);
        } else {
            Self::store(&self.health, record.clone());
        }
        record
    }

    /// 检查目录中所有启用的spoke，返回写入的记录数
    ///
    /// 每个spoke一个任务，结果完成即写入，慢的spoke不会拖住快的。
    pub async fn check_all(&self) -> usize {
        // 快照和清理在同一次目录读锁内完成，锁顺序固定为 目录 -> 健康表
        let snapshot: Vec<SpokeRecord> = {
            let directory = self.directory.read();
            self.health.write().retain(|cluster_id, _| {
                let keep = directory.contains_key(cluster_id);
                if !keep {
                    debug!("Dropping health record for removed spoke {}", cluster_id);
                }
                keep
            });
            directory.values().cloned().collect()
        };

        let total = snapshot.len();
        let enabled: Vec<SpokeRecord> = snapshot.into_iter().filter(|s| s.enabled).collect();
        debug!(
            "Starting health check for {} enabled spokes ({} disabled skipped)",
            enabled.len(),
            total - enabled.len()
        );

        let mut tasks = Vec::with_capacity(enabled.len());

        for spoke in enabled {
            let cluster_id = spoke.cluster_id.clone();
            let config = self.config.clone();
            let transport = self.transport.clone();
            let health = self.health.clone();
            let cancel = self.cancel.clone();

            let task = tokio::spawn(async move {
                let record = Self::probe(&config, &transport, &cancel, &spoke).await;
                // 关闭过程中被打断的检查不代表spoke的真实状态
                if cancel.is_cancelled() {
                    debug!("Discarding health result for {} after cancellation", spoke.cluster_id);
                    return false;
                }
                Self::store(&health, record);
                true
            });

            tasks.push((cluster_id, task));
        }

        let mut written = 0;
        for (cluster_id, task) in tasks {
            match task.await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => error!("Health check task failed for spoke {}: {}", cluster_id, e),
            }
        }

        written
    }

    async fn probe(
        config: &SpokeConfig,
        transport: &ResilientTransport,
        cancel: &CancellationToken,
        spoke: &SpokeRecord,
    ) -> HealthRecord {
        let url = build_url(&config.protocol, &spoke.fqdn, &config.health_check.path);
        let timeout = config.health_check_timeout();
        let request = SpokeRequest::get(url);
        let start_time = Instant::now();

        debug!("Checking health of spoke {} at {}", spoke.cluster_id, request.url);

        match tokio::time::timeout(timeout, transport.execute_with_retry(&request, cancel)).await {
            Ok(Ok(response)) => {
                let latency_ms = start_time.elapsed().as_millis() as u64;
                let status = response.status();
                if status == StatusCode::OK {
                    HealthRecord::healthy(spoke, latency_ms)
                } else {
                    HealthRecord::unhealthy(
                        spoke,
                        format!("unexpected status code: {}", status.as_u16()),
                        Some(latency_ms),
                    )
                }
            }
            Ok(Err(e)) => HealthRecord::unhealthy(spoke, e.to_string(), None),
            Err(_) => HealthRecord::unhealthy(
                spoke,
                format!("health check timed out after {}s", timeout.as_secs()),
                None,
            ),
        }
    }

    /// 整条替换写入，只在写锁内做一次insert
    fn store(health: &HealthTable, record: HealthRecord) {
        let cluster_id = record.cluster_id.clone();
        let status = record.status;
        let error = record.error.clone();

        let previous = health.write().insert(cluster_id.clone(), record);

        match previous.map(|p| p.status) {
            Some(old) if old != status => {
                info!("Spoke {} health changed: {} -> {}", cluster_id, old, status);
            }
            None => info!("Spoke {} initial health: {}", cluster_id, status),
            _ => debug!("Spoke {} health unchanged: {}", cluster_id, status),
        }

        if let Some(error) = error {
            if status == HealthStatus::Unhealthy {
                warn!("Spoke {} health check failed: {}", cluster_id, error);
            }
        }
    }

    /// 获取健康统计信息
    pub fn health_summary(&self) -> HealthSummary {
        // 两张表分别加锁，不同时持有
        let spokes: Vec<(String, bool)> = self
            .directory
            .read()
            .values()
            .map(|s| (s.cluster_id.clone(), s.enabled))
            .collect();
        let health = self.health.read().clone();

        let mut summary = HealthSummary {
            total_spokes: spokes.len(),
            ..HealthSummary::default()
        };

        for (cluster_id, enabled) in spokes {
            if !enabled {
                continue;
            }
            summary.enabled_spokes += 1;
            match health.get(&cluster_id).map(|r| r.status) {
                Some(HealthStatus::Healthy) => summary.healthy_spokes += 1,
                Some(HealthStatus::Unhealthy) => summary.unhealthy_spokes += 1,
                None => summary.unchecked_spokes += 1,
            }
        }

        let checked = summary.healthy_spokes + summary.unhealthy_spokes;
        summary.health_ratio = if checked > 0 {
            summary.healthy_spokes as f64 / checked as f64
        } else {
            0.0
        };

        summary
    }
}

/// 健康检查摘要
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HealthSummary {
    pub total_spokes: usize,
    pub enabled_spokes: usize,
    pub healthy_spokes: usize,
    pub unhealthy_spokes: usize,
    pub unchecked_spokes: usize,
    pub health_ratio: f64,
}

impl HealthSummary {
    /// 检查整体是否健康
    pub fn is_fleet_healthy(&self) -> bool {
        self.health_ratio > 0.5 // 至少50%已检查的spoke健康
    }

    pub fn has_healthy_spokes(&self) -> bool {
        self.healthy_spokes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spoke::test_support::{create_test_config, spawn_spoke, test_policy};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::Router;
    use reqwest::Client;
    use std::net::SocketAddr;
    use std::time::Duration;

    struct Fixture {
        checker: Arc<HealthChecker>,
        directory: SpokeDirectory,
        health: HealthTable,
    }

    fn fixture(config: SpokeConfig) -> Fixture {
        let directory: SpokeDirectory = Arc::new(RwLock::new(HashMap::new()));
        let health: HealthTable = Arc::new(RwLock::new(HashMap::new()));
        let transport = Arc::new(ResilientTransport::with_client(Client::new(), test_policy(1)));
        let checker = Arc::new(HealthChecker::new(
            Arc::new(config),
            transport,
            directory.clone(),
            health.clone(),
            CancellationToken::new(),
        ));
        Fixture {
            checker,
            directory,
            health,
        }
    }

    fn add_spoke(directory: &SpokeDirectory, cluster_id: &str, fqdn: String, enabled: bool) {
        let mut spoke = SpokeRecord::discovered(cluster_id.to_string(), "z1".to_string(), fqdn);
        spoke.enabled = enabled;
        directory.write().insert(cluster_id.to_string(), spoke);
    }

    async fn spawn_status_spoke(status: AxumStatus) -> SocketAddr {
        spawn_spoke(Router::new().route("/health", get(move || async move { status }))).await
    }

    async fn unused_addr() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_check_all_skips_disabled_spokes() {
        let addr = spawn_status_spoke(AxumStatus::OK).await;
        let f = fixture(create_test_config(""));
        for id in ["e1", "e2", "e3"] {
            add_spoke(&f.directory, id, addr.to_string(), true);
        }
        for id in ["d1", "d2"] {
            add_spoke(&f.directory, id, addr.to_string(), false);
        }

        let written = f.checker.check_all().await;

        assert_eq!(written, 3);
        let health = f.health.read().clone();
        assert_eq!(health.len(), 3);
        assert!(health.values().all(HealthRecord::is_healthy));
        assert!(!health.contains_key("d1"));
        assert!(health["e1"].latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_spoke() {
        let ok = spawn_status_spoke(AxumStatus::OK).await;
        let failing = spawn_status_spoke(AxumStatus::INTERNAL_SERVER_ERROR).await;
        let not_found = spawn_status_spoke(AxumStatus::NOT_FOUND).await;
        let unreachable = unused_addr().await;

        let f = fixture(create_test_config(""));
        add_spoke(&f.directory, "ok", ok.to_string(), true);
        add_spoke(&f.directory, "failing", failing.to_string(), true);
        add_spoke(&f.directory, "missing", not_found.to_string(), true);
        add_spoke(&f.directory, "gone", unreachable.to_string(), true);

        assert_eq!(f.checker.check_all().await, 4);

        let health = f.health.read().clone();
        assert_eq!(health["ok"].status, HealthStatus::Healthy);
        assert_eq!(health["failing"].status, HealthStatus::Unhealthy);
        assert!(health["failing"].error.as_deref().unwrap().contains("2 attempts"));
        assert_eq!(
            health["missing"].error.as_deref(),
            Some("unexpected status code: 404")
        );
        assert_eq!(health["gone"].status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_non_200_success_is_unhealthy() {
        let addr = spawn_status_spoke(AxumStatus::NO_CONTENT).await;
        let f = fixture(create_test_config(""));
        let spoke = SpokeRecord::discovered("c1".into(), "z1".into(), addr.to_string());

        let record = f.checker.check_one(&spoke).await;

        assert_eq!(record.status, HealthStatus::Unhealthy);
        // check_one不写健康表
        assert!(f.health.read().is_empty());
    }

    #[tokio::test]
    async fn test_slow_spoke_does_not_block_fast_spoke() {
        let fast = spawn_status_spoke(AxumStatus::OK).await;
        let slow = spawn_spoke(Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                AxumStatus::OK
            }),
        ))
        .await;

        let f = fixture(create_test_config(""));
        add_spoke(&f.directory, "fast", fast.to_string(), true);
        add_spoke(&f.directory, "slow", slow.to_string(), true);

        let checker = f.checker.clone();
        let round = tokio::spawn(async move { checker.check_all().await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        {
            let health = f.health.read();
            assert!(health.contains_key("fast"));
            assert!(!health.contains_key("slow"));
        }

        assert_eq!(round.await.unwrap(), 2);
        assert!(f.health.read()["slow"].is_healthy());
    }

    #[tokio::test]
    async fn test_health_check_timeout() {
        let slow = spawn_spoke(Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                AxumStatus::OK
            }),
        ))
        .await;

        let mut config = create_test_config("");
        config.health_check.timeout_seconds = 1;
        let f = fixture(config);
        let spoke = SpokeRecord::discovered("slow".into(), "z1".into(), slow.to_string());

        let record = f.checker.check_one(&spoke).await;

        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!(record.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_removed_spokes_are_pruned() {
        let addr = spawn_status_spoke(AxumStatus::OK).await;
        let f = fixture(create_test_config(""));
        add_spoke(&f.directory, "c1", addr.to_string(), true);
        add_spoke(&f.directory, "c2", addr.to_string(), true);
        f.checker.check_all().await;

        f.directory.write().remove("c2");
        f.checker.check_all().await;

        let health = f.health.read().clone();
        assert_eq!(health.len(), 1);
        assert!(health.contains_key("c1"));
    }

    #[tokio::test]
    async fn test_pruning_keeps_records_of_listed_spokes() {
        let addr = spawn_status_spoke(AxumStatus::OK).await;
        let f = fixture(create_test_config(""));
        add_spoke(&f.directory, "c1", addr.to_string(), true);
        add_spoke(&f.directory, "paused", addr.to_string(), false);

        // 按需检查写入的记录：一个仍在目录中（虽已禁用），一个已被移除
        let paused = SpokeRecord::discovered("paused".into(), "z1".into(), addr.to_string());
        f.checker.check_and_record(&paused).await;
        let gone = SpokeRecord::discovered("gone".into(), "z1".into(), addr.to_string());
        f.checker.check_and_record(&gone).await;

        assert_eq!(f.checker.check_all().await, 1);

        let health = f.health.read().clone();
        assert!(health.contains_key("c1"));
        assert!(health["paused"].is_healthy());
        assert!(!health.contains_key("gone"));
    }

    #[tokio::test]
    async fn test_health_summary() {
        let ok = spawn_status_spoke(AxumStatus::OK).await;
        let bad = spawn_status_spoke(AxumStatus::NOT_FOUND).await;
        let f = fixture(create_test_config(""));
        add_spoke(&f.directory, "a", ok.to_string(), true);
        add_spoke(&f.directory, "b", ok.to_string(), true);
        add_spoke(&f.directory, "c", bad.to_string(), true);
        add_spoke(&f.directory, "d", ok.to_string(), false);

        f.checker.check_all().await;
        add_spoke(&f.directory, "e", ok.to_string(), true);

        let summary = f.checker.health_summary();
        assert_eq!(summary.total_spokes, 5);
        assert_eq!(summary.enabled_spokes, 4);
        assert_eq!(summary.healthy_spokes, 2);
        assert_eq!(summary.unhealthy_spokes, 1);
        assert_eq!(summary.unchecked_spokes, 1);
        assert!(summary.is_fleet_healthy());
        assert!(summary.has_healthy_spokes());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let directory: SpokeDirectory = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let checker = HealthChecker::new(
            Arc::new(create_test_config("")),
            Arc::new(ResilientTransport::with_client(Client::new(), test_policy(1))),
            directory,
            Arc::new(RwLock::new(HashMap::new())),
            cancel.clone(),
        );

        let handle = tokio::spawn(async move { checker.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("health loop should exit after cancellation")
            .unwrap();
    }
}
