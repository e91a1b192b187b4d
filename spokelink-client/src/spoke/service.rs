use super::discovery::{DiscoveryEngine, DiscoveryStrategy, SpokeDirectory};
use super::fqdn;
use super::health_checker::{HealthChecker, HealthSummary, HealthTable};
use super::transport::{ResilientTransport, SpokeRequest};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use reqwest::{Method, Response};
use spokelink_core::{HealthRecord, Result, SpokeConfig, SpokeError, SpokeRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `stop()` 等待后台循环退出的最长时间
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// spoke客户端
/// 整合发现引擎、健康检查器和传输层，提供统一的服务接口
pub struct SpokeClient {
    config: Arc<SpokeConfig>,
    discovery: Arc<DiscoveryEngine>,
    health_checker: Arc<HealthChecker>,
    transport: Arc<ResilientTransport>,
    directory: SpokeDirectory,
    health: HealthTable,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl SpokeClient {
    /// 创建新的spoke客户端
    pub fn new(config: SpokeConfig) -> Result<Self> {
        let config = Arc::new(config);
        let directory: SpokeDirectory = Arc::new(RwLock::new(HashMap::new()));
        let discovery = DiscoveryEngine::new(config.clone(), directory.clone());
        Self::assemble(config, directory, discovery)
    }

    /// 使用自定义发现策略创建客户端
    pub fn with_discovery_strategy(
        config: SpokeConfig,
        strategy: Box<dyn DiscoveryStrategy>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let directory: SpokeDirectory = Arc::new(RwLock::new(HashMap::new()));
        let discovery = DiscoveryEngine::with_strategy(config.clone(), directory.clone(), strategy);
        Self::assemble(config, directory, discovery)
    }

    fn assemble(
        config: Arc<SpokeConfig>,
        directory: SpokeDirectory,
        discovery: DiscoveryEngine,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SpokeError::Config(e.to_string()))?;

        let transport = Arc::new(ResilientTransport::new(&config)?);
        let health: HealthTable = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let health_checker = Arc::new(HealthChecker::new(
            config.clone(),
            transport.clone(),
            directory.clone(),
            health.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            config,
            discovery: Arc::new(discovery),
            health_checker,
            transport,
            directory,
            health,
            cancel,
            tasks: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        })
    }

    /// 启动后台循环
    ///
    /// 先同步执行一次发现（失败只记日志），然后启动发现刷新循环，
    /// 健康检查启用时再启动健康检查循环。
    pub async fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SpokeError::Cancelled);
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Spoke client already running");
            return Ok(());
        }

        info!(
            "Starting spoke client (discovery source: {})",
            self.discovery.strategy_name()
        );

        match self.discovery.discover().await {
            Ok(count) => info!("Initial discovery found {} spokes", count),
            Err(e) => error!("Initial spoke discovery failed ({}): {}", e.error_type(), e),
        }

        let mut tasks = Vec::with_capacity(2);

        let discovery = self.discovery.clone();
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move {
            discovery.run(cancel).await;
        }));

        if self.config.health_check.enabled {
            let health_checker = self.health_checker.clone();
            tasks.push(tokio::spawn(async move {
                health_checker.run().await;
            }));
        } else {
            info!("Health checking is disabled");
        }

        self.tasks.lock().extend(tasks);

        info!("Spoke client started successfully");
        Ok(())
    }

    /// 停止后台循环，最多等待 `STOP_GRACE_PERIOD`
    pub async fn stop(&self) {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            self.is_running.store(false, Ordering::SeqCst);
            return;
        }

        match tokio::time::timeout(STOP_GRACE_PERIOD, join_all(tasks)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!("Spoke client background task failed: {}", e);
                    }
                }
                info!("Spoke client stopped");
            }
            Err(_) => warn!(
                "Spoke client background tasks did not finish within {:?}",
                STOP_GRACE_PERIOD
            ),
        }

        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// 立即执行一次发现，错误返回给调用方
    pub async fn refresh(&self) -> Result<usize> {
        self.discovery.discover().await
    }

    /// 目录快照
    pub fn list_spokes(&self) -> HashMap<String, SpokeRecord> {
        self.directory.read().clone()
    }

    pub fn get_spoke(&self, cluster_id: &str) -> Option<SpokeRecord> {
        self.directory.read().get(cluster_id).cloned()
    }

    /// 健康表快照
    pub fn list_health(&self) -> HashMap<String, HealthRecord> {
        self.health.read().clone()
    }

    pub fn get_health(&self, cluster_id: &str) -> Option<HealthRecord> {
        self.health.read().get(cluster_id).cloned()
    }

    /// 立即检查指定集群，结果同时写入健康表
    pub async fn check_health(&self, cluster_id: &str) -> Result<HealthRecord> {
        let spoke = self.require_spoke(cluster_id)?;
        Ok(self.health_checker.check_and_record(&spoke).await)
    }

    /// 向指定集群的spoke发送请求，响应不做解码
    pub async fn send(
        &self,
        cluster_id: &str,
        path: &str,
        method: Method,
        payload: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let spoke = self.require_spoke(cluster_id)?;
        let url = self.build_url(&spoke.fqdn, path);

        let mut request = SpokeRequest::new(method, url);
        if let Some(payload) = payload {
            request = request.json(payload)?;
        }

        debug!(
            "Sending {} {} to spoke {}",
            request.method, request.url, cluster_id
        );
        self.transport
            .execute_with_retry(&request, &self.cancel)
            .await
    }

    /// 按客户端的协议拼接URL
    pub fn build_url(&self, fqdn: &str, path: &str) -> String {
        fqdn::build_url(&self.config.protocol, fqdn, path)
    }

    /// 按客户端的配置生成FQDN
    pub fn generate_fqdn(&self, cluster_id: &str) -> Result<String> {
        fqdn::generate_fqdn(&self.config, cluster_id)
    }

    /// 获取健康统计信息
    pub fn health_summary(&self) -> HealthSummary {
        self.health_checker.health_summary()
    }

    pub fn config(&self) -> &SpokeConfig {
        &self.config
    }

    /// 根取消信号，调用方可以据此感知客户端关闭
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn require_spoke(&self, cluster_id: &str) -> Result<SpokeRecord> {
        self.get_spoke(cluster_id)
            .ok_or_else(|| SpokeError::NotFound(cluster_id.to_string()))
    }
}
