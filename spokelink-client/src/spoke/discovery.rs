use super::fqdn::generate_fqdn;
use async_trait::async_trait;
use parking_lot::RwLock;
use spokelink_core::{DiscoverySource, Result, SpokeConfig, SpokeError, SpokeRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// spoke目录：集群ID -> 连接记录，每次发现成功后整体替换
pub type SpokeDirectory = Arc<RwLock<HashMap<String, SpokeRecord>>>;

/// 发现策略
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// 策略名称，用于日志
    fn name(&self) -> &'static str;

    /// 返回完整的spoke集合；`Ok(None)` 表示来源未就绪，目录保持不变
    async fn discover(&self, config: &SpokeConfig) -> Result<Option<Vec<SpokeRecord>>>;
}

/// 从 `clusterID:zoneID[:fqdn]` 列表解析spoke
pub struct EnvironmentDiscovery;

#[async_trait]
impl DiscoveryStrategy for EnvironmentDiscovery {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn discover(&self, config: &SpokeConfig) -> Result<Option<Vec<SpokeRecord>>> {
        parse_spoke_list(&config.discovery.spoke_list, config).map(Some)
    }
}

/// 尚未实现的来源（database / crd / config），只记录日志
pub struct PendingDiscovery {
    source: DiscoverySource,
}

#[async_trait]
impl DiscoveryStrategy for PendingDiscovery {
    fn name(&self) -> &'static str {
        self.source.as_str()
    }

    async fn discover(&self, _config: &SpokeConfig) -> Result<Option<Vec<SpokeRecord>>> {
        warn!(
            "Discovery source '{}' is not implemented, keeping current spoke directory",
            self.source
        );
        Ok(None)
    }
}

/// 根据配置的来源选择发现策略
pub fn strategy_for(source: DiscoverySource) -> Box<dyn DiscoveryStrategy> {
    match source {
        DiscoverySource::Environment => Box::new(EnvironmentDiscovery),
        other => Box::new(PendingDiscovery { source: other }),
    }
}

/// 解析spoke列表
///
/// 任何一个条目格式错误都会让整批失败，不会返回部分结果。
pub fn parse_spoke_list(list: &str, config: &SpokeConfig) -> Result<Vec<SpokeRecord>> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }

    let mut spokes: Vec<SpokeRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        // 第三个字段可以带端口，因此最多切成三段
        let parts: Vec<&str> = entry.splitn(3, ':').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(invalid_entry(entry, "expected clusterID:zoneID[:fqdn]"));
        }

        let cluster_id = parts[0];
        let zone_id = parts[1];
        if cluster_id.is_empty() {
            return Err(invalid_entry(entry, "cluster ID is empty"));
        }
        if zone_id.is_empty() {
            return Err(invalid_entry(entry, "zone ID is empty"));
        }

        let fqdn = match parts.get(2) {
            Some(fqdn) if !fqdn.is_empty() => fqdn.to_string(),
            _ => generate_fqdn(config, cluster_id)?,
        };

        debug!("Parsed spoke {} (zone: {}, fqdn: {})", cluster_id, zone_id, fqdn);
        let spoke = SpokeRecord::discovered(cluster_id.to_string(), zone_id.to_string(), fqdn);

        match positions.get(cluster_id) {
            Some(&index) => {
                warn!("Duplicate spoke entry for cluster {}, later entry wins", cluster_id);
                spokes[index] = spoke;
            }
            None => {
                positions.insert(cluster_id.to_string(), spokes.len());
                spokes.push(spoke);
            }
        }
    }

    Ok(spokes)
}

fn invalid_entry(entry: &str, reason: &str) -> SpokeError {
    SpokeError::InvalidSpokeEntry {
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}

/// 发现引擎
/// 构建并定期刷新spoke目录
pub struct DiscoveryEngine {
    config: Arc<SpokeConfig>,
    strategy: Box<dyn DiscoveryStrategy>,
    directory: SpokeDirectory,
}

impl DiscoveryEngine {
    /// 按配置的来源创建发现引擎
    pub fn new(config: Arc<SpokeConfig>, directory: SpokeDirectory) -> Self {
        let strategy = strategy_for(config.discovery.source);
        Self::with_strategy(config, directory, strategy)
    }

    /// 使用自定义策略创建发现引擎
    pub fn with_strategy(
        config: Arc<SpokeConfig>,
        directory: SpokeDirectory,
        strategy: Box<dyn DiscoveryStrategy>,
    ) -> Self {
        Self {
            config,
            strategy,
            directory,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// 执行一次发现，成功时整体替换目录，返回目录中的spoke数量
    ///
    /// 失败时目录保持上一次成功的结果。
    pub async fn discover(&self) -> Result<usize> {
        debug!("Running spoke discovery using '{}' source", self.strategy.name());

        let Some(spokes) = self.strategy.discover(&self.config).await? else {
            return Ok(self.directory.read().len());
        };

        let directory: HashMap<String, SpokeRecord> = spokes
            .into_iter()
            .map(|spoke| (spoke.cluster_id.clone(), spoke))
            .collect();
        let count = directory.len();

        *self.directory.write() = directory;

        info!(
            "Spoke directory refreshed from '{}' source: {} spokes",
            self.strategy.name(),
            count
        );
        Ok(count)
    }

    /// 定期刷新目录，直到取消
    ///
    /// 第一次刷新在一个周期之后，启动时的同步发现由调用方负责。
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.refresh_interval();
        info!("Starting discovery refresh loop with interval: {:?}", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Discovery refresh loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.discover().await {
                        error!(
                            "Spoke discovery failed ({}), keeping previous directory: {}",
                            e.error_type(),
                            e
                        );
                    }
                }
            }
        }
    }
}
