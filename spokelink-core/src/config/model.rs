use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// spoke客户端配置，构造后不可变
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpokeConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub tls: TlsSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub health_check: HealthCheckSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_host_pattern")]
    pub host_pattern: String,
    #[serde(default)]
    pub domain_suffix: String,
    #[serde(default = "default_fqdn_template")]
    pub fqdn_template: String,
    /// 按集群ID覆盖FQDN，优先于模板
    #[serde(default)]
    pub custom_fqdns: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TlsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub skip_verify: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscoverySettings {
    #[serde(default)]
    pub source: DiscoverySource,
    /// 逗号分隔的 `clusterID:zoneID[:fqdn]` 列表
    #[serde(default)]
    pub spoke_list: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthCheckSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_check_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_health_check_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_health_check_path")]
    pub path: String,
}

/// 重试配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter_enabled: bool,
}

/// 发现来源
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// 从 spoke_list（通常来自 SPOKE_LIST 环境变量）解析
    #[default]
    Environment,
    Database,
    Crd,
    /// 静态配置文件
    Config,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Environment => "environment",
            DiscoverySource::Database => "database",
            DiscoverySource::Crd => "crd",
            DiscoverySource::Config => "config",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoverySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "environment" => Ok(DiscoverySource::Environment),
            "database" => Ok(DiscoverySource::Database),
            "crd" => Ok(DiscoverySource::Crd),
            "config" => Ok(DiscoverySource::Config),
            other => anyhow::bail!("Unknown discovery source '{}'", other),
        }
    }
}

impl Default for SpokeConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            timeout_seconds: default_request_timeout(),
            tls: TlsSettings::default(),
            discovery: DiscoverySettings::default(),
            health_check: HealthCheckSettings::default(),
            retry: RetrySettings::default(),
            host_pattern: default_host_pattern(),
            domain_suffix: String::new(),
            fqdn_template: default_fqdn_template(),
            custom_fqdns: HashMap::new(),
        }
    }
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_verify: false,
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            source: DiscoverySource::default(),
            spoke_list: String::new(),
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_health_check_interval(),
            timeout_seconds: default_health_check_timeout(),
            path: default_health_check_path(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_enabled: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    10
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000 // 最长退避5秒
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_host_pattern() -> String {
    "spoke-agent".to_string()
}

fn default_fqdn_template() -> String {
    "{{.HostPattern}}.{{.ClusterID}}.{{.DomainSuffix}}".to_string()
}

/// 环境变量覆盖项
pub const ENV_SPOKE_LIST: &str = "SPOKE_LIST";
pub const ENV_DOMAIN_SUFFIX: &str = "SPOKE_DOMAIN_SUFFIX";
pub const ENV_DISCOVERY_SOURCE: &str = "SPOKE_DISCOVERY_SOURCE";

impl SpokeConfig {
    /// 单次调用超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.refresh_interval_seconds)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check.interval_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check.timeout_seconds)
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_with(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数覆盖配置，空值视为未设置
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(list) = lookup(ENV_SPOKE_LIST) {
            tracing::debug!("Using spoke list from {}", ENV_SPOKE_LIST);
            self.discovery.spoke_list = list;
        }
        if let Some(suffix) = lookup(ENV_DOMAIN_SUFFIX) {
            self.domain_suffix = suffix.trim().to_string();
        }
        if let Some(source) = lookup(ENV_DISCOVERY_SOURCE) {
            self.discovery.source = source.parse()?;
        }

        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.protocol != "http" && self.protocol != "https" {
            anyhow::bail!(
                "Invalid protocol '{}'. Must be 'http' or 'https'",
                self.protocol
            );
        }

        if self.timeout_seconds == 0 {
            anyhow::bail!("Invalid timeout_seconds: cannot be 0");
        }

        if self.discovery.refresh_interval_seconds == 0 {
            anyhow::bail!("Invalid discovery.refresh_interval_seconds: cannot be 0");
        }

        self.validate_health_check()?;
        self.validate_retry()?;

        if self.fqdn_template.trim().is_empty() {
            anyhow::bail!("fqdn_template cannot be empty");
        }

        for (cluster_id, fqdn) in &self.custom_fqdns {
            if fqdn.trim().is_empty() {
                anyhow::bail!("custom_fqdns entry for cluster '{}' is empty", cluster_id);
            }
        }

        if self.protocol == "https" && !self.tls.enabled {
            tracing::warn!("Protocol is https but tls.enabled is false; TLS settings will still apply");
        }

        Ok(())
    }

    fn validate_health_check(&self) -> Result<()> {
        let health = &self.health_check;

        // 按需检查不受 enabled 影响，timeout 和 path 总是会用到
        if health.timeout_seconds == 0 {
            anyhow::bail!("Invalid health_check.timeout_seconds: cannot be 0");
        }

        if health.path.trim().is_empty() {
            anyhow::bail!("health_check.path cannot be empty");
        }

        if health.enabled && health.interval_seconds == 0 {
            anyhow::bail!("Invalid health_check.interval_seconds: cannot be 0");
        }

        Ok(())
    }

    fn validate_retry(&self) -> Result<()> {
        let retry = &self.retry;
        if !retry.enabled {
            return Ok(());
        }

        if retry.max_delay_ms < retry.initial_delay_ms {
            anyhow::bail!(
                "Invalid retry settings: max_delay_ms ({}) is less than initial_delay_ms ({})",
                retry.max_delay_ms,
                retry.initial_delay_ms
            );
        }

        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "Invalid retry.backoff_multiplier: {} (must be >= 1.0)",
                retry.backoff_multiplier
            );
        }

        Ok(())
    }
}
