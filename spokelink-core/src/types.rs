use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 新发现spoke的初始状态，仅供展示
pub const SPOKE_STATUS_UNKNOWN: &str = "unknown";

/// 目录中的spoke连接记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokeRecord {
    pub cluster_id: String,
    pub zone_id: String,
    pub fqdn: String,
    /// 仅供展示，不参与任何决策
    pub status: String,
    pub last_seen: DateTime<Utc>,
    pub enabled: bool,
}

impl SpokeRecord {
    /// 创建新发现的spoke记录（状态为unknown，默认启用）
    pub fn discovered(cluster_id: String, zone_id: String, fqdn: String) -> Self {
        Self {
            cluster_id,
            zone_id,
            fqdn,
            status: SPOKE_STATUS_UNKNOWN.to_string(),
            last_seen: Utc::now(),
            enabled: true,
        }
    }
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个spoke的健康检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub cluster_id: String,
    pub status: HealthStatus,
    pub fqdn: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 收到响应时的往返延迟
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl HealthRecord {
    pub fn healthy(spoke: &SpokeRecord, latency_ms: u64) -> Self {
        Self {
            cluster_id: spoke.cluster_id.clone(),
            status: HealthStatus::Healthy,
            fqdn: spoke.fqdn.clone(),
            timestamp: Utc::now(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn unhealthy(spoke: &SpokeRecord, error: String, latency_ms: Option<u64>) -> Self {
        Self {
            cluster_id: spoke.cluster_id.clone(),
            status: HealthStatus::Unhealthy,
            fqdn: spoke.fqdn.clone(),
            timestamp: Utc::now(),
            error: Some(error),
            latency_ms,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
