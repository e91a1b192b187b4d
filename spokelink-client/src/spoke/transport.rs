use bytes::Bytes;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use spokelink_core::{Result, RetrySettings, SpokeConfig, SpokeError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 抖动幅度：±10%
const JITTER_RATIO: f64 = 0.1;

/// 可重发的请求描述，body在构造时完整缓冲
#[derive(Debug, Clone)]
pub struct SpokeRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl SpokeRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// 序列化JSON payload 并设置 `Content-Type: application/json`
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    fn to_request_builder(&self, client: &Client) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            // Bytes克隆只增加引用计数
            builder = builder.body(body.clone());
        }
        builder
    }
}

/// 退避策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter_enabled: settings.jitter_enabled,
        }
    }

    /// 总尝试次数
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// `min(initial_delay × multiplier^attempt, max_delay)`，不含抖动
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_nanos =
            self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_nanos.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped.round() as u64)
    }

    /// 第 `attempt` 次重试前的等待时间（启用时带抖动）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if !self.jitter_enabled {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        delay.mul_f64(factor)
    }
}

/// 只有限流和网关类5xx状态码值得重试
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// 带重试的HTTP传输层
/// 健康检查和临时调用共享同一个连接池
pub struct ResilientTransport {
    client: Client,
    policy: RetryPolicy,
}

impl ResilientTransport {
    /// 按配置创建传输层，TLS信任策略在此固定
    pub fn new(config: &SpokeConfig) -> Result<Self> {
        if config.tls.skip_verify {
            warn!("TLS certificate verification is disabled for spoke connections");
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.tls.enabled && config.tls.skip_verify)
            .build()
            .map_err(|e| SpokeError::Client(e.to_string()))?;

        Ok(Self::with_client(
            client,
            RetryPolicy::from_settings(&config.retry),
        ))
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 执行请求，按策略重试
    ///
    /// 重试关闭时只尝试一次，结果原样返回。取消不会被重试。
    pub async fn execute_with_retry(
        &self,
        request: &SpokeRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if !self.policy.enabled {
            return self.execute_once(request, cancel).await;
        }

        let max_attempts = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                debug!(
                    "Waiting {}ms before attempt {} to {}",
                    delay.as_millis(),
                    attempt + 1,
                    request.url
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SpokeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.execute_once(request, cancel).await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        return Ok(response);
                    }

                    warn!(
                        "Request to {} returned {} on attempt {}/{}",
                        request.url,
                        status,
                        attempt + 1,
                        max_attempts
                    );
                    // 丢弃响应体，连接可以回到连接池
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SpokeError::Cancelled),
                        _ = response.bytes() => {}
                    }
                    last_error = Some(SpokeError::RetryableStatus {
                        status: status.as_u16(),
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Request to {} failed on attempt {}/{}: {}",
                        request.url,
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(last) => Err(SpokeError::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(last),
            }),
            None => Err(SpokeError::Client(format!(
                "no attempts were made for {}",
                request.url
            ))),
        }
    }

    /// 单次尝试，根取消信号触发时立即返回
    async fn execute_once(
        &self,
        request: &SpokeRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(SpokeError::Cancelled);
        }

        let send = request.to_request_builder(&self.client).send();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SpokeError::Cancelled),
            result = send => result.map_err(SpokeError::from),
        }
    }
}
