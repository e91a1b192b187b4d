use thiserror::Error;

/// spoke客户端错误类型
#[derive(Error, Debug)]
pub enum SpokeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid spoke entry '{entry}': {reason}")]
    InvalidSpokeEntry { entry: String, reason: String },
    #[error("domain suffix is required to generate FQDN for cluster {0}")]
    MissingDomainSuffix(String),
    #[error("unresolved placeholder in FQDN template: {0}")]
    UnresolvedTemplate(String),
    #[error("spoke not found for cluster {0}")]
    NotFound(String),
    #[error("HTTP request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
        retryable: bool,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("retryable status code: {status}")]
    RetryableStatus { status: u16 },
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SpokeError>,
    },
    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl SpokeError {
    /// 只有超时和瞬时网络错误可重试，取消永远不可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SpokeError::Transport { retryable, .. } => *retryable,
            SpokeError::RetryableStatus { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SpokeError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpokeError::Cancelled)
    }

    /// 错误类型标签，用于日志
    pub fn error_type(&self) -> &'static str {
        match self {
            SpokeError::Config(_)
            | SpokeError::InvalidSpokeEntry { .. }
            | SpokeError::MissingDomainSuffix(_)
            | SpokeError::UnresolvedTemplate(_) => "configuration",
            SpokeError::NotFound(_) => "not_found",
            SpokeError::Transport { .. } => "transport",
            SpokeError::Cancelled => "cancelled",
            SpokeError::RetryableStatus { .. } => "retryable_status",
            SpokeError::RetriesExhausted { .. } => "retries_exhausted",
            SpokeError::Serialization(_) => "serialization",
            SpokeError::Client(_) => "client",
        }
    }
}

impl From<reqwest::Error> for SpokeError {
    fn from(err: reqwest::Error) -> Self {
        // builder错误（如非法URL）重试也不会成功
        let retryable =
            !err.is_builder() && (err.is_timeout() || err.is_connect() || err.is_request());
        SpokeError::Transport {
            source: err,
            retryable,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpokeError>;
