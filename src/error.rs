use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttestError {
    #[error("no provider serves model '{0}'")]
    ModelNotFound(String),

    #[error("deadline exceeded after {0}ms")]
    Timeout(u64),

    #[error("{provider} is throttling requests")]
    RateLimited { provider: String },

    #[error("{provider} sent back nothing usable")]
    Empty { provider: String },

    #[error("response could not be decoded: {0}")]
    Malformed(String),

    #[error("{provider} answered with an error: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("{provider} rejected the configured credentials: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("could not resolve location: {0}")]
    InvalidLocation(String),

    #[error("historical weather requires an explicit date")]
    HistoricalDateRequired,

    #[error("no evidence collected for claim")]
    NoEvidence,

    #[error("helper exited with status {code}: {stderr}")]
    ProcessExit { code: i32, stderr: String },

    #[error("transport failure: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AttestError {
    /// Which provider this error is attributable to, for fallback-chain
    /// bookkeeping (a rate-limited provider gets its remaining models
    /// skipped). Variants with no upstream attribution yield None.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider } => Some(provider),
            Self::Empty { provider } => Some(provider),
            Self::Upstream { provider, .. } => Some(provider),
            Self::AuthFailed { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// True for failures a fallback chain absorbs by advancing to the next
    /// model: timeout, rate limit, empty text, unparseable JSON.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Empty { .. } | Self::Malformed(_)
        )
    }

    /// Client-facing rendering of this error. Endpoints, credentials, and
    /// raw upstream bodies stay on the server side of the RPC boundary;
    /// the caller only learns what failed and whether retrying can help.
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelNotFound(model) => format!("no provider serves model '{model}'"),
            Self::Timeout(ms) => format!("the call gave up after {ms}ms"),
            Self::RateLimited { provider } => {
                format!("{provider} is throttling — retry in a little while")
            }
            Self::Empty { provider } => format!("{provider} sent back nothing usable"),
            Self::Malformed(_) => "the provider response could not be decoded".to_string(),
            Self::Upstream { provider, .. } => {
                format!("{provider} reported an internal problem")
            }
            Self::AuthFailed { provider, .. } => {
                format!("credentials for {provider} were rejected")
            }
            Self::InvalidLocation(name) => format!("could not resolve location '{name}'"),
            Self::HistoricalDateRequired => {
                "historical weather requires an explicit date".to_string()
            }
            Self::NoEvidence => "no evidence could be collected".to_string(),
            Self::ProcessExit { code, .. } => {
                format!("the weather helper exited with status {code}")
            }
            Self::Request(_) => "could not reach the provider".to_string(),
            Self::Io(_) => "local storage error".to_string(),
            Self::Other(_) => "unexpected internal error".to_string(),
        }
    }
}

/// Classify an error into a short reason token for logs and L1 statuses.
pub fn error_reason(e: &AttestError) -> &'static str {
    match e {
        AttestError::Timeout(_) => "timeout",
        AttestError::RateLimited { .. } => "rate_limited",
        AttestError::Empty { .. } => "empty",
        AttestError::Malformed(_) => "malformed",
        AttestError::AuthFailed { .. } => "auth_failed",
        AttestError::InvalidLocation(_) => "invalid_location",
        AttestError::HistoricalDateRequired => "historical_date_required",
        AttestError::NoEvidence => "no_evidence",
        AttestError::ModelNotFound(_) => "model_not_found",
        AttestError::ProcessExit { .. } => "process_exit",
        _ => "error",
    }
}
