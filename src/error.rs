//! Normalized error taxonomy.
//!
//! Every error that crosses an adapter, middleware, bridge, or router
//! boundary is a [`GatewayError`]. Its `code` determines its `category` and
//! `is_retryable` classification; HTTP-origin errors are constructed
//! deterministically from `(status, status_text, body)` via
//! [`GatewayError::from_http`]. One enum covers every provider instead of a
//! separate error type per adapter, since the taxonomy is a cross-cutting
//! concern, not a provider-specific one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::ir::Provenance;

/// Broad error category, derived from [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    RateLimit,
    Validation,
    Provider,
    Adapter,
    Network,
    Stream,
    Router,
    Middleware,
    Unknown,
}

/// Specific error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Authentication
    InvalidApiKey,
    MissingApiKey,
    ExpiredApiKey,
    // Authorization
    InsufficientPermissions,
    QuotaExceeded,
    // Rate limit
    RateLimitExceeded,
    // Validation
    InvalidRequest,
    InvalidMessageFormat,
    InvalidParameters,
    UnsupportedModel,
    UnsupportedFeature,
    ContextLengthExceeded,
    // Provider
    ProviderError,
    ProviderUnavailable,
    ProviderTimeout,
    ProviderOverloaded,
    // Adapter
    AdapterConversionError,
    AdapterValidationError,
    UnsupportedConversion,
    SemanticDriftError,
    // Network
    NetworkError,
    ConnectionTimeout,
    DnsResolutionFailed,
    // Stream
    StreamError,
    StreamInterrupted,
    StreamParseError,
    StreamCancelled,
    // Router
    NoBackendAvailable,
    RoutingFailed,
    AllBackendsFailed,
    // Middleware
    MiddlewareError,
    // Unknown
    InternalError,
    UnknownError,
}

impl ErrorCode {
    pub fn category(self) -> ErrorCategory {
        use ErrorCategory as C;
        use ErrorCode::*;
        match self {
            InvalidApiKey | MissingApiKey | ExpiredApiKey => C::Authentication,
            InsufficientPermissions | QuotaExceeded => C::Authorization,
            RateLimitExceeded => C::RateLimit,
            InvalidRequest | InvalidMessageFormat | InvalidParameters | UnsupportedModel
            | UnsupportedFeature | ContextLengthExceeded => C::Validation,
            ProviderError | ProviderUnavailable | ProviderTimeout | ProviderOverloaded => {
                C::Provider
            }
            AdapterConversionError | AdapterValidationError | UnsupportedConversion
            | SemanticDriftError => C::Adapter,
            NetworkError | ConnectionTimeout | DnsResolutionFailed => C::Network,
            StreamError | StreamInterrupted | StreamParseError | StreamCancelled => C::Stream,
            NoBackendAvailable | RoutingFailed | AllBackendsFailed => C::Router,
            MiddlewareError => C::Middleware,
            InternalError | UnknownError => C::Unknown,
        }
    }

    /// Default retryability. `RateLimitExceeded` and `AllBackendsFailed` are
    /// always retryable; `StreamInterrupted` is the one stream kind that is;
    /// provider 5xx-class errors are context-dependent and use
    /// [`GatewayError::is_retryable`] instead.
    pub fn default_retryable(self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            RateLimitExceeded
                | ProviderError
                | ProviderUnavailable
                | ProviderTimeout
                | ProviderOverloaded
                | NetworkError
                | ConnectionTimeout
                | DnsResolutionFailed
                | StreamInterrupted
                | AllBackendsFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Extra data carried by a `rate_limit_exceeded` error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub retry_after: Option<u64>,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A normalized gateway error. Carries enough context (`code`, `category`,
/// `is_retryable`, `provenance`, optional `cause`/`ir_state`) that the
/// outermost Bridge call can surface it unchanged to the caller — errors are
/// a cross-cutting concern carried outside the dialect envelope, never
/// translated back into a provider-specific shape.
#[derive(Debug, thiserror::Error)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub is_retryable: bool,
    pub provenance: Provenance,
    pub rate_limit: Option<RateLimitInfo>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Opaque snapshot of the request/partial-response at failure time, for
    /// diagnostics.
    pub ir_state: Option<Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.category(), self.message)
    }
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            is_retryable: code.default_retryable(),
            provenance: Provenance::default(),
            rate_limit: None,
            cause: None,
            ir_state: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.is_retryable = retryable;
        self
    }

    pub fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    pub fn with_ir_state(mut self, state: Value) -> Self {
        self.ir_state = Some(state);
        self
    }

    // ---- Common constructors, one per frequently-raised error kind. ----

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn invalid_message_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidMessageFormat, message)
    }

    pub fn adapter_conversion_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AdapterConversionError, message)
    }

    pub fn unsupported_feature(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedFeature, message)
    }

    pub fn no_backend_available(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoBackendAvailable, message)
    }

    pub fn all_backends_failed(attempted: &[String], cause: GatewayError) -> Self {
        let message = format!("all backends failed, attempted: {}", attempted.join(", "));
        Self::new(ErrorCode::AllBackendsFailed, message).with_cause(cause)
    }

    pub fn middleware_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MiddlewareError, message)
    }

    pub fn stream_cancelled() -> Self {
        Self::new(ErrorCode::StreamCancelled, "stream cancelled")
    }

    pub fn stream_parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StreamParseError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Deterministic mapping from an HTTP response to a normalized error:
    /// 401→invalid_api_key, 403→insufficient_permissions, 429→rate_limit_exceeded
    /// (with Retry-After parsing), 400→invalid_request, ≥500→provider_error
    /// (retryable), otherwise a generic provider error with
    /// `is_retryable = status >= 500`.
    pub fn from_http(status: u16, status_text: &str, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {status} {status_text}")
        } else {
            format!("HTTP {status} {status_text}: {body}")
        };
        match status {
            401 => Self::new(ErrorCode::InvalidApiKey, message),
            403 => Self::new(ErrorCode::InsufficientPermissions, message),
            429 => {
                let retry_after = parse_retry_after(body);
                Self::new(ErrorCode::RateLimitExceeded, message)
                    .with_rate_limit(RateLimitInfo {
                        retry_after,
                        ..Default::default()
                    })
                    .with_retryable(true)
            }
            400 => Self::new(ErrorCode::InvalidRequest, message),
            s if s >= 500 => Self::new(ErrorCode::ProviderError, message).with_retryable(true),
            s => Self::new(ErrorCode::ProviderError, message).with_retryable(s >= 500),
        }
    }
}

/// Parses a `retry_after` hint out of a JSON error body's `error.retry_after`
/// or `retry_after` field, falling back to `None`. HTTP `Retry-After` header
/// parsing (seconds or HTTP-date) lives in [`crate::backends::http_util`]
/// where the header is actually available.
fn parse_retry_after(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after")
        .or_else(|| value.get("error").and_then(|e| e.get("retry_after")))
        .and_then(Value::as_u64)
}

pub type GatewayResult<T> = Result<T, GatewayError>;
