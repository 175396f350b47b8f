use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("{agent} reached its limit of {max_turns} turns with tool calls still pending")]
    TurnLimit { agent: String, max_turns: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn api(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failed request, reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    RateLimited,
    Provider,
    Network,
    Malformed,
    TurnLimit,
    Terminal,
}

impl FailureKind {
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Api {
                status_code: Some(401 | 403),
                ..
            } => Self::Authentication,
            Error::RateLimit { .. }
            | Error::Api {
                status_code: Some(429),
                ..
            } => Self::RateLimited,
            Error::Api { .. } | Error::Config(_) => Self::Provider,
            Error::Http(_) => Self::Network,
            Error::Parse(_) | Error::Stream(_) => Self::Malformed,
            Error::TurnLimit { .. } => Self::TurnLimit,
            Error::Io(_) => Self::Terminal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Provider => write!(f, "provider"),
            Self::Network => write!(f, "network"),
            Self::Malformed => write!(f, "malformed response"),
            Self::TurnLimit => write!(f, "turn limit"),
            Self::Terminal => write!(f, "output"),
        }
    }
}

/// A request that failed after the error was logged and shown to the operator.
#[derive(Debug, Error)]
#[error("{operation}: {source}")]
pub struct RequestError {
    pub operation: &'static str,
    pub kind: FailureKind,
    #[source]
    pub source: Error,
}

impl RequestError {
    pub fn new(operation: &'static str, source: Error) -> Self {
        Self {
            operation,
            kind: FailureKind::of(&source),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert_eq!(
            FailureKind::of(&Error::api_with_status("api.groq.com", "bad key", 401)),
            FailureKind::Authentication
        );
        assert_eq!(
            FailureKind::of(&Error::api_with_status("api.groq.com", "slow down", 429)),
            FailureKind::RateLimited
        );
        assert_eq!(
            FailureKind::of(&Error::RateLimit {
                platform: "api.groq.com".into(),
                retry_after_secs: Some(3),
            }),
            FailureKind::RateLimited
        );
        assert_eq!(
            FailureKind::of(&Error::api_with_status("api.groq.com", "model gone", 404)),
            FailureKind::Provider
        );
        assert_eq!(
            FailureKind::of(&Error::http("connection refused")),
            FailureKind::Network
        );
        assert_eq!(
            FailureKind::of(&Error::stream("truncated")),
            FailureKind::Malformed
        );
        assert_eq!(
            FailureKind::of(&Error::TurnLimit {
                agent: "Market Analysis Team".into(),
                max_turns: 10,
            }),
            FailureKind::TurnLimit
        );
    }

    #[test]
    fn request_error_message_carries_operation() {
        let err = RequestError::new("Error analyzing asset", Error::http("timed out"));
        assert_eq!(err.kind, FailureKind::Network);
        assert_eq!(err.to_string(), "Error analyzing asset: HTTP error: timed out");
    }
}
