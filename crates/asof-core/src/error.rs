use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    AuthenticationMissing,
    ConfigParseError,
    InvalidInstant,
    TooManyResults,
    InvalidSelection,
    MalformedRevision,
    TransportError,
    UpstreamDecode,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AuthenticationMissing => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidInstant => "E1003",
            Self::TooManyResults => "E2001",
            Self::InvalidSelection => "E2002",
            Self::MalformedRevision => "E3001",
            Self::TransportError => "E4001",
            Self::UpstreamDecode => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::AuthenticationMissing => "Missing Azure DevOps personal access token",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidInstant => "Invalid as-of instant",
            Self::TooManyResults => "Too many work items",
            Self::InvalidSelection => "Invalid work item selection",
            Self::MalformedRevision => "Malformed revision skipped",
            Self::TransportError => "Upstream request failed",
            Self::UpstreamDecode => "Unexpected upstream response",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::AuthenticationMissing => {
                Some("Pass --pat or set AZURE_DEVOPS_PAT before running a comparison.")
            }
            Self::ConfigParseError => Some("Fix syntax in .asof.toml or the user config and retry."),
            Self::InvalidInstant => {
                Some("Use a calendar date (2024-02-01) or an RFC 3339 timestamp.")
            }
            Self::TooManyResults => Some(
                "Narrow the query (e.g. by type, date, or iteration) so fewer items match.",
            ),
            Self::InvalidSelection => Some("Provide --project, --team and --iteration."),
            Self::MalformedRevision => None,
            Self::TransportError => {
                Some("Check network access and the organization name; retry if rate limited.")
            }
            Self::UpstreamDecode => Some("Check that the organization URL points at Azure DevOps."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by selection, transport and configuration layers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsofError {
    /// No credential was supplied; nothing has been fetched.
    #[error("missing Azure DevOps personal access token")]
    AuthenticationMissing,

    /// The upstream refused the query because it matches too many items.
    #[error("too many work items match the query: {upstream_message}")]
    TooManyResults { upstream_message: String },

    /// Network failure or non-success upstream status.
    #[error("upstream request failed{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        detail: String,
        retryable: bool,
    },

    /// The upstream answered with a body we could not interpret.
    #[error("could not decode {context}: {detail}")]
    Decode { context: String, detail: String },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid instant '{0}'")]
    InvalidInstant(String),

    #[error("config error: {0}")]
    Config(String),
}

impl AsofError {
    /// Build a transport error from a status code and response body.
    ///
    /// 429 and 5xx responses are marked retryable; the core never retries
    /// on its own.
    #[must_use]
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            detail: detail.into(),
            retryable: status == 429 || status >= 500,
        }
    }

    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::AuthenticationMissing => ErrorCode::AuthenticationMissing,
            Self::TooManyResults { .. } => ErrorCode::TooManyResults,
            Self::Transport { .. } => ErrorCode::TransportError,
            Self::Decode { .. } => ErrorCode::UpstreamDecode,
            Self::InvalidSelection(_) => ErrorCode::InvalidSelection,
            Self::InvalidInstant(_) => ErrorCode::InvalidInstant,
            Self::Config(_) => ErrorCode::ConfigParseError,
        }
    }

    /// Remediation text for terminal and JSON error output.
    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Transport {
                retryable: true, ..
            } => "The upstream is rate limiting or unavailable; retry later.".to_string(),
            other => other
                .error_code()
                .hint()
                .unwrap_or("No remediation available.")
                .to_string(),
        }
    }

    /// Returns true when a caller-driven retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            }
        )
    }
}

pub type Result<T, E = AsofError> = std::result::Result<T, E>;
