//! Closed error taxonomy for bot framework failures
//!
//! Every domain failure is one concrete kind from a closed set
//! ([`ErrorKind`]), carried by a single error type ([`BotError`]) with a
//! shared payload shape: stable string code, human message, supplementary
//! context map, and creation timestamp. Kind-specific required fields live in
//! a per-kind extension record ([`ErrorDetails`]) rather than a class
//! hierarchy, which preserves catch-by-kind ergonomics without virtual
//! dispatch.
//!
//! # Contracts
//!
//! - Construction never fails.
//! - `code` uniquely determines the extension record's shape.
//! - `context` is supplementary; no control-flow decision may depend on it.
//! - The only kind with retry semantics is `Connection`, whose `retryable`
//!   flag is an advisory hint consumed by retry predicates; the taxonomy
//!   itself never enforces it.
//!
//! # Surfaces
//!
//! - Short display form `"[<code>] <message>"` for end-user-facing contexts.
//! - [`BotError::to_record`] for logs and telemetry: the full structured
//!   export as a single serializable record.
//!
//! # Example
//!
//! ```rust,ignore
//! let err = BotError::connection("gateway closed the socket", true)
//!     .with_context("endpoint", "wss://gateway.example.com");
//!
//! assert_eq!(err.to_string(), "[CONNECTION_ERROR] gateway closed the socket");
//! assert!(err.is_retryable());
//! ```

pub mod manager;
pub mod serde_util;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use self::serde_util::duration_millis;

/// The closed set of failure kinds.
///
/// `Copy + Eq + Hash` so a kind can key the dispatch registry directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid or missing configuration
    Config,
    /// Plugin loading or execution failures
    Plugin,
    /// Platform adapter failures
    Adapter,
    /// Connectivity failures toward a chat platform
    Connection,
    /// Message parsing or delivery failures
    Message,
    /// Session/context access failures
    Context,
    /// Input validation failures
    Validation,
    /// Missing permission for an operation
    Permission,
    /// An operation exceeded its deadline
    Timeout,
}

impl ErrorKind {
    /// Stable string code identifying this kind.
    ///
    /// One code per taxonomy leaf; the code uniquely determines the shape of
    /// the kind's extension record.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Plugin => "PLUGIN_ERROR",
            Self::Adapter => "ADAPTER_ERROR",
            Self::Connection => "CONNECTION_ERROR",
            Self::Message => "MESSAGE_ERROR",
            Self::Context => "CONTEXT_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Permission => "PERMISSION_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind-specific extension record.
///
/// Kinds without required extra fields are unit variants; the rest carry
/// exactly the fields the taxonomy requires at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetails {
    /// No extension fields
    Config,
    /// The plugin that failed
    Plugin { plugin_name: String },
    /// The adapter and the bot it was serving
    Adapter { adapter_name: String, bot_name: String },
    /// Advisory hint that retrying the connection may succeed
    Connection { retryable: bool },
    /// No extension fields
    Message,
    /// No extension fields
    Context,
    /// No extension fields
    Validation,
    /// Who attempted the operation and what it required
    Permission { user_id: String, required_permission: String },
    /// How long the operation ran before the deadline
    Timeout {
        #[serde(with = "duration_millis", rename = "duration_ms")]
        duration: Duration,
    },
}

impl ErrorDetails {
    /// The kind this extension record belongs to.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config => ErrorKind::Config,
            Self::Plugin { .. } => ErrorKind::Plugin,
            Self::Adapter { .. } => ErrorKind::Adapter,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Message => ErrorKind::Message,
            Self::Context => ErrorKind::Context,
            Self::Validation => ErrorKind::Validation,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A domain failure: one taxonomy leaf plus the shared payload shape.
///
/// Immutable after construction; [`BotError::with_context`] is a builder
/// step that consumes and returns the value.
#[derive(Debug, Clone)]
pub struct BotError {
    message: String,
    details: ErrorDetails,
    context: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

/// Structured export of a [`BotError`] as a single record.
///
/// This is the full surface intended for logs and telemetry; user-facing
/// contexts should prefer the short display form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub details: ErrorDetails,
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl BotError {
    /// Create an error from a message and its kind extension record.
    ///
    /// Construction never fails; the timestamp is taken at creation.
    pub fn new<S: Into<String>>(message: S, details: ErrorDetails) -> Self {
        Self { message: message.into(), details, context: Map::new(), timestamp: Utc::now() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::new(message, ErrorDetails::Config)
    }

    /// Create a plugin error for a named plugin
    pub fn plugin<P: Into<String>, S: Into<String>>(plugin_name: P, message: S) -> Self {
        Self::new(message, ErrorDetails::Plugin { plugin_name: plugin_name.into() })
    }

    /// Create an adapter error for a named adapter and bot
    pub fn adapter<A: Into<String>, B: Into<String>, S: Into<String>>(
        adapter_name: A,
        bot_name: B,
        message: S,
    ) -> Self {
        Self::new(
            message,
            ErrorDetails::Adapter { adapter_name: adapter_name.into(), bot_name: bot_name.into() },
        )
    }

    /// Create a connection error with its advisory retry hint
    pub fn connection<S: Into<String>>(message: S, retryable: bool) -> Self {
        Self::new(message, ErrorDetails::Connection { retryable })
    }

    /// Create a message processing error.
    ///
    /// Named `message_error` because `message` is the payload getter.
    pub fn message_error<S: Into<String>>(message: S) -> Self {
        Self::new(message, ErrorDetails::Message)
    }

    /// Create a session/context access error.
    ///
    /// Named `context_error` because `context` is the payload getter.
    pub fn context_error<S: Into<String>>(message: S) -> Self {
        Self::new(message, ErrorDetails::Context)
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(message, ErrorDetails::Validation)
    }

    /// Create a permission error naming the user and the missing permission
    pub fn permission<U: Into<String>, P: Into<String>, S: Into<String>>(
        user_id: U,
        required_permission: P,
        message: S,
    ) -> Self {
        Self::new(
            message,
            ErrorDetails::Permission {
                user_id: user_id.into(),
                required_permission: required_permission.into(),
            },
        )
    }

    /// Create a timeout error carrying how long the operation ran
    pub fn timeout<S: Into<String>>(message: S, duration: Duration) -> Self {
        Self::new(message, ErrorDetails::Timeout { duration })
    }

    /// Attach a supplementary context entry (fluent API).
    ///
    /// Context never drives control-flow decisions; it exists for logs and
    /// telemetry only.
    pub fn with_context<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The taxonomy kind of this error
    pub const fn kind(&self) -> ErrorKind {
        self.details.kind()
    }

    /// The stable string code of this error's kind
    pub const fn code(&self) -> &'static str {
        self.details.kind().code()
    }

    /// The human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The kind-specific extension record
    pub const fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// The supplementary context map
    pub const fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// The creation instant
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether retrying is hinted to be appropriate.
    ///
    /// True only for `Connection` errors flagged retryable. The hint is
    /// advisory: retry predicates consume it, nothing enforces it.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.details, ErrorDetails::Connection { retryable: true })
    }

    /// Severity for monitoring and alerting decisions.
    pub const fn severity(&self) -> ErrorSeverity {
        match self.details {
            ErrorDetails::Config => ErrorSeverity::Error,
            ErrorDetails::Plugin { .. } => ErrorSeverity::Error,
            ErrorDetails::Adapter { .. } => ErrorSeverity::Error,
            ErrorDetails::Connection { .. } => ErrorSeverity::Warning,
            ErrorDetails::Message => ErrorSeverity::Warning,
            ErrorDetails::Context => ErrorSeverity::Error,
            ErrorDetails::Validation => ErrorSeverity::Error,
            ErrorDetails::Permission { .. } => ErrorSeverity::Warning,
            ErrorDetails::Timeout { .. } => ErrorSeverity::Warning,
        }
    }

    /// Export as a single structured record (code, message, extension
    /// fields, context, timestamp).
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().to_string(),
            message: self.message.clone(),
            details: self.details.clone(),
            context: self.context.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Convert to key-value pairs suitable for structured logging.
    pub fn as_tracing_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields =
            vec![("code", self.code().to_string()), ("message", self.message.clone())];

        match &self.details {
            ErrorDetails::Plugin { plugin_name } => {
                fields.push(("plugin_name", plugin_name.clone()));
            }
            ErrorDetails::Adapter { adapter_name, bot_name } => {
                fields.push(("adapter_name", adapter_name.clone()));
                fields.push(("bot_name", bot_name.clone()));
            }
            ErrorDetails::Connection { retryable } => {
                fields.push(("retryable", retryable.to_string()));
            }
            ErrorDetails::Permission { user_id, required_permission } => {
                fields.push(("user_id", user_id.clone()));
                fields.push(("required_permission", required_permission.clone()));
            }
            ErrorDetails::Timeout { duration } => {
                fields.push(("duration_ms", duration.as_millis().to_string()));
            }
            ErrorDetails::Config
            | ErrorDetails::Message
            | ErrorDetails::Context
            | ErrorDetails::Validation => {}
        }

        // Context keys are caller-supplied, so they are folded into a single
        // fixed field name.
        for (key, value) in &self.context {
            fields.push(("context", format!("{key}={value}")));
        }

        fields
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for BotError {}

/// Build a context map from string pairs, a convenience for call sites that
/// dispatch with ad-hoc context.
pub fn context_from<I, K, V>(entries: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Group a batch of errors by kind, preserving order within each kind.
///
/// Useful for summarizing dispatch backlogs in reports.
pub fn group_by_kind(errors: &[BotError]) -> HashMap<ErrorKind, Vec<&BotError>> {
    let mut groups: HashMap<ErrorKind, Vec<&BotError>> = HashMap::new();
    for error in errors {
        groups.entry(error.kind()).or_default().push(error);
    }
    groups
}
