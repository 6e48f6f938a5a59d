use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `hostbridge`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; orchestration code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Atomic document store ───────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Bridge document ─────────────────────────────────────────────────
    #[error("document: {0}")]
    Document(#[from] DocumentError),

    // ── Remote host ─────────────────────────────────────────────────────
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),

    // ── Security / Path policy ──────────────────────────────────────────
    #[error("security: {0}")]
    Security(#[from] SecurityError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock on {} not acquired within {}ms", path.display(), waited.as_millis())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

// ─── Document errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed bridge document, missing: {}", missing.join(", "))]
    Malformed { missing: Vec<String> },

    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("question '{id}' has {count} options, at most {max} allowed")]
    TooManyOptions { id: String, count: usize, max: usize },

    #[error("bridge document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Remote errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(
        "circuit breaker open after {failures} consecutive failures, retry in {}s",
        retry_after.as_secs()
    )]
    CircuitOpen { failures: u32, retry_after: Duration },

    #[error("connection failed: {message}")]
    Transport { message: String },

    #[error("remote host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timed out after {}s waiting for script result", after.as_secs_f64())]
    ResultTimeout { after: Duration },

    #[error("response too large ({size} bytes, max {limit})")]
    ResponseTooLarge { size: u64, limit: u64 },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("script artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    /// Human-readable remediation for operators.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => {
                "the remote host is unreachable; wait for the cooldown or restart the host"
            }
            Self::Transport { .. } => {
                "check that the host is running with its remote control endpoint enabled"
            }
            Self::Status { .. } => "the host rejected the request; check object paths and payloads",
            Self::ResultTimeout { .. } => "check the host output log for script errors",
            Self::ResponseTooLarge { .. } => {
                "reduce script output size or use file-based data transfer"
            }
            Self::Decode(_) => "the host produced output that is not valid JSON",
            Self::Artifact { .. } => "check permissions on the script directory",
        }
    }

    /// Estimated wait before the breaker admits another request.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

// ─── Security errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error(
        "bridge path '{}' is outside the allowed directory '{}'",
        path.display(),
        root.display()
    )]
    OutsideAllowedRoot { path: PathBuf, root: PathBuf },

    #[error("invalid bridge path: {0}")]
    InvalidPath(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
