use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    Stale,
    FutureTimestamp,
    MissingFields,
    Duplicate,
    OutOfSequence,
    InvalidValue,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "STALE",
            Self::FutureTimestamp => "FUTURE_TIMESTAMP",
            Self::MissingFields => "MISSING_FIELDS",
            Self::Duplicate => "DUPLICATE",
            Self::OutOfSequence => "OUT_OF_SEQUENCE",
            Self::InvalidValue => "INVALID_VALUE",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub code: ValidationCode,
    pub detail: String,
}

impl Violation {
    pub fn new(code: ValidationCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::new(ValidationCode::InvalidValue, detail)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

/// Every check that failed for one message, in check order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn has(&self, code: ValidationCode) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }

    pub fn codes(&self) -> Vec<ValidationCode> {
        self.violations.iter().map(|v| v.code).collect()
    }

    pub fn reason(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityCode {
    AuthFailed,
    IntegrityFailed,
    SuspiciousPattern,
    RateLimited,
}

impl SecurityCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::IntegrityFailed => "INTEGRITY_FAILED",
            Self::SuspiciousPattern => "SUSPICIOUS_PATTERN",
            Self::RateLimited => "RATE_LIMITED",
        }
    }
}

impl fmt::Display for SecurityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityError {
    pub code: SecurityCode,
    pub detail: String,
}

impl SecurityError {
    pub(crate) fn new(code: SecurityCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for SecurityError {}

/// Failure loading keyring or pattern material from disk or JSON.
#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "read {}: {}", path.display(), source),
            Self::Parse(err) => write!(f, "parse error: {}", err),
            Self::Invalid(msg) => write!(f, "invalid material: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

pub(crate) fn read_material(path: &std::path::Path) -> LoadResult<String> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}
