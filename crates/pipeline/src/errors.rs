use std::fmt;

use admission::{SecurityError, ValidationError};
use detection::RegistryError;
use message_queue::QueueError;
use protocol::Priority;
use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by admission and processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Fatal to the submission, never retried.
    Validation,
    /// Fatal to the submission, logged as a security event, never retried.
    Security,
    /// Retried up to the queue's retry bound.
    Processing,
    /// Stuck or slow processing; counted as a processing failure.
    Timeout,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Security => "SECURITY_ERROR",
            Self::Processing => "PROCESSING_ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Processing | Self::Timeout)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detection,
    Analysis,
    Transform,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Analysis => "analysis",
            Self::Transform => "transform",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a submission never reached the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Validation(ValidationError),
    Security(SecurityError),
    QueueFull { priority: Priority, capacity: usize },
    Unavailable(String),
}

impl Rejection {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::Security(_) => ErrorClass::Security,
            Self::QueueFull { .. } | Self::Unavailable(_) => ErrorClass::Processing,
        }
    }

    /// Stable codes, one per failed check.
    pub fn codes(&self) -> Vec<&'static str> {
        match self {
            Self::Validation(err) => err.codes().into_iter().map(|code| code.as_str()).collect(),
            Self::Security(err) => vec![err.code.as_str()],
            Self::QueueFull { .. } => vec!["QUEUE_FULL"],
            Self::Unavailable(_) => vec!["UNAVAILABLE"],
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Validation(err) => err.reason(),
            Self::Security(err) => err.to_string(),
            Self::QueueFull { priority, capacity } => {
                format!("QUEUE_FULL: {priority} class at capacity {capacity}")
            }
            Self::Unavailable(detail) => format!("UNAVAILABLE: {detail}"),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class(), self.reason())
    }
}

impl std::error::Error for Rejection {}

/// Failure of one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub class: ErrorClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
}

impl ProcessingError {
    pub fn processing(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Processing,
            stage: Some(stage),
            message: message.into(),
        }
    }

    pub fn timeout(stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Timeout,
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} in {} stage: {}", self.class, stage, self.message),
            None => write!(f, "{}: {}", self.class, self.message),
        }
    }
}

impl std::error::Error for ProcessingError {}

/// Infrastructure failure of the pipeline itself.
#[derive(Debug)]
pub enum PipelineError {
    Queue(QueueError),
    Registry(RegistryError),
    LockPoisoned(&'static str),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(err) => write!(f, "queue: {err}"),
            Self::Registry(err) => write!(f, "sender registry: {err}"),
            Self::LockPoisoned(what) => write!(f, "{what} lock poisoned"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Queue(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::LockPoisoned(_) => None,
        }
    }
}

impl From<QueueError> for PipelineError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

impl From<RegistryError> for PipelineError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
