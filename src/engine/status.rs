use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome class of a run as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Backend executed the program (its own exit behavior is not judged here)
    Accepted,
    /// Backend was reached and reported a failure
    Error,
    /// Backend unreachable or its response unreadable
    ConnectionError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Accepted => "Accepted",
            ExecutionStatus::Error => "Error",
            ExecutionStatus::ConnectionError => "Connection Error",
        };
        write!(f, "{}", s)
    }
}

/// Normalized result of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error_message: Option<String>,
    pub status: ExecutionStatus,
    pub elapsed: Option<String>,
    pub memory: Option<String>,
}

impl ExecutionResult {
    pub fn accepted(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error_message: None,
            status: ExecutionStatus::Accepted,
            elapsed: None,
            memory: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error_message: Some(message.into()),
            status: ExecutionStatus::Error,
            elapsed: None,
            memory: None,
        }
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error_message: Some(message.into()),
            status: ExecutionStatus::ConnectionError,
            elapsed: None,
            memory: None,
        }
    }

    pub fn with_metrics(mut self, elapsed: Option<String>, memory: Option<String>) -> Self {
        self.elapsed = elapsed;
        self.memory = memory;
        self
    }

    /// Text to show in the output pane
    pub fn display_text(&self) -> &str {
        match self.status {
            ExecutionStatus::Accepted => &self.output,
            _ => self.error_message.as_deref().unwrap_or(&self.output),
        }
    }
}
