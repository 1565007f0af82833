//! Append-only record of failures the receive loop swallowed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which bucket an entry lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The bridge or device could not be reached.
    ConnectFailure,
    /// The bridge answered a command with an error token.
    CommandError,
    /// A data record failed to decode.
    DataError,
    /// Anything else, including connection loss.
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::ConnectFailure => "connect",
            ErrorCategory::CommandError => "command",
            ErrorCategory::DataError => "data",
            ErrorCategory::Other => "other",
        };
        f.write_str(name)
    }
}

/// Categorized failure history plus the most recent failure of any kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub connect_failures: Vec<String>,
    pub command_errors: Vec<String>,
    pub data_errors: Vec<String>,
    pub other: Vec<String>,
    pub last_error: Option<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` under `category` and make it the last error.
    pub fn record(&mut self, category: ErrorCategory, message: impl Into<String>) {
        let message = message.into();
        self.last_error = Some(message.clone());
        self.bucket_mut(category).push(message);
    }

    pub fn entries(&self, category: ErrorCategory) -> &[String] {
        match category {
            ErrorCategory::ConnectFailure => &self.connect_failures,
            ErrorCategory::CommandError => &self.command_errors,
            ErrorCategory::DataError => &self.data_errors,
            ErrorCategory::Other => &self.other,
        }
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.entries(category).len()
    }

    pub fn total(&self) -> usize {
        self.connect_failures.len()
            + self.command_errors.len()
            + self.data_errors.len()
            + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn bucket_mut(&mut self, category: ErrorCategory) -> &mut Vec<String> {
        match category {
            ErrorCategory::ConnectFailure => &mut self.connect_failures,
            ErrorCategory::CommandError => &mut self.command_errors,
            ErrorCategory::DataError => &mut self.data_errors,
            ErrorCategory::Other => &mut self.other,
        }
    }
}
