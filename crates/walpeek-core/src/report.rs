//! Mapping of session outcomes to process exit statuses.

use std::error::Error as _;

use crate::error::{ErrorCode, SessionError};

/// Status reserved for external cancellation.
pub const ABORTED_STATUS: u8 = 1;

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Cancelled from outside (e.g. Ctrl-C). Reported directly by the caller.
    Aborted,
    Failed(ErrorCode),
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Aborted => ABORTED_STATUS,
            ExitStatus::Failed(code) => code.status(),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ExitStatus::Success => "success",
            ExitStatus::Aborted => "Aborted",
            ExitStatus::Failed(code) => code.description(),
        }
    }
}

impl From<&SessionError> for ExitStatus {
    fn from(err: &SessionError) -> Self {
        ExitStatus::Failed(err.code())
    }
}

/// Human-readable report of a failure: the code's description, the error
/// message, then each cause on its own line.
pub fn describe(err: &SessionError) -> Vec<String> {
    let mut lines = vec![format!("{} ({}): {}", err.code().description(), err.code(), err)];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    lines
}
