//! Structured, serializable error reports.
//!
//! Errors that have to cross a process boundary are flattened into an
//! [`ErrorReport`]: a kind, the rendered message, and the cause chain as
//! nested reports of the same type.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use trace::TraceError;

use crate::StagingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Trace,
    IllegalArgument,
    IllegalState,
    Unsupported,
    NotFound,
    Storage,
    Metadata,
    Marshal,
    Provision,
    Task,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorReport>>,
}

impl ErrorReport {
    /// Build a report from any error, following its `source()` chain.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let kind = if let Some(staging) = err.downcast_ref::<StagingError>() {
            kind_of(staging)
        } else if err.is::<TraceError>() || err.is::<Box<TraceError>>() {
            ErrorKind::Trace
        } else {
            ErrorKind::Other
        };
        Self {
            kind,
            message: err.to_string(),
            cause: err.source().map(|source| Box::new(Self::from_error(source))),
        }
    }

    /// Iterate over this report and its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ErrorReport> {
        std::iter::successors(Some(self), |r| r.cause.as_deref())
    }
}

fn kind_of(err: &StagingError) -> ErrorKind {
    match err {
        StagingError::Trace(_) => ErrorKind::Trace,
        StagingError::IllegalArgument(_) => ErrorKind::IllegalArgument,
        StagingError::IllegalState(_) => ErrorKind::IllegalState,
        StagingError::Unsupported(_) => ErrorKind::Unsupported,
        StagingError::NotFound(_) => ErrorKind::NotFound,
        StagingError::Storage { .. } => ErrorKind::Storage,
        StagingError::Metadata { .. } => ErrorKind::Metadata,
        StagingError::Marshal { .. } => ErrorKind::Marshal,
        StagingError::Provision(_) => ErrorKind::Provision,
        StagingError::Task { .. } => ErrorKind::Task,
    }
}

impl From<&StagingError> for ErrorReport {
    fn from(err: &StagingError) -> Self {
        Self::from_error(err)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ErrorReport {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use trace::ExecutionTrace;

    #[test]
    fn storage_failure_keeps_its_cause() {
        let err = StagingError::Storage {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, ErrorKind::Storage);
        let cause = report.cause.as_deref().expect("io cause");
        assert_eq!(cause.kind, ErrorKind::Other);
        assert_eq!(cause.message, "denied");
    }

    #[test]
    fn trace_errors_are_classified_through_the_chain() {
        let parse = ExecutionTrace::parse(":in:a/b").unwrap_err();
        let report = ErrorReport::from(&StagingError::from(parse));
        assert!(report.chain().all(|r| r.kind == ErrorKind::Trace));
        assert_eq!(report.chain().count(), 2);
    }

    #[test]
    fn report_survives_json_round_trip() {
        let err = StagingError::NotFound(ExecutionTrace::parse("a:out:b").unwrap());
        let report = ErrorReport::from(&err);
        let json = serde_json::to_string(&report).unwrap();
        let back: ErrorReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.to_string(), "no value stored at 'a:out:b'");
    }
}
