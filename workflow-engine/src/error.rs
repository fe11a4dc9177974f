// Engine error types

use crate::execution::graph::GraphError;
use crate::parser::error::ParseError;

use std::time::Duration;
use thiserror::Error;

/// Top-level library error: everything that aborts a run before any
/// instance starts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Instance-scoped execution error. Contained to the failing instance and
/// its dependents; independent branches of the graph keep running.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("step '{step}' failed{}", exit_label(.exit_code))]
    StepExecution {
        step: String,
        exit_code: Option<i32>,
    },

    #[error("instance timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("version '{version}' of '{package}' is already published")]
    UploadConflict { package: String, version: String },

    #[error("secret '{name}' is not available")]
    MissingSecret { name: String },

    #[error("run was canceled")]
    Canceled,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_messages() {
        let err = ExecError::StepExecution {
            step: "make test".to_string(),
            exit_code: Some(2),
        };
        assert_eq!(err.to_string(), "step 'make test' failed with exit code 2");

        let err = ExecError::UploadConflict {
            package: "cmethods".to_string(),
            version: "1.0.1".to_string(),
        };
        assert!(err.to_string().contains("already published"));

        let err = ExecError::StepExecution {
            step: "upload".to_string(),
            exit_code: None,
        };
        assert_eq!(err.to_string(), "step 'upload' failed");
    }
}
