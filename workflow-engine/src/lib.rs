// Workflow Engine Library
// Core engine for release-workflow parsing, graph building, and execution

pub mod error;
pub mod execution;
pub mod parser;
pub mod runners;
pub mod secrets;

// Re-export commonly used types
pub use error::{EngineError, EngineResult, ExecError};

// Re-export parser types
pub use parser::{
    InstanceState, JobSpec, ParseError, ParseErrorKind, ParseResult, Step, StepStatus, Workflow,
    WorkflowParser,
};

// Re-export execution types
pub use execution::{
    cancellation, progress_channel, ExecutionEvent, GraphError, GraphErrorKind, InstanceResult,
    MatrixExpander, MatrixInstance, ProgressSender, ReleaseEvent, RunContext, RunResult, Scheduler,
    SchedulerConfig, WorkflowGraph,
};

// Re-export runner types
pub use runners::{ArtifactPublisher, DirRegistry, PublishError, ShellRunner};

// Re-export secret types
pub use secrets::{SecretStore, SecretValue, SECRET_ENV_PREFIX};
