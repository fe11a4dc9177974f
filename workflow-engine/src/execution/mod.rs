// Execution Engine Module
// DAG construction, matrix expansion, scheduling, and instance execution

pub mod context;
pub mod events;
pub mod executor;
pub mod graph;
pub mod matrix;
pub mod scheduler;

// Re-export key types
pub use context::{ReleaseEvent, RunContext};
pub use events::{progress_channel, ExecutionEvent, LogLevel, ProgressSender};
pub use executor::{InstanceExecutor, InstanceResult};
pub use graph::{GraphError, GraphErrorKind, JobNode, WorkflowGraph};
pub use matrix::{MatrixExpander, MatrixInstance};
pub use scheduler::{cancellation, RunResult, Scheduler, SchedulerConfig};
