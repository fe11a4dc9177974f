// Workflow Parsing Module
// YAML schema types and the document parser

pub mod error;
pub mod models;
pub mod workflow;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use models::{
    InstanceState, JobSpec, Needs, PublishSpec, ReleaseTrigger, RunStep, Step, StepAction,
    StepResult, StepStatus, Strategy, TriggerSpec, Value, Workflow,
};
pub use workflow::WorkflowParser;
