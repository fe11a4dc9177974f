// Execution Events
// Progress reporting for run, instance, and step lifecycles

use crate::parser::models::{InstanceState, StepStatus};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started
    RunStarted {
        workflow_name: String,
        release_tag: String,
        total_instances: usize,
    },

    /// Run completed
    RunCompleted {
        workflow_name: String,
        success: bool,
        duration: Duration,
    },

    /// Job instance started executing
    InstanceStarted {
        job_id: String,
        instance: String,
        total_steps: usize,
    },

    /// Job instance reached a terminal state
    InstanceCompleted {
        job_id: String,
        instance: String,
        state: InstanceState,
        duration: Duration,
    },

    /// Job instance was skipped without running
    InstanceSkipped {
        job_id: String,
        instance: String,
        reason: String,
    },

    /// Step started
    StepStarted {
        instance: String,
        step_name: Option<String>,
        step_index: usize,
    },

    /// Step output line (secrets already redacted)
    StepOutput {
        instance: String,
        step_index: usize,
        output: String,
        is_error: bool,
    },

    /// Step completed
    StepCompleted {
        instance: String,
        step_name: Option<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// Step was skipped (earlier step failed, or step retried elsewhere)
    StepSkipped {
        instance: String,
        step_name: Option<String>,
        step_index: usize,
        reason: String,
    },

    /// Log message
    Log {
        level: LogLevel,
        message: String,
        instance: Option<String>,
    },

    /// Execution error occurred
    Error {
        message: String,
        instance: Option<String>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ExecutionEvent {
    pub fn run_started(
        workflow_name: impl Into<String>,
        release_tag: impl Into<String>,
        total_instances: usize,
    ) -> Self {
        Self::RunStarted {
            workflow_name: workflow_name.into(),
            release_tag: release_tag.into(),
            total_instances,
        }
    }

    pub fn run_completed(
        workflow_name: impl Into<String>,
        success: bool,
        duration: Duration,
    ) -> Self {
        Self::RunCompleted {
            workflow_name: workflow_name.into(),
            success,
            duration,
        }
    }

    pub fn instance_started(
        job_id: impl Into<String>,
        instance: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self::InstanceStarted {
            job_id: job_id.into(),
            instance: instance.into(),
            total_steps,
        }
    }

    pub fn instance_completed(
        job_id: impl Into<String>,
        instance: impl Into<String>,
        state: InstanceState,
        duration: Duration,
    ) -> Self {
        Self::InstanceCompleted {
            job_id: job_id.into(),
            instance: instance.into(),
            state,
            duration,
        }
    }

    pub fn instance_skipped(
        job_id: impl Into<String>,
        instance: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InstanceSkipped {
            job_id: job_id.into(),
            instance: instance.into(),
            reason: reason.into(),
        }
    }

    pub fn step_started(
        instance: impl Into<String>,
        step_name: Option<String>,
        step_index: usize,
    ) -> Self {
        Self::StepStarted {
            instance: instance.into(),
            step_name,
            step_index,
        }
    }

    pub fn step_output(
        instance: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            instance: instance.into(),
            step_index,
            output: output.into(),
            is_error,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step_completed(
        instance: impl Into<String>,
        step_name: Option<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            instance: instance.into(),
            step_name,
            step_index,
            status,
            duration,
            exit_code,
        }
    }

    pub fn warning(message: impl Into<String>, instance: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            instance,
        }
    }

    pub fn execution_error(message: impl Into<String>, instance: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            instance,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::run_started("release", "v1.0.0", 4));
        tx.send_event(ExecutionEvent::instance_started("test", "test (linux)", 2));

        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::RunStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::InstanceStarted { .. }
        ));
    }

    #[test]
    fn test_event_construction() {
        let event = ExecutionEvent::instance_completed(
            "test",
            "test (linux, 3.9)",
            InstanceState::Succeeded,
            Duration::from_secs(12),
        );

        match event {
            ExecutionEvent::InstanceCompleted {
                job_id,
                instance,
                state,
                duration,
            } => {
                assert_eq!(job_id, "test");
                assert_eq!(instance, "test (linux, 3.9)");
                assert_eq!(state, InstanceState::Succeeded);
                assert_eq!(duration, Duration::from_secs(12));
            }
            other => panic!("wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_optional_sender_is_noop() {
        let sender: Option<ProgressSender> = None;
        sender.send_event(ExecutionEvent::warning("test", None));
    }
}
