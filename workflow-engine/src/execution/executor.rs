// Instance Executor
// Runs one job instance's steps sequentially and reports the outcome

use crate::error::ExecError;
use crate::execution::context::RunContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::MatrixInstance;
use crate::parser::models::{
    InstanceState, JobSpec, PublishSpec, RunStep, Step, StepAction, StepResult, StepStatus,
};
use crate::runners::publish::{ArtifactPublisher, PublishError};
use crate::runners::shell::{Shell, ShellConfig, ShellRunner};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one job instance
#[derive(Debug, Clone)]
pub struct InstanceResult {
    pub job_id: String,
    /// Unique instance key, e.g. "test (linux, 3.9)"
    pub instance: String,
    pub state: InstanceState,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
    /// The error that made the instance fail or skip, if any
    pub error: Option<ExecError>,
}

impl InstanceResult {
    /// A result for an instance that never ran
    pub fn skipped(job_id: impl Into<String>, instance: impl Into<String>, error: Option<ExecError>) -> Self {
        Self {
            job_id: job_id.into(),
            instance: instance.into(),
            state: InstanceState::Skipped,
            steps: Vec::new(),
            duration: Duration::ZERO,
            error,
        }
    }

    /// A result for an instance that exceeded its time limit
    pub fn timed_out(job_id: impl Into<String>, instance: impl Into<String>, limit: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            instance: instance.into(),
            state: InstanceState::Failed,
            steps: Vec::new(),
            duration: limit,
            error: Some(ExecError::Timeout { limit }),
        }
    }
}

/// Executor for a single job instance
pub struct InstanceExecutor {
    shell: ShellRunner,
    publisher: Arc<dyn ArtifactPublisher>,
    event_tx: Option<ProgressSender>,
}

impl InstanceExecutor {
    pub fn new(publisher: Arc<dyn ArtifactPublisher>, event_tx: Option<ProgressSender>) -> Self {
        Self {
            shell: ShellRunner::new(),
            publisher,
            event_tx,
        }
    }

    /// Execute all steps of one instance. Steps run strictly in order; a
    /// failure skips the rest of the instance unless the step carries
    /// continue-on-error.
    pub async fn run_instance(
        &self,
        job_id: &str,
        instance_key: &str,
        job: &JobSpec,
        matrix: &MatrixInstance,
        ctx: &RunContext,
    ) -> InstanceResult {
        let start = Instant::now();

        let env = match ctx.instance_env(job, matrix) {
            Ok(env) => env,
            Err(error) => {
                self.event_tx.send_event(ExecutionEvent::execution_error(
                    error.to_string(),
                    Some(instance_key.to_string()),
                ));
                return InstanceResult {
                    job_id: job_id.to_string(),
                    instance: instance_key.to_string(),
                    state: InstanceState::Failed,
                    steps: Vec::new(),
                    duration: start.elapsed(),
                    error: Some(error),
                };
            }
        };

        self.event_tx.send_event(ExecutionEvent::instance_started(
            job_id,
            instance_key,
            job.steps.len(),
        ));

        let mut step_results = Vec::with_capacity(job.steps.len());
        let mut instance_error: Option<ExecError> = None;

        for (step_index, step) in job.steps.iter().enumerate() {
            if instance_error.is_some() {
                self.event_tx.send_event(ExecutionEvent::StepSkipped {
                    instance: instance_key.to_string(),
                    step_name: step.name.clone(),
                    step_index,
                    reason: "earlier step failed".to_string(),
                });
                step_results.push(StepResult::skipped(step.name.clone()));
                continue;
            }

            let (result, error) = self
                .execute_step(step, step_index, instance_key, &env, ctx)
                .await;

            if result.status == StepStatus::Failed {
                if step.continue_on_error {
                    self.event_tx.send_event(ExecutionEvent::warning(
                        format!("step '{}' failed but continues on error", step.label()),
                        Some(instance_key.to_string()),
                    ));
                } else {
                    instance_error = error;
                }
            }

            step_results.push(result);
        }

        let state = if instance_error.is_some() {
            InstanceState::Failed
        } else {
            InstanceState::Succeeded
        };

        InstanceResult {
            job_id: job_id.to_string(),
            instance: instance_key.to_string(),
            state,
            steps: step_results,
            duration: start.elapsed(),
            error: instance_error,
        }
    }

    /// Execute one step, retrying once when it is marked idempotent.
    /// Upload conflicts are terminal: they are never retried.
    async fn execute_step(
        &self,
        step: &Step,
        step_index: usize,
        instance_key: &str,
        env: &HashMap<String, String>,
        ctx: &RunContext,
    ) -> (StepResult, Option<ExecError>) {
        self.event_tx.send_event(ExecutionEvent::step_started(
            instance_key,
            step.name.clone(),
            step_index,
        ));

        let attempts = if step.idempotent { 2 } else { 1 };
        let mut outcome = self
            .execute_step_once(step, step_index, instance_key, env, ctx)
            .await;

        for attempt in 1..attempts {
            let retryable = outcome.0.status == StepStatus::Failed
                && !matches!(outcome.1, Some(ExecError::UploadConflict { .. }));
            if !retryable {
                break;
            }
            self.event_tx.send_event(ExecutionEvent::warning(
                format!(
                    "retrying idempotent step '{}' (attempt {})",
                    step.label(),
                    attempt + 1
                ),
                Some(instance_key.to_string()),
            ));
            outcome = self
                .execute_step_once(step, step_index, instance_key, env, ctx)
                .await;
        }

        let (result, error) = outcome;

        self.event_tx.send_event(ExecutionEvent::step_completed(
            instance_key,
            step.name.clone(),
            step_index,
            result.status,
            result.duration,
            result.exit_code,
        ));

        (result, error)
    }

    async fn execute_step_once(
        &self,
        step: &Step,
        step_index: usize,
        instance_key: &str,
        env: &HashMap<String, String>,
        ctx: &RunContext,
    ) -> (StepResult, Option<ExecError>) {
        match &step.action {
            StepAction::Run(run) => {
                self.execute_run(step, run, step_index, instance_key, env, ctx)
                    .await
            }
            StepAction::Publish(publish) => {
                self.execute_publish(step, &publish.publish, step_index, instance_key, ctx)
                    .await
            }
        }
    }

    async fn execute_run(
        &self,
        step: &Step,
        run: &RunStep,
        step_index: usize,
        instance_key: &str,
        env: &HashMap<String, String>,
        ctx: &RunContext,
    ) -> (StepResult, Option<ExecError>) {
        let start = Instant::now();

        let mut step_env = env.clone();
        for (key, value) in &step.env {
            step_env.insert(key.clone(), value.clone());
        }

        let shell = run.shell.as_deref().and_then(Shell::from_name);
        let config = ShellConfig {
            working_dir: run
                .working_directory
                .as_ref()
                .map(|dir| ctx.working_dir.join(dir)),
        };

        let output = self
            .shell
            .run(&run.run, shell, &step_env, &ctx.working_dir, &config)
            .await;

        let stdout = ctx.secrets.redact(&output.stdout);
        let stderr = ctx.secrets.redact(&output.stderr);

        for line in stdout.lines() {
            self.event_tx.send_event(ExecutionEvent::step_output(
                instance_key,
                step_index,
                line,
                false,
            ));
        }
        for line in stderr.lines() {
            self.event_tx.send_event(ExecutionEvent::step_output(
                instance_key,
                step_index,
                line,
                true,
            ));
        }

        let duration = start.elapsed();

        if output.success() {
            let result = StepResult {
                step_name: step.name.clone(),
                status: StepStatus::Succeeded,
                output: stdout,
                error: None,
                duration,
                exit_code: output.exit_code,
            };
            (result, None)
        } else {
            let error = ExecError::StepExecution {
                step: step.label(),
                exit_code: output.exit_code,
            };
            let result = StepResult {
                step_name: step.name.clone(),
                status: StepStatus::Failed,
                output: stdout,
                error: Some(if stderr.is_empty() {
                    error.to_string()
                } else {
                    stderr
                }),
                duration,
                exit_code: output.exit_code,
            };
            (result, Some(error))
        }
    }

    async fn execute_publish(
        &self,
        step: &Step,
        spec: &PublishSpec,
        step_index: usize,
        instance_key: &str,
        ctx: &RunContext,
    ) -> (StepResult, Option<ExecError>) {
        let start = Instant::now();

        // A publish without an explicit version publishes the release tag
        let version = spec
            .version
            .clone()
            .unwrap_or_else(|| ctx.release.tag.clone());
        let artifact = ctx.working_dir.join(&spec.path);

        match self
            .publisher
            .publish(&spec.package, &version, &artifact)
            .await
        {
            Ok(receipt) => {
                let message = format!(
                    "published {} {} -> {}",
                    receipt.package,
                    receipt.version,
                    receipt.location.display()
                );
                self.event_tx.send_event(ExecutionEvent::step_output(
                    instance_key,
                    step_index,
                    &message,
                    false,
                ));
                let result = StepResult {
                    step_name: step.name.clone(),
                    status: StepStatus::Succeeded,
                    output: message,
                    error: None,
                    duration: start.elapsed(),
                    exit_code: Some(0),
                };
                (result, None)
            }
            Err(publish_err) => {
                let error = match &publish_err {
                    PublishError::Conflict { package, version } => ExecError::UploadConflict {
                        package: package.clone(),
                        version: version.clone(),
                    },
                    _ => ExecError::StepExecution {
                        step: step.label(),
                        exit_code: None,
                    },
                };
                self.event_tx.send_event(ExecutionEvent::step_output(
                    instance_key,
                    step_index,
                    publish_err.to_string(),
                    true,
                ));
                let result = StepResult {
                    step_name: step.name.clone(),
                    status: StepStatus::Failed,
                    output: String::new(),
                    error: Some(publish_err.to_string()),
                    duration: start.elapsed(),
                    exit_code: None,
                };
                (result, Some(error))
            }
        }
    }
}
