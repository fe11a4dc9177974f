// Workflow Data Models
// Types representing the declarative release-workflow YAML schema

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Root workflow structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Workflow {
    /// Workflow name
    pub name: Option<String>,

    /// Trigger configuration (`on:`)
    #[serde(rename = "on")]
    pub trigger: Option<TriggerSpec>,

    /// Workflow-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Jobs by identifier. BTreeMap keeps instance ordering deterministic.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobSpec>,
}

impl Workflow {
    /// Total number of declared jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Total number of declared steps across all jobs
    pub fn step_count(&self) -> usize {
        self.jobs.values().map(|j| j.steps.len()).sum()
    }
}

// =============================================================================
// Triggers
// =============================================================================

/// Trigger configuration. Only release events are recognized; the engine is
/// invoked with a concrete release payload either way.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerSpec {
    pub release: Option<ReleaseTrigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReleaseTrigger {
    /// Release activity types, e.g. ["created"]
    #[serde(default)]
    pub types: Vec<String>,
}

// =============================================================================
// Jobs
// =============================================================================

/// Prerequisite declaration: absent, a single job id, or a list of ids
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Needs {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for Needs {
    fn default() -> Self {
        Needs::Multiple(Vec::new())
    }
}

impl Needs {
    /// Prerequisite job ids in declaration order
    pub fn ids(&self) -> Vec<String> {
        match self {
            Needs::Single(id) => vec![id.clone()],
            Needs::Multiple(ids) => ids.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Needs::Single(_) => false,
            Needs::Multiple(ids) => ids.is_empty(),
        }
    }
}

/// A job declaration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct JobSpec {
    /// Display name
    pub name: Option<String>,

    /// Prerequisite jobs
    #[serde(default)]
    pub needs: Needs,

    /// Matrix / parallelism strategy
    pub strategy: Option<Strategy>,

    /// Run this job even when prerequisites fail or are skipped
    #[serde(default)]
    pub always: bool,

    /// Static input parameters, exposed as INPUT_* environment variables
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Names of secrets this job needs. Resolved at execution time and
    /// injected only into this job's instances.
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Job-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-instance timeout in minutes. No default: instances run until done.
    pub timeout_minutes: Option<u64>,

    /// Ordered step list
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl JobSpec {
    /// Per-instance timeout as a Duration, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_minutes.map(|m| Duration::from_secs(m * 60))
    }
}

/// Matrix / parallelism strategy for a job
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Strategy {
    /// Matrix axes: axis name -> value list. Instances are the cross
    /// product of all axes.
    pub matrix: Option<BTreeMap<String, Vec<Value>>>,

    /// Cancel sibling instances that have not started once one fails
    #[serde(default)]
    pub fail_fast: bool,

    /// Cap on concurrently running instances of this job
    pub max_parallel: Option<u32>,
}

// =============================================================================
// Steps
// =============================================================================

/// A single step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    /// Step name
    pub name: Option<String>,

    /// Keep running later steps when this one fails
    #[serde(default)]
    pub continue_on_error: bool,

    /// Safe to retry on failure. Publish conflicts are never retried.
    #[serde(default)]
    pub idempotent: bool,

    /// Step-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// What the step does
    #[serde(flatten)]
    pub action: StepAction,
}

impl Step {
    /// Label used in events and results
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.action {
            StepAction::Run(run) => run
                .run
                .lines()
                .next()
                .unwrap_or("run")
                .trim()
                .to_string(),
            StepAction::Publish(publish) => format!("publish {}", publish.publish.package),
        }
    }
}

/// Step action variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepAction {
    Run(RunStep),
    Publish(PublishStep),
}

/// A shell script step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStep {
    /// Script body, passed to the shell
    pub run: String,

    /// Shell to use ("sh" or "bash"); sh when omitted
    pub shell: Option<String>,

    /// Working directory relative to the run's working dir
    pub working_directory: Option<String>,
}

/// A registry upload step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishStep {
    pub publish: PublishSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PublishSpec {
    /// Package name
    pub package: String,

    /// Version to publish. Defaults to the triggering release tag.
    pub version: Option<String>,

    /// Path to the artifact file to upload
    pub path: String,
}

// =============================================================================
// Values
// =============================================================================

/// A scalar value appearing in matrix axes and `with` inputs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// String form used for environment variables and instance labels
    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// =============================================================================
// Statuses and results
// =============================================================================

/// Lifecycle state of a job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Waiting on prerequisites
    Pending,
    /// Prerequisites resolved, waiting for an execution slot
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Succeeded | InstanceState::Failed | InstanceState::Skipped
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Ready => "ready",
            InstanceState::Running => "running",
            InstanceState::Succeeded => "succeeded",
            InstanceState::Failed => "failed",
            InstanceState::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Result of executing one step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: Option<String>,
    pub status: StepStatus,
    /// Captured output, secrets already redacted
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub exit_code: Option<i32>,
}

impl StepResult {
    pub fn skipped(step_name: Option<String>) -> Self {
        Self {
            step_name,
            status: StepStatus::Skipped,
            output: String::new(),
            error: None,
            duration: Duration::ZERO,
            exit_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_ids() {
        let single = Needs::Single("build".to_string());
        assert_eq!(single.ids(), vec!["build"]);
        assert!(!single.is_empty());

        let multiple = Needs::Multiple(vec!["build".to_string(), "lint".to_string()]);
        assert_eq!(multiple.ids(), vec!["build", "lint"]);

        assert!(Needs::default().is_empty());
    }

    #[test]
    fn test_value_as_string() {
        assert_eq!(Value::String("abc".to_string()).as_string(), "abc");
        assert_eq!(Value::Number(3.0).as_string(), "3");
        assert_eq!(Value::Number(3.5).as_string(), "3.5");
        assert_eq!(Value::Bool(true).as_string(), "true");
    }

    #[test]
    fn test_step_label_falls_back_to_script() {
        let step = Step {
            name: None,
            continue_on_error: false,
            idempotent: false,
            env: HashMap::new(),
            action: StepAction::Run(RunStep {
                run: "echo hello\necho world".to_string(),
                shell: None,
                working_directory: None,
            }),
        };
        assert_eq!(step.label(), "echo hello");
    }

    #[test]
    fn test_instance_state_terminal() {
        assert!(!InstanceState::Pending.is_terminal());
        assert!(!InstanceState::Ready.is_terminal());
        assert!(!InstanceState::Running.is_terminal());
        assert!(InstanceState::Succeeded.is_terminal());
        assert!(InstanceState::Failed.is_terminal());
        assert!(InstanceState::Skipped.is_terminal());
    }

    #[test]
    fn test_job_timeout() {
        let job = JobSpec {
            timeout_minutes: Some(2),
            ..Default::default()
        };
        assert_eq!(job.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(JobSpec::default().timeout(), None);
    }
}
