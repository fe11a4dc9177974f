// Workflow Graph (DAG) Builder
// Builds a directed acyclic graph of job instances from a workflow definition

use crate::execution::matrix::{MatrixExpander, MatrixInstance};
use crate::parser::models::{JobSpec, Workflow};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Error type for graph construction
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Dependency edges form a cycle
    Cycle,
    /// A `needs` entry references an undeclared job
    UnknownDependency,
}

impl GraphError {
    pub fn cycle(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::Cycle,
        }
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::UnknownDependency,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

/// A node representing one job and its expanded instances
#[derive(Debug, Clone)]
pub struct JobNode {
    /// Job identifier
    pub id: String,
    /// Job declaration
    pub job: JobSpec,
    /// Ids of jobs this job needs
    pub needs: Vec<String>,
    /// Matrix instances (exactly one for matrix-less jobs)
    pub instances: Vec<MatrixInstance>,
}

impl JobNode {
    /// Unique key for one instance of this job: "test (linux, 3.9)",
    /// or just the job id when there is no matrix.
    pub fn instance_key(&self, instance: &MatrixInstance) -> String {
        let label = instance.label();
        if label.is_empty() {
            self.id.clone()
        } else {
            format!("{} ({})", self.id, label)
        }
    }
}

/// The immutable DAG a run executes. Built once from the declaration;
/// never re-interpreted afterwards.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// All jobs, in declaration (id) order
    pub jobs: Vec<JobNode>,
    /// Quick lookup of job index by id
    job_indices: HashMap<String, usize>,
    /// Reverse edges: job id -> ids of jobs that need it
    dependents: HashMap<String, Vec<String>>,
    /// Workflow name
    pub name: String,
    /// Workflow-level environment
    pub env: HashMap<String, String>,
}

impl WorkflowGraph {
    /// Build and validate a graph from a workflow definition.
    /// Fails before any execution on cycles or unknown dependencies.
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, GraphError> {
        let declared: HashSet<&str> = workflow.jobs.keys().map(String::as_str).collect();

        let mut jobs = Vec::with_capacity(workflow.jobs.len());
        let mut job_indices = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for (i, (id, job)) in workflow.jobs.iter().enumerate() {
            let needs = job.needs.ids();
            for dep in &needs {
                if !declared.contains(dep.as_str()) {
                    return Err(GraphError::unknown_dependency(format!(
                        "job '{}' needs unknown job '{}'",
                        id, dep
                    )));
                }
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }

            job_indices.insert(id.clone(), i);
            jobs.push(JobNode {
                id: id.clone(),
                instances: MatrixExpander::expand(job.strategy.as_ref()),
                needs,
                job: job.clone(),
            });
        }

        let graph = Self {
            jobs,
            job_indices,
            dependents,
            name: workflow
                .name
                .clone()
                .unwrap_or_else(|| "workflow".to_string()),
            env: workflow.env.clone(),
        };

        graph.detect_cycles()?;

        tracing::debug!(
            jobs = graph.jobs.len(),
            instances = graph.instance_count(),
            "workflow graph built"
        );

        Ok(graph)
    }

    /// Get a job node by id
    pub fn get_job(&self, id: &str) -> Option<&JobNode> {
        self.job_indices.get(id).map(|&i| &self.jobs[i])
    }

    /// Ids of jobs that need the given job
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of job instances in the graph
    pub fn instance_count(&self) -> usize {
        self.jobs.iter().map(|j| j.instances.len()).sum()
    }

    /// Jobs in topological order (Kahn's algorithm)
    pub fn topological_order(&self) -> Vec<&JobNode> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();

        for job in &self.jobs {
            in_degree.entry(job.id.as_str()).or_insert(0);
            for _ in &job.needs {
                *in_degree.entry(job.id.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .jobs
            .iter()
            .map(|j| j.id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.jobs.len());

        while let Some(id) = queue.pop_front() {
            if let Some(&idx) = self.job_indices.get(id) {
                order.push(&self.jobs[idx]);
            }

            for dependent in self.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        order
    }

    /// Detect cycles in the needs relation using DFS
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for job in &self.jobs {
            if !visited.contains(job.id.as_str()) {
                if let Some(cycle) = self.dfs_cycle(job, &mut visited, &mut rec_stack) {
                    return Err(GraphError::cycle(format!(
                        "circular dependency detected: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a JobNode,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(&node.id);
        rec_stack.insert(&node.id);

        for dep in &node.needs {
            if !visited.contains(dep.as_str()) {
                if let Some(&idx) = self.job_indices.get(dep) {
                    if let Some(mut cycle) = self.dfs_cycle(&self.jobs[idx], visited, rec_stack) {
                        cycle.insert(0, node.id.clone());
                        return Some(cycle);
                    }
                }
            } else if rec_stack.contains(dep.as_str()) {
                return Some(vec![node.id.clone(), dep.clone()]);
            }
        }

        rec_stack.remove(node.id.as_str());
        None
    }
}
