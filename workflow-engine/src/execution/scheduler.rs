// Run Scheduler
// Single-owner status table driving concurrent job-instance execution

use crate::error::ExecError;
use crate::execution::context::RunContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::executor::{InstanceExecutor, InstanceResult};
use crate::execution::graph::WorkflowGraph;
use crate::execution::matrix::MatrixExpander;
use crate::parser::models::InstanceState;
use crate::runners::publish::{ArtifactPublisher, DirRegistry};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cap on concurrently running instances across the whole run
    /// (0 = unlimited, the default)
    pub max_parallel: usize,
    /// Timeout applied to instances whose job sets none
    pub default_instance_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            default_instance_timeout: None,
        }
    }
}

/// Create a cancellation pair for a run. Sending `true` skips all
/// non-terminal instances and best-effort terminates running ones.
pub fn cancellation() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Aggregate result of a run
#[derive(Debug)]
pub struct RunResult {
    pub workflow: String,
    pub release_tag: String,
    /// Per-instance results, in graph declaration order
    pub instances: Vec<InstanceResult>,
    pub duration: Duration,
    /// True only when no instance failed and the run was not canceled
    pub success: bool,
    pub canceled: bool,
}

impl RunResult {
    pub fn instance(&self, key: &str) -> Option<&InstanceResult> {
        self.instances.iter().find(|i| i.instance == key)
    }

    pub fn count(&self, state: InstanceState) -> usize {
        self.instances.iter().filter(|i| i.state == state).count()
    }
}

/// Status reports from instance tasks back to the scheduler loop
enum Report {
    Started(usize),
    Finished(usize, InstanceResult),
}

/// Per-instance bookkeeping. The scheduler task is the only writer.
struct Slot {
    job_idx: usize,
    inst_idx: usize,
    key: String,
    state: InstanceState,
    /// Set to stop the instance before it starts (fail-fast, cancel)
    halt: Arc<AtomicBool>,
    result: Option<InstanceResult>,
    handle: Option<JoinHandle<()>>,
}

enum Gate {
    /// Some prerequisite instance is not terminal yet
    Wait,
    /// All prerequisite instances succeeded (or the job runs always)
    Start,
    /// Prerequisites resolved with failures and the job does not tolerate that
    Skip,
}

/// Scheduler for one workflow graph
pub struct Scheduler {
    graph: Arc<WorkflowGraph>,
    config: SchedulerConfig,
    event_tx: Option<ProgressSender>,
    publisher: Arc<dyn ArtifactPublisher>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Scheduler {
    pub fn new(graph: WorkflowGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            config: SchedulerConfig::default(),
            event_tx: None,
            publisher: Arc::new(DirRegistry::new(DirRegistry::default_root())),
            cancel_rx: None,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(rx);
        self
    }

    /// Execute the run to completion. The run is terminal when no instance
    /// remains pending or ready.
    pub async fn execute(&self, ctx: RunContext) -> RunResult {
        let start = Instant::now();
        let graph = &self.graph;
        let ctx = Arc::new(ctx);

        let mut slots: Vec<Slot> = Vec::with_capacity(graph.instance_count());
        let mut job_slots: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut job_indices: HashMap<&str, usize> = HashMap::new();

        for (job_idx, job) in graph.jobs.iter().enumerate() {
            job_indices.insert(job.id.as_str(), job_idx);
            for (inst_idx, instance) in job.instances.iter().enumerate() {
                job_slots.entry(job_idx).or_default().push(slots.len());
                slots.push(Slot {
                    job_idx,
                    inst_idx,
                    key: job.instance_key(instance),
                    state: InstanceState::Pending,
                    halt: Arc::new(AtomicBool::new(false)),
                    result: None,
                    handle: None,
                });
            }
        }

        self.event_tx.send_event(ExecutionEvent::run_started(
            &graph.name,
            &ctx.release.tag,
            slots.len(),
        ));

        let global_sem = (self.config.max_parallel > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_parallel)));
        let job_sems: HashMap<usize, Arc<Semaphore>> = graph
            .jobs
            .iter()
            .enumerate()
            .filter_map(|(i, j)| {
                MatrixExpander::max_parallel(j.job.strategy.as_ref())
                    .map(|n| (i, Arc::new(Semaphore::new(n.max(1) as usize))))
            })
            .collect();

        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<Report>();
        let mut cancel_rx = self.cancel_rx.clone();
        let mut canceled = false;

        loop {
            self.dispatch(
                &mut slots,
                &job_slots,
                &job_indices,
                &global_sem,
                &job_sems,
                &report_tx,
                &ctx,
            );

            if slots.iter().all(|s| s.state.is_terminal()) {
                break;
            }

            let event = match cancel_rx.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        report = report_rx.recv() => Ok(report),
                        changed = rx.changed() => Err(changed),
                    }
                }
                None => Ok(report_rx.recv().await),
            };

            match event {
                Ok(Some(Report::Started(i))) => {
                    if !slots[i].state.is_terminal() {
                        slots[i].state = InstanceState::Running;
                    }
                }
                Ok(Some(Report::Finished(i, result))) => {
                    self.finish(&mut slots, &job_slots, i, result);
                }
                Ok(None) => break,
                Err(Ok(())) => {
                    if cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                        canceled = true;
                        break;
                    }
                }
                // Cancel sender dropped: no cancellation can arrive anymore
                Err(Err(_)) => cancel_rx = None,
            }
        }

        if canceled {
            self.cancel_remaining(&mut slots);
        }

        let instances: Vec<InstanceResult> = slots
            .into_iter()
            .map(|slot| match slot.result {
                Some(result) => result,
                None => InstanceResult::skipped(
                    self.graph.jobs[slot.job_idx].id.clone(),
                    slot.key,
                    Some(ExecError::Canceled),
                ),
            })
            .collect();

        let failed = instances
            .iter()
            .any(|i| i.state == InstanceState::Failed);
        let success = !failed && !canceled;
        let duration = start.elapsed();

        tracing::info!(
            workflow = %graph.name,
            success,
            canceled,
            instances = instances.len(),
            "run finished"
        );

        self.event_tx.send_event(ExecutionEvent::run_completed(
            &graph.name,
            success,
            duration,
        ));

        RunResult {
            workflow: graph.name.clone(),
            release_tag: ctx.release.tag.clone(),
            instances,
            duration,
            success,
            canceled,
        }
    }

    /// Evaluate job gates and spawn every instance that became ready.
    /// Loops to a fixpoint: a skip can resolve further gates.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        slots: &mut Vec<Slot>,
        job_slots: &HashMap<usize, Vec<usize>>,
        job_indices: &HashMap<&str, usize>,
        global_sem: &Option<Arc<Semaphore>>,
        job_sems: &HashMap<usize, Arc<Semaphore>>,
        report_tx: &mpsc::UnboundedSender<Report>,
        ctx: &Arc<RunContext>,
    ) {
        loop {
            let mut changed = false;

            for job_idx in 0..self.graph.jobs.len() {
                let pending: Vec<usize> = job_slots
                    .get(&job_idx)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|&i| slots[i].state == InstanceState::Pending)
                    .collect();
                if pending.is_empty() {
                    continue;
                }

                match self.gate(job_idx, slots, job_slots, job_indices) {
                    Gate::Wait => {}
                    Gate::Start => {
                        for i in pending {
                            let job_sem = job_sems.get(&slots[i].job_idx).cloned();
                            slots[i].state = InstanceState::Ready;
                            self.spawn_instance(
                                &mut slots[i],
                                i,
                                global_sem.clone(),
                                job_sem,
                                report_tx.clone(),
                                ctx.clone(),
                            );
                            changed = true;
                        }
                    }
                    Gate::Skip => {
                        for i in pending {
                            let job_id = self.graph.jobs[slots[i].job_idx].id.clone();
                            slots[i].state = InstanceState::Skipped;
                            slots[i].result = Some(InstanceResult::skipped(
                                job_id.clone(),
                                slots[i].key.clone(),
                                None,
                            ));
                            self.event_tx.send_event(ExecutionEvent::instance_skipped(
                                job_id,
                                slots[i].key.clone(),
                                "dependencies failed",
                            ));
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Readiness of one job given the states of its prerequisites
    fn gate(
        &self,
        job_idx: usize,
        slots: &[Slot],
        job_slots: &HashMap<usize, Vec<usize>>,
        job_indices: &HashMap<&str, usize>,
    ) -> Gate {
        let job = &self.graph.jobs[job_idx];
        let mut any_unsuccessful = false;

        for need in &job.needs {
            let Some(&need_idx) = job_indices.get(need.as_str()) else {
                // Validated at graph build; an unknown id here cannot start
                return Gate::Wait;
            };
            for &slot_idx in job_slots.get(&need_idx).into_iter().flatten() {
                let state = slots[slot_idx].state;
                if !state.is_terminal() {
                    return Gate::Wait;
                }
                if state != InstanceState::Succeeded {
                    any_unsuccessful = true;
                }
            }
        }

        if any_unsuccessful && !job.job.always {
            Gate::Skip
        } else {
            Gate::Start
        }
    }

    /// Spawn the execution task for one ready instance
    fn spawn_instance(
        &self,
        slot: &mut Slot,
        slot_idx: usize,
        global_sem: Option<Arc<Semaphore>>,
        job_sem: Option<Arc<Semaphore>>,
        report_tx: mpsc::UnboundedSender<Report>,
        ctx: Arc<RunContext>,
    ) {
        let job_node = &self.graph.jobs[slot.job_idx];
        let job_id = job_node.id.clone();
        let job = job_node.job.clone();
        let matrix = job_node.instances[slot.inst_idx].clone();
        let key = slot.key.clone();
        let halt = slot.halt.clone();
        let timeout = job.timeout().or(self.config.default_instance_timeout);
        let executor = InstanceExecutor::new(self.publisher.clone(), self.event_tx.clone());

        tracing::debug!(instance = %key, "instance dispatched");

        slot.handle = Some(tokio::spawn(async move {
            let _global = match global_sem {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            let _job = match job_sem {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };

            if halt.load(Ordering::SeqCst) {
                let _ = report_tx.send(Report::Finished(
                    slot_idx,
                    InstanceResult::skipped(job_id, key, None),
                ));
                return;
            }

            let _ = report_tx.send(Report::Started(slot_idx));

            let run = executor.run_instance(&job_id, &key, &job, &matrix, &ctx);
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => InstanceResult::timed_out(job_id, key, limit),
                },
                None => run.await,
            };

            let _ = report_tx.send(Report::Finished(slot_idx, result));
        }));
    }

    /// Record a finished instance and apply fail-fast to its siblings
    fn finish(
        &self,
        slots: &mut [Slot],
        job_slots: &HashMap<usize, Vec<usize>>,
        slot_idx: usize,
        result: InstanceResult,
    ) {
        let job_idx = slots[slot_idx].job_idx;
        let state = result.state;

        slots[slot_idx].state = state;

        match state {
            InstanceState::Skipped => {
                self.event_tx.send_event(ExecutionEvent::instance_skipped(
                    result.job_id.clone(),
                    result.instance.clone(),
                    "canceled before start",
                ));
            }
            _ => {
                self.event_tx.send_event(ExecutionEvent::instance_completed(
                    result.job_id.clone(),
                    result.instance.clone(),
                    state,
                    result.duration,
                ));
            }
        }

        slots[slot_idx].result = Some(result);

        let fail_fast =
            MatrixExpander::fail_fast(self.graph.jobs[job_idx].job.strategy.as_ref());
        if state == InstanceState::Failed && fail_fast {
            for &sibling in job_slots.get(&job_idx).into_iter().flatten() {
                if sibling == slot_idx {
                    continue;
                }
                match slots[sibling].state {
                    // Ready instances have a task waiting on a permit; the
                    // halt flag makes them report back as skipped.
                    InstanceState::Ready => {
                        slots[sibling].halt.store(true, Ordering::SeqCst);
                    }
                    InstanceState::Pending => {
                        let job_id = self.graph.jobs[job_idx].id.clone();
                        slots[sibling].state = InstanceState::Skipped;
                        slots[sibling].result = Some(InstanceResult::skipped(
                            job_id.clone(),
                            slots[sibling].key.clone(),
                            None,
                        ));
                        self.event_tx.send_event(ExecutionEvent::instance_skipped(
                            job_id,
                            slots[sibling].key.clone(),
                            "fail-fast",
                        ));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Mark everything non-terminal as skipped and stop running tasks
    fn cancel_remaining(&self, slots: &mut [Slot]) {
        for slot in slots.iter_mut() {
            slot.halt.store(true, Ordering::SeqCst);
            if let Some(handle) = &slot.handle {
                handle.abort();
            }
            if !slot.state.is_terminal() {
                let job_id = self.graph.jobs[slot.job_idx].id.clone();
                slot.state = InstanceState::Skipped;
                slot.result = Some(InstanceResult::skipped(
                    job_id.clone(),
                    slot.key.clone(),
                    Some(ExecError::Canceled),
                ));
                self.event_tx.send_event(ExecutionEvent::instance_skipped(
                    job_id,
                    slot.key.clone(),
                    "run canceled",
                ));
            }
        }
    }
}
