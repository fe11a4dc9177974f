use crate::output;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use workflow_engine::execution::events::LogLevel;
use workflow_engine::{
    progress_channel, DirRegistry, ExecutionEvent, InstanceState, ReleaseEvent, RunContext,
    Scheduler, SchedulerConfig, SecretStore, StepStatus, WorkflowGraph, WorkflowParser,
};

/// Execute a workflow against a release event
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Release tag that triggered the run
    #[arg(long, short = 't', value_name = "TAG", default_value = "v0.0.0-local")]
    pub tag: String,

    /// Release title
    #[arg(long, value_name = "NAME")]
    pub release_name: Option<String>,

    /// Mark the release as a prerelease
    #[arg(long)]
    pub prerelease: bool,

    /// Provide a secret (can be repeated, format: NAME=VALUE).
    /// Secrets not given here fall back to GANTRY_SECRET_* env vars.
    #[arg(long = "secret", short = 's', value_name = "NAME=VALUE")]
    pub secrets: Vec<String>,

    /// Set an environment variable for all instances (format: NAME=VALUE)
    #[arg(long = "env", short = 'e', value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// Cap concurrently running instances (0 = unlimited)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_parallel: usize,

    /// Registry directory for publish steps
    #[arg(long, value_name = "DIR")]
    pub registry: Option<PathBuf>,

    /// Working directory for execution
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,
}

fn parse_pairs(pairs: &[String], what: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((name, value)) => {
                map.insert(name.to_string(), value.to_string());
            }
            None => {
                color_eyre::eyre::bail!("Invalid {} '{}'. Expected NAME=VALUE", what, pair);
            }
        }
    }
    Ok(map)
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    // Parse the workflow
    output::status("Parsing", &format!("{}", workflow_path.display()));
    let workflow = WorkflowParser::parse_file(workflow_path)
        .map_err(|e| color_eyre::eyre::eyre!("Parse error:\n{}", e))?;

    // Build the graph; cycles and unknown dependencies abort here
    let graph = WorkflowGraph::from_workflow(&workflow)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to build job graph: {}", e.message))?;

    output::info(&format!(
        "Workflow '{}': {} jobs, {} instances",
        graph.name,
        graph.jobs.len(),
        graph.instance_count()
    ));

    // Secrets: explicit flags win over GANTRY_SECRET_* env vars
    let mut secrets = SecretStore::from_env();
    for (name, value) in parse_pairs(&args.secrets, "secret")? {
        secrets.insert(name, value);
    }

    let mut release = ReleaseEvent::new(args.tag.clone());
    release.name = args.release_name.clone();
    release.prerelease = args.prerelease;

    let mut base_env = graph.env.clone();
    base_env.extend(parse_pairs(&args.env, "env var")?);

    let ctx = RunContext::new(working_dir, release)
        .with_base_env(base_env)
        .with_secrets(secrets);

    let registry_root = args
        .registry
        .clone()
        .unwrap_or_else(DirRegistry::default_root);

    let (tx, mut rx) = progress_channel();

    let scheduler = Scheduler::new(graph)
        .with_config(SchedulerConfig {
            max_parallel: args.max_parallel,
            ..Default::default()
        })
        .with_publisher(Arc::new(DirRegistry::new(registry_root)))
        .with_progress(tx);

    // Run in the background; render events in the foreground
    let exec_handle = tokio::spawn(async move { scheduler.execute(ctx).await });

    while let Some(event) = rx.recv().await {
        match &event {
            ExecutionEvent::RunStarted {
                workflow_name,
                release_tag,
                total_instances,
            } => {
                println!();
                output::header(&format!(
                    "Run '{}' for {} ({} instances)",
                    workflow_name, release_tag, total_instances
                ));
            }

            ExecutionEvent::RunCompleted {
                success, duration, ..
            } => {
                println!();
                if *success {
                    output::success(&format!(
                        "Run completed successfully in {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!("Run failed after {:.2}s", duration.as_secs_f64()));
                }
            }

            ExecutionEvent::InstanceStarted {
                instance,
                total_steps,
                ..
            } => {
                println!("  Instance '{}' ({} steps)", instance, total_steps);
            }

            ExecutionEvent::InstanceCompleted {
                instance,
                state,
                duration,
                ..
            } => {
                let line = format!(
                    "  Instance '{}' {} ({:.2}s)",
                    instance,
                    state,
                    duration.as_secs_f64()
                );
                if *state == InstanceState::Succeeded {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }

            ExecutionEvent::InstanceSkipped {
                instance, reason, ..
            } => {
                output::warning(&format!("  Instance '{}' skipped: {}", instance, reason));
            }

            ExecutionEvent::StepStarted {
                step_name,
                step_index,
                ..
            } => {
                let label = step_name.as_deref().unwrap_or("step");
                println!("    [Step {}] {}", step_index + 1, label);
            }

            ExecutionEvent::StepOutput {
                output, is_error, ..
            } => {
                for line in output.lines() {
                    if *is_error {
                        output::step_error(line);
                    } else {
                        output::step_output(line);
                    }
                }
            }

            ExecutionEvent::StepCompleted {
                status,
                duration,
                exit_code,
                ..
            } => {
                let symbol = match status {
                    StepStatus::Succeeded => "OK",
                    StepStatus::Failed => "FAIL",
                    StepStatus::Skipped => "SKIP",
                };
                let exit_info = match exit_code {
                    Some(code) if *code != 0 => format!(" (exit code: {})", code),
                    _ => String::new(),
                };
                let line = format!(
                    "      {} ({:.2}s){}",
                    symbol,
                    duration.as_secs_f64(),
                    exit_info
                );
                match status {
                    StepStatus::Succeeded => output::dim_success(&line),
                    StepStatus::Failed => output::dim_failure(&line),
                    StepStatus::Skipped => println!("{}", line),
                }
            }

            ExecutionEvent::StepSkipped {
                step_name, reason, ..
            } => {
                let label = step_name.as_deref().unwrap_or("step");
                output::warning(&format!("      {} skipped: {}", label, reason));
            }

            ExecutionEvent::Log { level, message, .. } => match level {
                LogLevel::Error => output::error(message),
                LogLevel::Warning => output::warning(message),
                _ => output::dim(message),
            },

            ExecutionEvent::Error { message, .. } => {
                output::error(message);
            }
        }
    }

    let result = exec_handle.await?;

    // Per-instance status table
    println!();
    println!("{:<40} {:<10} {:>9}", "INSTANCE", "STATUS", "DURATION");
    for instance in &result.instances {
        println!(
            "{:<40} {:<10} {:>8.2}s",
            instance.instance,
            instance.state.to_string(),
            instance.duration.as_secs_f64()
        );
    }
    println!();
    output::info(&format!(
        "{} succeeded, {} failed, {} skipped",
        result.count(InstanceState::Succeeded),
        result.count(InstanceState::Failed),
        result.count(InstanceState::Skipped)
    ));

    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}
