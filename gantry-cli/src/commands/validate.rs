use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_engine::{WorkflowGraph, WorkflowParser};

/// Parse a workflow and check its job graph without executing
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    output::status("Validating", &format!("{}", workflow_path.display()));

    // Step 1: YAML syntax and schema
    let workflow = match WorkflowParser::parse_file(workflow_path) {
        Ok(workflow) => workflow,
        Err(e) => {
            output::error(&format!("{}", e));
            std::process::exit(1);
        }
    };

    output::check("YAML syntax valid");

    // Step 2: job graph (unknown dependencies, cycles)
    let graph = match WorkflowGraph::from_workflow(&workflow) {
        Ok(graph) => graph,
        Err(e) => {
            output::error(&e.message);
            std::process::exit(1);
        }
    };

    output::check("Job graph is acyclic, all dependencies resolve");

    output::info(&format!(
        "Workflow '{}': {} jobs, {} steps, {} instances",
        graph.name,
        graph.jobs.len(),
        workflow.step_count(),
        graph.instance_count()
    ));

    for job in graph.topological_order() {
        let needs = if job.needs.is_empty() {
            String::new()
        } else {
            format!(" (needs: {})", job.needs.join(", "))
        };
        let instances = if job.instances.len() > 1 {
            format!(" [{} instances]", job.instances.len())
        } else {
            String::new()
        };
        output::check(&format!("  {}{}{}", job.id, needs, instances));
    }

    Ok(())
}
