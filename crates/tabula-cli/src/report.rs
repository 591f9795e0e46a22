//! `tabula report`: plan, optionally replace, execute and follow a report

use crate::commands::current_user;
use anyhow::{bail, Context};
use clap::ArgMatches;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula_access::list_accessible_datasets;
use tabula_core::{DatasetRef, TabulaConfig};
use tabula_gateway::{ProxyClient, WorkflowClient};
use tabula_report::{
    ControllerDeps, ControllerSnapshot, ControllerState, JsonViewToggle, ReportController,
    ReportError, ReportPlan, StepStatus,
};

pub(crate) async fn run(config: &TabulaConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let user = current_user(config)?;
    let proxy = Arc::new(ProxyClient::new(&config.gateway)?);
    let workflow = Arc::new(WorkflowClient::new(&config.gateway)?);

    let prompt = args.get_one::<String>("prompt").map_or("", String::as_str);
    let model = args
        .get_one::<String>("model")
        .cloned()
        .unwrap_or_else(|| config.default_model.clone());
    let requested: Vec<&String> = args.get_many::<String>("dataset").into_iter().flatten().collect();

    // only datasets the user may see can be reported on
    let visible = list_accessible_datasets(proxy.as_ref(), &user, config.access.unassigned_policy).await?;
    let mut datasets = Vec::with_capacity(requested.len());
    for id in requested {
        let dataset = visible
            .iter()
            .find(|d| d.id.as_str() == id.as_str())
            .with_context(|| format!("dataset `{id}` does not exist or is not accessible"))?;
        datasets.push(DatasetRef {
            id: dataset.id.clone(),
            name: dataset.name.clone(),
        });
    }

    let deps = ControllerDeps {
        planner: workflow.clone(),
        executor: workflow,
        conversations: proxy,
    };
    let controller = ReportController::new(deps, user.email.clone(), config.polling);

    let plan = controller.request_plan(prompt, datasets, &model).await?;
    let plan = match args.get_one::<PathBuf>("plan-file") {
        Some(path) => replace_plan(&controller, path)?,
        None => plan,
    };
    print_plan(&plan);

    if args.get_flag("plan-only") {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let report_id = controller.execute_plan().await?;
    println!("Submitted report {report_id}");

    let settled = follow(&controller).await?;
    controller.shutdown();

    match settled.state {
        ControllerState::Completed => {
            println!();
            println!("{}", settled.final_report.unwrap_or_default());
            Ok(())
        }
        ControllerState::Failed => {
            let reason = settled
                .failure
                .map_or_else(|| "unknown failure".to_string(), |f| f.to_string());
            bail!("report {report_id} failed: {reason}")
        }
        ControllerState::Stopped => {
            println!("Report {report_id} stopped");
            Ok(())
        }
        other => bail!("report ended in unexpected state {other}"),
    }
}

/// Swap the generated plan for the contents of `path` via the JSON editor
fn replace_plan(controller: &ReportController, path: &Path) -> anyhow::Result<ReportPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan file {}", path.display()))?;

    controller.toggle_json_view()?;
    controller.set_json_text(text)?;
    match controller.toggle_json_view() {
        Ok(JsonViewToggle::Closed(plan)) => Ok(plan),
        Ok(JsonViewToggle::Opened(_)) => bail!("plan editor did not close"),
        Err(err) => {
            controller.discard_json_edits()?;
            Err(err).with_context(|| format!("plan file {} rejected", path.display()))
        }
    }
}

fn print_plan(plan: &ReportPlan) {
    println!("Plan {} ({} steps)", plan.plan_id, plan.total_steps);
    for step in &plan.steps {
        let deps = if step.dependencies.is_empty() {
            String::new()
        } else {
            let deps: Vec<String> = step.dependencies.iter().map(u32::to_string).collect();
            format!("  after {}", deps.join(","))
        };
        println!("  {}. [{}] {}{deps}", step.step_number, step.dataset_id, step.purpose);
    }
}

/// Print step updates until the execution settles; Ctrl-C stops it
async fn follow(controller: &ReportController) -> anyhow::Result<ControllerSnapshot> {
    let mut updates = controller.subscribe();
    let mut reported: Vec<(u32, StepStatus)> = Vec::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_steps(&snapshot, &mut reported);
                if snapshot.state.is_settled() {
                    return Ok(snapshot);
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted, stopping report");
                interrupt(controller)?;
                break;
            }
        }
    }
    Ok(controller.snapshot())
}

/// Stop on Ctrl-C; an execution that already settled is left as it is
fn interrupt(controller: &ReportController) -> Result<(), ReportError> {
    match controller.stop_execution() {
        Err(ReportError::Transition(err)) => {
            tracing::debug!(%err, "execution already settled");
            Ok(())
        }
        other => other,
    }
}

fn print_steps(snapshot: &ControllerSnapshot, reported: &mut Vec<(u32, StepStatus)>) {
    let Some(progress) = &snapshot.progress else {
        return;
    };
    for step in &progress.steps {
        let key = (step.step_number, step.status);
        if reported.contains(&key) {
            continue;
        }
        reported.push(key);
        let label = match step.status {
            StepStatus::Started => "started",
            StepStatus::Completed => "done",
            StepStatus::Error => "error",
        };
        println!("  step {} {label}", step.step_number);
    }
    if snapshot.stall_count > 0 {
        tracing::debug!(stall_count = snapshot.stall_count, "waiting for final report");
    }
}
