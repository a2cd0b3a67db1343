use anyhow::{Result, bail};
use console::style;

use super::{data_store, positionals};
use crate::core::events::JobStatus;
use crate::core::registry::{Job, JobRegistry, now_millis};
use crate::core::terminal::{print_info, print_success};

pub async fn run(args: &[String]) -> Result<()> {
    let positional = positionals(args, 2);
    let sub_cmd = positional.first().map(String::as_str).unwrap_or("list");
    let registry = JobRegistry::load(data_store()).await;

    match sub_cmd {
        "list" | "ls" => {
            let jobs = registry.list().await;
            if jobs.is_empty() {
                print_info("No recent migrations. Submit one with `pipeshift submit`.");
                return Ok(());
            }
            for job in jobs {
                print_job_line(&job);
            }
            Ok(())
        }
        "show" => {
            let Some(id) = positional.get(1) else {
                println!("{}", style("Usage: pipeshift jobs show <id>").bold());
                return Ok(());
            };
            let Some(job) = registry.get_by_id(id).await else {
                bail!("No recent migration with id '{}'", id);
            };
            print_job_line(&job);
            if let Some(yaml) = &job.yaml {
                println!("\n{}", style("--- generated pipeline YAML ---").dim());
                println!("{}", yaml);
            } else {
                print_info("No generated YAML yet.");
            }
            Ok(())
        }
        "remove" | "rm" => {
            let Some(id) = positional.get(1) else {
                println!("{}", style("Usage: pipeshift jobs remove <id>").bold());
                return Ok(());
            };
            if registry.remove(id).await? {
                print_success(&format!("Removed {} from recent migrations.", id));
            } else {
                print_info(&format!("No recent migration with id '{}'.", id));
            }
            Ok(())
        }
        other => bail!("Unknown jobs subcommand: {}", other),
    }
}

fn print_job_line(job: &Job) {
    let status = match job.status {
        JobStatus::Completed => style(job.status.as_str()).green(),
        JobStatus::Failed => style(job.status.as_str()).red(),
        _ => style(job.status.as_str()).yellow(),
    };
    let tool = job
        .tool
        .map(|t| t.as_str())
        .unwrap_or("unknown");
    println!(
        "  {:<12} {}  {} {} {}",
        status,
        style(&job.id).bold(),
        job.name,
        style(format!("[{}]", tool)).dim(),
        style(format_age(job.created_at)).dim()
    );
}

/// Rough age like "5s ago" or "3h ago"; recent jobs do not need exact dates.
fn format_age(created_at: i64) -> String {
    let secs = ((now_millis() - created_at) / 1000).max(0);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
