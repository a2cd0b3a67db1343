use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use console::style;

use super::{data_store, flag_value, positionals, require_auth, resolve_api_url};
use crate::core::api::ApiClient;
use crate::core::events::{Event, JobStatus};
use crate::core::poller::{self, PollState, Subscription};
use crate::core::registry::JobRegistry;
use crate::core::terminal::{print_error, print_info, print_success, print_warn};

pub async fn run(args: &[String]) -> Result<()> {
    let Some(correlation_id) = positionals(args, 2).into_iter().next() else {
        println!(
            "{}",
            style("Usage: pipeshift watch <correlation-id> [--output <file>]").bold()
        );
        return Ok(());
    };
    let output = flag_value(args, &["--output", "-o"]).map(PathBuf::from);

    let store = data_store();
    let auth = require_auth(&store).await?;
    let client = Arc::new(ApiClient::new(&resolve_api_url(args), auth));
    let registry = Arc::new(JobRegistry::load(store).await);

    print_info(&format!("Watching migration {}", correlation_id));
    let sub = poller::subscribe(client, registry, &correlation_id);
    follow(sub, output).await
}

fn print_event(event: &Event) {
    let status = match event.agent_status {
        JobStatus::Completed => style(event.agent_status.as_str()).green(),
        JobStatus::Failed => style(event.agent_status.as_str()).red(),
        _ => style(event.agent_status.as_str()).yellow(),
    };
    let mut line = format!("[{}] {}", status, event.message);
    if let Some(tool) = &event.tool {
        line.push_str(&format!(" ({})", style(tool).dim()));
    }
    println!("  {}", line);
}

/// Stream poll snapshots to the terminal until the subscription finishes or
/// the user interrupts it.
pub(crate) async fn follow(sub: Subscription, output: Option<PathBuf>) -> Result<()> {
    let mut rx = sub.watch();
    let mut printed = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        let snap = rx.borrow_and_update().clone();
        for event in &snap.events[printed..] {
            print_event(event);
        }
        printed = snap.events.len();

        match snap.state {
            PollState::Completed => {
                // The loop exits right after publishing a terminal snapshot;
                // reap it so its registry write is done before we return.
                sub.join().await;
                let failed = snap
                    .events
                    .iter()
                    .any(|e| e.event_type.as_deref() == Some(crate::core::events::MIGRATION_FAILED));
                let succeeded = !failed
                    || snap
                        .events
                        .iter()
                        .any(|e| e.agent_status == JobStatus::Completed);
                if succeeded {
                    print_success("Migration completed.");
                } else {
                    print_error("Migration failed. See events above.");
                }
                if let Some(yaml) = &snap.yaml {
                    match output {
                        Some(path) => {
                            tokio::fs::write(&path, yaml).await?;
                            print_success(&format!("Pipeline YAML written to {}", path.display()));
                        }
                        None => {
                            println!("\n{}", style("--- generated pipeline YAML ---").dim());
                            println!("{}", yaml);
                        }
                    }
                }
                return Ok(());
            }
            PollState::FailedFatal => {
                let message = snap
                    .error
                    .unwrap_or_else(|| "An error occurred while polling for events.".to_string());
                sub.join().await;
                return Err(anyhow!(message));
            }
            _ => {
                // Transient errors are surfaced once per distinct message
                // while the scheduler backs off and retries.
                if snap.error != last_error {
                    if let Some(err) = &snap.error {
                        print_warn(err);
                    }
                    last_error = snap.error.clone();
                }
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                sub.stop();
                sub.join().await;
                print_info("Stopped watching. The migration keeps running remotely.");
                return Ok(());
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    bail!("Polling stopped unexpectedly");
                }
            }
        }
    }
}
