use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use console::style;

use super::{data_store, flag_value, positionals, require_auth, resolve_api_url};
use crate::core::api::ApiClient;
use crate::core::poller;
use crate::core::registry::{Job, JobRegistry, now_millis};
use crate::core::terminal::{print_status, print_success, print_warn};
use crate::core::tools::{ALL_TOOLS, ToolKind};

pub async fn run(args: &[String]) -> Result<()> {
    let positional = positionals(args, 2);
    let (Some(tool_arg), Some(file_arg)) = (positional.first(), positional.get(1)) else {
        println!(
            "{}",
            style("Usage: pipeshift submit <tool> <file> [--name <name>] [--no-watch] [--output <file>]")
                .bold()
        );
        println!(
            "  Tools: {}",
            ALL_TOOLS
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Ok(());
    };

    let Some(tool) = ToolKind::parse(tool_arg) else {
        bail!(
            "Unknown tool '{}'. Supported tools: {}",
            tool_arg,
            ALL_TOOLS
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let path = Path::new(file_arg);
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_lowercase();
        if !tool.accepted_extensions().contains(&ext.as_str()) {
            print_warn(&format!(
                "{} usually expects {} files; submitting anyway.",
                tool,
                tool.accepted_extensions().join("/")
            ));
        }
    }
    tool.validate_content(&content)?;

    let store = data_store();
    let auth = require_auth(&store).await?;
    let client = Arc::new(ApiClient::new(&resolve_api_url(args), auth));
    let registry = Arc::new(JobRegistry::load(store).await);

    print_status("Submitting", &format!("{} migration from {}", tool, path.display()));
    let correlation_id = client.submit_migration(tool, &content).await?;

    let name = flag_value(args, &["--name", "-n"])
        .or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("{} migration {}", tool, now_millis()));
    registry
        .upsert(Job::submitted(&correlation_id, &name, tool))
        .await?;

    print_success(&format!("Submitted. Correlation id: {}", correlation_id));

    if args.iter().any(|a| a == "--no-watch") {
        print_status(
            "Next",
            &format!("pipeshift watch {}", correlation_id),
        );
        return Ok(());
    }

    let output = flag_value(args, &["--output", "-o"]).map(std::path::PathBuf::from);
    let sub = poller::subscribe(client, registry, &correlation_id);
    super::watch::follow(sub, output).await
}
