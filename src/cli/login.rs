use anyhow::{Result, bail};
use console::style;

use super::{data_store, flag_value, positionals};
use crate::core::auth::{AuthHeaders, CredentialStore};
use crate::core::terminal::{print_status, print_success};

pub async fn run_login(args: &[String]) -> Result<()> {
    let token = flag_value(args, &["--token", "-t"])
        .or_else(|| positionals(args, 2).into_iter().next());
    let Some(token) = token else {
        println!(
            "{}",
            style("Usage: pipeshift login --token <token> [--client-id <id>] [--project-id <id>] [--workspace-id <id>]")
                .bold()
        );
        return Ok(());
    };

    let headers = AuthHeaders::with_token(
        &token,
        &flag_value(args, &["--client-id"]).unwrap_or_default(),
        &flag_value(args, &["--project-id"]).unwrap_or_default(),
        &flag_value(args, &["--workspace-id"]).unwrap_or_default(),
    );
    if !headers.is_authenticated() {
        bail!("Token looks too short to be valid.");
    }

    CredentialStore::new(data_store()).save(&headers).await?;
    print_success("Logged in. Credential stored locally.");
    if !headers.project_id.is_empty() {
        print_status("Project", &headers.project_id);
    }
    if !headers.workspace_id.is_empty() {
        print_status("Workspace", &headers.workspace_id);
    }
    Ok(())
}

pub async fn run_logout() -> Result<()> {
    CredentialStore::new(data_store()).clear().await?;
    print_success("Logged out. Stored credential removed.");
    Ok(())
}
