use anyhow::{Result, bail};
use console::style;

use super::{data_store, flag_value, positionals, resolve_api_url};
use crate::core::api::{ApiClient, PipelineParams};
use crate::core::auth::CredentialStore;
use crate::core::registry::JobRegistry;
use crate::core::terminal::{print_status, print_success};

pub async fn run(args: &[String]) -> Result<()> {
    let Some(job_id) = positionals(args, 2).into_iter().next() else {
        println!(
            "{}",
            style(
                "Usage: pipeshift pipeline <job-id> --api-key <key> --account <id> --org <id> --project <id>"
            )
            .bold()
        );
        return Ok(());
    };

    let api_key = flag_value(args, &["--api-key"])
        .or_else(|| std::env::var("PIPESHIFT_PIPELINE_API_KEY").ok());
    let Some(api_key) = api_key else {
        bail!("Missing --api-key (or PIPESHIFT_PIPELINE_API_KEY).");
    };
    let Some(account_id) = flag_value(args, &["--account"]) else {
        bail!("Missing --account identifier.");
    };
    let Some(org_id) = flag_value(args, &["--org"]) else {
        bail!("Missing --org identifier.");
    };
    let Some(project_id) = flag_value(args, &["--project"]) else {
        bail!("Missing --project identifier.");
    };

    let store = data_store();
    let registry = JobRegistry::load(store.clone()).await;
    let Some(job) = registry.get_by_id(&job_id).await else {
        bail!("No recent migration with id '{}'", job_id);
    };
    let Some(yaml) = &job.yaml else {
        bail!(
            "Migration '{}' has no generated YAML yet. Watch it to completion first.",
            job_id
        );
    };

    // The pipeline API lives behind the same gateway under /harness and is
    // keyed by API key rather than the bearer credential.
    let auth = CredentialStore::new(store).load().await?.unwrap_or_default();
    let base_url = format!("{}/harness", resolve_api_url(args));
    let client = ApiClient::new(&base_url, auth);

    print_status("Publishing", &format!("pipeline from migration {}", job_id));
    let identifier = client
        .create_pipeline(PipelineParams {
            api_key: &api_key,
            account_id: &account_id,
            org_id: &org_id,
            project_id: &project_id,
            yaml,
        })
        .await?;

    print_success(&format!("Pipeline created: {}", identifier));
    Ok(())
}
