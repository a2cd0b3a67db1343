mod jobs;
mod login;
mod pipeline;
mod submit;
mod watch;

use std::sync::Arc;

use anyhow::{Result, bail};
use console::style;

use crate::core::auth::{AuthHeaders, CredentialStore};
use crate::core::store::{FileStore, KvStore};
use crate::core::terminal::{self, GuideSection, print_error};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Migrations")
        .command("submit", "Submit a config file for migration and follow it")
        .command("watch", "Follow events for a submitted migration")
        .command("jobs", "List, inspect, or remove recent migrations")
        .print();

    GuideSection::new("Publishing")
        .command("pipeline", "Create a pipeline from a completed migration's YAML")
        .print();

    GuideSection::new("Session")
        .command("login", "Store the platform credential locally")
        .command("logout", "Clear the stored credential")
        .print();

    println!(
        " {} {} <command> [options]   (--api-url <url>, --verbose)\n",
        style("Usage:").bold(),
        style("pipeshift").green()
    );
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    crate::logging::init(verbose);

    let command = args.get(1).map(String::as_str).unwrap_or("");
    match command {
        "login" => login::run_login(&args).await,
        "logout" => login::run_logout().await,
        "submit" => submit::run(&args).await,
        "watch" => watch::run(&args).await,
        "jobs" => jobs::run(&args).await,
        "pipeline" => pipeline::run(&args).await,
        "help" | "--help" | "-h" | "" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

/// Value of the first matching `--flag <value>` pair, if present.
pub(crate) fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if names.contains(&args[i].as_str()) {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

/// Positional arguments after `start`, skipping flags and their values.
pub(crate) fn positionals(args: &[String], start: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = start;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--verbose" || arg == "-v" || arg.starts_with("--no-") {
            i += 1;
        } else if arg.starts_with('-') {
            i += 2; // flag plus its value
        } else {
            out.push(arg.clone());
            i += 1;
        }
    }
    out
}

pub(crate) fn resolve_api_url(args: &[String]) -> String {
    flag_value(args, &["--api-url"])
        .or_else(|| std::env::var("PIPESHIFT_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

pub(crate) fn data_store() -> Arc<dyn KvStore> {
    Arc::new(FileStore::new(FileStore::default_dir()))
}

/// Load the stored credential and require it to pass the shape check. Without
/// one, no command may start polling or submitting.
pub(crate) async fn require_auth(store: &Arc<dyn KvStore>) -> Result<AuthHeaders> {
    let creds = CredentialStore::new(store.clone());
    match creds.load().await? {
        Some(headers) if headers.is_authenticated() => Ok(headers),
        _ => bail!(
            "You are not authenticated. Please log in with `pipeshift login --token <token>`."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_finds_first_match() {
        let a = args(&["pipeshift", "watch", "c1", "--api-url", "http://x", "-o", "out.yaml"]);
        assert_eq!(flag_value(&a, &["--api-url"]).as_deref(), Some("http://x"));
        assert_eq!(flag_value(&a, &["--output", "-o"]).as_deref(), Some("out.yaml"));
        assert_eq!(flag_value(&a, &["--name"]), None);
    }

    #[test]
    fn positionals_skip_flags_and_their_values() {
        let a = args(&[
            "pipeshift", "submit", "jenkins", "Jenkinsfile", "--name", "demo", "--no-watch", "-v",
        ]);
        assert_eq!(positionals(&a, 2), vec!["jenkins", "Jenkinsfile"]);
    }
}
