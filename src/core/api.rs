use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use thiserror::Error;

use super::auth::AuthHeaders;
use super::events::Event;
use super::tools::ToolKind;

/// Structured transport error carried up to the polling scheduler, which owns
/// all fatal-vs-transient classification. Nothing is swallowed here.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable credential present; detected before any network call.
    #[error("Unauthenticated")]
    Unauthenticated,
    /// The remote answered 401.
    #[error("Unauthorized")]
    Unauthorized,
    /// The remote answered 403.
    #[error("Forbidden")]
    Forbidden,
    /// Any other non-success response.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    /// A success response that does not match the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Connection-level failure (DNS, refused, reset, malformed body).
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// Parameters for publishing a generated YAML artifact as a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineParams<'a> {
    pub api_key: &'a str,
    pub account_id: &'a str,
    pub org_id: &'a str,
    pub project_id: &'a str,
    pub yaml: &'a str,
}

/// HTTP client for the migration agent platform.
pub struct ApiClient {
    base_url: String,
    auth: AuthHeaders,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: AuthHeaders) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            client: Client::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req.header("Authorization", &self.auth.authorization);
        if !self.auth.client_id.is_empty() {
            req = req.header("x-client-id", &self.auth.client_id);
        }
        if !self.auth.project_id.is_empty() {
            req = req.header("x-project-id", &self.auth.project_id);
        }
        if !self.auth.workspace_id.is_empty() {
            req = req.header("x-workspace-id", &self.auth.workspace_id);
        }
        req
    }

    /// Fetch the full set of events known to the server for a correlation id.
    /// The server is the source of truth for "all events so far"; no deltas.
    pub async fn fetch_events(&self, correlation_id: &str) -> Result<Vec<Event>, ApiError> {
        if !self.is_authenticated() {
            return Err(ApiError::Unauthenticated);
        }
        let url = format!(
            "{}/events/events?correlationId={}",
            self.base_url,
            urlencoding::encode(correlation_id)
        );
        let res = self.authed(self.client.get(&url)).send().await?;
        match res.status() {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            status if !status.is_success() => Err(ApiError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
            _ => Ok(res.json().await?),
        }
    }

    /// Submit a migration job to the tool's agent. Returns the correlation id
    /// the platform assigned to the job.
    pub async fn submit_migration(
        &self,
        tool: ToolKind,
        content: &str,
    ) -> Result<String, ApiError> {
        if !self.is_authenticated() {
            return Err(ApiError::Unauthenticated);
        }
        let url = format!("{}/agents/{}/query", self.base_url, tool.agent_id());

        let mut input_params = serde_json::Map::new();
        input_params.insert(tool.file_key().to_string(), Value::String(content.to_string()));
        input_params.insert("use_docker_agent".to_string(), Value::Bool(true));
        let body = serde_json::json!({ "input_params": input_params });

        let res = self.authed(self.client.post(&url)).json(&body).send().await?;
        match res.status() {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            status if !status.is_success() => Err(ApiError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
            _ => {
                let data: Value = res.json().await?;
                data.get("data")
                    .and_then(|d| d.get("correlation_id"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::InvalidResponse("missing correlation_id".to_string())
                    })
            }
        }
    }

    /// Publish a generated YAML artifact as a pipeline on the downstream
    /// orchestration API. Authenticated by API key, not the bearer credential.
    pub async fn create_pipeline(&self, params: PipelineParams<'_>) -> Result<String, ApiError> {
        let url = format!(
            "{}/pipeline/api/pipelines/v2?accountIdentifier={}&orgIdentifier={}&projectIdentifier={}",
            self.base_url,
            urlencoding::encode(params.account_id),
            urlencoding::encode(params.org_id),
            urlencoding::encode(params.project_id),
        );
        let res = self
            .client
            .post(&url)
            .header("Content-Type", "application/yaml")
            .header("x-api-key", params.api_key)
            .body(params.yaml.to_string())
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ApiError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let data: Value = res.json().await?;
        data.pointer("/data/identifier")
            .or_else(|| data.pointer("/data/pipeline/identifier"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidResponse("missing pipeline identifier".to_string()))
    }
}
