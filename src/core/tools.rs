use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// The fixed set of source CI/CD tools the platform can migrate from.
///
/// Each tool maps to a dedicated remote agent and a payload key the agent
/// expects its input under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    Spinnaker,
    Jenkins,
    AzureDevops,
    UrbanCode,
}

/// Input format a tool's configuration files use, for local validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Json,
    Yaml,
    Groovy,
}

pub const ALL_TOOLS: [ToolKind; 4] = [
    ToolKind::Spinnaker,
    ToolKind::Jenkins,
    ToolKind::AzureDevops,
    ToolKind::UrbanCode,
];

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Spinnaker => "Spinnaker",
            ToolKind::Jenkins => "Jenkins",
            ToolKind::AzureDevops => "AzureDevops",
            ToolKind::UrbanCode => "UrbanCode",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "spinnaker" => Some(ToolKind::Spinnaker),
            "jenkins" => Some(ToolKind::Jenkins),
            "azuredevops" | "azure-devops" | "azure" => Some(ToolKind::AzureDevops),
            "urbancode" | "urban-code" => Some(ToolKind::UrbanCode),
            _ => None,
        }
    }

    /// Remote agent that handles this tool's migrations.
    pub fn agent_id(self) -> &'static str {
        match self {
            ToolKind::Spinnaker => "68a3092193ef9dab0c0754b6",
            ToolKind::Jenkins => "68b93f86bc6dfa5ea693cece",
            ToolKind::AzureDevops => "azure-to-harness",
            ToolKind::UrbanCode => "urbancode-to-harness",
        }
    }

    /// Key the agent expects the file content under in `input_params`.
    pub fn file_key(self) -> &'static str {
        match self {
            ToolKind::Spinnaker => "jsonFile",
            ToolKind::Jenkins => "jenkinsFile",
            ToolKind::AzureDevops | ToolKind::UrbanCode => "yaml",
        }
    }

    pub fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            ToolKind::Spinnaker => &["json"],
            ToolKind::Jenkins => &["groovy", "jenkinsfile"],
            ToolKind::AzureDevops | ToolKind::UrbanCode => &["yml", "yaml"],
        }
    }

    pub fn content_format(self) -> ContentFormat {
        match self {
            ToolKind::Spinnaker => ContentFormat::Json,
            ToolKind::Jenkins => ContentFormat::Groovy,
            ToolKind::AzureDevops | ToolKind::UrbanCode => ContentFormat::Yaml,
        }
    }

    /// Validate file content locally before any network call. JSON and YAML
    /// inputs must parse; Groovy pipelines are opaque and only checked for
    /// being non-empty.
    pub fn validate_content(self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            bail!("File content is empty");
        }
        match self.content_format() {
            ContentFormat::Json => {
                if serde_json::from_str::<serde_json::Value>(content).is_err() {
                    bail!("Invalid JSON format. Please check your file content.");
                }
            }
            ContentFormat::Yaml => {
                if serde_yaml::from_str::<serde_yaml::Value>(content).is_err() {
                    bail!("Invalid YAML format. Please check your file content.");
                }
            }
            ContentFormat::Groovy => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_case_insensitively() {
        assert_eq!(ToolKind::parse("jenkins"), Some(ToolKind::Jenkins));
        assert_eq!(ToolKind::parse("Spinnaker"), Some(ToolKind::Spinnaker));
        assert_eq!(ToolKind::parse("azure-devops"), Some(ToolKind::AzureDevops));
        assert_eq!(ToolKind::parse("URBANCODE"), Some(ToolKind::UrbanCode));
        assert_eq!(ToolKind::parse("travis"), None);
    }

    #[test]
    fn spinnaker_rejects_invalid_json() {
        assert!(ToolKind::Spinnaker.validate_content("{not json").is_err());
        assert!(
            ToolKind::Spinnaker
                .validate_content(r#"{"application": "demo"}"#)
                .is_ok()
        );
    }

    #[test]
    fn yaml_tools_reject_invalid_yaml() {
        assert!(
            ToolKind::AzureDevops
                .validate_content("steps:\n  - script: echo hi\n")
                .is_ok()
        );
        assert!(ToolKind::UrbanCode.validate_content("a: b\n- broken").is_err());
    }

    #[test]
    fn jenkins_only_requires_non_empty_content() {
        assert!(ToolKind::Jenkins.validate_content("pipeline { }").is_ok());
        assert!(ToolKind::Jenkins.validate_content("   \n").is_err());
    }

    #[test]
    fn every_tool_has_an_agent_and_file_key() {
        for tool in ALL_TOOLS {
            assert!(!tool.agent_id().is_empty());
            assert!(!tool.file_key().is_empty());
            assert!(!tool.accepted_extensions().is_empty());
        }
    }
}
