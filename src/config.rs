//! Configuration Management
//!
//! Loads the static values a stack is synthesized from. Values come from a
//! JSON or YAML file, are overridden by CLI flags, and fall back to the
//! gcloud environment for the project.

use crate::pipeline::instance_bounds;
use crate::synth::Backend;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_ENTRY_POINT: &str = "imageUploaded";
const DEFAULT_RUNTIME: &str = "go119";
const DEFAULT_FUNCTION_NAME: &str = "function";

/// Environment variables checked for the project, in order
const PROJECT_ENV_VARS: &[&str] = &["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// Function build settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
}

/// Stack configuration as written on disk
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Vertex AI endpoint the function calls
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub min_instance_count: Option<u32>,
    #[serde(default)]
    pub max_instance_count: Option<u32>,
    #[serde(default)]
    pub function: FunctionConfig,
    #[serde(default)]
    pub backend: Option<Backend>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub endpoint_id: Option<String>,
}

/// Fully resolved stack settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub project: String,
    pub region: String,
    pub endpoint_id: String,
    pub min_instance_count: Option<u32>,
    pub max_instance_count: Option<u32>,
    pub function_name: String,
    pub entry_point: String,
    pub runtime: String,
    pub backend: Option<Backend>,
}

impl StackConfig {
    /// Settings for `project` with every other value defaulted
    pub fn new(project: &str, endpoint_id: &str) -> Self {
        Self {
            project: project.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint_id: endpoint_id.to_string(),
            min_instance_count: None,
            max_instance_count: None,
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            backend: None,
        }
    }
}

impl Config {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pipesynth").join("config.json"))
    }

    /// Load from `path`, or from the default location when `path` is None.
    /// A missing default file yields an empty config; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&path, &content)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))
        } else {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))
        }
    }

    /// Get effective project (CLI > config > gcloud environment)
    pub fn effective_project(&self, overrides: &Overrides) -> Option<String> {
        overrides
            .project_id
            .clone()
            .or_else(|| self.project_id.clone())
            .or_else(default_project_from_env)
    }

    /// Apply overrides and defaults
    pub fn resolve(&self, overrides: &Overrides) -> Result<StackConfig> {
        let project = self.effective_project(overrides).ok_or_else(|| {
            anyhow::anyhow!(
                "No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project flag"
            )
        })?;
        if !validate_project_id(&project) {
            anyhow::bail!("Invalid GCP project ID: {}", project);
        }

        let endpoint_id = overrides
            .endpoint_id
            .clone()
            .or_else(|| self.endpoint_id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("No prediction endpoint configured. Use --endpoint-id flag")
            })?;

        // Checked against the defaults too, so a lone min cannot exceed them
        instance_bounds(self.min_instance_count, self.max_instance_count)?;

        let mut stack = StackConfig::new(&project, &endpoint_id);
        if let Some(region) = overrides.region.clone().or_else(|| self.region.clone()) {
            stack.region = region;
        }
        stack.min_instance_count = self.min_instance_count;
        stack.max_instance_count = self.max_instance_count;
        if let Some(name) = &self.function.name {
            stack.function_name = name.clone();
        }
        if let Some(entry_point) = &self.function.entry_point {
            stack.entry_point = entry_point.clone();
        }
        if let Some(runtime) = &self.function.runtime {
            stack.runtime = runtime.clone();
        }
        stack.backend = self.backend.clone();
        Ok(stack)
    }
}

/// Read the default project from the gcloud environment variables
fn default_project_from_env() -> Option<String> {
    for var in PROJECT_ENV_VARS {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }
    None
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
