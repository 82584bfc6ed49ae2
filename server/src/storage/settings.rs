//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write a daily rolling log file under `<base_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Terraform execution configuration
    #[serde(default)]
    pub terraform: TerraformSettings,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            terraform: TerraformSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the file
    /// does not exist
    pub async fn load(file: &File) -> Result<Self, ServerError> {
        let settings = file.read_json_opt::<Settings>().await?;
        Ok(settings.unwrap_or_default())
    }

    /// Settings file, then environment overrides read through `lookup`,
    /// then the `--port` flag
    pub async fn resolve<F>(file: &File, port: Option<&str>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::load(file)
            .await
            .with_context(|| format!("Unable to read settings file {}", file.path().display()))?;
        settings
            .apply_overrides(lookup)
            .context("Invalid environment")?;

        if let Some(port) = port {
            settings.server.port = port
                .parse()
                .with_context(|| format!("Invalid --port: {}", port))?;
        }
        Ok(settings)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(image) = non_empty("DOCKER_IMAGE_NAME") {
            self.terraform.image_name = Some(image);
        }
        if let Some(container_id) = non_empty("CONTAINERID") {
            self.terraform.container_id = Some(container_id);
        }
        if let Some(port) = non_empty("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ServerError::ConfigError(format!("Invalid PORT: {}", port)))?;
        }
        if let Some(level) = non_empty("SPACECTL_LOG_LEVEL") {
            self.log_level = level.parse().map_err(ServerError::ConfigError)?;
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Terraform execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformSettings {
    /// Image of the shared Terraform container, resolved to a running
    /// container on every request
    #[serde(default)]
    pub image_name: Option<String>,

    /// Fixed container id; takes precedence over `image_name`
    #[serde(default)]
    pub container_id: Option<String>,

    /// Root of the cloned repositories inside the container
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Prefix of generated deployment ids
    #[serde(default = "default_deployment_prefix")]
    pub deployment_prefix: String,

    /// Shell used to run the composed command chain
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Container runtime CLI
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    /// Extra environment passed to every Terraform invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_workspace_root() -> String {
    "/workspace".to_string()
}

fn default_deployment_prefix() -> String {
    "bagel-dep".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            image_name: None,
            container_id: None,
            workspace_root: default_workspace_root(),
            deployment_prefix: default_deployment_prefix(),
            shell: default_shell(),
            docker_binary: default_docker_binary(),
            env: BTreeMap::new(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Base directory for deployment and project documents
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Keep documents in memory only
    #[serde(default)]
    pub in_memory: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/lib/spacectl")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            in_memory: false,
        }
    }
}
