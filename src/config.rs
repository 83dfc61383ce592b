use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".rawimg.toml";

/// Defaults for `rawimg build`; command line arguments win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_config: Option<PathBuf>,
    /// Bytes or with K/M/G suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhd: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gce: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn generate_config_file(path: impl AsRef<Path>, force: bool) -> anyhow::Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                path.display()
            );
        }

        fs::write(path, Self::generate_full_config()?)?;

        info!("Configuration file generated: {}", path.display());
        info!("Please edit this file to customize configuration");
        Ok(())
    }

    pub fn generate_full_config() -> anyhow::Result<String> {
        let config = AppConfig {
            build: Some(BuildConfig {
                output: Some(PathBuf::from("build")),
                cloud_config: Some(PathBuf::from("cloud-config.yaml")),
                size: Some("0".to_string()),
                artifact_name: Some(crate::disk::constants::DEFAULT_ARTIFACT_NAME.to_string()),
                vhd: Some(false),
                gce: Some(false),
            }),
        };
        let toml_content = toml::to_string_pretty(&config)?;
        Ok(format!(
            "# rawimg configuration file\n# All fields are optional, command line arguments override config file values\n\n{toml_content}"
        ))
    }
}
