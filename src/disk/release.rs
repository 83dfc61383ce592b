use anyhow::{anyhow, Context};
use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ImageError, Result};

pub const KAIROS_RELEASE: &str = "etc/kairos-release";
pub const OS_RELEASE: &str = "etc/os-release";

/// Key/value pairs from a rootfs release file.
#[derive(Debug, Clone, Default)]
pub struct ReleaseInfo {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ReleaseInfo {
    /// Reads `etc/kairos-release`, or `etc/os-release` on rootfs trees that predate it.
    pub fn load(rootfs: &Path) -> Result<Self> {
        let kairos = rootfs.join(KAIROS_RELEASE);
        let path = if kairos.exists() {
            kairos
        } else {
            rootfs.join(OS_RELEASE)
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))
            .map_err(|source| ImageError::Release {
                path: path.clone(),
                source,
            })?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: PathBuf, content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .collect();
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up `KAIROS_<key>` first, then the bare key. Empty values count as missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&format!("KAIROS_{key}"))
            .or_else(|| self.values.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| ImageError::Release {
            path: self.path.clone(),
            source: anyhow!("{key} is not set"),
        })
    }

    pub fn image_label(&self) -> Result<&str> {
        self.require("IMAGE_LABEL")
    }

    pub fn flavor(&self) -> Result<&str> {
        self.require("FLAVOR")
    }

    pub fn model(&self) -> Result<&str> {
        self.require("MODEL")
    }

    /// `<artifact>-<flavor>-<label>.raw`
    pub fn output_name(&self, artifact_name: &str) -> Result<String> {
        let flavor = self.flavor()?;
        let label = self.image_label()?;
        Ok(format!("{artifact_name}-{flavor}-{label}.raw"))
    }

    pub fn target_arch(&self) -> String {
        if let Some(arch) = self.get("TARGETARCH") {
            return arch.to_string();
        }
        let host = host_arch();
        warn!(
            "TARGETARCH missing from {}, using host architecture {host}",
            self.path.display()
        );
        host.to_string()
    }

    /// Flavor and model used to pick the EFI layout. Failure here is never fatal.
    pub fn model_and_flavor(&self) -> Option<(String, String)> {
        match (self.model(), self.flavor()) {
            (Ok(model), Ok(flavor)) => Some((model.to_string(), flavor.to_string())),
            _ => {
                warn!(
                    "failed to get flavor or model from {}, using the generic EFI layout",
                    self.path.display()
                );
                None
            }
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}
