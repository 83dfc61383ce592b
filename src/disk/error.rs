use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Pipeline phase an [`ImageError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Staging,
    Sizing,
    Assembly,
    Conversion,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no {asset} binary found in rootfs {} (searched: {})", root.display(), searched.join(", "))]
    MissingBootAsset {
        asset: &'static str,
        root: PathBuf,
        searched: Vec<String>,
    },

    #[error("rootfs is missing boot-loader config {}", path.display())]
    MissingGrubConfig { path: PathBuf },

    #[error("failed to deploy {label} image {}", image.display())]
    ImageDeploy {
        label: String,
        image: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to size {}", path.display())]
    SizeCalculation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("staging step '{step}' failed for {}", path.display())]
    Staging {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read release info from {}", path.display())]
    Release {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported source {locator}: {reason}")]
    Source { locator: String, reason: String },

    #[error("BIOS boot images are not supported, build with EFI instead")]
    BiosUnsupported,

    #[error("assembly step '{step}' failed for {}", path.display())]
    Assembly {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{format} conversion step '{step}' failed for {}", path.display())]
    FormatConversion {
        format: &'static str,
        step: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} is {size} bytes, not a multiple of 1 MiB", path.display())]
    InvalidVhdAlignment { path: PathBuf, size: u64 },
}

impl ImageError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::MissingBootAsset { .. }
            | Self::MissingGrubConfig { .. }
            | Self::ImageDeploy { .. }
            | Self::Staging { .. }
            | Self::Release { .. }
            | Self::Source { .. }
            | Self::BiosUnsupported => Phase::Staging,
            Self::SizeCalculation { .. } => Phase::Sizing,
            Self::Assembly { .. } => Phase::Assembly,
            Self::FormatConversion { .. } | Self::InvalidVhdAlignment { .. } => Phase::Conversion,
        }
    }

    pub(crate) fn staging(step: &'static str, path: &Path, err: impl Into<anyhow::Error>) -> Self {
        Self::Staging {
            step,
            path: path.to_path_buf(),
            source: err.into(),
        }
    }

    pub(crate) fn sizing(path: &Path, err: io::Error) -> Self {
        Self::SizeCalculation {
            path: path.to_path_buf(),
            source: err,
        }
    }

    pub(crate) fn assembly(step: &'static str, path: &Path, err: impl Into<anyhow::Error>) -> Self {
        Self::Assembly {
            step,
            path: path.to_path_buf(),
            source: err.into(),
        }
    }

    pub(crate) fn conversion(
        format: &'static str,
        step: &'static str,
        path: &Path,
        err: impl Into<anyhow::Error>,
    ) -> Self {
        Self::FormatConversion {
            format,
            step,
            path: path.to_path_buf(),
            source: err.into(),
        }
    }
}

pub type Result<T, E = ImageError> = std::result::Result<T, E>;
