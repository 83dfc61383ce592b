use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use gpt::partition_types;
use uuid::Uuid;

use super::constants::{
    BIOS_LABEL, BIOS_PART_NAME, DEFAULT_ARTIFACT_NAME, EFI_LABEL, EFI_PART_NAME, MIB, OEM_LABEL,
    OEM_PART_NAME, RECOVERY_LABEL, RECOVERY_PART_NAME,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Efi,
    Bios,
}

/// Where the root filesystem comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Dir(PathBuf),
    Container(String),
}

impl SourceLocator {
    pub fn parse(input: &str) -> Self {
        if let Some(dir) = input.strip_prefix("dir:") {
            return Self::Dir(PathBuf::from(dir));
        }
        for prefix in ["docker:", "oci:", "container:"] {
            if let Some(reference) = input.strip_prefix(prefix) {
                return Self::Container(reference.trim_start_matches("//").to_string());
            }
        }
        let path = Path::new(input);
        if !path.exists() && input.contains(':') && !input.starts_with('/') {
            return Self::Container(input.to_string());
        }
        Self::Dir(path.to_path_buf())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir(path) => write!(f, "dir:{}", path.display()),
            Self::Container(reference) => write!(f, "container:{reference}"),
        }
    }
}

/// Immutable input to a raw image build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source: SourceLocator,
    pub cloud_config: Option<String>,
    /// Minimum size of the final disk in bytes, 0 leaves the assembled size alone.
    pub final_size: u64,
    pub boot_mode: BootMode,
    pub output_dir: PathBuf,
    pub artifact_name: String,
    pub conversions: Conversions,
}

/// Cloud formats produced from the raw image after it is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conversions {
    pub vhd: bool,
    pub gce: bool,
}

impl BuildRequest {
    pub fn efi(source: SourceLocator, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            cloud_config: None,
            final_size: 0,
            boot_mode: BootMode::Efi,
            output_dir: output_dir.into(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            conversions: Conversions::default(),
        }
    }

    pub fn with_cloud_config(mut self, cloud_config: Option<String>) -> Self {
        self.cloud_config = cloud_config;
        self
    }

    pub fn with_final_size(mut self, final_size: u64) -> Self {
        self.final_size = final_size;
        self
    }

    pub fn with_boot_mode(mut self, boot_mode: BootMode) -> Self {
        self.boot_mode = boot_mode;
        self
    }

    pub fn with_conversions(mut self, conversions: Conversions) -> Self {
        self.conversions = conversions;
        self
    }

    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Vfat,
    Ext2,
    Ext4,
}

impl FsType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vfat => "vfat",
            Self::Ext2 => "ext2",
            Self::Ext4 => "ext4",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partitions of the raw disk, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    BiosBoot,
    Efi,
    Oem,
    Recovery,
}

impl PartitionRole {
    pub const ORDER: [PartitionRole; 4] = [Self::BiosBoot, Self::Efi, Self::Oem, Self::Recovery];

    pub fn label(self) -> &'static str {
        match self {
            Self::BiosBoot => BIOS_LABEL,
            Self::Efi => EFI_LABEL,
            Self::Oem => OEM_LABEL,
            Self::Recovery => RECOVERY_LABEL,
        }
    }

    pub fn part_name(self) -> &'static str {
        match self {
            Self::BiosBoot => BIOS_PART_NAME,
            Self::Efi => EFI_PART_NAME,
            Self::Oem => OEM_PART_NAME,
            Self::Recovery => RECOVERY_PART_NAME,
        }
    }

    pub fn fs_type(self) -> Option<FsType> {
        match self {
            Self::BiosBoot => None,
            Self::Efi => Some(FsType::Vfat),
            Self::Oem | Self::Recovery => Some(FsType::Ext4),
        }
    }

    pub fn type_guid(self) -> partition_types::Type {
        match self {
            Self::BiosBoot => partition_types::BIOS,
            Self::Efi => partition_types::EFI,
            Self::Oem | Self::Recovery => partition_types::LINUX_FS,
        }
    }

    /// Bit 0 marks a required partition, bit 2 legacy BIOS bootable.
    pub fn attributes(self) -> u64 {
        match self {
            Self::BiosBoot => (1 << 0) | (1 << 2),
            Self::Efi => 1 << 0,
            Self::Oem | Self::Recovery => 0,
        }
    }

    pub fn partition_guid(self) -> Uuid {
        name_based_uuid(self.label())
    }
}

/// Deterministic v5 id in the URL namespace.
pub fn name_based_uuid(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

/// Fresh random v4 id.
pub fn random_uuid() -> Uuid {
    uuid::Builder::from_random_bytes(rand::random()).into_uuid()
}

#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub role: PartitionRole,
    pub fs_type: Option<FsType>,
    pub label: String,
    pub name: String,
    pub size_bytes: u64,
    pub source_dir: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl PartitionSpec {
    pub fn new(role: PartitionRole, size_bytes: u64) -> Self {
        Self {
            role,
            fs_type: role.fs_type(),
            label: role.label().to_string(),
            name: role.part_name().to_string(),
            size_bytes,
            source_dir: None,
            image: None,
        }
    }

    /// Attaches the staged tree and the image path it is deployed to.
    pub fn staged(mut self, source_dir: impl Into<PathBuf>, image: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(source_dir.into());
        self.image = Some(image.into());
        self
    }

    pub fn size_mb(&self) -> u64 {
        self.size_bytes.div_ceil(MIB)
    }
}

/// Inclusive sector range of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectorRange {
    pub start: u64,
    pub end: u64,
}

impl SectorRange {
    pub fn sectors(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }
}

#[derive(Serialize)]
pub struct PartitionInfo {
    pub index: u32,
    pub name: String,
    pub type_guid: String,
    pub guid: String,
    pub first_lba: u64,
    pub last_lba: u64,
    pub start_bytes: u64,
    pub size_bytes: u64,
}

#[derive(Serialize)]
pub struct DiskInfo {
    pub disk: String,
    pub size_bytes: u64,
    pub partitions: Vec<PartitionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhd: Option<VhdInfo>,
}

#[derive(Serialize)]
pub struct VhdInfo {
    pub current_size: u64,
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub disk_type: u32,
    pub unique_id: String,
    pub checksum_valid: bool,
}
