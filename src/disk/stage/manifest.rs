use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::disk::constants::{
    GRUBENV_SIZE, MIB, PERSISTENT_LABEL, PERSISTENT_PART_NAME, RECOVERY_LABEL,
    RESET_CLOUD_CONFIG, STATE_EXTRA_BYTES, STATE_LABEL, STATE_PART_NAME,
};
use crate::disk::types::FsType;

/// First-boot config consumed by yip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YipConfig {
    pub name: String,
    pub stages: BTreeMap<String, Vec<Stage>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(rename = "if", default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub device: Device,
    pub add_partitions: Vec<LayoutPartition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPartition {
    #[serde(rename = "fsLabel")]
    pub fs_label: String,
    /// MiB, 0 takes the rest of the disk.
    pub size: u64,
    #[serde(rename = "pLabel")]
    pub p_label: String,
    pub filesystem: String,
}

/// `(recovery * 3 + 100 MiB) / 1 MiB`, floored.
pub fn state_size_mb(recovery_image_bytes: u64) -> u64 {
    (recovery_image_bytes * 3 + STATE_EXTRA_BYTES) / MIB
}

fn add_partition_stage(name: &str, part: LayoutPartition) -> Stage {
    Stage {
        name: name.to_string(),
        layout: Some(Layout {
            device: Device {
                label: RECOVERY_LABEL.to_string(),
            },
            add_partitions: vec![part],
        }),
        ..Stage::default()
    }
}

/// Expands the layout on first boot, resets into the installed system and
/// removes itself afterwards.
pub fn reset_config(state_size_mb: u64) -> YipConfig {
    let mut stages = BTreeMap::new();
    stages.insert(
        "rootfs.before".to_string(),
        vec![
            add_partition_stage(
                "Add state partition",
                LayoutPartition {
                    fs_label: STATE_LABEL.to_string(),
                    size: state_size_mb,
                    p_label: STATE_PART_NAME.to_string(),
                    filesystem: FsType::Ext4.to_string(),
                },
            ),
            add_partition_stage(
                "Add persistent partition",
                LayoutPartition {
                    fs_label: PERSISTENT_LABEL.to_string(),
                    size: 0,
                    p_label: PERSISTENT_PART_NAME.to_string(),
                    filesystem: FsType::Ext4.to_string(),
                },
            ),
        ],
    );
    stages.insert(
        "network".to_string(),
        vec![Stage {
            name: "Run auto reset".to_string(),
            condition: r#"[ -f "/run/cos/recovery_mode" ]"#.to_string(),
            commands: vec!["kairos-agent --debug reset --unattended --reboot".to_string()],
            layout: None,
        }],
    );
    stages.insert(
        "after-reset".to_string(),
        vec![Stage {
            name: "Auto remove this file".to_string(),
            condition: format!(r#"[ -f "/oem/{RESET_CLOUD_CONFIG}" ]"#),
            commands: vec![format!("rm /oem/{RESET_CLOUD_CONFIG}")],
            layout: None,
        }],
    );
    YipConfig {
        name: "Expand disk layout".to_string(),
        stages,
    }
}

pub fn render(config: &YipConfig) -> serde_yaml::Result<String> {
    serde_yaml::to_string(config)
}

/// Fixed-size GRUB environment block.
pub fn grubenv(vars: &[(&str, &str)]) -> Vec<u8> {
    let mut block = String::from("# GRUB Environment Block\n");
    for (key, value) in vars {
        block.push_str(key);
        block.push('=');
        block.push_str(value);
        block.push('\n');
    }
    let mut bytes = block.into_bytes();
    bytes.resize(GRUBENV_SIZE.max(bytes.len()), b'#');
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_size_triples_recovery_plus_margin() {
        assert_eq!(state_size_mb(0), 100);
        assert_eq!(state_size_mb(10 * MIB), 130);
        // floored
        assert_eq!(state_size_mb(MIB + 1), 103);
    }

    #[test]
    fn reset_config_renders_yip_fields() {
        let yaml = render(&reset_config(1234)).expect("render");
        assert!(yaml.contains("name: Expand disk layout"));
        assert!(yaml.contains("rootfs.before:"));
        assert!(yaml.contains("fsLabel: COS_STATE"));
        assert!(yaml.contains("size: 1234"));
        assert!(yaml.contains("pLabel: persistent"));
        assert!(yaml.contains("label: COS_RECOVERY"));
        assert!(yaml.contains("kairos-agent --debug reset --unattended --reboot"));
        assert!(yaml.contains("rm /oem/01_reset.yaml"));

        let parsed: YipConfig = serde_yaml::from_str(&yaml).expect("parse");
        let rootfs = &parsed.stages["rootfs.before"];
        assert_eq!(rootfs.len(), 2);
        let persistent = &rootfs[1].layout.as_ref().expect("layout").add_partitions[0];
        assert_eq!(persistent.size, 0);
        assert_eq!(persistent.filesystem, "ext4");
        assert_eq!(parsed.stages["network"][0].condition, r#"[ -f "/run/cos/recovery_mode" ]"#);
    }

    #[test]
    fn grubenv_is_padded_block() {
        let env = grubenv(&[("next_entry", "recovery")]);
        assert_eq!(env.len(), GRUBENV_SIZE);
        let text = String::from_utf8(env).expect("utf8");
        assert!(text.starts_with("# GRUB Environment Block\nnext_entry=recovery\n#"));
        assert!(text.trim_end_matches('#').ends_with("recovery\n"));
    }
}
