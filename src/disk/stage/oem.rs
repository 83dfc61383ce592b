use log::debug;
use std::fs;
use std::path::Path;

use super::manifest::{grubenv, render, reset_config, state_size_mb};
use crate::disk::constants::{
    CUSTOM_CLOUD_CONFIG, DEFAULT_CLOUD_CONFIG, GRUBENV_FILE, RESET_CLOUD_CONFIG,
};
use crate::disk::error::{ImageError, Result};

/// Writes the OEM tree. `recovery_image` must already exist since the
/// declared state partition is sized from it.
pub fn stage_oem_tree(
    tree: &Path,
    cloud_config: Option<&str>,
    recovery_image: &Path,
) -> Result<u64> {
    let custom = tree.join(CUSTOM_CLOUD_CONFIG);
    let content = match cloud_config {
        Some(cc) if !cc.is_empty() => cc,
        _ => {
            debug!("no cloud config supplied, writing default");
            DEFAULT_CLOUD_CONFIG
        }
    };
    fs::write(&custom, content).map_err(|e| ImageError::staging("write cloud config", &custom, e))?;

    let env_path = tree.join(GRUBENV_FILE);
    fs::write(&env_path, grubenv(&[("next_entry", "recovery")]))
        .map_err(|e| ImageError::staging("write grubenv", &env_path, e))?;

    let recovery_len = fs::metadata(recovery_image)
        .map_err(|e| ImageError::sizing(recovery_image, e))?
        .len();
    let state_mb = state_size_mb(recovery_len);
    debug!("state partition declared at {state_mb} MiB");

    let reset = tree.join(RESET_CLOUD_CONFIG);
    let yaml = render(&reset_config(state_mb))
        .map_err(|e| ImageError::staging("render reset config", &reset, e))?;
    fs::write(&reset, yaml).map_err(|e| ImageError::staging("write reset config", &reset, e))?;
    Ok(state_mb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::constants::MIB;

    #[test]
    fn writes_config_env_and_manifest() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let recovery = temp.path().join("recovery.img");
        fs::File::create(&recovery).expect("create").set_len(20 * MIB).expect("len");
        let tree = temp.path().join("oem");
        fs::create_dir(&tree).expect("mkdir");

        let state = stage_oem_tree(&tree, Some("#cloud-config\nhostname: test\n"), &recovery)
            .expect("stage");
        assert_eq!(state, 160);
        assert!(fs::read_to_string(tree.join(CUSTOM_CLOUD_CONFIG)).unwrap().contains("hostname: test"));
        assert_eq!(fs::metadata(tree.join(GRUBENV_FILE)).unwrap().len(), 1024);
        assert!(fs::read_to_string(tree.join(RESET_CLOUD_CONFIG)).unwrap().contains("size: 160"));
    }

    #[test]
    fn default_config_and_missing_recovery() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let err = stage_oem_tree(temp.path(), None, &temp.path().join("absent.img")).unwrap_err();
        assert!(matches!(err, ImageError::SizeCalculation { .. }));
        assert_eq!(
            fs::read_to_string(temp.path().join(CUSTOM_CLOUD_CONFIG)).unwrap(),
            DEFAULT_CLOUD_CONFIG
        );
    }
}
