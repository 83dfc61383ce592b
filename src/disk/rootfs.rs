use std::path::PathBuf;

use super::error::{ImageError, Result};
use super::types::SourceLocator;

/// Resolves a [`SourceLocator`] into a readable rootfs directory.
pub trait RootfsProvider {
    fn resolve(&self, source: &SourceLocator) -> Result<PathBuf>;
}

/// Accepts plain directories only. Container references must be unpacked beforehand.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryRootfs;

impl RootfsProvider for DirectoryRootfs {
    fn resolve(&self, source: &SourceLocator) -> Result<PathBuf> {
        match source {
            SourceLocator::Dir(path) => {
                if !path.is_dir() {
                    return Err(ImageError::Source {
                        locator: source.to_string(),
                        reason: "not a directory".to_string(),
                    });
                }
                Ok(path.clone())
            }
            SourceLocator::Container(_) => Err(ImageError::Source {
                locator: source.to_string(),
                reason: "container images must be extracted to a directory first".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directories_and_rejects_containers() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let dir = SourceLocator::Dir(temp.path().to_path_buf());
        assert_eq!(DirectoryRootfs.resolve(&dir).expect("dir"), temp.path());

        let missing = SourceLocator::Dir(temp.path().join("nope"));
        assert!(matches!(
            DirectoryRootfs.resolve(&missing),
            Err(ImageError::Source { .. })
        ));

        let container = SourceLocator::Container("quay.io/kairos/core:latest".to_string());
        let err = DirectoryRootfs.resolve(&container).unwrap_err();
        assert!(err.to_string().contains("quay.io/kairos/core:latest"));
    }
}
