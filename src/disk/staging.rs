use anyhow::Context;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::error::{ImageError, Result};
use super::utils::remove_host_path;

/// Build-scoped scratch space. Dropping it removes everything below the root.
#[derive(Debug)]
pub struct StagingContext {
    root: TempDir,
}

impl StagingContext {
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("rawimg-")
            .tempdir()
            .map_err(|e| ImageError::staging("create build directory", &std::env::temp_dir(), e))?;
        debug!("staging under {}", root.path().display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Fresh empty directory for one partition tree.
    pub fn tree(&self, name: &str) -> Result<ScratchDir> {
        let path = self.root().join(name);
        remove_host_path(&path);
        fs::create_dir_all(&path)
            .with_context(|| format!("mkdir {}", path.display()))
            .map_err(|e| ImageError::staging("create staging tree", &path, e))?;
        Ok(ScratchDir { path })
    }

    /// Path for an intermediate image, removed when the guard drops.
    pub fn image(&self, name: &str) -> ScratchFile {
        ScratchFile {
            path: self.root().join(name),
            armed: true,
        }
    }
}

/// Directory removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        remove_host_path(&self.path);
    }
}

/// File removed on drop unless [`ScratchFile::persist`] was called.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Guards a file outside the staging root, such as a half-written output.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            remove_host_path(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_clean_up_on_drop() {
        let ctx = StagingContext::new().expect("context");
        let root = ctx.root().to_path_buf();

        let tree_path = {
            let tree = ctx.tree("efi").expect("tree");
            fs::write(tree.join("grub.cfg"), "x").expect("write");
            tree.path().to_path_buf()
        };
        assert!(!tree_path.exists());

        let image_path = {
            let image = ctx.image("oem.img");
            fs::write(image.path(), b"img").expect("write");
            image.path().to_path_buf()
        };
        assert!(!image_path.exists());

        let kept = {
            let image = ctx.image("recovery.img");
            fs::write(image.path(), b"img").expect("write");
            image.persist()
        };
        assert!(kept.exists());

        drop(ctx);
        assert!(!root.exists());
    }
}
