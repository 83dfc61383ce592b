#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rawimg::disk::constants::MIB;
use rawimg::disk::deploy::{DeployRequest, ImageDeployer};
use rawimg::disk::error::Result;
use rawimg::disk::types::FsType;
use walkdir::WalkDir;

/// What a deploy call saw in its staged tree.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub label: String,
    pub fs_type: FsType,
    pub size_mb: u64,
    /// Relative path -> contents; files over 64 KiB are recorded empty.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Writes sparse images of the requested size instead of running mkfs.
#[derive(Debug, Default)]
pub struct SparseDeployer {
    pub calls: Mutex<Vec<Deployed>>,
}

impl SparseDeployer {
    pub fn deployed(&self, label: &str) -> Option<Deployed> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .find(|d| d.label == label)
            .cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .map(|d| d.label.clone())
            .collect()
    }
}

impl ImageDeployer for SparseDeployer {
    fn deploy(&self, req: &DeployRequest) -> Result<PathBuf> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(&req.source_dir).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&req.source_dir)
                .expect("inside tree")
                .to_string_lossy()
                .into_owned();
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let data = if len <= 64 * 1024 {
                fs::read(entry.path()).unwrap_or_default()
            } else {
                Vec::new()
            };
            files.insert(rel, data);
        }
        self.calls.lock().expect("lock").push(Deployed {
            label: req.label.clone(),
            fs_type: req.fs_type,
            size_mb: req.size_mb,
            files,
        });

        let file = fs::File::create(&req.image).expect("create image");
        file.set_len(req.size_mb * MIB).expect("size image");
        Ok(req.image.clone())
    }
}

pub const SHIM: &str = "usr/lib/shim/shimx64.efi.signed";
pub const GRUB: &str = "usr/lib/grub/x86_64-efi-signed/grubx64.efi.signed";

/// Rootfs with release info, grub config, shim and grub plus a sparse
/// filler file of `filler_mb` MiB.
pub fn fake_rootfs(root: &Path, filler_mb: u64, with_boot_assets: bool) {
    write(
        root,
        "etc/kairos-release",
        b"KAIROS_FLAVOR=\"opensuse\"\nKAIROS_IMAGE_LABEL=\"v3.2.4-test\"\nKAIROS_MODEL=\"generic\"\nKAIROS_TARGETARCH=\"amd64\"\n",
    );
    write(root, "etc/cos/grub.cfg", b"set timeout=5\n");
    if with_boot_assets {
        write(root, SHIM, b"shim-binary");
        write(root, GRUB, b"grub-binary");
    }
    if filler_mb > 0 {
        let filler = root.join("usr/lib/filler.bin");
        fs::create_dir_all(root.join("usr/lib")).expect("mkdir");
        let file = fs::File::create(&filler).expect("create filler");
        file.set_len(filler_mb * MIB).expect("size filler");
    }
}

pub fn write(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, data).expect("write");
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
