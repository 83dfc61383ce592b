use std::fs;
use std::path::PathBuf;

use rawimg::config::{AppConfig, BuildConfig};
use rawimg::disk::commands::{build_request, BuildArgs};
use tempfile::TempDir;

#[test]
fn genconfig_writes_loadable_file_and_respects_force() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join(".rawimg.toml");

    AppConfig::generate_config_file(&path, false).expect("generate");
    let content = fs::read_to_string(&path).expect("read");
    assert!(content.starts_with("# rawimg configuration file"));
    assert!(content.contains("[build]"));

    let loaded = AppConfig::load_from_file(&path).expect("load");
    let build = loaded.build.expect("build table");
    assert_eq!(build.artifact_name.as_deref(), Some("kairos"));
    assert_eq!(build.vhd, Some(false));

    assert!(AppConfig::generate_config_file(&path, false).is_err());
    fs::write(&path, "[build]\nvhd = true\n").expect("edit");
    AppConfig::generate_config_file(&path, true).expect("force");
    assert!(fs::read_to_string(&path).expect("read").contains("artifact_name"));
}

#[test]
fn partial_config_feeds_build_request() {
    let temp = TempDir::new().expect("temp dir");
    let cc = temp.path().join("cc.yaml");
    fs::write(&cc, "#cloud-config\nhostname: from-file\n").expect("write cc");
    let path = temp.path().join(".rawimg.toml");
    fs::write(
        &path,
        format!("[build]\ncloud_config = \"{}\"\nsize = \"2G\"\ngce = true\n", cc.display()),
    )
    .expect("write config");

    let cfg: BuildConfig = AppConfig::load_from_file(&path)
        .expect("load")
        .build
        .expect("build");
    let request = build_request(
        BuildArgs {
            source: temp.path().display().to_string(),
            ..BuildArgs::default()
        },
        Some(&cfg),
    )
    .expect("request");
    assert_eq!(request.cloud_config.as_deref(), Some("#cloud-config\nhostname: from-file\n"));
    assert_eq!(request.final_size, 2 * 1024 * 1024 * 1024);
    assert!(request.conversions.gce);
    assert!(!request.conversions.vhd);
    assert_eq!(request.output_dir, PathBuf::from("."));
}

#[test]
fn unreadable_cloud_config_is_an_error() {
    let args = BuildArgs {
        source: "/rootfs".to_string(),
        cloud_config: Some(PathBuf::from("/nonexistent/cc.yaml")),
        ..BuildArgs::default()
    };
    let err = build_request(args, None).expect_err("missing file");
    assert!(err.to_string().contains("/nonexistent/cc.yaml"));
}
