/// Integration tests for the `loot` binary. Procurement stays disabled so
/// nothing touches the network.
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const SHA: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

fn write_depfile(root: &Path) {
    fs::write(
        root.join("Depfile"),
        format!(
            "bin:\n  tool:\n    version: 1.0.0\n    url: http://127.0.0.1:9/tool\n    sha: {}\n\
             lib:\n  protos:\n    version: \"3.19\"\n    url: http://127.0.0.1:9/protos.zip\n    sha: {}\n    zipPaths: [include]\n",
            SHA, SHA
        ),
    )
    .unwrap();
}

fn loot(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_loot"))
        .arg("-d")
        .arg(dir)
        .args(args)
        .env("DEPFILE_SKIP_PROCUREMENT", "1")
        .env_remove("DEPFILE")
        .env_remove("DEPFILE_ROOT")
        .output()
        .unwrap()
}

#[test]
fn test_path_in_skip_mode() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    write_depfile(&root);

    let output = loot(&root, &["path", "tool"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        root.join(".ext/bin/tool-1.0.0/tool").display().to_string()
    );
}

#[test]
fn test_list_names() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    write_depfile(&root);

    let output = loot(&root, &["list", "--name-only"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "protos\ntool\n");
}

#[test]
fn test_fetch_in_skip_mode_does_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    write_depfile(&root);

    let output = loot(&root, &["fetch"]);
    assert!(output.status.success());
    assert!(!root.join(".ext/bin").exists());
}

#[test]
fn test_unknown_dependency_fails() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    write_depfile(&root);

    let output = loot(&root, &["path", "ghost"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
    assert!(stderr.contains("ghost"));
}
