//! The procurement steps behind a gate: download, verify, unpack, select
//! members and commit them into the cache.
//!
//! Everything is assembled in a scratch directory under `.ext/tmp` first.
//! Dedicated install directories are committed with a single rename, so a
//! `name-version` directory only ever appears fully populated.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use glob::MatchOptions;

use crate::config::CacheLayout;
use crate::downloader::{verify_digest, ArchiveExtractor, ArchiveFormat, Downloader};
use crate::{DepsError, Result};

use super::descriptor::{DependencyKind, ResolvedDependency};

const STAGING_DIR: &str = "staging";
const UNPACKED_DIR: &str = "unpacked";

#[derive(Debug, Clone)]
pub struct Installer {
    layout: CacheLayout,
    downloader: Downloader,
    extractor: ArchiveExtractor,
    go_command: OsString,
}

impl Installer {
    pub fn new(layout: CacheLayout, downloader: Downloader) -> Self {
        Self {
            layout,
            downloader,
            extractor: ArchiveExtractor::new(),
            go_command: OsString::from("go"),
        }
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_go_command(mut self, go_command: impl Into<OsString>) -> Self {
        self.go_command = go_command.into();
        self
    }

    /// Install `dep` into `install_dir` unless it is already there.
    /// Returns `entry`, the path callers use.
    pub fn install(&self, dep: &ResolvedDependency, install_dir: &Path, entry: &Path) -> Result<PathBuf> {
        let dedicated = dep.output_dir.is_none();
        if dedicated && install_dir.is_dir() {
            log::debug!("{} {} already installed at {}", dep.kind, dep.name, install_dir.display());
            return Ok(entry.to_path_buf());
        }

        match dep.kind {
            DependencyKind::Binary => self.install_binary(dep, install_dir)?,
            DependencyKind::Library => self.install_library(dep, install_dir)?,
            DependencyKind::GoPackage => self.install_go(dep, install_dir)?,
        }

        log::info!("Installed {} {} {} to {}", dep.kind, dep.name, dep.version, install_dir.display());
        Ok(entry.to_path_buf())
    }

    fn install_binary(&self, dep: &ResolvedDependency, install_dir: &Path) -> Result<()> {
        let scratch = self.layout.scratch_dir()?;
        let staging = scratch.path().join(STAGING_DIR);

        match dep.format {
            None => self.fetch(dep, &staging.join(&dep.entrypoint))?,
            Some(format) => {
                let unpacked = self.fetch_and_extract(dep, format, scratch.path())?;
                fs::create_dir_all(&staging).map_err(|e| DepsError::io("create dir", &staging, e))?;

                // Members are flattened into the install directory by file name
                for member in self.select_members(dep, &unpacked)? {
                    let file_name = member
                        .file_name()
                        .ok_or_else(|| DepsError::IllegalPath(member.display().to_string()))?;
                    move_path(&member, &staging.join(file_name))?;
                }
            }
        }

        let staged_entry = staging.join(&dep.entrypoint);
        if !staged_entry.is_file() {
            return Err(missing_entrypoint(dep));
        }
        make_executable(&staged_entry)?;

        commit(&staging, install_dir)
    }

    fn install_library(&self, dep: &ResolvedDependency, install_dir: &Path) -> Result<()> {
        let format = dep
            .format
            .ok_or_else(|| DepsError::Config(format!("Library '{}' has no archive format", dep.name)))?;

        let scratch = self.layout.scratch_dir()?;
        let unpacked = self.fetch_and_extract(dep, format, scratch.path())?;
        let staging = scratch.path().join(STAGING_DIR);
        fs::create_dir_all(&staging).map_err(|e| DepsError::io("create dir", &staging, e))?;

        for member in self.select_members(dep, &unpacked)? {
            let relative = member
                .strip_prefix(&unpacked)
                .map_err(|_| DepsError::IllegalPath(member.display().to_string()))?;

            let relative = match &dep.lib_prefix {
                Some(prefix) => relative.strip_prefix(prefix).map_err(|_| {
                    DepsError::Config(format!(
                        "Member '{}' of library '{}' is not under prefix '{}'",
                        relative.display(),
                        dep.name,
                        prefix
                    ))
                })?,
                None => relative,
            };

            if relative.as_os_str().is_empty() {
                merge_into(&member, &staging)?;
            } else {
                move_path(&member, &staging.join(relative))?;
            }
        }

        if dep.output_dir.is_some() {
            merge_into(&staging, install_dir)
        } else {
            commit(&staging, install_dir)
        }
    }

    fn install_go(&self, dep: &ResolvedDependency, install_dir: &Path) -> Result<()> {
        let scratch = self.layout.scratch_dir()?;
        let staging = scratch.path().join(STAGING_DIR);
        fs::create_dir_all(&staging).map_err(|e| DepsError::io("create dir", &staging, e))?;

        let module = format!("{}@{}", dep.source, dep.version);
        let program = self.go_command.to_string_lossy().into_owned();
        log::info!("Running {} install {}", program, module);

        let status = Command::new(&self.go_command)
            .arg("install")
            .arg(&module)
            .env("GOBIN", &staging)
            .status()
            .map_err(|e| {
                DepsError::procurement(
                    &dep.name,
                    "install",
                    DepsError::Command {
                        program: program.clone(),
                        reason: e.to_string(),
                    },
                )
            })?;

        if !status.success() {
            return Err(DepsError::procurement(
                &dep.name,
                "install",
                DepsError::Command {
                    program,
                    reason: format!("install {} exited with {}", module, status),
                },
            ));
        }

        if !staging.join(&dep.entrypoint).is_file() {
            return Err(missing_entrypoint(dep));
        }

        commit(&staging, install_dir)
    }

    /// Download and verify
    fn fetch(&self, dep: &ResolvedDependency, target: &Path) -> Result<()> {
        log::info!("Downloading {} {} from {}", dep.kind, dep.name, dep.source);
        self.downloader
            .download_to_file(&dep.source, target)
            .map_err(|e| DepsError::procurement(&dep.name, "download", e))?;

        if let Some(digest) = &dep.digest {
            log::debug!("Checking SHA256 of {}", target.display());
            verify_digest(target, digest).map_err(|e| DepsError::procurement(&dep.name, "verify", e))?;
        }
        Ok(())
    }

    fn fetch_and_extract(&self, dep: &ResolvedDependency, format: ArchiveFormat, scratch: &Path) -> Result<PathBuf> {
        let archive = scratch.join(format!("{}.{}", dep.name, format.extension()));
        self.fetch(dep, &archive)?;

        let unpacked = scratch.join(UNPACKED_DIR);
        log::info!("Extracting {} {}", dep.kind, dep.name);
        self.extractor
            .extract(format, &archive, &unpacked)
            .map_err(|e| DepsError::procurement(&dep.name, "extract", e))?;

        Ok(unpacked)
    }

    fn select_members(&self, dep: &ResolvedDependency, unpacked: &Path) -> Result<Vec<PathBuf>> {
        let members = find_members(unpacked, &dep.patterns)?;
        if members.is_empty() {
            return Err(DepsError::Config(format!(
                "No files in the archive of '{}' match {}",
                dep.name,
                dep.patterns.join(", ")
            )));
        }
        Ok(members)
    }
}

/// Expand member globs relative to `root`, in pattern order, without duplicates
pub fn find_members(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let base = glob::Pattern::escape(&root.to_string_lossy());

    let mut seen = HashSet::new();
    let mut members = Vec::new();
    for pattern in patterns {
        let escapes = Path::new(pattern)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(DepsError::IllegalPath(pattern.clone()));
        }

        let paths = glob::glob_with(&format!("{}/{}", base, pattern), options)
            .map_err(|e| DepsError::Config(format!("Invalid member pattern '{}': {}", pattern, e)))?;

        for path in paths {
            let path = path.map_err(|e| {
                let path = e.path().to_path_buf();
                DepsError::io("read", path, e.into_error())
            })?;
            // A match nested in an earlier directory match moves with it
            let covered = members.iter().any(|m: &PathBuf| path != *m && path.starts_with(m));
            if !covered && seen.insert(path.clone()) {
                members.push(path);
            }
        }
    }

    Ok(members)
}

fn missing_entrypoint(dep: &ResolvedDependency) -> DepsError {
    DepsError::Config(format!(
        "Entrypoint '{}' of '{}' is not among the installed files",
        dep.entrypoint, dep.name
    ))
}

fn move_path(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| DepsError::io("create dir", parent, e))?;
    }
    fs::rename(src, dst).map_err(|e| DepsError::io(format!("move '{}' to", src.display()), dst, e))
}

/// Rename a fully staged directory into place
fn commit(staging: &Path, install_dir: &Path) -> Result<()> {
    if let Some(parent) = install_dir.parent() {
        fs::create_dir_all(parent).map_err(|e| DepsError::io("create dir", parent, e))?;
    }

    match fs::rename(staging, install_dir) {
        Ok(()) => Ok(()),
        Err(_) if install_dir.is_dir() => {
            // Another process finished the same install first
            log::warn!("{} already exists, keeping it", install_dir.display());
            Ok(())
        }
        Err(e) => Err(DepsError::io(format!("move '{}' to", staging.display()), install_dir, e)),
    }
}

/// Move the contents of `src_dir` into `dst_dir`, merging directories and
/// replacing files that already exist
fn merge_into(src_dir: &Path, dst_dir: &Path) -> Result<()> {
    fs::create_dir_all(dst_dir).map_err(|e| DepsError::io("create dir", dst_dir, e))?;

    let entries = fs::read_dir(src_dir).map_err(|e| DepsError::io("read dir", src_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DepsError::io("read dir", src_dir, e))?;
        let src = entry.path();
        let dst = dst_dir.join(entry.file_name());
        let src_is_dir = entry
            .file_type()
            .map_err(|e| DepsError::io("stat", &src, e))?
            .is_dir();

        match fs::symlink_metadata(&dst) {
            Ok(meta) if meta.is_dir() && src_is_dir => {
                merge_into(&src, &dst)?;
                continue;
            }
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&dst).map_err(|e| DepsError::io("remove dir", &dst, e))?;
            }
            Ok(_) => {
                fs::remove_file(&dst).map_err(|e| DepsError::io("remove file", &dst, e))?;
            }
            Err(_) => {}
        }

        move_path(&src, &dst)?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .map_err(|e| DepsError::io("stat", path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).map_err(|e| DepsError::io("chmod", path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
