//! Archive extraction (zip, tar.gz, tar.xz).

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use xz2::read::XzDecoder;

use crate::{DepsError, Result};

/// Largest uncompressed size accepted for a single archive member (5 GiB)
pub const MAX_ENTRY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Parse the short extension names used throughout the cache (`zip`, `tgz`, `txz`)
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext {
            "zip" => Ok(ArchiveFormat::Zip),
            "tgz" => Ok(ArchiveFormat::TarGz),
            "txz" => Ok(ArchiveFormat::TarXz),
            other => Err(DepsError::UnknownExtension(other.to_string())),
        }
    }

    /// Detect the format from the last extension of a URL or file name.
    ///
    /// A bare `.gz` or `.xz` is taken to be a compressed tarball.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next()?;
        let (_, ext) = file_name.rsplit_once('.')?;

        match ext.to_ascii_lowercase().as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "tgz" | "gz" => Some(ArchiveFormat::TarGz),
            "txz" | "xz" => Some(ArchiveFormat::TarXz),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tgz",
            ArchiveFormat::TarXz => "txz",
        }
    }
}

/// Extract an archive with the default size limit
pub fn extract(format: ArchiveFormat, archive_path: &Path, dest_dir: &Path) -> Result<()> {
    ArchiveExtractor::new().extract(format, archive_path, dest_dir)
}

/// Archive extractor
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    max_entry_size: u64,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self {
            max_entry_size: MAX_ENTRY_SIZE,
        }
    }

    pub fn with_max_entry_size(mut self, max_entry_size: u64) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// Extract `archive_path` into `dest_dir`, creating it if needed.
    ///
    /// Entries are processed in archive order. Any entry that would land
    /// outside `dest_dir` aborts the extraction before it is written.
    pub fn extract(&self, format: ArchiveFormat, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        fs::create_dir_all(dest_dir)
            .map_err(|e| DepsError::io("create directory", dest_dir, e))?;
        let root = dest_dir
            .canonicalize()
            .map_err(|e| DepsError::io("canonicalize destination", dest_dir, e))?;

        log::debug!(
            "Extracting {} ({}) to {}",
            archive_path.display(),
            format.extension(),
            root.display()
        );

        match format {
            ArchiveFormat::Zip => self.extract_zip(archive_path, &root),
            ArchiveFormat::TarGz => {
                let file = open_archive(archive_path)?;
                self.extract_tar(GzDecoder::new(BufReader::new(file)), archive_path, &root)
            }
            ArchiveFormat::TarXz => {
                let file = open_archive(archive_path)?;
                self.extract_tar(XzDecoder::new(BufReader::new(file)), archive_path, &root)
            }
        }
    }

    fn extract_zip(&self, archive_path: &Path, root: &Path) -> Result<()> {
        let file = open_archive(archive_path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| archive_error(archive_path, e))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| archive_error(archive_path, e))?;
            let name = entry.name().to_string();

            let Some(target) = entry_destination(root, &name)? else {
                continue;
            };

            if entry.is_dir() {
                prepare_parent(root, &target, &name)?;
                fs::create_dir_all(&target)
                    .map_err(|e| DepsError::io("create directory", &target, e))?;
                continue;
            }

            if entry.size() > self.max_entry_size {
                return Err(DepsError::FileTooLarge {
                    entry: name,
                    size: entry.size(),
                    limit: self.max_entry_size,
                });
            }

            prepare_parent(root, &target, &name)?;

            let mode = entry.unix_mode();
            if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                let mut link = String::new();
                entry
                    .read_to_string(&mut link)
                    .map_err(|e| archive_error(archive_path, e))?;
                create_symlink(Path::new(&link), &target)?;
                continue;
            }

            write_file(&mut entry, &target, &name, self.max_entry_size)?;
            if let Some(mode) = mode {
                set_mode(&target, mode)?;
            }
        }

        Ok(())
    }

    fn extract_tar<R: Read>(&self, reader: R, archive_path: &Path, root: &Path) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        let mut hard_links: Vec<(PathBuf, PathBuf)> = Vec::new();

        let entries = archive
            .entries()
            .map_err(|e| archive_error(archive_path, e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| archive_error(archive_path, e))?;
            let name = entry
                .path()
                .map_err(|e| archive_error(archive_path, e))?
                .to_string_lossy()
                .into_owned();
            let entry_type = entry.header().entry_type();

            if entry_type.is_pax_global_extensions() {
                continue;
            }

            // Tars usually start with a header for the current directory
            let Some(target) = entry_destination(root, &name)? else {
                continue;
            };

            match entry_type {
                EntryType::Directory => {
                    prepare_parent(root, &target, &name)?;
                    fs::create_dir_all(&target)
                        .map_err(|e| DepsError::io("create directory", &target, e))?;
                }
                EntryType::Regular | EntryType::Continuous => {
                    let size = entry.size();
                    if size > self.max_entry_size {
                        return Err(DepsError::FileTooLarge {
                            entry: name,
                            size,
                            limit: self.max_entry_size,
                        });
                    }

                    let mode = entry.header().mode().ok();
                    prepare_parent(root, &target, &name)?;
                    write_file(&mut entry, &target, &name, self.max_entry_size)?;
                    if let Some(mode) = mode {
                        set_mode(&target, mode)?;
                    }
                }
                EntryType::Symlink => {
                    let link = link_name(&entry, archive_path, &name)?;
                    prepare_parent(root, &target, &name)?;
                    create_symlink(&link, &target)?;
                }
                EntryType::Link => {
                    // Resolved after everything else exists
                    let link = link_name(&entry, archive_path, &name)?;
                    let original = entry_destination(root, &link.to_string_lossy())?
                        .ok_or_else(|| DepsError::IllegalPath(link.display().to_string()))?;
                    hard_links.push((target, original));
                }
                other => {
                    return Err(DepsError::Archive {
                        path: archive_path.to_path_buf(),
                        reason: format!("unknown type: {:?} in {}", other, name),
                    });
                }
            }
        }

        for (link, original) in hard_links {
            let name = link.display().to_string();
            // The source may sit behind a symlink extracted earlier
            if let Some(parent) = original.parent() {
                ensure_inside(root, parent, &original.display().to_string())?;
            }
            prepare_parent(root, &link, &name)?;
            remove_existing_link(&link)?;
            fs::hard_link(&original, &link)
                .map_err(|e| DepsError::io(format!("hard link {} to", original.display()), &link, e))?;
        }

        Ok(())
    }
}

fn open_archive(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| DepsError::io("open archive", path, e))
}

fn archive_error(path: &Path, err: impl std::fmt::Display) -> DepsError {
    DepsError::Archive {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn link_name<R: Read>(entry: &tar::Entry<'_, R>, archive_path: &Path, name: &str) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| archive_error(archive_path, e))?
        .map(|link| link.into_owned())
        .ok_or_else(|| DepsError::Archive {
            path: archive_path.to_path_buf(),
            reason: format!("link entry {} has no target", name),
        })
}

/// Lexically clean an entry name and join it onto `root`.
///
/// Returns `None` for names that clean to the root itself (such as `./`).
fn entry_destination(root: &Path, name: &str) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(DepsError::IllegalPath(root.join(name).display().to_string()));
                }
            }
            Component::Prefix(_) => {
                return Err(DepsError::IllegalPath(name.to_string()));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Ok(None);
    }

    Ok(Some(root.join(relative)))
}

/// Make sure the parent of `target` resolves inside `root` (following any
/// symlinks extracted earlier), then create it.
fn prepare_parent(root: &Path, target: &Path, name: &str) -> Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };

    ensure_inside(root, parent, name)?;
    fs::create_dir_all(parent).map_err(|e| DepsError::io("create directory", parent, e))
}

/// Resolve the deepest existing ancestor of `path` and reject it unless it
/// stays under `root`.
fn ensure_inside(root: &Path, path: &Path, name: &str) -> Result<()> {
    let mut existing = path;
    while !existing.exists() {
        match existing.parent() {
            Some(up) => existing = up,
            None => break,
        }
    }

    let resolved = existing
        .canonicalize()
        .map_err(|e| DepsError::io("canonicalize", existing, e))?;
    if !resolved.starts_with(root) {
        return Err(DepsError::IllegalPath(format!(
            "{} (escapes {})",
            name,
            root.display()
        )));
    }

    Ok(())
}

fn remove_existing_link(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => {
            fs::remove_file(target).map_err(|e| DepsError::io("remove", target, e))
        }
        _ => Ok(()),
    }
}

fn write_file<R: Read>(reader: R, target: &Path, name: &str, limit: u64) -> Result<()> {
    remove_existing_link(target)?;

    let mut out = File::create(target).map_err(|e| DepsError::io("create file", target, e))?;
    let written = io::copy(&mut reader.take(limit + 1), &mut out)
        .map_err(|e| DepsError::io("write file", target, e))?;
    drop(out);

    if written > limit {
        let _ = fs::remove_file(target);
        return Err(DepsError::FileTooLarge {
            entry: name.to_string(),
            size: written,
            limit,
        });
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(target: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| DepsError::io("change mode of file", target, e))
}

#[cfg(not(unix))]
fn set_mode(_target: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        log::trace!("Symlink {} already exists", target.display());
        return Ok(());
    }

    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(link, target);
    #[cfg(windows)]
    let created = std::os::windows::fs::symlink_file(link, target);

    created.map_err(|e| DepsError::io(format!("create symlink to {} at", link.display()), target, e))
}
