use std::collections::BTreeMap;
use std::fmt;

use crate::downloader::{is_sha256_hex, ArchiveFormat};
use crate::platform::Platform;
use crate::template::{expand_all, Template, TemplateContext};
use crate::{DepsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Prebuilt tool fetched over HTTP
    Binary,
    /// Headers, protos or other files fetched over HTTP
    Library,
    /// Built with `go install`
    GoPackage,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Binary => "bin",
            DependencyKind::Library => "lib",
            DependencyKind::GoPackage => "go",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected SHA-256 of a downloaded artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Digest {
    /// Same artifact on every platform
    Single(String),
    /// Keyed by `os-arch`, e.g. `linux-amd64`
    ByPlatform(BTreeMap<String, String>),
}

impl Digest {
    pub fn for_platform(&self, platform: &Platform) -> Option<&str> {
        match self {
            Digest::Single(hex) => Some(hex),
            Digest::ByPlatform(map) => map.get(&platform.key()).map(String::as_str),
        }
    }
}

/// Which archive members to keep, per archive format
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub zip_paths: Vec<String>,
    pub tgz_paths: Vec<String>,
    pub txz_paths: Vec<String>,
    /// Leading directory stripped from library members
    pub lib_prefix: Option<String>,
}

impl ArchiveOptions {
    pub fn patterns_for(&self, format: ArchiveFormat) -> &[String] {
        match format {
            ArchiveFormat::Zip => &self.zip_paths,
            ArchiveFormat::TarGz => &self.tgz_paths,
            ArchiveFormat::TarXz => &self.txz_paths,
        }
    }

    pub fn has_patterns(&self) -> bool {
        !(self.zip_paths.is_empty() && self.tgz_paths.is_empty() && self.txz_paths.is_empty())
    }

    fn formats_with_patterns(&self) -> Vec<&'static str> {
        [ArchiveFormat::Zip, ArchiveFormat::TarGz, ArchiveFormat::TarXz]
            .into_iter()
            .filter(|f| !self.patterns_for(*f).is_empty())
            .map(|f| f.extension())
            .collect()
    }
}

/// Everything needed to procure one dependency, as declared by the user.
///
/// Strings may contain `{{.Version}}`, `{{.OS}}` and `{{.Arch}}`; they are
/// rendered when the descriptor is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub name: String,
    pub kind: DependencyKind,
    /// URL template, or import path for Go packages
    pub source: String,
    pub version: String,
    pub digest: Option<Digest>,
    pub archive: ArchiveOptions,
    /// Path of the executable inside the install directory, defaults to `name`
    pub entrypoint: Option<String>,
    /// Shared directory under `.ext/lib` (libraries only)
    pub output_dir: Option<String>,
}

impl DependencyDescriptor {
    fn new(name: impl Into<String>, kind: DependencyKind, source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            source: source.into(),
            version: version.into(),
            digest: None,
            archive: ArchiveOptions::default(),
            entrypoint: None,
            output_dir: None,
        }
    }

    pub fn binary(name: impl Into<String>, version: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, DependencyKind::Binary, url, version)
    }

    pub fn library(name: impl Into<String>, version: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, DependencyKind::Library, url, version)
    }

    pub fn go_package(name: impl Into<String>, import_path: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name, DependencyKind::GoPackage, import_path, version)
    }

    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn with_sha256(self, hex: impl Into<String>) -> Self {
        self.with_digest(Digest::Single(hex.into()))
    }

    /// Add a digest for one `os-arch` key
    pub fn with_platform_sha256(mut self, key: impl Into<String>, hex: impl Into<String>) -> Self {
        let mut map = match self.digest.take() {
            Some(Digest::ByPlatform(map)) => map,
            _ => BTreeMap::new(),
        };
        map.insert(key.into(), hex.into());
        self.digest = Some(Digest::ByPlatform(map));
        self
    }

    pub fn with_archive(mut self, archive: ArchiveOptions) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_zip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive.zip_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tgz_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive.tgz_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_txz_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive.txz_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lib_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.archive.lib_prefix = Some(prefix.into());
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Validate the descriptor and render it for `platform`
    pub(crate) fn resolve(&self, platform: &Platform) -> Result<ResolvedDependency> {
        check_name(&self.name)?;
        if self.version.is_empty() && self.kind != DependencyKind::Library {
            return Err(DepsError::Config(format!("Dependency '{}' has no version", self.name)));
        }

        let ctx = TemplateContext {
            version: &self.version,
            platform,
        };
        let render = |source: &str| -> Result<String> { Ok(Template::parse(source)?.render(&ctx)) };

        let entrypoint = match &self.entrypoint {
            Some(entrypoint) => render(entrypoint.as_str())?,
            None => self.name.clone(),
        };
        if entrypoint.is_empty() {
            return Err(DepsError::Config(format!("Dependency '{}' has an empty entrypoint", self.name)));
        }
        if !stays_below(&entrypoint) {
            return Err(DepsError::Config(format!(
                "Dependency '{}' has an invalid entrypoint '{}'",
                self.name, entrypoint
            )));
        }

        if self.kind == DependencyKind::GoPackage {
            return Ok(ResolvedDependency {
                name: self.name.clone(),
                kind: self.kind,
                version: self.version.clone(),
                source: self.source.clone(),
                digest: None,
                format: None,
                patterns: Vec::new(),
                lib_prefix: None,
                entrypoint,
                output_dir: None,
            });
        }

        let url = render(self.source.as_str())?;
        let digest = self.select_digest(platform)?;

        let format = if self.archive.has_patterns() {
            Some(self.archive_format(&url)?)
        } else if self.kind == DependencyKind::Library {
            return Err(DepsError::Config(format!(
                "Library '{}' must list the archive members to install",
                self.name
            )));
        } else {
            None
        };

        let patterns = match format {
            Some(format) => expand_all(self.archive.patterns_for(format), &self.version, platform)?,
            None => Vec::new(),
        };

        let lib_prefix = self
            .archive
            .lib_prefix
            .as_deref()
            .map(render)
            .transpose()?
            .filter(|p| !p.is_empty());

        let output_dir = match (&self.output_dir, self.kind) {
            (Some(dir), DependencyKind::Library) => {
                check_relative(&self.name, dir)?;
                Some(dir.clone())
            }
            _ => None,
        };

        Ok(ResolvedDependency {
            name: self.name.clone(),
            kind: self.kind,
            version: self.version.clone(),
            source: url,
            digest: Some(digest),
            format,
            patterns,
            lib_prefix,
            entrypoint,
            output_dir,
        })
    }

    fn select_digest(&self, platform: &Platform) -> Result<String> {
        let hex = self
            .digest
            .as_ref()
            .and_then(|d| d.for_platform(platform))
            .ok_or_else(|| DepsError::MissingPlatformDigest {
                name: self.name.clone(),
                platform: platform.key(),
            })?;

        if !is_sha256_hex(hex) {
            return Err(DepsError::Config(format!(
                "Dependency '{}' has an invalid SHA256 '{}'",
                self.name, hex
            )));
        }
        Ok(hex.to_ascii_lowercase())
    }

    /// The URL extension picks the format; it must be one the patterns were given for
    fn archive_format(&self, url: &str) -> Result<ArchiveFormat> {
        let format = ArchiveFormat::from_url(url).ok_or_else(|| DepsError::UnknownExtension(url_extension(url)))?;

        if self.archive.patterns_for(format).is_empty() {
            return Err(DepsError::Config(format!(
                "Dependency '{}' lists {} members but '{}' is a .{} archive",
                self.name,
                self.archive.formats_with_patterns().join("/"),
                url,
                format.extension()
            )));
        }
        Ok(format)
    }
}

fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => String::new(),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(DepsError::Config(format!("Invalid dependency name '{}'", name)));
    }
    Ok(())
}

/// True when `path` is relative and names something strictly below its base
fn stays_below(path: &str) -> bool {
    use std::path::Component;

    let mut normal = false;
    for component in std::path::Path::new(path).components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            _ => return false,
        }
    }
    normal
}

fn check_relative(name: &str, dir: &str) -> Result<()> {
    if !stays_below(dir) {
        return Err(DepsError::Config(format!(
            "Library '{}' has an invalid output directory '{}'",
            name, dir
        )));
    }
    Ok(())
}

/// A descriptor with every template rendered and the digest for the running
/// platform selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub kind: DependencyKind,
    pub version: String,
    /// Rendered URL, or import path for Go packages
    pub source: String,
    /// Lowercase hex, absent for Go packages
    pub digest: Option<String>,
    /// `None` means the download is the executable itself
    pub format: Option<ArchiveFormat>,
    pub patterns: Vec<String>,
    pub lib_prefix: Option<String>,
    pub entrypoint: String,
    pub output_dir: Option<String>,
}
