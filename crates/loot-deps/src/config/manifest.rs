//! `Depfile` parsing.
//!
//! ```yaml
//! go:
//!   stringer: { importPath: golang.org/x/tools/cmd/stringer, version: v0.1.0 }
//! bin:
//!   tool:
//!     version: 1.0.0
//!     url: https://example.com/tool-{{.Version}}-{{.OS}}-{{.Arch}}.tgz
//!     sha: { linux-amd64: 9f86d0... }
//!     tgzPaths: [tool-{{.Version}}/tool]
//! lib:
//!   protos:
//!     url: https://example.com/protoc.zip
//!     sha: 9f86d0...
//!     zipPaths: [include/**/*.proto]
//!     libPrefix: include
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::registry::{ArchiveOptions, DependencyDescriptor, Digest};
use crate::{DepsError, Result};

/// `sha` is either one digest for every platform or a per-platform table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ShaSpec {
    Single(String),
    ByPlatform(BTreeMap<String, String>),
}

/// Member globs may be written as a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathList {
    Single(String),
    Multiple(Vec<String>),
}

impl PathList {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            PathList::Single(s) => vec![s.clone()],
            PathList::Multiple(v) => v.clone(),
        }
    }
}

impl Default for PathList {
    fn default() -> Self {
        PathList::Multiple(vec![])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoEntry {
    pub import_path: String,
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BinEntry {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub sha: Option<ShaSpec>,
    #[serde(default, rename = "sha-by-platform")]
    pub sha_by_platform: BTreeMap<String, String>,
    #[serde(default)]
    pub zip_paths: PathList,
    #[serde(default)]
    pub tgz_paths: PathList,
    #[serde(default)]
    pub txz_paths: PathList,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LibEntry {
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub sha: Option<ShaSpec>,
    #[serde(default, rename = "sha-by-platform")]
    pub sha_by_platform: BTreeMap<String, String>,
    #[serde(default)]
    pub zip_paths: PathList,
    #[serde(default)]
    pub tgz_paths: PathList,
    #[serde(default)]
    pub txz_paths: PathList,
    #[serde(default)]
    pub lib_prefix: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Unquoted YAML versions such as `1` or `3.19` arrive as numbers
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a version string, found {:?}", other))),
    }
}

/// Parsed `Depfile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub go: BTreeMap<String, GoEntry>,
    #[serde(default)]
    pub bin: BTreeMap<String, BinEntry>,
    #[serde(default)]
    pub lib: BTreeMap<String, LibEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DepsError::io("read manifest", path, e))?;
        Self::parse(&content, path)
    }

    /// Parse manifest text; `path` is only used in error messages
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(content).map_err(|e| DepsError::Manifest {
            path: PathBuf::from(path),
            reason: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.go.is_empty() && self.bin.is_empty() && self.lib.is_empty()
    }

    /// Descriptors in registration order: Go packages, binaries, libraries
    pub fn descriptors(&self) -> Result<Vec<DependencyDescriptor>> {
        let mut descriptors = Vec::with_capacity(self.go.len() + self.bin.len() + self.lib.len());

        for (name, entry) in &self.go {
            let mut dep = DependencyDescriptor::go_package(name, &entry.import_path, &entry.version);
            if let Some(entrypoint) = &entry.entrypoint {
                dep = dep.with_entrypoint(entrypoint);
            }
            descriptors.push(dep);
        }

        for (name, entry) in &self.bin {
            let mut dep = DependencyDescriptor::binary(name, &entry.version, &entry.url).with_archive(ArchiveOptions {
                zip_paths: entry.zip_paths.as_vec(),
                tgz_paths: entry.tgz_paths.as_vec(),
                txz_paths: entry.txz_paths.as_vec(),
                lib_prefix: None,
            });
            if let Some(digest) = merge_digests(name, entry.sha.as_ref(), &entry.sha_by_platform)? {
                dep = dep.with_digest(digest);
            }
            if let Some(entrypoint) = &entry.entrypoint {
                dep = dep.with_entrypoint(entrypoint);
            }
            descriptors.push(dep);
        }

        for (name, entry) in &self.lib {
            let mut dep = DependencyDescriptor::library(name, &entry.version, &entry.url).with_archive(ArchiveOptions {
                zip_paths: entry.zip_paths.as_vec(),
                tgz_paths: entry.tgz_paths.as_vec(),
                txz_paths: entry.txz_paths.as_vec(),
                lib_prefix: entry.lib_prefix.clone(),
            });
            if let Some(digest) = merge_digests(name, entry.sha.as_ref(), &entry.sha_by_platform)? {
                dep = dep.with_digest(digest);
            }
            if let Some(output_dir) = &entry.output_dir {
                dep = dep.with_output_dir(output_dir);
            }
            descriptors.push(dep);
        }

        Ok(descriptors)
    }
}

/// Combine `sha` and `sha-by-platform`; the latter wins on duplicate keys
fn merge_digests(name: &str, sha: Option<&ShaSpec>, by_platform: &BTreeMap<String, String>) -> Result<Option<Digest>> {
    match sha {
        None if by_platform.is_empty() => Ok(None),
        None => Ok(Some(Digest::ByPlatform(by_platform.clone()))),
        Some(ShaSpec::Single(hex)) if by_platform.is_empty() => Ok(Some(Digest::Single(hex.clone()))),
        Some(ShaSpec::Single(_)) => Err(DepsError::Config(format!(
            "Dependency '{}' sets both a single sha and sha-by-platform",
            name
        ))),
        Some(ShaSpec::ByPlatform(map)) => {
            let mut merged = map.clone();
            merged.extend(by_platform.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Some(Digest::ByPlatform(merged)))
        }
    }
}
