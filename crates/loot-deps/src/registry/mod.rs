//! Dependency registry and procurement engine.
//!
//! A [`Registry`] owns every registered dependency for one project root.
//! Registration validates and renders a descriptor but never touches the
//! network; the first [`Registry::procure`] of a dependency installs it,
//! and every later or concurrent call shares that outcome.

mod descriptor;
mod exec;
mod gate;
mod install;

pub use descriptor::{ArchiveOptions, DependencyDescriptor, DependencyKind, Digest, ResolvedDependency};
pub use gate::{InstallGate, InstallState};
pub use install::{find_members, Installer};

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::config::{CacheLayout, Manifest, Settings, SettingsLoader};
use crate::downloader::{ArchiveExtractor, Downloader};
use crate::platform::Platform;
use crate::{DepsError, Result};

/// A registered dependency and its install gate
#[derive(Debug)]
pub struct InstalledDependency {
    descriptor: DependencyDescriptor,
    resolved: ResolvedDependency,
    install_dir: PathBuf,
    path: PathBuf,
    gate: InstallGate,
}

impl InstalledDependency {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &DependencyDescriptor {
        &self.descriptor
    }

    pub fn resolved(&self) -> &ResolvedDependency {
        &self.resolved
    }

    /// Directory the dependency is installed into
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Executable for tools, the install directory for libraries
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> InstallState {
        self.gate.state()
    }
}

pub struct Registry {
    layout: CacheLayout,
    platform: Platform,
    skip_procurement: bool,
    installer: Installer,
    entries: Mutex<BTreeMap<String, Arc<InstalledDependency>>>,
    /// Library installs hold this shared; wiping `.ext/lib` holds it exclusively
    libraries: RwLock<()>,
}

impl Registry {
    pub fn new(layout: CacheLayout, platform: Platform, settings: &Settings) -> Result<Self> {
        let downloader = Downloader::with_config(settings.downloader.clone())?;

        Ok(Self {
            installer: Installer::new(layout.clone(), downloader),
            layout,
            platform,
            skip_procurement: settings.skip_procurement,
            entries: Mutex::new(BTreeMap::new()),
            libraries: RwLock::new(()),
        })
    }

    /// Registry for the settings' root on the running platform
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.layout(), Platform::current(), settings)
    }

    /// Like [`Registry::from_settings`], registering everything in the
    /// settings' manifest if there is one
    pub fn from_manifest(settings: &Settings) -> Result<Self> {
        let registry = Self::from_settings(settings)?;
        if let Some(path) = &settings.manifest {
            log::debug!("Loading manifest {}", path.display());
            registry.register_manifest(&Manifest::load(path)?)?;
        }
        Ok(registry)
    }

    /// Discover settings and manifest from `start_dir` and the environment
    pub fn load(start_dir: &Path) -> Result<Self> {
        let settings = SettingsLoader::new(true).load(start_dir)?;
        Self::from_manifest(&settings)
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.installer = self.installer.with_extractor(extractor);
        self
    }

    /// Program used to build Go packages, `go` by default
    pub fn with_go_command(mut self, go_command: impl Into<OsString>) -> Self {
        self.installer = self.installer.with_go_command(go_command);
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn skip_procurement(&self) -> bool {
        self.skip_procurement
    }

    /// Validate and add a dependency. Registering an identical descriptor
    /// again is a no-op; a changed one replaces the old record.
    pub fn register(&self, descriptor: DependencyDescriptor) -> Result<()> {
        let resolved = descriptor.resolve(&self.platform)?;
        let (install_dir, path) = self.paths_for(&resolved);

        let mut entries = self.lock_entries();
        if let Some(existing) = entries.get(&descriptor.name) {
            if existing.descriptor == descriptor {
                return Ok(());
            }
            log::debug!("Replacing registration of '{}'", descriptor.name);
        }

        log::trace!("Registered {} '{}' at {}", resolved.kind, resolved.name, path.display());
        let name = descriptor.name.clone();
        let record = InstalledDependency {
            gate: InstallGate::new(&name),
            descriptor,
            resolved,
            install_dir,
            path,
        };
        entries.insert(name, Arc::new(record));
        Ok(())
    }

    /// Register several descriptors, stopping at the first invalid one
    pub fn register_all<I>(&self, descriptors: I) -> Result<()>
    where
        I: IntoIterator<Item = DependencyDescriptor>,
    {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    pub fn register_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.register_all(manifest.descriptors()?)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<InstalledDependency>> {
        self.lock_entries().get(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<DependencyDescriptor> {
        self.get(name).map(|r| r.descriptor.clone())
    }

    pub fn state(&self, name: &str) -> Option<InstallState> {
        self.get(name).map(|r| r.state())
    }

    /// Make sure `name` is installed and return its path
    pub fn procure(&self, name: &str) -> Result<PathBuf> {
        let record = self.require(name)?;
        if let InstallState::Installed(path) = record.gate.state() {
            return Ok(path);
        }

        if record.resolved.kind != DependencyKind::Library {
            return self.install(&record);
        }

        let _shared = self.libraries.read().unwrap_or_else(|e| e.into_inner());
        // procure_all may have replaced the record while we waited
        let record = self.require(name)?;
        self.install(&record)
    }

    fn install(&self, record: &InstalledDependency) -> Result<PathBuf> {
        record
            .gate
            .run(|| self.installer.install(&record.resolved, &record.install_dir, &record.path))
    }

    /// Path of `name`, procuring it first unless procurement is disabled
    pub fn resolved_path(&self, name: &str) -> Result<PathBuf> {
        if self.skip_procurement {
            return Ok(self.require(name)?.path.clone());
        }
        self.procure(name)
    }

    /// Procure every tool, then rebuild the library directory from scratch
    pub fn procure_all(&self) -> Result<()> {
        if self.skip_procurement {
            log::info!("Procurement disabled, not procuring anything");
            return Ok(());
        }

        let records: Vec<_> = self.lock_entries().values().cloned().collect();
        let (libraries, tools): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.resolved.kind == DependencyKind::Library);

        for record in &tools {
            log::info!("Procuring {} '{}'", record.resolved.kind, record.name());
            self.procure(record.name())?;
        }

        if libraries.is_empty() {
            return Ok(());
        }

        {
            // Waits for library installs already in flight
            let _exclusive = self.libraries.write().unwrap_or_else(|e| e.into_inner());

            let lib_dir = self.layout.lib_dir();
            if lib_dir.exists() {
                log::info!("Cleaning {}", lib_dir.display());
                fs::remove_dir_all(&lib_dir).map_err(|e| DepsError::io("clean lib dir", &lib_dir, e))?;
            }

            // Earlier installs were wiped with the directory
            for record in &libraries {
                self.reset(record.name());
            }
        }

        for record in &libraries {
            log::info!("Procuring lib '{}'", record.name());
            self.procure(record.name())?;
        }
        Ok(())
    }

    fn reset(&self, name: &str) {
        let mut entries = self.lock_entries();
        let Some(current) = entries.get(name) else {
            return;
        };
        let fresh = InstalledDependency {
            descriptor: current.descriptor.clone(),
            resolved: current.resolved.clone(),
            install_dir: current.install_dir.clone(),
            path: current.path.clone(),
            gate: InstallGate::new(name),
        };
        entries.insert(name.to_string(), Arc::new(fresh));
    }

    fn paths_for(&self, dep: &ResolvedDependency) -> (PathBuf, PathBuf) {
        match dep.kind {
            DependencyKind::Binary => {
                let dir = self.layout.bin_path(&dep.name, &dep.version);
                let path = dir.join(&dep.entrypoint);
                (dir, path)
            }
            DependencyKind::GoPackage => {
                let dir = self.layout.gobin_path(&dep.name, &dep.version);
                let path = dir.join(&dep.entrypoint);
                (dir, path)
            }
            DependencyKind::Library => {
                let dir = self.layout.lib_path(&dep.name, &dep.version, dep.output_dir.as_deref());
                (dir.clone(), dir)
            }
        }
    }

    fn require(&self, name: &str) -> Result<Arc<InstalledDependency>> {
        self.get(name).ok_or_else(|| DepsError::NotFound(name.to_string()))
    }

    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<String, Arc<InstalledDependency>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    const SHA: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn registry(root: &Path) -> Registry {
        let settings = Settings::with_root(root);
        Registry::new(settings.layout(), Platform::new("linux", "amd64"), &settings).unwrap()
    }

    fn tool() -> DependencyDescriptor {
        DependencyDescriptor::binary("tool", "1.0.0", "http://127.0.0.1:9/tool-{{.Version}}.tgz")
            .with_platform_sha256("linux-amd64", SHA)
            .with_tgz_paths(["tool-{{.Version}}/tool"])
    }

    #[test]
    fn test_register_and_lookup() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        registry.register(tool()).unwrap();

        assert_eq!(registry.names(), vec!["tool"]);
        assert_eq!(registry.descriptor("tool"), Some(tool()));
        assert!(matches!(registry.state("tool"), Some(InstallState::NotStarted)));

        let record = registry.get("tool").unwrap();
        assert_eq!(record.install_dir(), temp.path().join(".ext/bin/tool-1.0.0"));
        assert_eq!(record.path(), temp.path().join(".ext/bin/tool-1.0.0/tool"));
    }

    #[test]
    fn test_register_rejects_missing_digest() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        let dep = DependencyDescriptor::binary("tool", "1.0.0", "http://127.0.0.1:9/tool")
            .with_platform_sha256("darwin-arm64", SHA);

        let err = registry.register(dep).unwrap_err();
        assert!(err.to_string().contains("linux-amd64"));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_identical_registration_keeps_record() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        registry.register(tool()).unwrap();
        let first = registry.get("tool").unwrap();

        registry.register(tool()).unwrap();
        assert!(Arc::ptr_eq(&first, &registry.get("tool").unwrap()));

        registry.register(tool().with_entrypoint("tool-cli")).unwrap();
        let replaced = registry.get("tool").unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert!(replaced.path().ends_with("tool-cli"));
    }

    #[test]
    fn test_procure_unknown_name() {
        let temp = TempDir::new().unwrap();
        let err = registry(temp.path()).procure("nope").unwrap_err();
        assert!(matches!(err, DepsError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_existing_cache_dir_is_adopted() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        registry.register(tool()).unwrap();

        let dir = temp.path().join(".ext/bin/tool-1.0.0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tool"), "#!/bin/sh\n").unwrap();

        // The URL points at a closed port; any network access would fail
        let path = registry.procure("tool").unwrap();
        assert_eq!(path, dir.join("tool"));
        assert!(registry.state("tool").unwrap().is_installed());
    }

    #[test]
    fn test_skip_procurement_returns_conventional_path() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::with_root(temp.path());
        settings.skip_procurement = true;
        let registry = Registry::new(settings.layout(), Platform::new("linux", "amd64"), &settings).unwrap();
        registry.register(tool()).unwrap();

        let path = registry.resolved_path("tool").unwrap();
        assert_eq!(path, temp.path().join(".ext/bin/tool-1.0.0/tool"));
        assert!(!path.exists());
        assert!(matches!(registry.state("tool"), Some(InstallState::NotStarted)));
        registry.procure_all().unwrap();
    }

    #[test]
    fn test_library_paths() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        let lib = DependencyDescriptor::library("protos", "3.19", "http://127.0.0.1:9/protos.zip")
            .with_sha256(SHA)
            .with_zip_paths(["include/**/*.proto"]);
        registry.register(lib.clone()).unwrap();
        registry.register(DependencyDescriptor { name: "shared".into(), ..lib }.with_output_dir("proto")).unwrap();

        assert_eq!(registry.get("protos").unwrap().path(), temp.path().join(".ext/lib/protos-3.19"));
        assert_eq!(registry.get("shared").unwrap().path(), temp.path().join(".ext/lib/proto"));
    }
}
