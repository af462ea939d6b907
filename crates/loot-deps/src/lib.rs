pub mod config;
pub mod downloader;
pub mod error;
pub mod platform;
pub mod registry;
pub mod template;

pub use error::{DepsError, ErrorKind, Result};
pub use platform::Platform;
pub use config::{CacheLayout, Manifest, Settings, SettingsLoader};
pub use downloader::{ArchiveExtractor, ArchiveFormat, Downloader, DownloaderConfig};
pub use registry::{
    ArchiveOptions, DependencyDescriptor, DependencyKind, Digest, InstallState,
    InstalledDependency, Registry,
};
pub use template::{expand_template, Template, TemplateContext};
