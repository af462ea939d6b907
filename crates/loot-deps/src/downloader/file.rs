//! HTTP file downloader.
//!
//! A thin blocking wrapper around `reqwest`. There is deliberately no retry
//! or resume: a failed transfer surfaces as an error and may leave a
//! truncated file at the target path.

use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::{DepsError, Result};

const DEFAULT_USER_AGENT: &str = concat!("loot/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Deadline for a whole transfer; `None` lets large downloads run to completion
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Downloads URLs to local files
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Self::with_config(DownloaderConfig::default())
    }

    pub fn with_config(config: DownloaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| DepsError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Download `url` to `target`, creating parent directories and
    /// overwriting any existing file. Returns the number of bytes written.
    pub fn download_to_file(&self, url: &str, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| DepsError::io("create dir", parent, e))?;
        }

        log::debug!("HTTP GET {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| download_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DepsError::Download {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let file = File::create(target).map_err(|e| DepsError::io("create file", target, e))?;
        let mut writer = BufWriter::new(file);
        let written = response
            .copy_to(&mut writer)
            .map_err(|e| download_error(url, e))?;
        writer
            .flush()
            .map_err(|e| DepsError::io("write file", target, e))?;

        log::debug!("HTTP {} {} ({} bytes)", status.as_u16(), url, written);
        Ok(written)
    }
}

fn download_error(url: &str, err: reqwest::Error) -> DepsError {
    DepsError::Download {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::thread;
    use tempfile::TempDir;
    use tiny_http::{Response, Server};

    fn serve_once(status: u16, body: &'static [u8]) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let _ = request.respond(Response::from_data(body).with_status_code(status));
            }
        });
        format!("http://{}/artifact.bin", addr)
    }

    #[test]
    fn test_config_builder() {
        let config = DownloaderConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_connect_timeout(Duration::from_secs(3))
            .with_user_agent("Test/1.0".to_string());

        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.user_agent, "Test/1.0");
    }

    #[test]
    fn test_default_config_has_no_total_timeout() {
        let config = DownloaderConfig::default();
        assert_eq!(config.timeout, None);
        assert!(config.user_agent.starts_with("loot/"));
    }

    #[test]
    fn test_download_creates_parents_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/artifact.bin");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"old content that is longer").unwrap();

        let url = serve_once(200, b"payload");
        let written = Downloader::new().unwrap().download_to_file(&url, &target).unwrap();

        assert_eq!(written, 7);
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn test_http_error_status() {
        let temp = TempDir::new().unwrap();
        let url = serve_once(404, b"missing");

        let err = Downloader::new()
            .unwrap()
            .download_to_file(&url, &temp.path().join("x"))
            .unwrap_err();

        assert!(matches!(err, DepsError::Download { ref reason, .. } if reason == "HTTP 404"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_connection_refused() {
        let temp = TempDir::new().unwrap();
        // Bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = Downloader::new()
            .unwrap()
            .download_to_file(&format!("http://127.0.0.1:{}/x", port), &temp.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, DepsError::Download { .. }));
    }
}
