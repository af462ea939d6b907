//! Shared fixtures: a loopback HTTP server that counts requests and
//! in-memory archive builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use loot_deps::{Platform, Registry, Settings};
use sha2::Digest as _;
use tiny_http::{Response, Server};
use xz2::write::XzEncoder;
use zip::write::SimpleFileOptions;

pub struct TestServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Serve fixed bodies by path; anything else is a 404
    pub fn start(routes: Vec<(&str, Vec<u8>)>) -> Self {
        let routes: HashMap<String, Vec<u8>> = routes.into_iter().map(|(p, b)| (p.to_string(), b)).collect();
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr().to_ip().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                counter.fetch_add(1, Ordering::SeqCst);
                // Keep the leader busy long enough for followers to pile up
                thread::sleep(Duration::from_millis(20));
                let response = match routes.get(request.url()) {
                    Some(body) => Response::from_data(body.clone()),
                    None => Response::from_data(b"not found".to_vec()).with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self { base, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn linux_amd64() -> Platform {
    Platform::new("linux", "amd64")
}

pub fn registry(root: &Path) -> Registry {
    let settings = Settings::with_root(root);
    Registry::new(settings.layout(), linux_amd64(), &settings).unwrap()
}

pub fn sha256(data: &[u8]) -> String {
    format!("{:x}", sha2::Sha256::digest(data))
}

fn tar_into<W: Write>(writer: W, entries: &[(&str, &[u8], u32)]) -> W {
    let mut builder = tar::Builder::new(writer);
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn tgz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    tar_into(GzEncoder::new(Vec::new(), Compression::default()), entries)
        .finish()
        .unwrap()
}

pub fn txz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    tar_into(XzEncoder::new(Vec::new(), 6), entries).finish().unwrap()
}

pub fn zip(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, mode) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default().unix_permissions(*mode))
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
