//! Snapshot stores.
//!
//! A store only lists object names and streams one object out. Selection,
//! temporary files and extraction live in `restore`.

use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::SnapshotError;
use crate::interrupt;
use crate::types::BucketLocation;

/// Public Google Cloud Storage JSON API endpoint.
const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Copy buffer size; the interrupt flag is checked between chunks.
const CHUNK_SIZE: usize = 64 * 1024;

/// A place snapshots can be listed and downloaded from.
pub trait SnapshotStore {
    /// Human-readable location, for logs and errors.
    fn location(&self) -> String;

    /// Names of all snapshot objects at the location, in no particular order.
    fn list(&self) -> Result<Vec<String>, SnapshotError>;

    /// Stream the named object into `dest`, returning the byte count.
    fn download(&self, name: &str, dest: &mut dyn Write) -> Result<u64, SnapshotError>;
}

/// Build the store for a bucket location.
pub fn open_store(location: &BucketLocation) -> Box<dyn SnapshotStore> {
    match location {
        BucketLocation::Gcs { bucket, prefix } => Box::new(GcsStore::new(bucket, prefix)),
        BucketLocation::Local(path) => Box::new(LocalStore::new(path.clone())),
    }
}

/// Copy `reader` to `writer`, aborting between chunks on interrupt.
fn copy_interruptible(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64, SnapshotError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        if interrupt::is_interrupted() {
            return Err(SnapshotError::Interrupted);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Snapshots stored as plain files in a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Create a store over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SnapshotStore for LocalStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn list(&self) -> Result<Vec<String>, SnapshotError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn download(&self, name: &str, dest: &mut dyn Write) -> Result<u64, SnapshotError> {
        if name.contains('/') || name.contains('\\') || name == ".." {
            return Err(SnapshotError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid snapshot name '{}'", name),
            )));
        }
        let mut file = File::open(self.dir.join(name))?;
        copy_interruptible(&mut file, dest)
    }
}

/// One page of a GCS object listing.
#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Snapshots stored in a Google Cloud Storage bucket, read over the JSON API.
///
/// Requests are anonymous; the bucket must allow public reads or sit behind
/// an endpoint that handles authentication.
pub struct GcsStore {
    endpoint: String,
    bucket: String,
    prefix: String,
    agent: ureq::Agent,
}

impl GcsStore {
    /// Create a store for `gs://<bucket>/<prefix>`.
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self {
            endpoint: GCS_ENDPOINT.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            agent: ureq::builder()
                .timeout_connect(Duration::from_secs(30))
                .timeout_read(Duration::from_secs(120))
                .user_agent(concat!("reposync/", env!("CARGO_PKG_VERSION")))
                .build(),
        }
    }

    /// Talk to a different API endpoint (emulators, proxies).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.endpoint,
            encode_path_segment(&self.bucket)
        )
    }
}

impl SnapshotStore for GcsStore {
    fn location(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.prefix)
    }

    fn list(&self) -> Result<Vec<String>, SnapshotError> {
        let url = self.objects_url();
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .agent
                .get(&url)
                .query("prefix", &self.prefix)
                .query("fields", "items(name),nextPageToken");
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }

            let response = request.call()?;
            let page: ObjectList = serde_json::from_reader(response.into_reader())?;
            names.extend(
                page.items
                    .into_iter()
                    .map(|item| item.name)
                    .filter(|name| !name.ends_with('/')),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::debug!("Listed {} objects under {}", names.len(), self.location());
        Ok(names)
    }

    fn download(&self, name: &str, dest: &mut dyn Write) -> Result<u64, SnapshotError> {
        let url = format!("{}/{}", self.objects_url(), encode_path_segment(name));
        let response = self.agent.get(&url).query("alt", "media").call()?;
        let mut reader = response.into_reader();
        copy_interruptible(&mut reader, dest)
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set, including `/`.
fn encode_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
