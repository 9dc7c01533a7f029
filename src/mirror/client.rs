// FILE: src/mirror/client.rs
//! WebDAV-style file operations against the remote mirror.
//!
//! Best-effort by contract: every operation logs its failure and returns
//! `false`/empty rather than propagating. The local store has already
//! committed by the time anything here runs, so a dead server only means
//! a stale mirror.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::storage::paths::percent_decode;

/// WebDAV endpoint prefix on the server (NextCloud layout).
pub const WEBDAV_PATH: &str = "/remote.php/dav/files/";

/// Fixed remote location of the database blob.
pub const REMOTE_DATABASE_PATH: &str = "database/custom_db.sqlite";

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(300);

static MKCOL: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"MKCOL").unwrap());
static PROPFIND: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"PROPFIND").unwrap());
static HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[dD]:href>([^<]+)</[dD]:href>").unwrap());

pub struct MirrorClient {
    client: reqwest::Client,
    server_url: String,
    username: String,
    password: String,
    remote_path: String,
    retry_delay: Duration,
}

impl MirrorClient {
    pub fn new(server_url: &str, username: &str, password: &str, remote_path: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            remote_path: remote_path.trim_matches('/').to_string(),
            retry_delay: RETRY_BASE_DELAY,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.server_url,
            &config.username,
            &config.password,
            &config.remote_path,
        )
    }

    /// Shorten the retry backoff. Used by tests to keep the retry loop
    /// observable without the production delays.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn server_prefix(&self) -> String {
        format!("{}{}/{}/", WEBDAV_PATH, self.username, self.remote_path)
    }

    fn remote_url(&self, relative: &str) -> String {
        format!(
            "{}{}{}/{}/{}",
            self.server_url,
            WEBDAV_PATH,
            self.username,
            self.remote_path,
            relative.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Probe the server's status endpoint.
    pub async fn test_connection(&self) -> bool {
        let url = format!("{}/status.php", self.server_url);
        match self.request(Method::GET, &url).send().await {
            Ok(response) if response.status().is_success() => {
                if let Ok(status) = response.json::<serde_json::Value>().await {
                    tracing::info!(
                        "[Mirror] Connected to server version {}",
                        status.get("version").unwrap_or(&serde_json::Value::Null)
                    );
                }
                true
            }
            Ok(response) => {
                tracing::error!("[Mirror] Failed to connect: {}", response.status());
                false
            }
            Err(e) => {
                tracing::error!("[Mirror] Connection error: {}", e);
                false
            }
        }
    }

    /// Create a remote directory. Idempotent: 405 Method Not Allowed
    /// means the collection already exists and counts as success.
    pub async fn mkdir(&self, relative: &str) -> bool {
        let url = self.remote_url(relative);
        match self.request(MKCOL.clone(), &url).send().await {
            Ok(response)
                if response.status().is_success()
                    || response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED =>
            {
                true
            }
            Ok(response) => {
                tracing::error!(
                    "[Mirror] Failed to create directory {}: {}",
                    relative,
                    response.status()
                );
                false
            }
            Err(e) => {
                tracing::error!("[Mirror] Error creating directory {}: {}", relative, e);
                false
            }
        }
    }

    /// Upload one file, creating parent collections first. Retried with
    /// linearly increasing delay.
    pub async fn put(&self, local_file: &Path, remote: &str) -> bool {
        let bytes = match tokio::fs::read(local_file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("[Mirror] Local file not readable {}: {}", local_file.display(), e);
                return false;
            }
        };

        if let Some(parent) = Path::new(remote).parent() {
            let parent = parent.to_string_lossy().replace('\\', "/");
            if !parent.is_empty() {
                self.mkdir(&parent).await;
            }
        }

        let url = self.remote_url(remote);
        for attempt in 1..=MAX_RETRIES {
            match self
                .request(Method::PUT, &url)
                .header("Content-Type", "application/octet-stream")
                .body(bytes.clone())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("[Mirror] Uploaded {}", remote);
                    return true;
                }
                Ok(response) => {
                    if attempt == MAX_RETRIES {
                        tracing::error!(
                            "[Mirror] Failed to upload {}: {}",
                            remote,
                            response.status()
                        );
                    }
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        tracing::error!("[Mirror] Error uploading {}: {}", remote, e);
                    }
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        false
    }

    /// Download one file into place, creating local parents. Same retry
    /// policy as `put`.
    pub async fn get(&self, remote: &str, local_file: &Path) -> bool {
        if let Some(parent) = local_file.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::error!("[Mirror] Cannot create {}: {}", parent.display(), e);
                return false;
            }
        }

        let url = self.remote_url(remote);
        for attempt in 1..=MAX_RETRIES {
            match self.request(Method::GET, &url).send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(data) => {
                        if let Err(e) = tokio::fs::write(local_file, &data).await {
                            tracing::error!(
                                "[Mirror] Cannot write {}: {}",
                                local_file.display(),
                                e
                            );
                            return false;
                        }
                        tracing::info!("[Mirror] Downloaded {}", remote);
                        return true;
                    }
                    Err(e) => {
                        if attempt == MAX_RETRIES {
                            tracing::error!("[Mirror] Error reading body of {}: {}", remote, e);
                        }
                    }
                },
                Ok(response) => {
                    if attempt == MAX_RETRIES {
                        tracing::error!(
                            "[Mirror] Failed to download {}: {}",
                            remote,
                            response.status()
                        );
                    }
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        tracing::error!("[Mirror] Error downloading {}: {}", remote, e);
                    }
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        false
    }

    pub async fn exists(&self, remote: &str) -> bool {
        let url = self.remote_url(remote);
        match self.request(Method::HEAD, &url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::error!("[Mirror] Error checking {}: {}", remote, e);
                false
            }
        }
    }

    /// List the immediate children of a remote directory. Entries come
    /// back as paths relative to the remote root; collections keep a
    /// trailing slash.
    pub async fn list(&self, remote: &str) -> Vec<String> {
        let url = self.remote_url(remote);
        let response = match self
            .request(PROPFIND.clone(), &url)
            .header("Depth", "1")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::error!("[Mirror] Failed to list {}: {}", remote, response.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::error!("[Mirror] Error listing {}: {}", remote, e);
                return Vec::new();
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("[Mirror] Error reading listing of {}: {}", remote, e);
                return Vec::new();
            }
        };

        let prefix = self.server_prefix();
        let requested = remote.trim_matches('/');
        let mut entries = Vec::new();

        for capture in HREF.captures_iter(&body) {
            let href = percent_decode(&capture[1]);
            let Some(position) = href.find(&prefix) else {
                continue;
            };
            let relative = &href[position + prefix.len()..];
            if relative.is_empty() || relative.trim_matches('/') == requested {
                continue;
            }
            entries.push(relative.to_string());
        }

        entries
    }

    pub async fn delete(&self, remote: &str) -> bool {
        let url = self.remote_url(remote);
        match self.request(Method::DELETE, &url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("[Mirror] Deleted {}", remote);
                true
            }
            Ok(response) => {
                tracing::error!("[Mirror] Failed to delete {}: {}", remote, response.status());
                false
            }
            Err(e) => {
                tracing::error!("[Mirror] Error deleting {}: {}", remote, e);
                false
            }
        }
    }

    /// Mirror an entire local subtree to the remote, directories before
    /// the files inside them.
    pub async fn upload_directory(&self, local_dir: &Path, remote: &str) -> bool {
        if !local_dir.is_dir() {
            tracing::error!(
                "[Mirror] Cannot upload nonexistent directory: {}",
                local_dir.display()
            );
            return false;
        }

        let mut success = true;
        for entry in WalkDir::new(local_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("[Mirror] Walk error under {}: {}", local_dir.display(), e);
                    success = false;
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(local_dir) {
                Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let remote_path = if relative.is_empty() {
                remote.to_string()
            } else {
                format!("{}/{}", remote.trim_end_matches('/'), relative)
            };

            if entry.file_type().is_dir() {
                success &= self.mkdir(&remote_path).await;
            } else {
                success &= self.put(entry.path(), &remote_path).await;
            }
        }

        success
    }

    /// Mirror a remote subtree into a local directory.
    pub async fn download_directory(&self, remote: &str, local_dir: &Path) -> bool {
        self.download_directory_inner(remote.to_string(), local_dir.to_path_buf())
            .await
    }

    // Recursion over an async fn needs the boxed form.
    fn download_directory_inner(
        &self,
        remote: String,
        local_dir: PathBuf,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = tokio::fs::create_dir_all(&local_dir).await {
                tracing::error!("[Mirror] Cannot create {}: {}", local_dir.display(), e);
                return false;
            }

            let mut success = true;
            for entry in self.list(&remote).await {
                if entry.ends_with('/') {
                    let name = entry
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or("")
                        .to_string();
                    if name.is_empty() {
                        continue;
                    }
                    success &= self
                        .download_directory_inner(entry.clone(), local_dir.join(name))
                        .await;
                } else {
                    let name = entry.rsplit('/').next().unwrap_or(&entry).to_string();
                    success &= self.get(&entry, &local_dir.join(name)).await;
                }
            }

            success
        })
    }

    /// The whole local database file is one blob at a fixed remote path.
    pub async fn upload_database(&self, db_path: &Path) -> bool {
        self.put(db_path, REMOTE_DATABASE_PATH).await
    }

    pub async fn download_database(&self, db_path: &Path) -> bool {
        self.get(REMOTE_DATABASE_PATH, db_path).await
    }

    /// Seed the remote top-level layout.
    pub async fn init_remote_structure(&self, include_variants: bool) -> bool {
        let mut success = true;
        success &= self.mkdir("database").await;
        success &= self.mkdir("assets").await;
        success &= self.mkdir("records").await;
        if include_variants {
            success &= self.mkdir("variants").await;
        }
        success
    }
}
