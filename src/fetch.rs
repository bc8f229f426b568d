//! Transfer client for remote index resources.
//!
//! Resources are addressed by name relative to one base location and written
//! to a local destination file, via a `.part` file so the destination is
//! never observed half-written. `HttpFetcher` talks to a published index over
//! HTTP(S); `DirectoryFetcher` serves a filesystem mirror and is selected
//! automatically for non-HTTP repository locations.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const COPY_BUF_SIZE: usize = 8 * 1024;
const REDIRECT_LIMIT: usize = 10;

/// Progress events for a single transfer. Every hook defaults to a no-op;
/// `progress` in particular stays silent in the shipped listener and exists
/// as a hook point for embedding applications.
pub trait TransferListener: Send + Sync {
    fn started(&self, _resource: &str) {}
    fn progress(&self, _bytes: usize) {}
    fn completed(&self, _resource: &str) {}
}

/// Logs one line when a transfer starts and one when it completes.
#[derive(Debug, Default)]
pub struct LogListener;

impl TransferListener for LogListener {
    fn started(&self, resource: &str) {
        info!("Downloading {resource}");
    }

    fn completed(&self, _resource: &str) {
        info!("Done");
    }
}

pub trait ResourceFetcher: Send + Sync {
    /// Fetches `resource` into `dest`. Returns `Ok(false)` when the remote
    /// does not have the resource; any other failure is an error.
    fn fetch_optional(&self, resource: &str, dest: &Path) -> Result<bool>;

    /// Fetches `resource` into `dest`, erroring when the remote does not
    /// have it.
    fn fetch(&self, resource: &str, dest: &Path) -> Result<()> {
        if self.fetch_optional(resource, dest)? {
            Ok(())
        } else {
            anyhow::bail!("Remote resource not found: {resource}")
        }
    }
}

/// Picks a transfer client for the repository location: HTTP(S) URLs get the
/// HTTP client, anything else is treated as a local mirror directory
/// (`file://` prefix or a plain path).
pub fn fetcher_for(repository_url: &str, timeout: Duration) -> Result<Box<dyn ResourceFetcher>> {
    if repository_url.starts_with("http://") || repository_url.starts_with("https://") {
        Ok(Box::new(HttpFetcher::new(repository_url, timeout)?))
    } else {
        let root = repository_url.strip_prefix("file://").unwrap_or(repository_url);
        Ok(Box::new(DirectoryFetcher::new(root)))
    }
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    listener: Box<dyn TransferListener>,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_listener(base_url, timeout, Box::new(LogListener))
    }

    pub fn with_listener(
        base_url: impl Into<String>,
        timeout: Duration,
        listener: Box<dyn TransferListener>,
    ) -> Result<Self> {
        // Published indexes commonly sit behind mirror chains; follow
        // redirects up to a hop cap instead of rejecting loops outright.
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            listener,
        })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url.trim_end_matches('/'))
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch_optional(&self, resource: &str, dest: &Path) -> Result<bool> {
        let url = self.resource_url(resource);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Failed to request {url}"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let mut response = response
            .error_for_status()
            .with_context(|| format!("Failed to fetch {url}"))?;

        self.listener.started(resource);
        let part = part_path(dest);
        let mut out = File::create(&part)
            .with_context(|| format!("Failed to create {}", part.display()))?;
        let mut buf = [0u8; COPY_BUF_SIZE];
        loop {
            let n = response
                .read(&mut buf)
                .with_context(|| format!("Failed to read body of {url}"))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .with_context(|| format!("Failed to write {}", part.display()))?;
            self.listener.progress(n);
        }
        drop(out);

        std::fs::rename(&part, dest)
            .with_context(|| format!("Failed to move {} into place", dest.display()))?;
        self.listener.completed(resource);
        Ok(true)
    }
}

/// Serves resources out of a local directory laid out like the remote.
pub struct DirectoryFetcher {
    root: PathBuf,
    listener: Box<dyn TransferListener>,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_listener(root, Box::new(LogListener))
    }

    pub fn with_listener(root: impl Into<PathBuf>, listener: Box<dyn TransferListener>) -> Self {
        Self {
            root: root.into(),
            listener,
        }
    }
}

impl ResourceFetcher for DirectoryFetcher {
    fn fetch_optional(&self, resource: &str, dest: &Path) -> Result<bool> {
        let source = self.root.join(resource);
        if !source.exists() {
            return Ok(false);
        }

        self.listener.started(resource);
        let part = part_path(dest);
        std::fs::copy(&source, &part)
            .with_context(|| format!("Failed to copy {}", source.display()))?;
        std::fs::rename(&part, dest)
            .with_context(|| format!("Failed to move {} into place", dest.display()))?;
        self.listener.completed(resource);
        Ok(true)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}
