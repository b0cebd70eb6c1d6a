//! Script fetching.
//!
//! Transfers every step, extension and utility script into the work
//! directory before anything executes. Every file is attempted; each failure
//! is reported on its own, and any failure fails the run.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::blocking::Client;

use crate::console;
use crate::error::{InstallerError, Result};

/// Where scripts are published unless `--source` says otherwise: the main
/// branch of the itiligent/Guacamole-Install project
pub const DEFAULT_SCRIPT_SOURCE: &str =
    "https://raw.githubusercontent.com/itiligent/Guacamole-Install/main";

/// Something scripts can be read from
pub trait ScriptSource {
    /// Contents of the named script
    fn fetch(&self, name: &str) -> anyhow::Result<Vec<u8>>;

    /// Where the scripts come from, for messages
    fn describe(&self) -> String;
}

/// Scripts published over HTTP(S) under a base URL
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("guac-installer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InstallerError::system(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }
}

impl ScriptSource for HttpSource {
    fn fetch(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.url_for(name);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned HTTP {}", url, status));
        }

        let body = response
            .bytes()
            .with_context(|| format!("reading body of {} failed", url))?;
        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Scripts copied from a local directory (offline installs, tests)
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ScriptSource for DirSource {
    fn fetch(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join(name);
        fs::read(&path).with_context(|| format!("cannot read {}", path.display()))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Pick a source from the `--source` value: URLs are fetched over HTTP,
/// anything else is a local directory.
pub fn source_from_arg(arg: &str) -> Result<Box<dyn ScriptSource>> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        Ok(Box::new(HttpSource::new(arg)?))
    } else {
        Ok(Box::new(DirSource::new(arg)))
    }
}

/// Fetch every named script into `dest` and mark it executable.
///
/// Returns the written paths in input order. If any file fails, the error
/// lists all failures, not just the first.
pub fn fetch_all(
    source: &dyn ScriptSource,
    names: &[String],
    dest: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    log::info!(
        "Fetching {} scripts from {} into {}",
        names.len(),
        source.describe(),
        dest.display()
    );

    let mut written = Vec::with_capacity(names.len());
    let mut failures = Vec::new();

    for name in names {
        match fetch_one(source, name, dest) {
            Ok(path) => {
                log::info!("Fetched {}", name);
                written.push(path);
            }
            Err(e) => {
                let msg = format!("{}: {:#}", name, e);
                log::error!("Fetch failed: {}", msg);
                console::error(&format!("Failed to fetch {}", msg));
                failures.push(msg);
            }
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(InstallerError::Fetch { failures })
    }
}

fn fetch_one(source: &dyn ScriptSource, name: &str, dest: &Path) -> anyhow::Result<PathBuf> {
    if name.contains('/') || name.starts_with('.') {
        return Err(anyhow!("refusing unsafe script name"));
    }

    let body = source.fetch(name)?;
    if body.is_empty() {
        return Err(anyhow!("empty file"));
    }

    let path = dest.join(name);
    fs::write(&path, &body).with_context(|| format!("cannot write {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("cannot chmod {}", path.display()))?;
    Ok(path)
}
