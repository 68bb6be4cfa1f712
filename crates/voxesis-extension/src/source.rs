//! Extension listing collaborators.
//!
//! A source prepares the backing storage, lists installed extensions with
//! their base64 descriptors, and serves package payloads by entry path.
//! Packages live at `<root>/<name>/` with the descriptor in
//! `manifest.json` and `main` relative to the package directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ExtensionError;
use crate::manifest::validate_path_safety;

/// Descriptor file inside each package directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One listing entry as produced by the host backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtension {
    #[serde(rename = "PluginName", alias = "Name")]
    pub name: String,
    /// Base64 encoded descriptor.
    #[serde(rename = "Manifest")]
    pub manifest: String,
}

impl RawExtension {
    /// Build an entry from raw descriptor bytes.
    pub fn from_bytes(name: impl Into<String>, manifest: &[u8]) -> Self {
        Self {
            name: name.into(),
            manifest: STANDARD.encode(manifest),
        }
    }
}

/// Address of a payload inside an extension package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPath {
    pub extension: String,
    pub main: String,
}

impl EntryPath {
    pub fn new(extension: impl Into<String>, main: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            main: main.into(),
        }
    }

    fn check(&self) -> Result<(), ExtensionError> {
        if self.extension.is_empty()
            || self.extension.contains(['/', '\\'])
            || self.extension == "."
            || self.extension == ".."
        {
            return Err(ExtensionError::InvalidManifest(format!(
                "invalid extension directory '{}'",
                self.extension
            )));
        }
        validate_path_safety(&self.main, "main")
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/plugins/{}/{}", self.extension, self.main)
    }
}

#[async_trait]
pub trait ExtensionSource: Send + Sync {
    /// Prepare the backing storage. An error rejects the whole load.
    async fn prepare(&self) -> Result<(), ExtensionError>;

    /// List installed extensions.
    async fn list(&self) -> Result<Vec<RawExtension>, ExtensionError>;

    /// Fetch a package payload as text.
    async fn fetch_text(&self, entry: &EntryPath) -> Result<String, ExtensionError>;
}

// ─── Filesystem ─────────────────────────────────────────────────────

/// Reads packages from a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ExtensionSource for DirectorySource {
    async fn prepare(&self) -> Result<(), ExtensionError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RawExtension>, ExtensionError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut found = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type().await?.is_dir() {
                tracing::debug!(entry = %name, "skipping non-directory in extension root");
                continue;
            }

            let manifest_path = entry.path().join(MANIFEST_FILE);
            match tokio::fs::read(&manifest_path).await {
                Ok(bytes) => found.push(RawExtension::from_bytes(name, &bytes)),
                Err(e) => {
                    tracing::warn!(
                        extension = %name,
                        path = %manifest_path.display(),
                        error = %e,
                        "skipping extension without readable manifest"
                    );
                }
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn fetch_text(&self, entry: &EntryPath) -> Result<String, ExtensionError> {
        entry.check()?;
        let path = self.root.join(&entry.extension).join(&entry.main);
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

// ─── HTTP ───────────────────────────────────────────────────────────

/// Talks to a host backend exposing the plugin endpoints.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base: Url,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExtensionError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ExtensionError::Http(format!("invalid base url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("voxesis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExtensionError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ExtensionError> {
        self.base
            .join(path)
            .map_err(|e| ExtensionError::Http(format!("invalid endpoint '{path}': {e}")))
    }

    fn payload_url(&self, entry: &EntryPath) -> Result<Url, ExtensionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExtensionError::Http(format!("base url cannot hold a path: {}", self.base))
            })?
            .pop_if_empty()
            .push("plugins")
            .push(&entry.extension)
            .extend(entry.main.split('/'));
        Ok(url)
    }
}

fn http_error(e: reqwest::Error) -> ExtensionError {
    ExtensionError::Http(e.to_string())
}

#[async_trait]
impl ExtensionSource for HttpSource {
    async fn prepare(&self) -> Result<(), ExtensionError> {
        let resp = self
            .client
            .post(self.endpoint("api/plugins/LoadPlugins")?)
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?;

        match resp.json::<Option<String>>().await.map_err(http_error)? {
            Some(reason) if !reason.is_empty() => Err(ExtensionError::UpstreamListingFailed(reason)),
            _ => Ok(()),
        }
    }

    async fn list(&self) -> Result<Vec<RawExtension>, ExtensionError> {
        let listing = self
            .client
            .get(self.endpoint("api/plugins/GetPluginList")?)
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?
            .json::<Option<Vec<RawExtension>>>()
            .await
            .map_err(http_error)?;

        Ok(listing.unwrap_or_default())
    }

    async fn fetch_text(&self, entry: &EntryPath) -> Result<String, ExtensionError> {
        entry.check()?;
        self.client
            .get(self.payload_url(entry)?)
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?
            .text()
            .await
            .map_err(http_error)
    }
}
