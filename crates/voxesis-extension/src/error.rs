//! Extension system error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("descriptor could not be decoded: {0}")]
    DecodeFailure(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("extension already registered: {0}")]
    DuplicateExtension(String),

    #[error("failed to load module {entry}: {source}")]
    ModuleLoadFailed {
        entry: String,
        #[source]
        source: ModuleError,
    },

    #[error("failed to fetch stylesheet {entry}: {reason}")]
    StylesheetFetchFailed { entry: String, reason: String },

    #[error("extension listing failed: {0}")]
    UpstreamListingFailed(String),

    #[error("module bridge error: {0}")]
    Bridge(String),

    #[error("host function error: {0}")]
    HostFunction(String),

    #[error("theme not found: {0}")]
    ThemeNotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("extension load aborted before completion")]
    LoadAborted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtensionError {
    /// Wrap a module-level cause for the given entry path.
    pub fn module(entry: impl ToString, source: ModuleError) -> Self {
        Self::ModuleLoadFailed {
            entry: entry.to_string(),
            source,
        }
    }
}

/// Root cause of a failed module load.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("malformed source payload: {0}")]
    Payload(String),

    #[error("unresolved import '{0}'")]
    UnresolvedImport(String),

    #[error("module bridge has not been bound")]
    BridgeUnbound,

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("execution exceeded fuel limit")]
    FuelExhausted,

    #[error("module has no default export")]
    MissingDefaultExport,
}
