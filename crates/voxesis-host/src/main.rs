use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use voxesis_extension::{
    default_namespace_table, CodeLoader, DirectorySource, ExtensionRegistry, ExtensionSource,
    HttpSource, ModuleBridge, RegistryConfig, SandboxConfig, WasmEvaluator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RegistryConfig::from_env();
    let sandbox = SandboxConfig::from_env();
    let version =
        std::env::var("VOXESIS_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    let source: Arc<dyn ExtensionSource> = match &config.base_url {
        Some(url) => {
            tracing::info!(base_url = %url, "listing extensions over HTTP");
            Arc::new(HttpSource::new(url, config.fetch_timeout)?)
        }
        None => {
            tracing::info!(dir = %config.extension_dir.display(), "listing extensions from disk");
            Arc::new(DirectorySource::new(&config.extension_dir))
        }
    };

    let (table, facades) = default_namespace_table(&version)?;
    let bridge = Arc::new(ModuleBridge::new());
    bridge.bind(table)?;

    let loader = CodeLoader::new(bridge, Arc::new(WasmEvaluator::new(sandbox)));
    let registry = Arc::new(ExtensionRegistry::new(source, loader, config));

    let summary = registry
        .load()
        .wait()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("extension system failed to start")?;

    for failure in &summary.failures {
        tracing::warn!(extension = %failure.name, "skipped: {}", failure.error);
    }
    tracing::info!(
        loaded = summary.loaded.len(),
        failed = summary.failures.len(),
        "extension registry ready"
    );

    for view in registry.views().await {
        tracing::info!(
            view = %view.manifest.base.name,
            version = %view.manifest.base.version,
            settings = view.manifest.settings.items.len(),
            "view extension"
        );
    }
    for theme in registry.themes().await {
        tracing::info!(
            extension = %theme.manifest.base.name,
            themes = ?theme.variables.keys().collect::<Vec<_>>(),
            "theme extension"
        );
    }
    tracing::info!(views = ?registry.view_catalog().names(), "view catalog");
    tracing::info!(themes = ?registry.theme_catalog().names(), "theme catalog");

    for event in facades.events.drain() {
        tracing::debug!(event = %event.name, "event emitted during load");
    }

    Ok(())
}
