mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use common::*;
use voxesis_extension::catalog::{ComponentHandle, ThemeEntry};
use voxesis_extension::events::{FATAL_FAILURE_TITLE, ITEM_FAILURE_TITLE};
use voxesis_extension::{
    decode_descriptor, parse_descriptor, ExtensionError, ExtensionKind, LoadStatus,
    LoadedExtension, RegistryConfig,
};

// ── Views ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_view_end_to_end() {
    let source = MemorySource::new()
        .with_extension("clock", &view_manifest("clock"))
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    assert_eq!(h.registry.status(), LoadStatus::NotStarted);
    let summary = h.registry.load().wait().await.unwrap();

    assert_eq!(summary.loaded, vec!["clock"]);
    assert!(summary.failures.is_empty());
    assert_eq!(h.registry.status(), LoadStatus::Completed);
    assert_eq!(h.registry.len().await, 1);

    let views = h.registry.views().await;
    assert_eq!(views.len(), 1);
    let view = h.registry.view("clock").await.unwrap();
    assert_eq!(view.manifest.base.name, "clock");
    assert_eq!(view.manifest.settings.items.len(), 1);
    assert_eq!(view.component.component["name"], "Clock");

    let catalog_item = h.registry.view_catalog().get("clock").unwrap();
    assert!(matches!(catalog_item.component, ComponentHandle::Extension(_)));
    assert_eq!(
        h.registry.view_catalog().names(),
        vec!["instance", "pluginManager", "clock"]
    );
    assert!(h.notifications.is_empty());
}

#[tokio::test]
async fn test_invalid_middle_item_does_not_block_siblings() {
    let mut broken = view_manifest("second");
    broken.as_object_mut().unwrap().remove("author");

    let source = MemorySource::new()
        .with_extension("first", &view_manifest("first"))
        .with_extension("second", &broken)
        .with_extension("third", &view_manifest("third"))
        .with_file("first", "index.json", component("First"))
        .with_file("third", "index.json", component("Third"));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();

    assert_eq!(h.registry.names().await, vec!["first", "third"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "second");
    assert!(summary.failures[0].error.contains("author"));

    let notes = h.notifications.entries();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, ITEM_FAILURE_TITLE);
    assert_eq!(notes[0].extension.as_deref(), Some("second"));
    assert_eq!(h.registry.failures().await, summary.failures);
}

#[tokio::test]
async fn test_unknown_setting_type_rejects_view() {
    let mut manifest = view_manifest("clock");
    manifest["settings"]["items"]
        .as_array_mut()
        .unwrap()
        .push(json!({"label": "Color", "type": "color_picker", "key": "color"}));

    let source = MemorySource::new()
        .with_extension("clock", &manifest)
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();
    assert!(summary.loaded.is_empty());
    assert!(summary.failures[0].error.contains("unrecognized type 'color_picker'"));
    assert!(h.registry.is_empty().await);
    assert_eq!(h.evaluator.evaluations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_module_failures_are_isolated() {
    let source = MemorySource::new()
        .with_extension("missing", &view_manifest("missing"))
        .with_extension("noexport", &view_manifest("noexport"))
        .with_extension("ok", &view_manifest("ok"))
        .with_file("noexport", "index.json", module_payload(json!({"host_requests": []})))
        .with_file("ok", "index.json", component("Ok"));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();
    assert_eq!(summary.loaded, vec!["ok"]);

    let errors: Vec<_> = summary.failures.iter().map(|f| f.error.as_str()).collect();
    assert!(errors[0].contains("/plugins/missing/index.json"));
    assert!(errors[0].contains("fetch failed"));
    assert!(errors[1].contains("no default export"));
    assert_eq!(h.notifications.len(), 2);
}

#[tokio::test]
async fn test_undecodable_descriptor_is_reported_by_listing_name() {
    let mut raw = raw("garbled", &json!({}));
    raw.manifest = "***".into();

    let source = MemorySource::new().with_raw(raw);
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();
    assert_eq!(summary.failures[0].name, "garbled");
    assert!(summary.failures[0].error.contains("could not be decoded"));
}

#[tokio::test]
async fn test_host_requests_reach_bound_facades() {
    let source = MemorySource::new()
        .with_extension("clock", &view_manifest("clock"))
        .with_file(
            "clock",
            "index.json",
            module_payload(json!({
                "component": {"name": "Clock"},
                "host_requests": [
                    {"namespace": "VLoggerAPI", "function": "info", "args": {"message": "hello"}},
                    {"namespace": "VConfigAPI", "function": "set", "args": {"key": "tz", "value": "UTC"}},
                    {"namespace": "VProcessAPI", "function": "start"}
                ]
            })),
        );
    let h = harness(source);

    h.registry.load().wait().await.unwrap();

    let calls = h.facade.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "info");
    assert_eq!(calls[1].1["key"], "tz");
    assert_eq!(h.registry.len().await, 1);
}

// ── Uniqueness and the load gate ────────────────────────────────────

#[tokio::test]
async fn test_duplicate_names_keep_one_entry() {
    let source = MemorySource::new()
        .with_extension("clock-a", &view_manifest("clock"))
        .with_extension("clock-b", &view_manifest("clock"))
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();

    assert_eq!(h.registry.len().await, 1);
    assert_eq!(summary.loaded, vec!["clock"]);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0]
        .error
        .contains("extension already registered: clock"));
    assert_eq!(h.registry.view_catalog().len(), 3);
}

#[tokio::test]
async fn test_view_named_like_builtin_is_a_duplicate() {
    let source = MemorySource::new()
        .with_extension("instance", &view_manifest("instance"))
        .with_extension("clock", &view_manifest("clock"))
        .with_file("instance", "index.json", component("Impostor"))
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();

    assert_eq!(summary.loaded, vec!["clock"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "instance");
    assert!(summary.failures[0]
        .error
        .contains("extension already registered: instance"));
    assert!(h.registry.get("instance").await.is_none());

    let notes = h.notifications.entries();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, ITEM_FAILURE_TITLE);
    assert_eq!(notes[0].extension.as_deref(), Some("instance"));

    let builtin = h.registry.view_catalog().get("instance").unwrap();
    assert!(matches!(builtin.component, ComponentHandle::BuiltIn("instance")));
}

#[tokio::test]
async fn test_concurrent_loads_share_one_pass() {
    let mut broken = view_manifest("broken");
    broken["plugin_type"] = json!("widget");

    let source = MemorySource::new()
        .with_extension("clock", &view_manifest("clock"))
        .with_extension("broken", &broken)
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    let first = h.registry.load();
    let second = h.registry.load();
    assert!(first.is_same(&second));
    assert_eq!(h.registry.status(), LoadStatus::InFlight);

    let (a, b) = tokio::join!(first.wait(), second.wait());
    assert_eq!(a.unwrap(), b.unwrap());

    assert_eq!(h.source.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.evaluator.evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.len().await, 1);
    assert_eq!(h.notifications.len(), 1);
}

#[tokio::test]
async fn test_load_after_completion_is_a_noop() {
    let source = MemorySource::new()
        .with_extension("clock", &view_manifest("clock"))
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    let first = h.registry.load();
    let summary = first.wait().await.unwrap();

    let again = h.registry.load();
    assert!(again.is_same(&first));
    assert!(again.is_complete());
    assert_eq!(again.wait().await.unwrap(), summary);
    assert_eq!(h.source.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.len().await, 1);
}

// ── Fatal failures ──────────────────────────────────────────────────

#[tokio::test]
async fn test_listing_failure_rejects_load() {
    let h = harness(MemorySource::new().failing_list("connection refused"));

    let err = h.registry.load().wait().await.unwrap_err();
    assert!(matches!(*err, ExtensionError::UpstreamListingFailed(ref r) if r.contains("connection refused")));
    assert_eq!(h.registry.status(), LoadStatus::Completed);

    let notes = h.notifications.entries();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, FATAL_FAILURE_TITLE);
}

#[tokio::test]
async fn test_handshake_error_rejects_load() {
    let h = harness(MemorySource::new().failing_prepare("plugin directory unreadable"));

    let err = h.registry.load().wait().await.unwrap_err();
    assert!(matches!(*err, ExtensionError::UpstreamListingFailed(_)));
    assert_eq!(h.source.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_listing_completes_immediately() {
    let h = harness(MemorySource::new());

    let summary = h.registry.load().wait().await.unwrap();
    assert_eq!(summary, Default::default());
    assert!(h.registry.is_empty().await);
    assert!(h.notifications.is_empty());
}

#[tokio::test]
async fn test_slow_module_fetch_times_out() {
    let source = MemorySource::new()
        .with_extension("slow", &view_manifest("slow"))
        .with_file("slow", "index.json", component("Slow"))
        .with_delay("slow", "index.json", Duration::from_secs(2));
    let h = harness_with(source, RegistryConfig {
        fetch_timeout: Duration::from_millis(100),
        ..RegistryConfig::default()
    });

    let summary = h.registry.load().wait().await.unwrap();
    assert!(summary.failures[0].error.contains("timed out"));
    assert!(h.registry.is_empty().await);
}

// ── Themes ──────────────────────────────────────────────────────────

const AURORA_CSS: &str = r#"
    :root, [data-theme="aurora-dark"] { --accent: #ff0000; --bg: #101010; }
    [data-theme="aurora-dark"] { --ignored: 1px; }
    :root, [data-theme="aurora-dark"] { --accent: #00ff00; }
    :root, [data-theme="aurora-light"] { --bg: #fafafa; }
"#;

#[tokio::test]
async fn test_theme_end_to_end() {
    let source = MemorySource::new()
        .with_extension("aurora", &theme_manifest("aurora", &["aurora-dark", "aurora-light"]))
        .with_file("aurora", "theme.css", AURORA_CSS);
    let h = harness(source);

    h.registry.load().wait().await.unwrap();

    let theme = h.registry.theme("aurora").await.unwrap();
    assert_eq!(theme.variables.len(), 2);
    assert_eq!(theme.variables["aurora-dark"]["--accent"], "#00ff00");
    assert_eq!(theme.variables["aurora-dark"]["--bg"], "#101010");
    assert!(!theme.variables["aurora-dark"].contains_key("--ignored"));

    match h.registry.get("aurora").await.unwrap() {
        LoadedExtension::Theme(t) => assert_eq!(t.manifest.base.kind, ExtensionKind::Theme),
        other => panic!("expected theme, got {:?}", other.kind()),
    }

    let catalog = h.registry.theme_catalog();
    assert!(matches!(catalog.get("aurora-light"), Some(ThemeEntry::Custom(_))));
    let app = catalog.toggle("aurora-light").unwrap();
    assert_eq!(app.set, vec![("--bg".to_string(), "#fafafa".to_string())]);
}

#[tokio::test]
async fn test_theme_id_missing_from_stylesheet_is_omitted() {
    let source = MemorySource::new()
        .with_extension("aurora", &theme_manifest("aurora", &["aurora-dark", "aurora-neon"]))
        .with_file("aurora", "theme.css", AURORA_CSS);
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();
    assert!(summary.failures.is_empty());

    let theme = h.registry.theme("aurora").await.unwrap();
    assert_eq!(theme.variables.keys().collect::<Vec<_>>(), vec!["aurora-dark"]);
    // Declared by the stylesheet but not by the manifest.
    assert!(h.registry.theme_catalog().get("aurora-light").is_none());
    assert!(h.registry.theme_catalog().get("aurora-neon").is_none());
}

#[tokio::test]
async fn test_stylesheet_fetch_failure() {
    let source = MemorySource::new()
        .with_extension("aurora", &theme_manifest("aurora", &["aurora-dark"]));
    let h = harness(source);

    let summary = h.registry.load().wait().await.unwrap();
    assert!(summary.failures[0]
        .error
        .starts_with("failed to fetch stylesheet /plugins/aurora/theme.css"));
    assert!(h.registry.themes().await.is_empty());
}

#[tokio::test]
async fn test_mixed_kinds() {
    let source = MemorySource::new()
        .with_extension("aurora", &theme_manifest("aurora", &["aurora-dark"]))
        .with_extension("clock", &view_manifest("clock"))
        .with_file("aurora", "theme.css", AURORA_CSS)
        .with_file("clock", "index.json", component("Clock"));
    let h = harness(source);

    h.registry.load().wait().await.unwrap();
    assert_eq!(h.registry.names().await, vec!["aurora", "clock"]);
    assert_eq!(h.registry.views().await.len(), 1);
    assert_eq!(h.registry.themes().await.len(), 1);
}

// ── Decode then validate ────────────────────────────────────────────

#[test]
fn test_decode_then_validate_preserves_fields() {
    let manifest = json!({
        "name": "monitor",
        "main": "dist/index.json",
        "introduce": "服务器监控",
        "plugin_type": "view",
        "version": "2.1.0",
        "author": "voxesis",
        "repository": "https://example.org/monitor"
    });
    let raw = raw("monitor", &manifest);

    let text = decode_descriptor(&raw.manifest).unwrap();
    let base = voxesis_extension::manifest::validate_base(parse_descriptor(&text).unwrap())
        .unwrap()
        .base;

    assert_eq!(base.name, "monitor");
    assert_eq!(base.main, "dist/index.json");
    assert_eq!(base.introduce, "服务器监控");
    assert_eq!(base.kind, ExtensionKind::View);
    assert_eq!(base.version, "2.1.0");
    assert_eq!(base.author, "voxesis");
    assert_eq!(base.repository.as_deref(), Some("https://example.org/monitor"));
}
