//! A page processed end to end from a JSON configuration.

use flate2::read::GzDecoder;
use nutpipe_core::config::{ContextConfig, ObjectRegistry};
use nutpipe_core::context::ContextBuilder;
use nutpipe_core::nut::{Nut, NutType};
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn gunzip(nut: &Nut) -> String {
    let mut out = String::new();
    GzDecoder::new(nut.read_bytes().unwrap().as_slice())
        .read_to_string(&mut out)
        .unwrap();
    out
}

fn site(root: &Path) {
    fs::create_dir_all(root.join("css")).unwrap();
    fs::create_dir_all(root.join("js")).unwrap();
    fs::write(root.join("css/a.css"), "a{}").unwrap();
    fs::write(root.join("css/b.css"), "b{}").unwrap();
    fs::write(root.join("js/app.js"), "run();").unwrap();
    fs::write(
        root.join("index.html"),
        concat!(
            "<html><head>",
            "<link rel=\"stylesheet\" href=\"css/a.css\">",
            "<link rel=\"stylesheet\" href=\"css/b.css\">",
            "<script src=\"js/app.js\"></script>",
            "</head><body>",
            "<script src=\"https://cdn.example.com/lib.js\"></script>",
            "</body></html>"
        ),
    )
    .unwrap();
}

#[test]
fn test_page_is_inspected_aggregated_compressed_and_stored() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("site");
    let out = temp.path().join("out");
    site(&root);
    fs::create_dir(&out).unwrap();

    let json = serde_json::json!({
        "context_path": "/static",
        "providers": [
            { "id": "site", "type": "disk", "properties": { "base_dir": root, "wildcard": true } },
            { "id": "out", "type": "disk", "properties": { "base_dir": out } }
        ],
        "engines": [
            { "id": "gz", "type": "gzip", "properties": { "level": 9 } },
            { "id": "cache", "type": "memory-cache" }
        ],
        "heaps": [{ "id": "pages", "provider": "site", "paths": ["index.html"] }],
        "templates": [{ "id": "prod", "engines": ["gz", "cache"] }],
        "workflows": [{ "id": "web", "heap": "pages", "template": "prod", "stores": ["out"] }]
    });
    let config = ContextConfig::from_json_str(&json.to_string()).unwrap();
    let context = ContextBuilder::from_config(&config, &ObjectRegistry::with_builtins())
        .unwrap()
        .build()
        .unwrap();

    let outcome = context.process_with_stats("web").unwrap();
    assert_eq!(outcome.nuts.len(), 1);
    let page = &outcome.nuts[0];
    assert_eq!(page.name(), "index.html");
    assert_eq!(page.nut_type(), NutType::Html);
    assert!(page.is_compressed());

    let engines: Vec<&str> = outcome.engines.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(engines[0], "memory-cache");
    assert!(engines.contains(&"html-inspector"));
    assert!(engines.contains(&"gzip"));

    let html = gunzip(page);
    assert_eq!(html.matches("rel=\"stylesheet\"").count(), 1);
    assert_eq!(html.matches("<script").count(), 2);
    assert!(html.contains("https://cdn.example.com/lib.js"));
    assert!(html.contains("href=\"/static/web/"));

    let referenced = page.referenced_nuts();
    assert_eq!(referenced.len(), 2);
    let css = referenced
        .iter()
        .find(|n| n.nut_type() == NutType::Css)
        .unwrap();
    assert!(css.name().ends_with("/aggregate.css"));
    assert!(css.is_compressed());
    assert_eq!(gunzip(css), "a{}\r\nb{}");

    let stored = fs::read(out.join("index.html")).unwrap();
    assert_eq!(stored, page.read_bytes().unwrap());
    assert!(out.join(css.name()).is_file());

    // Served from the cache the second time.
    let again = context.process_with_stats("web").unwrap();
    assert_eq!(again.engines.len(), 1);
    assert_eq!(again.nuts[0].read_bytes().unwrap(), page.read_bytes().unwrap());
}

#[test]
fn test_unknown_workflow_reports_not_found() {
    let context = ContextBuilder::new().build().unwrap();
    assert_eq!(
        context.process("missing").unwrap_err().kind(),
        nutpipe_core::ErrorKind::NotFound
    );
}
