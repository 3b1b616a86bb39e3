use cursor_chat_export::catalog::{self, ViewerState};
use cursor_chat_export::exporter::{self, ExportFormat, ExportPayload, RenderMode};
use cursor_chat_export::importer::{RecordSource, SqliteStore};
use cursor_chat_export::metadata::UNKNOWN_DATE;
use cursor_chat_export::{LoadConfig, StoreError};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use rusqlite::{Connection, params};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn zlib(text: &str) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}

fn create_store(dir: &Path) -> PathBuf {
    let path = dir.join("state.vscdb");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
         CREATE TABLE cursorDiskKV (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);",
    )
    .unwrap();

    let insert = |key: &str, value: rusqlite::types::Value| {
        conn.execute(
            "INSERT INTO cursorDiskKV (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .unwrap();
    };

    insert(
        "composerData:old",
        r#"{"createdAt":"2023-12-24 08:00","title":"Old chat","messages":[]}"#
            .to_string()
            .into(),
    );
    insert(
        "composerData:plan",
        zlib(r#"{"title":"Plan","createdAt":"2024-03-01 09:00","messages":[{"role":"user","content":"Hi\nthere"},{"role":"assistant","content":"Hello"}]}"#).into(),
    );
    insert(
        "composerData:notes",
        r#"{"messages":[{"role":"user","content":"Refactor the parser module please"}]}"#
            .to_string()
            .into(),
    );
    insert("composerData:blob", vec![0x00, 0xff, 0x10].into());
    insert("composerData:void", rusqlite::types::Value::Null);
    insert("bubbleId:abc:def", r#"{"text":"bubble"}"#.to_string().into());
    insert("plainkey", "x".to_string().into());
    path
}

#[test]
fn loads_sorted_catalog_from_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = create_store(dir.path());

    let catalog = catalog::load(&SqliteStore::new(&path), "composerData:").unwrap();

    let listed: Vec<(&str, &str, &str)> = catalog
        .entries()
        .iter()
        .map(|e| {
            (
                e.summary.id.as_str(),
                e.summary.display_date.as_str(),
                e.summary.display_title.as_str(),
            )
        })
        .collect();
    assert_eq!(
        listed,
        vec![
            ("plan", "2024-03-01 09:00", "Plan"),
            ("old", "2023-12-24 08:00", "Old chat"),
            ("notes", UNKNOWN_DATE, "Refactor the parser module please"),
            ("blob", UNKNOWN_DATE, ""),
        ]
    );
    assert_eq!(catalog.skipped(), 1);

    let plan = &catalog.entries()[0].record;
    assert!(plan.was_compressed);
    assert_eq!(plan.raw_key, "composerData:plan");
}

#[test]
fn empty_prefix_loads_every_key() {
    let dir = TempDir::new().unwrap();
    let path = create_store(dir.path());
    let config = LoadConfig {
        db_path: path,
        key_prefix: String::new(),
        snapshot: false,
    };

    let catalog = catalog::load(&config.store(), &config.key_prefix).unwrap();
    assert_eq!(catalog.len(), 6);
    assert!(catalog.lookup("bubbleId:abc:def").is_some());
}

#[test]
fn search_then_render_and_export() {
    let dir = TempDir::new().unwrap();
    let path = create_store(dir.path());

    let mut state = ViewerState::new();
    state
        .reload(&SqliteStore::new(&path), "composerData:")
        .unwrap();

    // Content inside the compressed payload is searchable.
    let index = state.search("THERE").unwrap();
    assert_eq!(index, 0);
    let record = &state.selected().unwrap().record;

    let transcript = exporter::render(record, RenderMode::Transcript);
    assert!(transcript.starts_with("Title: Plan\n"));
    let user = transcript.find("[USER]\nHi\nthere\n").unwrap();
    let assistant = transcript.find("[ASSISTANT]\nHello\n").unwrap();
    assert!(user < assistant);

    let out = dir.path().join(exporter::default_file_name(&record.id, ExportFormat::Json));
    let payload = exporter::export(record, ExportFormat::Json).unwrap();
    exporter::write_export(&out, &payload).unwrap();
    assert!(out.ends_with("cursor_chat_plan.json"));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(Some(&written), record.structured.as_ref());
}

#[test]
fn binary_record_exports_raw_bytes() {
    let dir = TempDir::new().unwrap();
    let path = create_store(dir.path());
    let catalog = catalog::load(&SqliteStore::new(&path), "composerData:").unwrap();

    let blob = &catalog.lookup("blob").unwrap().record;
    assert!(blob.is_binary());
    assert_eq!(
        exporter::render(blob, RenderMode::Pretty),
        "Binary data (showing first 1000 bytes):\n00 ff 10"
    );
    assert_eq!(
        exporter::export(blob, ExportFormat::Text).unwrap(),
        ExportPayload::Bytes(vec![0x00, 0xff, 0x10])
    );
    assert!(exporter::export(blob, ExportFormat::Json).is_err());
}

#[test]
fn analyzes_key_prefixes() {
    let dir = TempDir::new().unwrap();
    let path = create_store(dir.path());

    let keys = SqliteStore::new(&path).read_keys().unwrap();
    let counts = catalog::analyze_prefixes(&keys);
    let summary: Vec<(&str, usize)> = counts
        .iter()
        .map(|c| (c.prefix.as_str(), c.count))
        .collect();
    assert_eq!(
        summary,
        vec![("composerData:", 5), ("bubbleId:", 1), ("(no prefix)", 1)]
    );
}

#[test]
fn unreachable_store_fails_the_whole_load() {
    let dir = TempDir::new().unwrap();
    let mut state = ViewerState::new();
    let err = state
        .reload(&SqliteStore::new(dir.path().join("missing.vscdb")), "")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(state.catalog().is_none());
}
