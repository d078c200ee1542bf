use std::path::Path;
use std::time::Duration;

use docmirror::app::sync_all;
use docmirror::config::Config;
use docmirror::report::ConversionRecord;
use docmirror::state::{StateStore, SyncState};
use docmirror::sync::backoff::Backoff;
use docmirror::sync::{DriveRemote, ResolveError, SyncEngine, resolve_folder_path};
use docmirror_core::{DriveClient, FileQuery};
use serde_json::{Value, json};
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILES_PATH: &str = "/drive/v3/files";

fn remote_for(server: &MockServer) -> DriveRemote {
    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    DriveRemote::new(client)
        .with_backoff(Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            false,
        ))
        .with_max_attempts(3)
}

fn doc(id: &str, name: &str, modified: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "application/vnd.google-apps.document",
        "modifiedTime": modified
    })
}

fn folder(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "application/vnd.google-apps.folder"
    })
}

async fn mount_listing(server: &MockServer, query: FileQuery, files: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(FILES_PATH))
        .and(query_param("q", query.to_filter()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .mount(server)
        .await;
}

async fn mount_documents(server: &MockServer, folder_id: &str, files: Vec<Value>) {
    mount_listing(server, FileQuery::children_of(folder_id).documents(), files).await;
}

async fn mount_folders(server: &MockServer, folder_id: &str, files: Vec<Value>) {
    mount_listing(server, FileQuery::children_of(folder_id).folders(), files).await;
}

/// Any listing not mounted explicitly is an empty folder.
async fn mount_empty_fallback(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(FILES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_export(server: &MockServer, file_id: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{FILES_PATH}/{file_id}/export")))
        .and(query_param("mimeType", "text/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

async fn mount_binary_export(server: &MockServer, file_id: &str, mime_type: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("{FILES_PATH}/{file_id}/export")))
        .and(query_param("mimeType", mime_type))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Every export of `file_id` fails, whatever the requested format.
async fn mount_failing_export(server: &MockServer, file_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{FILES_PATH}/{file_id}/export")))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(server)
        .await;
}

fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path).expect("file should exist")
}

async fn export_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().ends_with("/export"))
        .count()
}

#[tokio::test]
async fn mirrors_legacy_and_path_entries() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![
            doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z"),
            doc("doc-2", "Doc 2", "2023-10-26T11:00:00Z"),
        ],
    )
    .await;
    mount_listing(
        &server,
        FileQuery::children_of("root").folders().named("Projects"),
        vec![folder("projects-1", "Projects")],
    )
    .await;
    mount_documents(
        &server,
        "projects-1",
        vec![doc("doc-3", "Doc 3", "2023-10-27T09:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<h1>Doc 1</h1><p>First</p>").await;
    mount_export(&server, "doc-2", "<h1>Doc 2</h1><p>Second</p>").await;
    mount_export(&server, "doc-3", "<h1>Doc 3</h1><p>Third</p>").await;

    let dir = tempdir().unwrap();
    let config = Config::from_yaml(
        "directories:\n  - id: folder-1\n    name: F1\n  - Projects\n",
        dir.path(),
    )
    .unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut report = Vec::new();

    let records = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        SyncState::new(),
        false,
        &mut report,
    )
    .await
    .unwrap();

    let downloads = dir.path().join("downloads");
    assert!(read(downloads.join("F1/Doc 1.md")).contains("# Doc 1"));
    assert!(read(downloads.join("F1/Doc 2.md")).contains("Second"));
    assert!(read(downloads.join("Projects/Doc 3.md")).contains("# Doc 3"));
    assert_eq!(
        records,
        vec![
            ConversionRecord::from(("F1", "Doc 1.md")),
            ConversionRecord::from(("F1", "Doc 2.md")),
            ConversionRecord::from(("Projects", "Doc 3.md")),
        ]
    );

    let state = store.load().await.unwrap();
    assert_eq!(state.len(), 3);
    assert_eq!(state["doc-1"], "2023-10-26T10:00:00Z");
    assert_eq!(state["doc-3"], "2023-10-27T09:00:00Z");

    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("3 documents were converted:"));
    assert!(report.contains("     folder: Projects"));
}

#[tokio::test]
async fn mirrors_subfolders_into_custom_output_dir() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        FileQuery::children_of("root").folders().named("Work"),
        vec![folder("work-1", "Work")],
    )
    .await;
    mount_listing(
        &server,
        FileQuery::children_of("work-1").folders().named("Specs"),
        vec![folder("specs-1", "Specs")],
    )
    .await;
    mount_documents(
        &server,
        "specs-1",
        vec![doc("doc-1", "Doc 1", "2024-01-01T00:00:00Z")],
    )
    .await;
    mount_folders(&server, "specs-1", vec![folder("sub-1", "Sub: Drafts")]).await;
    mount_documents(
        &server,
        "sub-1",
        vec![doc("doc-2", "Q&A: Report (Final)!", "2024-01-02T00:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>top</p>").await;
    mount_export(&server, "doc-2", "<p>nested</p>").await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("custom_output");
    let yaml = format!("directories:\n  - Work/Specs: \"{}\"\n", output.display());
    let config = Config::from_yaml(&yaml, dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));

    let records = sync_all(
        remote_for(&server),
        &config,
        store,
        SyncState::new(),
        false,
        std::io::sink(),
    )
    .await
    .unwrap();

    assert_eq!(read(output.join("Doc 1.md")).trim(), "top");
    assert_eq!(
        read(output.join("Sub Drafts/QA Report Final.md")).trim(),
        "nested"
    );
    assert_eq!(
        records,
        vec![
            ConversionRecord::from(("Specs", "Doc 1.md")),
            ConversionRecord::from(("Specs/Sub Drafts", "QA Report Final.md")),
        ]
    );
}

#[tokio::test]
async fn dry_run_exports_and_writes_nothing() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![
            doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z"),
            doc("doc-2", "Doc 2", "2023-10-26T11:00:00Z"),
        ],
    )
    .await;
    mount_folders(&server, "folder-1", vec![folder("sub-1", "Sub")]).await;
    mount_empty_fallback(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{FILES_PATH}/doc-1/export")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>x</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut state = SyncState::new();
    state.insert("doc-2".into(), "2023-10-26T11:00:00Z".into());
    let mut report = Vec::new();

    let records = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        state,
        true,
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(records, vec![ConversionRecord::from(("F1", "Doc 1.md"))]);
    assert!(!dir.path().join("downloads").exists());
    assert!(!store.path().exists());
    assert_eq!(export_requests(&server).await, 0);

    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("Conversion summary (dry run)"));
    assert!(report.contains("1 document would be converted:"));
}

#[tokio::test]
async fn second_run_converts_nothing() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z")],
    )
    .await;
    mount_folders(&server, "folder-1", vec![folder("sub-1", "Sub")]).await;
    mount_documents(
        &server,
        "sub-1",
        vec![doc("doc-2", "Doc 2", "2023-10-26T12:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>one</p>").await;
    mount_export(&server, "doc-2", "<p>two</p>").await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));

    let first = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        store.load().await.unwrap(),
        false,
        std::io::sink(),
    )
    .await
    .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(export_requests(&server).await, 2);

    let state = store.load().await.unwrap();
    let mut engine = SyncEngine::new(remote_for(&server), store.clone(), state, false);
    let mut converted = Vec::new();
    for root in &config.roots {
        engine.sync_root(root, &mut converted).await.unwrap();
    }

    assert!(converted.is_empty());
    let stats = engine.stats();
    assert_eq!(stats.converted, 0);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(stats.state_saves, 0);
    assert_eq!(export_requests(&server).await, 2);
}

#[tokio::test]
async fn only_changed_documents_are_reconverted() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![
            doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z"),
            doc("doc-2", "Doc 2", "2023-11-01T08:00:00Z"),
        ],
    )
    .await;
    mount_empty_fallback(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{FILES_PATH}/doc-2/export")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>updated</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut state = SyncState::new();
    state.insert("doc-1".into(), "2023-10-26T10:00:00Z".into());
    state.insert("doc-2".into(), "2023-10-26T11:00:00Z".into());

    let records = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        state,
        false,
        std::io::sink(),
    )
    .await
    .unwrap();

    assert_eq!(records, vec![ConversionRecord::from(("F1", "Doc 2.md"))]);
    assert_eq!(store.load().await.unwrap()["doc-2"], "2023-11-01T08:00:00Z");
    assert_eq!(export_requests(&server).await, 1);
}

#[tokio::test]
async fn existing_output_is_backed_up() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![doc("doc-1", "Doc 1", "2023-12-01T00:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>new content</p>").await;

    let dir = tempdir().unwrap();
    let local = dir.path().join("downloads/F1");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(local.join("Doc 1.md"), "old content").unwrap();
    std::fs::write(local.join("Doc 1.md.bak"), "older content").unwrap();

    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    sync_all(
        remote_for(&server),
        &config,
        StateStore::new(dir.path().join("state.json")),
        SyncState::new(),
        false,
        std::io::sink(),
    )
    .await
    .unwrap();

    assert_eq!(read(local.join("Doc 1.md")).trim(), "new content");
    assert_eq!(read(local.join("Doc 1.md.bak")), "old content");
}

#[tokio::test]
async fn failing_folder_does_not_stop_siblings() {
    let server = MockServer::start().await;
    mount_folders(
        &server,
        "folder-1",
        vec![folder("broken-1", "Broken"), folder("ok-1", "Fine")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(FILES_PATH))
        .and(query_param(
            "q",
            FileQuery::children_of("broken-1").documents().to_filter(),
        ))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;
    mount_documents(
        &server,
        "ok-1",
        vec![doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>fine</p>").await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut engine = SyncEngine::new(remote_for(&server), store, SyncState::new(), false);
    let mut converted = Vec::new();
    engine
        .sync_root(&config.roots[0], &mut converted)
        .await
        .unwrap();

    assert_eq!(
        converted,
        vec![ConversionRecord::from(("F1/Fine", "Doc 1.md"))]
    );
    assert_eq!(engine.stats().folder_errors, 1);
    assert!(dir.path().join("downloads/F1/Fine/Doc 1.md").exists());
}

#[tokio::test]
async fn transient_listing_errors_are_retried() {
    let server = MockServer::start().await;
    let docs_filter = FileQuery::children_of("folder-1").documents().to_filter();
    Mock::given(method("GET"))
        .and(path(FILES_PATH))
        .and(query_param("q", docs_filter.as_str()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_documents(
        &server,
        "folder-1",
        vec![doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>ok</p>").await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let records = sync_all(
        remote_for(&server),
        &config,
        StateStore::new(dir.path().join("state.json")),
        SyncState::new(),
        false,
        std::io::sink(),
    )
    .await
    .unwrap();

    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn resolves_nested_path_with_one_query_per_segment() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        FileQuery::children_of("root").folders().named("A"),
        vec![folder("a-1", "A"), folder("a-2", "A")],
    )
    .await;
    mount_listing(
        &server,
        FileQuery::children_of("a-1").folders().named("B"),
        vec![folder("b-1", "B")],
    )
    .await;
    mount_listing(
        &server,
        FileQuery::children_of("b-1").folders().named("C"),
        vec![folder("c-1", "C")],
    )
    .await;

    let id = resolve_folder_path(&remote_for(&server), "/A//B/C/")
        .await
        .unwrap();

    assert_eq!(id, "c-1");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn root_path_resolves_without_queries() {
    let server = MockServer::start().await;
    let remote = remote_for(&server);

    assert_eq!(resolve_folder_path(&remote, "").await.unwrap(), "root");
    assert_eq!(resolve_folder_path(&remote, "/").await.unwrap(), "root");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_first_segment_fails_after_one_query() {
    let server = MockServer::start().await;
    mount_empty_fallback(&server).await;

    let err = resolve_folder_path(&remote_for(&server), "Missing/Deeper")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::FolderNotFound { ref segment, .. } if segment == "Missing"
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unresolvable_root_is_skipped() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![doc("doc-1", "Doc 1", "2023-10-26T10:00:00Z")],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_export(&server, "doc-1", "<p>ok</p>").await;

    let dir = tempdir().unwrap();
    let config = Config::from_yaml(
        "directories:\n  - Nowhere/Here\n  - id: folder-1\n    name: F1\n",
        dir.path(),
    )
    .unwrap();
    let mut report = Vec::new();
    let records = sync_all(
        remote_for(&server),
        &config,
        StateStore::new(dir.path().join("state.json")),
        SyncState::new(),
        false,
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(records, vec![ConversionRecord::from(("F1", "Doc 1.md"))]);
    assert!(!dir.path().join("downloads/Here").exists());
}

#[tokio::test]
async fn failed_export_is_isolated_and_pdf_is_written_verbatim() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![
            doc("bad", "Bad", "2024-03-01T00:00:00Z"),
            doc("good", "Good", "2024-03-02T00:00:00Z"),
        ],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_failing_export(&server, "bad").await;
    mount_export(&server, "good", "<h2>Hi</h2>").await;
    let pdf = [37u8, 80, 255, 0];
    mount_binary_export(&server, "good", "application/pdf", &pdf).await;

    let dir = tempdir().unwrap();
    let config = Config::from_yaml(
        "directories:\n  - id: folder-1\n    name: F\n    formats: [markdown, pdf]\n",
        dir.path(),
    )
    .unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut report = Vec::new();

    let records = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        SyncState::new(),
        false,
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(
        records,
        vec![
            ConversionRecord::from(("F", "Good.md")),
            ConversionRecord::from(("F", "Good.pdf")),
        ]
    );
    let local = dir.path().join("downloads/F");
    assert_eq!(read(local.join("Good.md")).trim(), "## Hi");
    assert_eq!(std::fs::read(local.join("Good.pdf")).unwrap(), pdf);
    assert!(!local.join("Bad.md").exists());
    assert!(!local.join("Bad.pdf").exists());

    let state = store.load().await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state["good"], "2024-03-02T00:00:00Z");

    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("2 documents were converted:"));
    assert!(report.contains("1. Good.md"));
    assert!(report.contains("2. Good.pdf"));
}

#[tokio::test]
async fn run_where_every_export_fails_reports_nothing_converted() {
    let server = MockServer::start().await;
    mount_documents(
        &server,
        "folder-1",
        vec![
            doc("doc-1", "Doc 1", "2024-03-01T00:00:00Z"),
            doc("doc-2", "Doc 2", "2024-03-02T00:00:00Z"),
        ],
    )
    .await;
    mount_empty_fallback(&server).await;
    mount_failing_export(&server, "doc-1").await;
    mount_failing_export(&server, "doc-2").await;

    let dir = tempdir().unwrap();
    let config =
        Config::from_yaml("directories:\n  - id: folder-1\n    name: F1\n", dir.path()).unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut report = Vec::new();

    let records = sync_all(
        remote_for(&server),
        &config,
        store.clone(),
        SyncState::new(),
        false,
        &mut report,
    )
    .await
    .unwrap();

    assert!(records.is_empty());
    assert!(!store.path().exists());
    assert_eq!(export_requests(&server).await, 6);

    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("Conversion summary"));
    assert!(report.ends_with("No documents were converted.\n"));
}
