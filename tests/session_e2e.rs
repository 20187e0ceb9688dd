//! End-to-end session tests: tabular portal pages and the case API flow,
//! against a mock portal and a temporary downloads root.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use plandl::discovery::PageContext;
use plandl::{
    NativeTransport, Notify, SandboxTransport, Session, SessionConfig, TransportCapabilities,
    TransportSelector,
};
use reqwest::Client;
use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every notification for assertions.
#[derive(Debug, Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl Notify for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn test_config() -> SessionConfig {
    SessionConfig {
        stagger: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

/// Session writing through the folder-aware native transport.
fn native_session(
    root: &TempDir,
    config: SessionConfig,
) -> (Session, Arc<RecordingNotifier>) {
    let client = Client::new();
    let selector = Arc::new(TransportSelector::new(
        TransportCapabilities {
            native_downloads: true,
        },
        Some(NativeTransport::spawn(root.path().to_path_buf(), client.clone())),
        SandboxTransport::new(root.path().to_path_buf(), client.clone()),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let session = Session::with_client(client, config, selector, notifier.clone());
    (session, notifier)
}

fn tabular_page_html(server_uri: &str) -> String {
    format!(
        r##"<html><body>
        <div class="description">
          Reference: REF123
          Address: 1 High Street
        </div>
        <a id="tab_summary" href="{server_uri}/summary">Summary</a>
        <table id="Documents">
          <tr>
            <th>Date</th>
            <th><a href="#">Description</a></th>
            <th>View</th>
          </tr>
          <tr><td>01</td><td>Site Plan</td><td><a href="/files/site-plan.pdf">View</a></td></tr>
          <tr><td>02</td><td>Elevations</td><td><a href="/files/elevations.pdf">View</a></td></tr>
          <tr><td>03</td><td>Decision</td><td><a href="/files/decision.pdf">View</a></td></tr>
        </table>
        </body></html>"##
    )
}

const SUMMARY_HTML: &str = r#"<html><body>
    <table id="simpleDetailsTable">
      <tr><th>Reference</th><td>REF123</td></tr>
      <tr><th>Address</th><td>1 High Street</td></tr>
      <tr><th>Proposal</th><td>Two storey <b>extension</b></td></tr>
    </table>
    </body></html>"#;

async fn mount_file(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

// Scenario A: tabular source with 3 document rows and a summary tab yields
// 3 files plus one synthesized JSON artifact in the case folder.
#[tokio::test]
async fn test_tabular_run_downloads_documents_and_summary() {
    let server = MockServer::start().await;
    mount_file(&server, "/files/site-plan.pdf", "site plan bytes").await;
    mount_file(&server, "/files/elevations.pdf", "elevation bytes").await;
    mount_file(&server, "/files/decision.pdf", "decision bytes").await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(SUMMARY_HTML),
        )
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let (session, notifier) = native_session(&root, test_config());
    let page = PageContext::new(
        Url::parse(&format!("{}/planning?activeTab=documents", server.uri())).unwrap(),
        tabular_page_html(&server.uri()),
    );

    session.run_tabular(&page).await;
    session.quiesce().await;

    let folder = root.path().join("REF123 1 High Street");
    assert!(folder.join("site-plan.pdf").exists());
    assert!(folder.join("elevations.pdf").exists());
    assert!(folder.join("decision.pdf").exists());

    let summary_path = folder.join("REF123 1 High Street.json");
    assert!(summary_path.exists());
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["Reference"], "REF123");
    // Inner HTML is preserved verbatim in the summary record
    assert_eq!(summary["Proposal"], "Two storey <b>extension</b>");
    assert!(summary["url"].as_str().unwrap().ends_with("/summary"));

    assert!(notifier.contains("Downloading 3 documents"));
    assert!(notifier.contains("application summary"));
}

// Scenario B: metadata-endpoint source with no address anywhere yields a
// folder named by the bare case id and two resolved artifacts.
#[tokio::test]
async fn test_api_run_resolves_and_downloads_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                { "id": 1, "documentId": 1 },
                { "id": 2, "documentId": 2 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211/document/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentUri": format!("{}/files/one.pdf", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211/document/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "downloadUrl": format!("{}/files/two.pdf", server.uri())
        })))
        .mount(&server)
        .await;
    mount_file(&server, "/files/one.pdf", "one").await;
    mount_file(&server, "/files/two.pdf", "two").await;

    let root = TempDir::new().unwrap();
    let (session, notifier) = native_session(&root, test_config());
    let page_url = Url::parse(&format!("{}/application/4211/documents", server.uri())).unwrap();

    session.run_api(&page_url).await;
    session.quiesce().await;

    // No address anywhere in the record: folder is the bare case id
    let folder = root.path().join("4211");
    assert!(folder.join("one.pdf").exists());
    assert!(folder.join("two.pdf").exists());
    assert!(notifier.contains("Downloading 2 documents"));
}

#[tokio::test]
async fn test_api_run_uses_discovered_address_in_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "application": { "siteAddress": "9 Mill Lane" },
            "documents": [ { "id": 1, "documentId": 1 } ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211/document/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/files/plan.pdf", server.uri())
        })))
        .mount(&server)
        .await;
    mount_file(&server, "/files/plan.pdf", "plan").await;

    let root = TempDir::new().unwrap();
    let (session, _notifier) = native_session(&root, test_config());
    let page_url = Url::parse(&format!("{}/application/4211/documents", server.uri())).unwrap();

    session.run_api(&page_url).await;
    session.quiesce().await;

    assert!(root.path().join("4211 9 Mill Lane/plan.pdf").exists());
}

// Scenario C: a tabular page without the "view" column header reports a
// discovery failure and attempts zero downloads.
#[tokio::test]
async fn test_tabular_run_missing_view_column_reports_and_stops() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let (session, notifier) = native_session(&root, test_config());

    let html = tabular_page_html(&server.uri()).replace("<th>View</th>", "<th>Open</th>");
    let page = PageContext::new(
        Url::parse(&format!("{}/planning?activeTab=documents", server.uri())).unwrap(),
        html,
    );

    session.run_tabular(&page).await;
    session.quiesce().await;

    assert!(notifier.contains("Failed to find document columns"));
    let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert!(entries.is_empty(), "no downloads may be attempted");
}

#[tokio::test]
async fn test_api_run_with_no_documents_notifies_zero_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/application/4211"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reference": "X", "status": "Decided"
        })))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let (session, notifier) = native_session(&root, test_config());
    let page_url = Url::parse(&format!("{}/application/4211/documents", server.uri())).unwrap();

    session.run_api(&page_url).await;
    session.quiesce().await;

    assert!(notifier.contains("No documents found"));
    let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert!(entries.is_empty());
}

// Labeled text missing from the page: case details come from the summary
// tab's label/value table instead.
#[tokio::test]
async fn test_tabular_run_falls_back_to_summary_for_case_details() {
    let server = MockServer::start().await;
    mount_file(&server, "/files/site-plan.pdf", "site plan bytes").await;
    mount_file(&server, "/files/elevations.pdf", "elevation bytes").await;
    mount_file(&server, "/files/decision.pdf", "decision bytes").await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(SUMMARY_HTML),
        )
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let (session, _notifier) = native_session(&root, test_config());
    let html = tabular_page_html(&server.uri()).replace(
        r#"<div class="description">"#,
        r#"<div class="unrelated">"#,
    );
    let page = PageContext::new(
        Url::parse(&format!("{}/planning?activeTab=documents", server.uri())).unwrap(),
        html,
    );

    session.run_tabular(&page).await;
    session.quiesce().await;

    // Reference and address were read from the summary table
    let folder = root.path().join("REF123 1 High Street");
    assert!(folder.join("site-plan.pdf").exists());
    assert!(folder.join("REF123 1 High Street.json").exists());
}

#[tokio::test]
async fn test_sandbox_fallback_writes_flat_files() {
    let server = MockServer::start().await;
    mount_file(&server, "/files/site-plan.pdf", "site plan bytes").await;
    mount_file(&server, "/files/elevations.pdf", "elevation bytes").await;
    mount_file(&server, "/files/decision.pdf", "decision bytes").await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUMMARY_HTML))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let client = Client::new();
    // No native capability: everything goes through the sandbox transport
    let selector = Arc::new(TransportSelector::new(
        TransportCapabilities::default(),
        None,
        SandboxTransport::new(root.path().to_path_buf(), client.clone()),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let session = Session::with_client(client, test_config(), selector, notifier.clone());

    let page = PageContext::new(
        Url::parse(&format!("{}/planning?activeTab=documents", server.uri())).unwrap(),
        tabular_page_html(&server.uri()),
    );
    session.run_tabular(&page).await;

    // Folder segment is dropped: files land flat in the downloads root
    assert!(root.path().join("site-plan.pdf").exists());
    assert!(root.path().join("REF123 1 High Street.json").exists());
    assert!(!root.path().join("REF123 1 High Street").is_dir());
}
