//! Session: the user-triggered run wiring discovery, resolution, and
//! delivery together.
//!
//! One run handles one case. Two source flavours exist: a tabular portal
//! page ([`Session::run_tabular`]) and a schema-unstable case API
//! ([`Session::run_api`]). Nothing outlives the run; every run starts from a
//! fresh discovery pass. No error escapes the trigger handlers — every stage
//! degrades to logging plus a non-blocking user notification.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::delivery::{
    Artifact, DEFAULT_STAGGER, DeliveryStats, Orchestrator, TransportSelector,
    filename_from_url, sanitize_path_segment,
};
use crate::discovery::{
    CaseDetails, DiscoveryError, PageContext, extract_case_details, find_address,
    find_document_ids, harvest_details_table, scan_document_table, summary_tab_href,
};
use crate::http::build_portal_client;
use crate::resolver::{DEFAULT_RESOLVE_TIMEOUT, DocumentResolver};

/// Fixed pattern locating the numeric case id in an API portal page path.
static CASE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| crate::discovery::compile_static_regex(r"/application/(\d+)/"));

/// User-facing notification seam (the toast analogue). The hosting layer
/// renders messages; the session only emits them.
pub trait Notify: Send + Sync {
    /// Shows a short, non-blocking message to the user.
    fn notify(&self, message: &str);
}

/// Default notifier: messages go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notify for TracingNotifier {
    fn notify(&self, message: &str) {
        info!(target: "plandl::notify", "{message}");
    }
}

/// Run configuration, resolved once and injected.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between successive delivery dispatches.
    pub stagger: Duration,
    /// Bound on each per-document resolution; `None` disables it.
    pub resolve_timeout: Option<Duration>,
    /// Case API base; derived from the page origin (`{origin}/api`) when
    /// unset.
    pub api_base: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stagger: DEFAULT_STAGGER,
            resolve_timeout: Some(DEFAULT_RESOLVE_TIMEOUT),
            api_base: None,
        }
    }
}

/// One user-triggered download run over one case.
pub struct Session {
    client: Client,
    orchestrator: Orchestrator,
    notifier: Arc<dyn Notify>,
    config: SessionConfig,
}

impl Session {
    /// Creates a session with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Fails only when HTTP client construction fails.
    pub fn new(
        config: SessionConfig,
        selector: Arc<TransportSelector>,
        notifier: Arc<dyn Notify>,
    ) -> anyhow::Result<Self> {
        let client = build_portal_client().context("building portal HTTP client")?;
        Ok(Self::with_client(client, config, selector, notifier))
    }

    /// Creates a session reusing an existing client.
    #[must_use]
    pub fn with_client(
        client: Client,
        config: SessionConfig,
        selector: Arc<TransportSelector>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        let orchestrator = Orchestrator::new(selector).with_stagger(config.stagger);
        Self {
            client,
            orchestrator,
            notifier,
            config,
        }
    }

    /// Runs the tabular-page flow: case details, document table rows, then
    /// the synthesized summary artifact. Never returns an error; every
    /// failure is logged and notified.
    pub async fn run_tabular(&self, page: &PageContext) {
        self.notifier.notify("Preparing downloads...");

        let details = extract_case_details(page, &self.client).await;
        // Computed once, shared read-only by every delivery in the run
        let folder = details.folder_name();
        info!(reference = %details.reference, folder = %folder, "starting tabular run");

        let rows = match scan_document_table(page) {
            Ok(rows) => rows,
            Err(error) => {
                warn!(error = %error, "document column detection failed");
                self.notifier
                    .notify("Failed to find document columns. Page structure may have changed.");
                return;
            }
        };

        if rows.is_empty() {
            self.notifier.notify("No documents found to download.");
        } else {
            self.notifier
                .notify(&format!("Downloading {} documents...", rows.len()));
            let artifacts: Vec<Artifact> = rows
                .iter()
                .map(|row| Artifact::remote(row.href.clone(), filename_from_url(&row.href)))
                .collect();
            let stats = self.orchestrator.deliver(artifacts, &folder).await;
            log_run_outcome("documents", &stats);
        }

        if let Some(summary) = self.build_summary_artifact(page, &details).await {
            self.notifier.notify("Downloading application summary...");
            let stats = self.orchestrator.deliver(vec![summary], &folder).await;
            log_run_outcome("summary", &stats);
        }
    }

    /// Runs the metadata-endpoint flow: numeric case id from the page path,
    /// heuristic graph search over the case record, per-document resolution,
    /// delivery. Never returns an error.
    pub async fn run_api(&self, page_url: &Url) {
        self.notifier.notify("Preparing downloads...");

        let case_id = match extract_case_id(page_url) {
            Ok(case_id) => case_id,
            Err(error) => {
                warn!(error = %error, "case id discovery failed");
                self.notifier
                    .notify("Could not find an application id in the page address.");
                return;
            }
        };

        let api_base = self.api_base_for(page_url);
        let record_url = format!("{api_base}/application/{case_id}");
        let record = match self.fetch_case_record(&record_url).await {
            Some(record) => record,
            None => {
                self.notifier
                    .notify("Failed to load application details. Please try again.");
                return;
            }
        };

        let address = find_address(&record).unwrap_or_default();
        let documents = find_document_ids(&record);
        let details = CaseDetails {
            reference: case_id.clone(),
            address,
        };
        let folder = details.folder_name();
        info!(
            case_id = %case_id,
            folder = %folder,
            documents = documents.len(),
            "starting api run"
        );

        if documents.is_empty() {
            // Discoverable-but-empty is a normal terminal case
            self.notifier.notify("No documents found to download.");
            return;
        }

        let resolver = DocumentResolver::with_client(self.client.clone(), api_base)
            .with_resolve_timeout(self.config.resolve_timeout);
        let resolved = resolver.resolve_batch(&case_id, &documents, &folder).await;

        if resolved.is_empty() {
            self.notifier.notify("No documents found to download.");
            return;
        }

        self.notifier
            .notify(&format!("Downloading {} documents...", resolved.len()));
        let artifacts: Vec<Artifact> = resolved.into_iter().map(Artifact::from).collect();
        let stats = self.orchestrator.deliver(artifacts, &folder).await;
        log_run_outcome("documents", &stats);
    }

    /// Waits until the native download worker (when present) has drained.
    pub async fn quiesce(&self) {
        self.orchestrator.selector().quiesce().await;
    }

    /// Builds the synthesized summary artifact from the summary tab's
    /// details table. Keys and values are the table cells' inner HTML,
    /// verbatim, so embedded formatting survives.
    async fn build_summary_artifact(
        &self,
        page: &PageContext,
        details: &CaseDetails,
    ) -> Option<Artifact> {
        let href = summary_tab_href(&page.html)?;
        let Some(summary_url) = page.absolutize(&href) else {
            warn!(href = %href, "summary tab href did not resolve to a URL");
            return None;
        };

        let body = match self.client.get(&summary_url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    warn!(url = %summary_url, error = %error, "failed to read summary page");
                    return None;
                }
            },
            Err(error) => {
                warn!(url = %summary_url, error = %error, "failed to fetch summary page");
                return None;
            }
        };

        let mut record = serde_json::Map::new();
        record.insert("url".to_string(), Value::String(summary_url));
        for (key, value) in harvest_details_table(&body) {
            record.insert(key, Value::String(value));
        }

        let json = match serde_json::to_string_pretty(&Value::Object(record)) {
            Ok(json) => json,
            Err(error) => {
                warn!(error = %error, "failed to serialize summary record");
                return None;
            }
        };

        let filename = format!(
            "{} {}",
            sanitize_path_segment(&details.reference),
            sanitize_path_segment(&details.address)
        )
        .trim()
        .to_string()
            + ".json";

        Some(Artifact::inline(json, "application/json", filename))
    }

    async fn fetch_case_record(&self, record_url: &str) -> Option<Value> {
        let response = match self.client.get(record_url).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(url = %record_url, error = %error, "case record request failed");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(
                url = %record_url,
                status = status.as_u16(),
                "case record request returned non-success status"
            );
            return None;
        }
        match response.json::<Value>().await {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(url = %record_url, error = %error, "case record was not valid JSON");
                None
            }
        }
    }

    fn api_base_for(&self, page_url: &Url) -> String {
        if let Some(base) = &self.config.api_base {
            return base.trim_end_matches('/').to_string();
        }
        format!("{}/api", page_url.origin().ascii_serialization())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Extracts the numeric case id from an API portal page path.
fn extract_case_id(page_url: &Url) -> Result<String, DiscoveryError> {
    CASE_ID_RE
        .captures(page_url.path())
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| DiscoveryError::CaseIdNotFound {
            path: page_url.path().to_string(),
        })
}

fn log_run_outcome(kind: &str, stats: &DeliveryStats) {
    info!(
        kind,
        delivered = stats.delivered(),
        failed = stats.failed(),
        "delivery batch settled"
    );
}
