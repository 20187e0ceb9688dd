//! Document Resolver: one remote lookup per discovered document identifier.
//!
//! Each identifier is resolved independently against the per-document
//! endpoint; the batch joins only once every lookup has settled. A failed or
//! timed-out lookup drops that one document and the batch continues — callers
//! never see an error for an individual document, only a smaller result list.

use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::delivery::filename_from_url;
use crate::discovery::DocumentRef;
use crate::http::build_portal_client;

/// Location-URL aliases probed on a resolver response, in priority order.
pub const URL_ALIASES: &[&str] = &["documentUri", "url", "downloadUrl", "fileUrl", "link"];

/// Default bound on a single document lookup.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// A document identifier resolved to a concrete artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Final downloadable URL of the document.
    pub location_url: String,
    /// Filename derived from the URL's decoded last path segment.
    pub suggested_filename: String,
    /// Case folder shared by every artifact of the run.
    pub target_folder: String,
}

/// Error constructing a resolver (client construction only; individual
/// lookups degrade to `None` instead of erroring).
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The shared HTTP client could not be built.
    #[error("HTTP client construction failed: {source}")]
    Client {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Resolves document identifiers against a case API's per-document endpoint.
#[derive(Debug, Clone)]
pub struct DocumentResolver {
    client: Client,
    api_base: String,
    resolve_timeout: Option<Duration>,
}

impl DocumentResolver {
    /// Creates a resolver for the given API base (e.g. `https://host/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Client`] if HTTP client construction fails.
    pub fn new(api_base: impl Into<String>) -> Result<Self, ResolverError> {
        let client = build_portal_client().map_err(|source| ResolverError::Client { source })?;
        Ok(Self::with_client(client, api_base))
    }

    /// Creates a resolver reusing an existing client.
    #[must_use]
    pub fn with_client(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            resolve_timeout: Some(DEFAULT_RESOLVE_TIMEOUT),
        }
    }

    /// Overrides the per-lookup timeout; `None` disables the bound.
    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Resolves one document identifier to an artifact location.
    ///
    /// Returns `None` on any failure: non-success status (body captured for
    /// diagnostics), unparsable body, or a response carrying none of the
    /// known URL aliases. The caller skips the document and continues.
    pub async fn resolve(
        &self,
        application_id: &str,
        document_id: &str,
    ) -> Option<ResolvedArtifact> {
        let endpoint = format!(
            "{}/application/{}/document/{}",
            self.api_base,
            urlencoding::encode(application_id),
            urlencoding::encode(document_id),
        );
        debug!(endpoint = %endpoint, "resolving document");

        let response = match self.client.get(&endpoint).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(document_id, error = %error, "document lookup request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                document_id,
                status = status.as_u16(),
                body = %body_snippet(&body),
                "document lookup returned non-success status"
            );
            return None;
        }

        let record = match response.json::<Value>().await {
            Ok(record) => record,
            Err(error) => {
                warn!(document_id, error = %error, "document lookup body was not valid JSON");
                return None;
            }
        };

        let Some(location_url) = extract_location_url(&record) else {
            warn!(document_id, "document record carries no known URL field");
            return None;
        };

        Some(ResolvedArtifact {
            suggested_filename: filename_from_url(&location_url),
            location_url,
            target_folder: String::new(),
        })
    }

    /// Resolves a whole batch of identifiers concurrently.
    ///
    /// Every lookup is issued immediately (fan-out) and the call returns only
    /// once all of them have settled (fan-in); there is no partial-batch
    /// short-circuit. Lookups exceeding the configured timeout are dropped
    /// like failures, so one hung request cannot stall the join. `None`
    /// results are filtered out and the remaining artifacts carry `folder`.
    pub async fn resolve_batch(
        &self,
        application_id: &str,
        documents: &[DocumentRef],
        folder: &str,
    ) -> Vec<ResolvedArtifact> {
        let lookups = documents.iter().map(|document| {
            let document_id = document.id.clone();
            async move {
                let lookup = self.resolve(application_id, &document_id);
                match self.resolve_timeout {
                    Some(bound) => match tokio::time::timeout(bound, lookup).await {
                        Ok(resolved) => resolved,
                        Err(_) => {
                            warn!(
                                document_id = %document_id,
                                timeout_ms = bound.as_millis(),
                                "document lookup timed out; dropping document"
                            );
                            None
                        }
                    },
                    None => lookup.await,
                }
            }
        });

        let settled = join_all(lookups).await;
        let total = settled.len();
        let artifacts: Vec<ResolvedArtifact> = settled
            .into_iter()
            .flatten()
            .map(|artifact| ResolvedArtifact {
                target_folder: folder.to_string(),
                ..artifact
            })
            .collect();

        debug!(
            resolved = artifacts.len(),
            dropped = total - artifacts.len(),
            "document batch resolution settled"
        );
        artifacts
    }
}

/// Probes the record for a location URL, first alias in table order wins.
fn extract_location_url(record: &Value) -> Option<String> {
    let map = record.as_object()?;
    URL_ALIASES.iter().find_map(|alias| match map.get(*alias) {
        Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
        _ => None,
    })
}

fn body_snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(index, _)| index);
    &body[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_location_url_alias_priority() {
        let record = json!({
            "downloadUrl": "https://host/files/b.pdf",
            "documentUri": "https://host/files/a.pdf"
        });
        assert_eq!(
            extract_location_url(&record).as_deref(),
            Some("https://host/files/a.pdf")
        );
    }

    #[test]
    fn test_extract_location_url_missing_all_aliases() {
        let record = json!({ "name": "plan", "size": 12345 });
        assert_eq!(extract_location_url(&record), None);
    }

    #[test]
    fn test_extract_location_url_skips_empty_and_non_string() {
        let record = json!({
            "documentUri": "",
            "url": 17,
            "fileUrl": "https://host/files/c.pdf"
        });
        assert_eq!(
            extract_location_url(&record).as_deref(),
            Some("https://host/files/c.pdf")
        );
    }

    #[test]
    fn test_body_snippet_bounds_long_bodies() {
        let body = "x".repeat(500);
        assert_eq!(body_snippet(&body).len(), 200);
        assert_eq!(body_snippet("short"), "short");
    }
}
