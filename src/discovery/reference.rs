//! Reference Extractor: pulls the case reference and address from a page.
//!
//! Strategy, first match wins per field: scan a fixed list of candidate page
//! regions for labeled `Reference: ...` / `Address: ...` text, then fall back
//! to fetching the summary tab and reading its label/value table. Extraction
//! never fails; a missing reference stays at the [`UNKNOWN_REFERENCE`]
//! sentinel and a missing address stays empty.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::delivery::sanitize_path_segment;

use super::{PageContext, compile_static_selector};

/// Sentinel reference used when nothing labeled "Reference" can be found.
pub const UNKNOWN_REFERENCE: &str = "Unknown";

/// Candidate page regions scanned for labeled reference/address text.
const DETAIL_REGIONS: &[&str] = &[".description", "#simpleDetailsTable", ".application_details"];

static REFERENCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Reference\s*:\s*([^\n\r]+)"));
static ADDRESS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Address\s*:\s*([^\n\r]+)"));

static SUMMARY_ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#simpleDetailsTable tr"));
static TH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("th"));
static TD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("td"));

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Case reference and human address, the two fields every run needs before
/// any download starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDetails {
    /// Case/application reference; [`UNKNOWN_REFERENCE`] when undiscovered.
    pub reference: String,
    /// Human address string; may be empty.
    pub address: String,
}

impl CaseDetails {
    /// Creates details with the sentinel reference and an empty address.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            reference: UNKNOWN_REFERENCE.to_string(),
            address: String::new(),
        }
    }

    /// Builds the case folder name shared by every artifact of the run:
    /// reference and address joined, trimmed, and sanitized as one path
    /// segment.
    #[must_use]
    pub fn folder_name(&self) -> String {
        let joined = format!("{} {}", self.reference, self.address);
        sanitize_path_segment(joined.trim())
    }

    fn reference_missing(&self) -> bool {
        self.reference == UNKNOWN_REFERENCE
    }
}

/// Extracts the case reference and address for the current page.
///
/// Scans the candidate regions first; if either field is still unresolved,
/// fetches the summary tab (its URL taken from the `#tab_summary` anchor) and
/// reads the label/value table there. Network failure on the secondary fetch
/// is logged and treated as "no further data".
pub async fn extract_case_details(page: &PageContext, client: &Client) -> CaseDetails {
    let mut details = scan_detail_regions(&page.html);

    if !details.reference_missing() && !details.address.is_empty() {
        return details;
    }

    let Some(href) = super::summary_tab_href(&page.html) else {
        debug!("no summary tab on page; keeping partially resolved case details");
        return details;
    };
    let Some(summary_url) = page.absolutize(&href) else {
        warn!(href = %href, "summary tab href did not resolve to a URL");
        return details;
    };

    match fetch_text(client, &summary_url).await {
        Ok(body) => apply_summary_rows(&body, &mut details),
        Err(error) => {
            warn!(url = %summary_url, error = %error, "failed to fetch case details from summary tab");
        }
    }

    details
}

/// Scans the fixed candidate regions for labeled text, first match wins per
/// field.
fn scan_detail_regions(html: &str) -> CaseDetails {
    let document = Html::parse_document(html);
    let mut details = CaseDetails::unknown();

    for region in DETAIL_REGIONS {
        let Ok(selector) = Selector::parse(region) else {
            continue;
        };
        for element in document.select(&selector) {
            let text: String = element.text().collect();
            if details.reference_missing()
                && let Some(captures) = REFERENCE_LINE_RE.captures(&text)
                && let Some(value) = captures.get(1)
            {
                details.reference = value.as_str().trim().to_string();
            }
            if details.address.is_empty()
                && let Some(captures) = ADDRESS_LINE_RE.captures(&text)
                && let Some(value) = captures.get(1)
            {
                details.address = value.as_str().trim().to_string();
            }
        }
    }

    details
}

/// Reads the summary label/value table, matching row labels case-insensitively.
fn apply_summary_rows(html: &str, details: &mut CaseDetails) {
    let document = Html::parse_document(html);
    for row in document.select(&SUMMARY_ROW_SELECTOR) {
        let Some(th) = row.select(&TH_SELECTOR).next() else {
            continue;
        };
        let Some(td) = row.select(&TD_SELECTOR).next() else {
            continue;
        };
        let label: String = th.text().collect::<String>().trim().to_lowercase();
        let value = td.text().collect::<String>().trim().to_string();
        match label.as_str() {
            "reference" => details.reference = value,
            "address" => details.address = value,
            _ => {}
        }
    }
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, reqwest::Error> {
    client.get(url).send().await?.text().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_detail_regions_labeled_text() {
        let html = r#"
            <div class="description">
              Reference: 12/00453/FUL
              Address: 1 High Street, Townsville
            </div>"#;
        let details = scan_detail_regions(html);
        assert_eq!(details.reference, "12/00453/FUL");
        assert_eq!(details.address, "1 High Street, Townsville");
    }

    #[test]
    fn test_scan_detail_regions_case_insensitive_labels() {
        let html = r#"<div class="application_details">REFERENCE : A/1<br>ADDRESS : Somewhere</div>"#;
        let details = scan_detail_regions(html);
        assert_eq!(details.reference, "A/1");
    }

    #[test]
    fn test_scan_detail_regions_first_match_wins_per_field() {
        let html = r#"
            <div class="description">Reference: FIRST</div>
            <table id="simpleDetailsTable"><tr><td>Reference: SECOND</td></tr></table>"#;
        let details = scan_detail_regions(html);
        assert_eq!(details.reference, "FIRST");
    }

    #[test]
    fn test_scan_detail_regions_nothing_found_keeps_sentinel() {
        let details = scan_detail_regions("<p>no labels here</p>");
        assert_eq!(details.reference, UNKNOWN_REFERENCE);
        assert!(details.address.is_empty());
    }

    #[test]
    fn test_apply_summary_rows_matches_labels_case_insensitively() {
        let html = r#"
            <table id="simpleDetailsTable">
              <tr><th>Reference</th><td>22/1234/HOU</td></tr>
              <tr><th>ADDRESS</th><td>9 Mill Lane</td></tr>
              <tr><th>Status</th><td>Decided</td></tr>
            </table>"#;
        let mut details = CaseDetails::unknown();
        apply_summary_rows(html, &mut details);
        assert_eq!(details.reference, "22/1234/HOU");
        assert_eq!(details.address, "9 Mill Lane");
    }

    #[test]
    fn test_folder_name_joins_and_sanitizes() {
        let details = CaseDetails {
            reference: "12/00453/FUL".to_string(),
            address: "1 High Street".to_string(),
        };
        assert_eq!(details.folder_name(), "12_00453_FUL 1 High Street");
    }

    #[test]
    fn test_folder_name_empty_address_trims() {
        let details = CaseDetails {
            reference: "4211".to_string(),
            address: String::new(),
        };
        assert_eq!(details.folder_name(), "4211");
    }
}
