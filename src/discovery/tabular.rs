//! Tabular portal page scanning: document table rows and the details table.
//!
//! The document list page carries a `#Documents` table whose columns are
//! located by header text, not position; portals reorder columns between
//! deployments. Absence of either expected column is a discovery failure
//! reported to the user, never silently ignored.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

use super::{DiscoveryError, PageContext, compile_static_selector};

static HEADER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#Documents tr:first-child th"));
static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("#Documents tr"));
static DETAILS_ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#simpleDetailsTable tr"));
static SUMMARY_TAB_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#tab_summary"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a"));
static TH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("th"));
static TD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("td"));

/// One document row discovered on a tabular page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    /// Absolute URL of the document, resolved against the page.
    pub href: String,
    /// Row title from the description column; may be empty.
    pub title: String,
}

/// Scans the `#Documents` table for document rows.
///
/// Columns are located by trimmed, case-insensitive header text: `view` for
/// the download column and `description` inside a header anchor for the title
/// column.
///
/// # Errors
///
/// Returns [`DiscoveryError::ColumnsNotFound`] when either column is missing.
/// An empty row list is a normal result, not an error.
pub fn scan_document_table(page: &PageContext) -> Result<Vec<DocumentRow>, DiscoveryError> {
    let document = Html::parse_document(&page.html);

    let mut download_column = None;
    let mut title_column = None;
    for (index, th) in document.select(&HEADER_SELECTOR).enumerate() {
        let header_text = th.text().collect::<String>().trim().to_lowercase();
        if header_text == "view" {
            download_column = Some(index);
        } else if let Some(anchor) = th.select(&ANCHOR_SELECTOR).next() {
            let link_text = anchor.text().collect::<String>().trim().to_lowercase();
            if link_text == "description" {
                title_column = Some(index);
            }
        }
    }

    let (Some(download_column), Some(title_column)) = (download_column, title_column) else {
        return Err(DiscoveryError::ColumnsNotFound {
            download_column,
            title_column,
        });
    };

    let mut rows = Vec::new();
    for row in document.select(&ROW_SELECTOR) {
        let cells: Vec<_> = row.select(&TD_SELECTOR).collect();
        // Header row has no td cells and is skipped naturally
        let Some(link_cell) = cells.get(download_column) else {
            continue;
        };
        let Some(anchor) = link_cell.select(&ANCHOR_SELECTOR).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(absolute) = page.absolutize(href) else {
            debug!(href = %href, "skipping document row with unresolvable href");
            continue;
        };
        let title = cells
            .get(title_column)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        rows.push(DocumentRow {
            href: absolute,
            title,
        });
    }

    Ok(rows)
}

/// Returns the `#tab_summary` anchor's href, when the page has one.
#[must_use]
pub fn summary_tab_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&SUMMARY_TAB_SELECTOR)
        .next()
        .and_then(|tab| tab.value().attr("href").map(ToString::to_string))
}

/// Harvests the `#simpleDetailsTable` label/value rows as ordered pairs.
///
/// Keys and values are the cells' inner HTML, trimmed but otherwise verbatim,
/// so embedded formatting survives into the summary record.
#[must_use]
pub fn harvest_details_table(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();
    for row in document.select(&DETAILS_ROW_SELECTOR) {
        let Some(th) = row.select(&TH_SELECTOR).next() else {
            continue;
        };
        let Some(td) = row.select(&TD_SELECTOR).next() else {
            continue;
        };
        entries.push((
            th.inner_html().trim().to_string(),
            td.inner_html().trim().to_string(),
        ));
    }
    entries
}
