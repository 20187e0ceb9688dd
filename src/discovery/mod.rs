//! Discovery: locating case metadata and document identifiers in a source.
//!
//! Two source flavours exist. Portal pages expose a stable tabular document
//! list and a label/value details table ([`tabular`], [`reference`]);
//! undocumented case APIs return schema-unstable JSON searched heuristically
//! ([`graph`]).

mod graph;
mod reference;
mod tabular;

pub use graph::{
    ADDRESS_KEYS, DOC_CONTAINER_KEYS, DOC_ID_ALIASES, DocumentRef, find_address,
    find_document_ids,
};
pub use reference::{CaseDetails, UNKNOWN_REFERENCE, extract_case_details};
pub(crate) use reference::compile_static_regex;
pub use tabular::{DocumentRow, harvest_details_table, scan_document_table, summary_tab_href};

use scraper::Selector;
use thiserror::Error;
use url::Url;

/// A rendered portal page handed to the discovery stage: final URL plus raw
/// markup. Discovery never re-fetches the page itself, only secondary
/// endpoints it finds inside.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// The page's own URL; relative hrefs resolve against it.
    pub url: Url,
    /// Raw HTML of the rendered page.
    pub html: String,
}

impl PageContext {
    /// Creates a page context from a URL and its markup.
    #[must_use]
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }

    /// Resolves a possibly relative href against this page.
    #[must_use]
    pub fn absolutize(&self, href: &str) -> Option<String> {
        self.url.join(href).ok().map(|url| url.to_string())
    }
}

/// Errors from the discovery stage.
///
/// Discovery failures abort only the discovery path that raised them; the
/// session reports them to the user and carries on with whatever else it can
/// do.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The document table is present but its expected columns are not.
    #[error(
        "document table columns not found (view column: {download_column:?}, description column: {title_column:?})"
    )]
    ColumnsNotFound {
        /// Index of the "view" column, if it was found.
        download_column: Option<usize>,
        /// Index of the "description" column, if it was found.
        title_column: Option<usize>,
    },

    /// The page path carries no recognizable application id.
    #[error("no application id in page path: {path}")]
    CaseIdNotFound {
        /// The path that was searched.
        path: String,
    },

    /// A secondary discovery fetch failed.
    #[error("network error fetching {url}: {source}")]
    Fetch {
        /// The endpoint that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },
}

/// Compiles a CSS selector at static init; panics on an invalid pattern.
pub(crate) fn compile_static_selector(pattern: &str) -> Selector {
    Selector::parse(pattern)
        .unwrap_or_else(|e| panic!("invalid static selector '{pattern}': {e:?}"))
}
