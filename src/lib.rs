//! Planning-application document retriever.
//!
//! Discovers and downloads the document set of one planning application from
//! heterogeneous portal sources: stable tabular pages and schema-unstable
//! JSON case APIs. A run is user-triggered, transient, and tolerant of
//! partial failure — individual documents drop out, the batch carries on.
//!
//! # Architecture
//!
//! - [`discovery`] - case metadata and document-id discovery (tabular pages
//!   and heuristic graph search over unknown JSON)
//! - [`resolver`] - per-document lookups turning identifiers into locations
//! - [`delivery`] - staggered delivery through capability-selected transports
//! - [`session`] - the trigger handler wiring one run end to end

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod delivery;
pub mod discovery;
pub mod http;
pub mod resolver;
pub mod session;

// Re-export commonly used types
pub use delivery::{
    Artifact, ArtifactPayload, DeliveryError, DeliveryStats, NativeTransport, Orchestrator,
    SandboxTransport, Transport, TransportCapabilities, TransportSelector, filename_from_url,
    sanitize_path_segment,
};
pub use discovery::{
    CaseDetails, DiscoveryError, DocumentRef, PageContext, extract_case_details, find_address,
    find_document_ids,
};
pub use resolver::{DocumentResolver, ResolvedArtifact, ResolverError};
pub use session::{Notify, Session, SessionConfig, TracingNotifier};
