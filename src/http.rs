//! Shared HTTP client construction policy.
//!
//! Centralizes networking defaults so discovery, resolution, and transports
//! stay consistent on timeout, user-agent, compression, and cookie support.
//! Ambient portal session cookies ride the client's cookie store; nothing is
//! captured or persisted beyond the run.

use std::time::Duration;

use reqwest::Client;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// User agent sent on every portal request.
pub const PORTAL_USER_AGENT: &str = concat!("plandl/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client using shared project policy.
///
/// # Errors
///
/// Returns the underlying [`reqwest::Error`] when client construction fails.
pub fn build_portal_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(PORTAL_USER_AGENT)
        .gzip(true)
        .cookie_store(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_portal_client_succeeds() {
        assert!(build_portal_client().is_ok());
    }

    #[test]
    fn test_user_agent_names_crate_and_version() {
        assert!(PORTAL_USER_AGENT.starts_with("plandl/"));
        assert!(PORTAL_USER_AGENT.len() > "plandl/".len());
    }
}
