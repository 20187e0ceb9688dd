//! Transport Selector: how artifact bytes reach the user's filesystem.
//!
//! Two mutually exclusive strategies. The native transport models the
//! privileged folder-aware downloads capability: requests are dispatched over
//! a channel to a background worker and the caller is not blocked on the
//! download itself. The sandbox transport is available everywhere: it
//! materializes the bytes in-process and writes a flat file, with no
//! subfolder support. Selection happens once per item: native when the
//! environment is capability-flagged and the channel is open, with an
//! immediate synchronous fallback to the sandbox when *dispatch* fails.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::filename::{resolve_unique_path, sanitize_path_segment};
use super::{Artifact, ArtifactPayload, DeliveryError};

/// Environment capability descriptor, resolved once at startup and injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportCapabilities {
    /// The environment exposes the privileged folder-aware downloads
    /// capability.
    pub native_downloads: bool,
}

/// A mechanism that persists one artifact's bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &'static str;

    /// Whether destination paths may carry a relative subfolder.
    fn supports_folders(&self) -> bool;

    /// Delivers one artifact. `folder` is ignored by transports without
    /// subfolder support.
    async fn send(&self, artifact: &Artifact, folder: &str) -> Result<(), DeliveryError>;
}

enum WorkerMessage {
    Save {
        payload: ArtifactPayload,
        folder: String,
        filename: String,
    },
    Flush(oneshot::Sender<()>),
}

/// Folder-aware transport backed by a background download worker.
///
/// `send` only dispatches the request; success means the worker accepted it,
/// not that the download finished. Worker-side failures are logged, never
/// surfaced (the original behavior of the privileged downloads path).
pub struct NativeTransport {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl NativeTransport {
    /// Spawns the download worker writing under `downloads_root`.
    #[must_use]
    pub fn spawn(downloads_root: PathBuf, client: Client) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, downloads_root, client));
        Self { tx }
    }

    /// True while the worker can still accept requests.
    #[must_use]
    pub fn channel_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Waits until the worker has drained every previously dispatched
    /// request. Used by shutdown paths and tests; a closed channel drains
    /// trivially.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WorkerMessage::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

impl std::fmt::Debug for NativeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTransport")
            .field("channel_open", &self.channel_open())
            .finish()
    }
}

#[async_trait]
impl Transport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports_folders(&self) -> bool {
        true
    }

    async fn send(&self, artifact: &Artifact, folder: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(WorkerMessage::Save {
                payload: artifact.payload.clone(),
                folder: folder.to_string(),
                filename: artifact.filename.clone(),
            })
            .map_err(|_| DeliveryError::Dispatch {
                message: "download worker channel is closed".to_string(),
            })
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    root: PathBuf,
    client: Client,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Save {
                payload,
                folder,
                filename,
            } => {
                let dir = if folder.is_empty() {
                    root.clone()
                } else {
                    root.join(sanitize_path_segment(&folder))
                };
                match write_payload(&client, &dir, &filename, &payload).await {
                    Ok(path) => debug!(path = %path.display(), "native download saved"),
                    Err(error) => {
                        warn!(filename = %filename, error = %error, "native download failed");
                    }
                }
            }
            WorkerMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Sandboxed same-document transport: bytes are materialized in-process and
/// written as a flat file. Cannot address subfolders.
#[derive(Debug, Clone)]
pub struct SandboxTransport {
    client: Client,
    root: PathBuf,
}

impl SandboxTransport {
    /// Creates a sandbox transport writing flat files under `root`.
    #[must_use]
    pub fn new(root: PathBuf, client: Client) -> Self {
        Self { client, root }
    }
}

#[async_trait]
impl Transport for SandboxTransport {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    fn supports_folders(&self) -> bool {
        false
    }

    async fn send(&self, artifact: &Artifact, _folder: &str) -> Result<(), DeliveryError> {
        let path = write_payload(&self.client, &self.root, &artifact.filename, &artifact.payload)
            .await?;
        debug!(path = %path.display(), "sandbox download saved");
        Ok(())
    }
}

/// Fetches (or takes inline) the payload bytes and writes them to a unique
/// path under `dir`. Collisions get a numeric suffix; nothing is overwritten.
async fn write_payload(
    client: &Client,
    dir: &Path,
    filename: &str,
    payload: &ArtifactPayload,
) -> Result<PathBuf, DeliveryError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| DeliveryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    let dest = resolve_unique_path(dir, filename);

    match payload {
        ArtifactPayload::Remote { url } => {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|source| DeliveryError::Network {
                    url: url.clone(),
                    source,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::HttpStatus {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|source| DeliveryError::Network {
                    url: url.clone(),
                    source,
                })?;
            tokio::fs::write(&dest, &bytes)
                .await
                .map_err(|source| DeliveryError::Io {
                    path: dest.clone(),
                    source,
                })?;
        }
        ArtifactPayload::Inline { content, .. } => {
            tokio::fs::write(&dest, content)
                .await
                .map_err(|source| DeliveryError::Io {
                    path: dest.clone(),
                    source,
                })?;
        }
    }

    Ok(dest)
}

/// Chooses the transport per item and owns the fallback rule.
pub struct TransportSelector {
    capabilities: TransportCapabilities,
    native: Option<NativeTransport>,
    sandbox: SandboxTransport,
}

impl TransportSelector {
    /// Builds a selector from the capability descriptor and the available
    /// transports. A native transport without the capability flag is never
    /// used.
    #[must_use]
    pub fn new(
        capabilities: TransportCapabilities,
        native: Option<NativeTransport>,
        sandbox: SandboxTransport,
    ) -> Self {
        Self {
            capabilities,
            native,
            sandbox,
        }
    }

    /// Whether the active transport choice supports relative subfolders.
    #[must_use]
    pub fn folder_aware(&self) -> bool {
        self.capabilities.native_downloads && self.native.is_some()
    }

    /// Delivers one artifact through the preferred transport.
    ///
    /// A native *dispatch* failure falls back immediately to the sandbox
    /// transport for this item; the folder segment is dropped there since
    /// true subfolder support is unavailable.
    pub async fn deliver(&self, artifact: &Artifact, folder: &str) -> Result<(), DeliveryError> {
        if self.capabilities.native_downloads
            && let Some(native) = &self.native
        {
            match native.send(artifact, folder).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(
                        filename = %artifact.filename,
                        error = %error,
                        "native dispatch failed; falling back to sandbox transport"
                    );
                }
            }
        }
        self.sandbox.send(artifact, "").await
    }

    /// Drains the native worker, when one exists.
    pub async fn quiesce(&self) {
        if let Some(native) = &self.native {
            native.flush().await;
        }
    }
}

impl std::fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSelector")
            .field("capabilities", &self.capabilities)
            .field("native", &self.native.is_some())
            .finish_non_exhaustive()
    }
}
