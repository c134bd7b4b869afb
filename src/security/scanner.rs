//! # Threat Scanner Module
//!
//! Hook verso uno scanner antimalware esterno.
//!
//! ## Responsabilità:
//! - Definisce il trait `ThreatScanner` (verdetto: Clean / Infected / Unavailable)
//! - `NoOpScanner`: scansione disattivata esplicitamente da configurazione
//! - `ClamAvScanner`: daemon clamd via TCP o unix socket, con timeout per file
//! - `ScanGate`: applica la policy configurata quando lo scanner non è raggiungibile
//!
//! ## Policy per scanner non disponibile:
//! - `fail_closed`: il file viene rifiutato (`ScannerUnavailable`)
//! - `fail_open`: warning e si prosegue
//!
//! Nessuna delle due è un default: la configurazione deve sceglierne una,
//! e il ramo preso viene sempre loggato.

use crate::config::ScannerSettings;
use crate::error::CompressError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of scanning one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Signature name reported by the scanner
    Infected(String),
    /// The scanner could not give an answer
    Unavailable(String),
}

impl fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "Clean"),
            Self::Infected(signature) => write!(f, "Infected: {signature}"),
            Self::Unavailable(reason) => write!(f, "Unavailable: {reason}"),
        }
    }
}

/// What to do with a file when the scanner cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    FailClosed,
    FailOpen,
}

/// Pluggable malware scanning capability
#[async_trait]
pub trait ThreatScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> ScanVerdict;

    fn name(&self) -> &'static str;
}

/// Scanner used when scanning is disabled by configuration
#[derive(Debug, Clone, Default)]
pub struct NoOpScanner;

#[async_trait]
impl ThreatScanner for NoOpScanner {
    async fn scan(&self, _path: &Path) -> ScanVerdict {
        ScanVerdict::Clean
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// How to reach clamd
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClamAvConnection {
    Tcp { host: String, port: u16 },
    Socket { path: PathBuf },
}

impl fmt::Display for ClamAvConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Socket { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// ClamAV daemon scanner. Each scan runs under a timeout; when it fires the
/// connection to clamd is dropped with the future.
#[derive(Debug, Clone)]
pub struct ClamAvScanner {
    connection: ClamAvConnection,
    timeout: Duration,
}

impl ClamAvScanner {
    pub fn new(connection: ClamAvConnection, timeout: Duration) -> Self {
        Self { connection, timeout }
    }

    async fn scan_with_clamd(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        use clamav_client::tokio::{scan_file, Tcp};
        #[cfg(unix)]
        use clamav_client::tokio::Socket;

        match &self.connection {
            ClamAvConnection::Tcp { host, port } => {
                let host_address = format!("{host}:{port}");
                let clamd = Tcp { host_address: &host_address };
                scan_file(path, clamd, None).await
            }
            #[cfg(unix)]
            ClamAvConnection::Socket { path: socket } => {
                let socket_path = socket.to_str().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "socket path is not valid UTF-8")
                })?;
                let clamd = Socket { socket_path };
                scan_file(path, clamd, None).await
            }
            #[cfg(not(unix))]
            ClamAvConnection::Socket { .. } => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix socket connections are not supported on this platform",
            )),
        }
    }

    /// Turn a raw clamd reply into a verdict
    fn interpret(response: &[u8]) -> ScanVerdict {
        match clamav_client::clean(response) {
            Ok(true) => ScanVerdict::Clean,
            Ok(false) => ScanVerdict::Infected(signature_from_response(response)),
            Err(e) => ScanVerdict::Unavailable(format!("unreadable scanner response: {e}")),
        }
    }
}

#[async_trait]
impl ThreatScanner for ClamAvScanner {
    async fn scan(&self, path: &Path) -> ScanVerdict {
        let start = Instant::now();
        debug!(path = %path.display(), clamd = %self.connection, "Starting ClamAV scan");

        let verdict = match tokio::time::timeout(self.timeout, self.scan_with_clamd(path)).await {
            Ok(Ok(response)) => Self::interpret(&response),
            Ok(Err(e)) => ScanVerdict::Unavailable(format!("ClamAV scan error: {e}")),
            Err(_) => ScanVerdict::Unavailable(format!(
                "ClamAV scan timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        debug!(
            path = %path.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            verdict = %verdict,
            "ClamAV scan finished"
        );
        verdict
    }

    fn name(&self) -> &'static str {
        "clamav"
    }
}

/// Extract the signature from a reply like `stream: Eicar-Signature FOUND\0`
fn signature_from_response(response: &[u8]) -> String {
    let text = String::from_utf8_lossy(response);
    let text = text.trim_end_matches('\0').trim();
    text.rsplit_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(text)
        .trim()
        .trim_end_matches("FOUND")
        .trim()
        .to_string()
}

/// A scanner plus the explicit policy for when it cannot answer
#[derive(Clone)]
pub struct ScanGate {
    scanner: Arc<dyn ThreatScanner>,
    on_unavailable: UnavailablePolicy,
}

impl fmt::Debug for ScanGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanGate")
            .field("scanner", &self.scanner.name())
            .field("on_unavailable", &self.on_unavailable)
            .finish()
    }
}

impl ScanGate {
    pub fn new(scanner: Arc<dyn ThreatScanner>, on_unavailable: UnavailablePolicy) -> Self {
        Self { scanner, on_unavailable }
    }

    /// Gate with scanning switched off
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoOpScanner), UnavailablePolicy::FailClosed)
    }

    /// Build the gate selected by the `scanner` config section
    pub fn from_settings(settings: &ScannerSettings) -> Result<Self, CompressError> {
        match settings {
            ScannerSettings::Disabled => {
                warn!("Malware scanning is disabled by configuration (scanner.backend = \"disabled\")");
                Ok(Self::disabled())
            }
            ScannerSettings::Clamav { host, port, socket_path, on_unavailable, timeout_secs } => {
                let connection = match (socket_path, host) {
                    (Some(path), _) => ClamAvConnection::Socket { path: path.clone() },
                    (None, Some(host)) => ClamAvConnection::Tcp {
                        host: host.clone(),
                        port: port.unwrap_or(3310),
                    },
                    (None, None) => {
                        return Err(CompressError::Config(
                            "clamav scanner needs either host or socket_path".to_string(),
                        ))
                    }
                };
                info!(
                    clamd = %connection,
                    on_unavailable = ?on_unavailable,
                    "Malware scanning enabled"
                );
                let scanner = ClamAvScanner::new(connection, Duration::from_secs(*timeout_secs));
                Ok(Self::new(Arc::new(scanner), *on_unavailable))
            }
        }
    }

    pub fn scanner_name(&self) -> &'static str {
        self.scanner.name()
    }

    pub fn on_unavailable(&self) -> UnavailablePolicy {
        self.on_unavailable
    }

    /// Scan `path` and turn the verdict into pass/deny
    pub async fn check(&self, path: &Path) -> Result<(), CompressError> {
        match self.scanner.scan(path).await {
            ScanVerdict::Clean => {
                debug!(path = %path.display(), scanner = self.scanner.name(), "File is clean");
                Ok(())
            }
            ScanVerdict::Infected(signature) => {
                error!(path = %path.display(), signature = %signature, "Threat detected");
                Err(CompressError::ThreatDetected(signature))
            }
            ScanVerdict::Unavailable(reason) => match self.on_unavailable {
                UnavailablePolicy::FailClosed => {
                    error!(path = %path.display(), reason = %reason, "Scanner unavailable, denying file (fail-closed)");
                    Err(CompressError::ScannerUnavailable(reason))
                }
                UnavailablePolicy::FailOpen => {
                    warn!(path = %path.display(), reason = %reason, "Scanner unavailable, continuing without scan (fail-open)");
                    Ok(())
                }
            },
        }
    }
}
