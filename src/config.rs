//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione caricata all'avvio del processo.
//!
//! ## Responsabilità:
//! - Definisce `AppConfig` con le sezioni `security`, `logging`, `scanner`, `tools`, `processing`
//! - Carica la configurazione da file JSON e la valida
//! - Costruisce `SecurityConfig`, l'oggetto immutabile passato a gatekeeper e classifier
//!
//! ## Sezioni:
//! - `security.base_directory`: root entro cui ogni accesso è confinato (supporta `~`)
//! - `security.allowed_mime_types`: prefissi MIME ammessi (es. "image/", "video/")
//! - `security.allowed_extensions`: estensioni ammesse (lowercase, senza punto)
//! - `security.max_file_size_mb`: limite dimensione (0 = illimitato)
//! - `logging.level`: livello di log ("error", "warn", "info", "debug", "trace")
//! - `scanner`: backend antimalware e policy per scanner non raggiungibile (obbligatori)
//! - `tools`: path di ffmpeg/ffprobe e timeout di encode
//! - `processing.workers`: dimensione del worker pool (default: core disponibili)
//!
//! ## Nessuno stato globale:
//! La configurazione viene caricata una volta e poi passata esplicitamente
//! (via `Arc<SecurityConfig>`) ai componenti che ne hanno bisogno.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = AppConfig::from_file(&path).await?;
//! let security = Arc::new(SecurityConfig::from_settings(&config.security)?);
//! ```

use crate::error::CompressError;
use crate::security::scanner::UnavailablePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub security: SecuritySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Required: the scanner choice is never implied
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
}

/// Raw `security` section, as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub base_directory: String,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub max_file_size_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// Which malware scanner to wire in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ScannerSettings {
    /// Scanning switched off on purpose; every file is reported clean
    Disabled,
    /// clamd reachable over TCP or a unix socket
    Clamav {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        socket_path: Option<PathBuf>,
        on_unavailable: UnavailablePolicy,
        #[serde(default = "default_scan_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_scan_timeout_secs() -> u64 {
    30
}

/// External video toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Upper bound for a single video encode
    pub encode_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encode_timeout_secs: 900,
        }
    }
}

impl ToolSettings {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Number of parallel workers (None = available CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ProcessingSettings {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// Worker count matching the host's available parallelism
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AppConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let security = &self.security;

        if security.base_directory.trim().is_empty() {
            return Err(anyhow::anyhow!("security.base_directory must not be empty"));
        }

        if !security.max_file_size_mb.is_finite() || security.max_file_size_mb < 0.0 {
            return Err(anyhow::anyhow!("security.max_file_size_mb must be a non-negative number"));
        }

        if security.allowed_mime_types.is_empty() {
            return Err(anyhow::anyhow!("security.allowed_mime_types must list at least one prefix"));
        }

        if security.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("security.allowed_extensions must list at least one extension"));
        }

        if let ScannerSettings::Clamav { host, socket_path, timeout_secs, .. } = &self.scanner {
            if host.is_none() && socket_path.is_none() {
                return Err(anyhow::anyhow!("scanner.host or scanner.socket_path is required for the clamav backend"));
            }
            if *timeout_secs == 0 {
                return Err(anyhow::anyhow!("scanner.timeout_secs must be greater than 0"));
            }
        }

        if self.tools.encode_timeout_secs == 0 {
            return Err(anyhow::anyhow!("tools.encode_timeout_secs must be greater than 0"));
        }

        if self.processing.workers == Some(0) {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Immutable security policy shared by the gatekeeper and the classifier
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    root_directory: PathBuf,
    allowed_mime_prefixes: BTreeSet<String>,
    allowed_extensions: BTreeSet<String>,
    max_file_size_mb: f64,
}

impl SecurityConfig {
    /// Build the policy, canonicalizing the root so every later comparison
    /// happens between resolved paths.
    pub fn new<M, E>(
        root_directory: &Path,
        allowed_mime_prefixes: M,
        allowed_extensions: E,
        max_file_size_mb: f64,
    ) -> Result<Self, CompressError>
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        if !max_file_size_mb.is_finite() || max_file_size_mb < 0.0 {
            return Err(CompressError::Config(format!(
                "max file size must be a non-negative number, got {max_file_size_mb}"
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            CompressError::Config(format!(
                "cannot resolve base directory {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        if !root_directory.is_dir() {
            return Err(CompressError::Config(format!(
                "base directory is not a directory: {}",
                root_directory.display()
            )));
        }

        let allowed_mime_prefixes = allowed_mime_prefixes
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();

        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            root_directory,
            allowed_mime_prefixes,
            allowed_extensions,
            max_file_size_mb,
        })
    }

    /// Build from the `security` section, expanding a leading `~`
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, CompressError> {
        let root = expand_home(&settings.base_directory);
        Self::new(
            &root,
            &settings.allowed_mime_types,
            &settings.allowed_extensions,
            settings.max_file_size_mb,
        )
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(extension)
    }

    pub fn is_mime_allowed(&self, mime: &str) -> bool {
        let mime = mime.to_lowercase();
        self.allowed_mime_prefixes
            .iter()
            .any(|prefix| mime.starts_with(prefix.as_str()))
    }

    pub fn max_file_size_mb(&self) -> f64 {
        self.max_file_size_mb
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
