//! ClamAV scanning backends.
//!
//! Two strategies share one contract:
//!
//! - [`ClamScanScanner`] runs `clamscan` directly, loading definitions from a
//!   local directory on every invocation.
//! - [`ClamdScanScanner`] runs `clamdscan`, which hands the directory to a
//!   running `clamd` daemon that already has definitions loaded.
//!
//! Both report through the `--stdout` text format parsed in
//! [`crate::backends::output`].

use crate::backends::{output, process};
use crate::core::{ArcScanner, ScanError, Scanner};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// ClamAV scanner configuration.
#[derive(Debug, Clone)]
pub struct ClamAvConfig {
    /// Use the daemon client instead of the standalone scanner.
    pub use_daemon: bool,

    /// Path or name of the `clamscan` binary.
    pub clamscan_path: String,

    /// Path or name of the `clamdscan` binary.
    pub clamdscan_path: String,

    /// Definitions directory passed to `clamscan --database`.
    pub definitions_dir: Option<PathBuf>,

    /// `clamd.conf` passed to `clamdscan --config-file`.
    pub daemon_config: Option<PathBuf>,

    /// Scan timeout.
    pub scan_timeout: Duration,
}

impl Default for ClamAvConfig {
    fn default() -> Self {
        Self {
            use_daemon: false,
            clamscan_path: "clamscan".to_string(),
            clamdscan_path: "clamdscan".to_string(),
            definitions_dir: None,
            daemon_config: None,
            scan_timeout: Duration::from_secs(600),
        }
    }
}

impl ClamAvConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the daemon client strategy.
    pub fn with_daemon(mut self, use_daemon: bool) -> Self {
        self.use_daemon = use_daemon;
        self
    }

    /// Sets the `clamscan` binary.
    pub fn with_clamscan_path(mut self, path: impl Into<String>) -> Self {
        self.clamscan_path = path.into();
        self
    }

    /// Sets the `clamdscan` binary.
    pub fn with_clamdscan_path(mut self, path: impl Into<String>) -> Self {
        self.clamdscan_path = path.into();
        self
    }

    /// Sets the definitions directory.
    pub fn with_definitions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.definitions_dir = Some(dir.into());
        self
    }

    /// Sets the daemon configuration file.
    pub fn with_daemon_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.daemon_config = Some(path.into());
        self
    }

    /// Sets the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Builds the scanner this configuration selects.
    pub fn build(&self) -> ArcScanner {
        if self.use_daemon {
            Arc::new(ClamdScanScanner::new(self.clone()))
        } else {
            Arc::new(ClamScanScanner::new(self.clone()))
        }
    }
}

/// Standalone `clamscan` invocation.
#[derive(Debug, Clone)]
pub struct ClamScanScanner {
    config: ClamAvConfig,
}

impl ClamScanScanner {
    /// Creates a new scanner.
    pub fn new(config: ClamAvConfig) -> Self {
        Self { config }
    }

    fn args(&self, dir: &Path) -> Vec<String> {
        let mut args = vec!["--stdout".to_string(), "-r".to_string()];
        if let Some(defs) = &self.config.definitions_dir {
            args.push(format!("--database={}", defs.display()));
        }
        args.push(dir.display().to_string());
        args
    }
}

#[async_trait]
impl Scanner for ClamScanScanner {
    fn name(&self) -> &str {
        "clamscan"
    }

    async fn scan(&self, dir: &Path) -> Result<Vec<String>, ScanError> {
        let program = &self.config.clamscan_path;
        let start = std::time::Instant::now();
        let out = process::run(program, self.args(dir), self.config.scan_timeout).await?;
        let infected = output::interpret(program, &out)?;

        tracing::info!(
            engine = self.name(),
            dir = %dir.display(),
            infected = infected.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Directory scan completed"
        );
        Ok(infected)
    }
}

/// `clamdscan` client invocation against a running daemon.
#[derive(Debug, Clone)]
pub struct ClamdScanScanner {
    config: ClamAvConfig,
}

impl ClamdScanScanner {
    /// Creates a new scanner.
    pub fn new(config: ClamAvConfig) -> Self {
        Self { config }
    }

    fn args(&self, dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--stdout".to_string(),
            "--fdpass".to_string(),
            "--multiscan".to_string(),
        ];
        if let Some(conf) = &self.config.daemon_config {
            args.push(format!("--config-file={}", conf.display()));
        }
        args.push(dir.display().to_string());
        args
    }
}

#[async_trait]
impl Scanner for ClamdScanScanner {
    fn name(&self) -> &str {
        "clamdscan"
    }

    async fn scan(&self, dir: &Path) -> Result<Vec<String>, ScanError> {
        let program = &self.config.clamdscan_path;
        let start = std::time::Instant::now();
        let out = process::run(program, self.args(dir), self.config.scan_timeout).await?;
        let infected = output::interpret(program, &out)?;

        tracing::info!(
            engine = self.name(),
            dir = %dir.display(),
            infected = infected.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Directory scan completed"
        );
        Ok(infected)
    }
}
