//! Settings read from the environment.
//!
//! Every value has a default except the bucket names, which are only
//! required by the commands that use them. Values that are present but do not
//! parse are rejected up front, before any work starts.

use crate::backends::{ClamAvConfig, DefinitionsUpdater};
use crate::core::ConfigError;
use crate::definitions::{DefinitionsLocation, DEFAULT_DEFINITIONS_PREFIX};
use crate::manager::{ScanManagerConfig, DEFAULT_MAX_FILE_SIZE};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default local definitions directory.
pub const DEFAULT_DEFINITIONS_DIR: &str = "/tmp/clamav/definitions";

/// Default `freshclam.conf` location.
pub const DEFAULT_FRESHCLAM_CONFIG: &str = "/etc/freshclam.conf";

/// Default scanner timeout in seconds.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 600;

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bucket holding published virus definitions (`CLAMAV_BUCKET_NAME`).
    pub definitions_bucket: Option<String>,
    /// Key prefix of the definitions (`PATH_TO_AV_DEFINITIONS`).
    pub definitions_prefix: String,
    /// Local definitions directory (`DEFINITIONS_DIR`).
    pub definitions_dir: PathBuf,
    /// Per-object scan size limit in bytes (`MAX_FILE_SIZE`).
    pub max_file_size: u64,
    /// Use `clamdscan` instead of `clamscan` (`CLAMAV_USE_DAEMON`).
    pub use_daemon: bool,
    /// `clamscan` binary (`CLAMSCAN_PATH`).
    pub clamscan_path: String,
    /// `clamdscan` binary (`CLAMDSCAN_PATH`).
    pub clamdscan_path: String,
    /// `freshclam` binary (`FRESHCLAM_PATH`).
    pub freshclam_path: String,
    /// `freshclam.conf` (`FRESHCLAM_CONFIG`).
    pub freshclam_config: PathBuf,
    /// Scanner timeout (`SCAN_TIMEOUT_SECS`).
    pub scan_timeout: Duration,
    /// Parent of scratch directories (`SCRATCH_DIR`).
    pub scratch_dir: Option<PathBuf>,
    /// Bucket audited and rescanned by scheduled jobs (`AUDIT_BUCKET_NAME`).
    pub audit_bucket: Option<String>,
    /// Custom S3 endpoint (`S3_ENDPOINT_URL`).
    pub s3_endpoint: Option<String>,
    /// Path-style S3 addressing (`S3_FORCE_PATH_STYLE`).
    pub s3_force_path_style: bool,
    /// AWS region override (`AWS_REGION`).
    pub aws_region: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            definitions_bucket: None,
            definitions_prefix: DEFAULT_DEFINITIONS_PREFIX.to_string(),
            definitions_dir: PathBuf::from(DEFAULT_DEFINITIONS_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            use_daemon: false,
            clamscan_path: "clamscan".to_string(),
            clamdscan_path: "clamdscan".to_string(),
            freshclam_path: "freshclam".to_string(),
            freshclam_config: PathBuf::from(DEFAULT_FRESHCLAM_CONFIG),
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS),
            scratch_dir: None,
            audit_bucket: None,
            s3_endpoint: None,
            s3_force_path_style: false,
            aws_region: None,
        }
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        settings.definitions_bucket = get("CLAMAV_BUCKET_NAME");
        if let Some(prefix) = get("PATH_TO_AV_DEFINITIONS") {
            settings.definitions_prefix = prefix;
        }
        if let Some(dir) = get("DEFINITIONS_DIR") {
            settings.definitions_dir = PathBuf::from(dir);
        }
        if let Some(value) = get("MAX_FILE_SIZE") {
            settings.max_file_size = parse("MAX_FILE_SIZE", value)?;
        }
        if let Some(value) = get("CLAMAV_USE_DAEMON") {
            settings.use_daemon = parse_bool("CLAMAV_USE_DAEMON", value)?;
        }
        if let Some(path) = get("CLAMSCAN_PATH") {
            settings.clamscan_path = path;
        }
        if let Some(path) = get("CLAMDSCAN_PATH") {
            settings.clamdscan_path = path;
        }
        if let Some(path) = get("FRESHCLAM_PATH") {
            settings.freshclam_path = path;
        }
        if let Some(path) = get("FRESHCLAM_CONFIG") {
            settings.freshclam_config = PathBuf::from(path);
        }
        if let Some(value) = get("SCAN_TIMEOUT_SECS") {
            let secs: u64 = parse("SCAN_TIMEOUT_SECS", value.clone())?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "SCAN_TIMEOUT_SECS",
                    value,
                    reason: "must be positive".to_string(),
                });
            }
            settings.scan_timeout = Duration::from_secs(secs);
        }
        settings.scratch_dir = get("SCRATCH_DIR").map(PathBuf::from);
        settings.audit_bucket = get("AUDIT_BUCKET_NAME");
        settings.s3_endpoint = get("S3_ENDPOINT_URL");
        if let Some(value) = get("S3_FORCE_PATH_STYLE") {
            settings.s3_force_path_style = parse_bool("S3_FORCE_PATH_STYLE", value)?;
        }
        settings.aws_region = get("AWS_REGION");

        Ok(settings)
    }

    /// Sets the audit bucket.
    pub fn with_audit_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.audit_bucket = Some(bucket.into());
        self
    }

    /// Sets the definitions bucket.
    pub fn with_definitions_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.definitions_bucket = Some(bucket.into());
        self
    }

    /// Sets the maximum scannable object size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Sets the scratch directory root.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Returns the audit bucket, failing if none is configured.
    pub fn require_audit_bucket(&self) -> Result<&str, ConfigError> {
        self.audit_bucket
            .as_deref()
            .ok_or(ConfigError::Missing { name: "AUDIT_BUCKET_NAME" })
    }

    /// Returns where definitions are published, failing if no bucket is set.
    pub fn definitions_location(&self) -> Result<DefinitionsLocation, ConfigError> {
        let bucket = self
            .definitions_bucket
            .as_deref()
            .ok_or(ConfigError::Missing { name: "CLAMAV_BUCKET_NAME" })?;
        Ok(DefinitionsLocation::new(bucket, &self.definitions_prefix))
    }

    /// Builds the scanner configuration.
    pub fn clamav_config(&self) -> ClamAvConfig {
        ClamAvConfig::new()
            .with_daemon(self.use_daemon)
            .with_clamscan_path(self.clamscan_path.clone())
            .with_clamdscan_path(self.clamdscan_path.clone())
            .with_definitions_dir(self.definitions_dir.clone())
            .with_scan_timeout(self.scan_timeout)
    }

    /// Builds the scan manager configuration.
    pub fn manager_config(&self) -> ScanManagerConfig {
        let config = ScanManagerConfig::new().with_max_file_size(self.max_file_size);
        match &self.scratch_dir {
            Some(dir) => config.with_scratch_root(dir.clone()),
            None => config,
        }
    }

    /// Builds the definitions updater.
    pub fn updater(&self) -> DefinitionsUpdater {
        DefinitionsUpdater::new(self.freshclam_path.clone(), self.freshclam_config.clone())
            .with_timeout(self.scan_timeout)
    }

    /// Builds the S3 client configuration.
    #[cfg(feature = "s3")]
    pub fn s3_config(&self) -> crate::store::S3Config {
        let mut config = crate::store::S3Config::new().with_force_path_style(self.s3_force_path_style);
        if let Some(region) = &self.aws_region {
            config = config.with_region(region.clone());
        }
        if let Some(endpoint) = &self.s3_endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        config
    }
}
