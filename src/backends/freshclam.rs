//! Virus definitions updater (`freshclam`).

use crate::backends::process;
use crate::core::{DefinitionsSource, ScanError};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runs `freshclam` to download current definitions into a directory.
#[derive(Debug, Clone)]
pub struct DefinitionsUpdater {
    program: String,
    config_file: PathBuf,
    timeout: Duration,
}

impl DefinitionsUpdater {
    /// Creates an updater using `program` and the given `freshclam.conf`.
    pub fn new(program: impl Into<String>, config_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_file: config_file.into(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Sets the update timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, target_dir: &Path) -> Vec<String> {
        vec![
            format!("--config-file={}", self.config_file.display()),
            format!("--datadir={}", target_dir.display()),
        ]
    }
}

#[async_trait]
impl DefinitionsSource for DefinitionsUpdater {
    /// Fetches definitions into `target_dir`. Any non-zero exit is an error.
    async fn fetch_definitions(&self, target_dir: &Path) -> Result<(), ScanError> {
        tokio::fs::create_dir_all(target_dir).await?;
        let out = process::run(&self.program, self.args(target_dir), self.timeout).await?;
        if out.exit_code != Some(0) {
            return Err(ScanError::DefinitionsFailed {
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        tracing::info!(target_dir = %target_dir.display(), "Definitions fetched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let updater = DefinitionsUpdater::new("freshclam", "/opt/freshclam.conf");
        assert_eq!(
            updater.args(Path::new("/tmp/defs")),
            vec!["--config-file=/opt/freshclam.conf", "--datadir=/tmp/defs"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits 1.
        let updater = DefinitionsUpdater::new("false", "/dev/null");
        let err = updater.fetch_definitions(dir.path()).await.unwrap_err();
        assert!(matches!(err, ScanError::DefinitionsFailed { exit_code: Some(1), .. }));
    }
}
