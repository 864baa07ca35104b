//! Accessor configuration, loaded from RON.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use vdesk_shell::{InteropCfg, RetryPolicy};

use crate::events::DEFAULT_EVENT_CAPACITY;

/// Errors produced while loading or validating an [`AccessorCfg`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read error at {}: {message}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// The text is not valid RON for this structure.
    #[error("config parse error{}: {message}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    Parse {
        /// Source file, when loaded from disk.
        path: Option<PathBuf>,
        /// Parser message including the location.
        message: String,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings for an accessor.
///
/// ```ron
/// (
///     call_timeout_ms: 2000,
///     reconcile_interval_ms: 1000,
///     retry: (initial_ms: 50, factor: 2, max_ms: 800, attempts: 5),
/// )
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessorCfg {
    /// Bound on each shell call.
    pub call_timeout_ms: u64,
    /// Period of the reconciliation pass; `0` disables it.
    pub reconcile_interval_ms: u64,
    /// Per-subscriber event buffer size.
    pub event_capacity: usize,
    /// Start with keep-minimized switching enabled.
    pub keep_minimized: bool,
    /// Backoff for re-acquiring shell interfaces.
    pub retry: RetryPolicy,
}

impl Default for AccessorCfg {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2000,
            reconcile_interval_ms: 1000,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            keep_minimized: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl AccessorCfg {
    /// Parse and validate RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = ron::from_str(text).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms must be positive".into()));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be positive".into()));
        }
        Ok(())
    }

    /// Bound on each shell call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Reconciliation period, or `None` when disabled.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Option<Duration> {
        if self.reconcile_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.reconcile_interval_ms))
        }
    }

    /// Settings for the interop worker.
    #[must_use]
    pub fn interop_cfg(&self) -> InteropCfg {
        InteropCfg {
            call_timeout: self.call_timeout(),
            retry: self.retry.clone(),
            keep_minimized: self.keep_minimized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        assert_eq!(AccessorCfg::from_ron("()").unwrap(), AccessorCfg::default());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let cfg = AccessorCfg::from_ron(
            "(call_timeout_ms: 250, reconcile_interval_ms: 0, retry: (attempts: 2))",
        )
        .unwrap();
        assert_eq!(cfg.call_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.reconcile_interval(), None);
        assert_eq!(cfg.retry.attempts, 2);
        assert_eq!(cfg.retry.initial_ms, RetryPolicy::default().initial_ms);
        assert_eq!(cfg.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(matches!(
            AccessorCfg::from_ron("(call_timeout_ms: 0)"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_fields_are_parse_errors() {
        assert!(matches!(
            AccessorCfg::from_ron("(poll_ms: 5)"),
            Err(ConfigError::Parse { path: None, .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = AccessorCfg::load(Path::new("/nonexistent/vdesk.ron")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vdesk.ron"), "{err}");
    }
}
