use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for one cleanup job.
///
/// Defaults are conservative: three dialogs may be left at once, two
/// histories deleted at once, and every platform call is spaced out both
/// globally and per peer.
#[derive(Clone, Debug)]
pub struct CleanupConfig {
    // Per-category concurrency ceilings
    pub leave_concurrency: usize,
    pub delete_history_concurrency: usize,
    pub delete_contacts_concurrency: usize,

    // Pacing
    pub action_spacing: Duration,
    pub action_jitter: Duration,
    pub min_peer_interval: Duration,

    // Behavior
    pub revoke_by_default: bool,
    pub dry_run: bool,

    // Retry
    pub max_attempts: u32,
    pub network_backoff: Duration,

    // Report artifacts
    pub report_dir: PathBuf,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            leave_concurrency: 3,
            delete_history_concurrency: 2,
            delete_contacts_concurrency: 3,
            action_spacing: Duration::from_millis(300),
            action_jitter: Duration::from_millis(150),
            min_peer_interval: Duration::from_millis(1500),
            revoke_by_default: true,
            dry_run: false,
            max_attempts: 3,
            network_backoff: Duration::from_secs(2),
            report_dir: PathBuf::from("./results/cleanup_reports"),
        }
    }
}

impl CleanupConfig {
    /// Load configuration from the environment (with `.env` support),
    /// falling back to defaults for anything unset.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let defaults = Self::default();

        let cfg = Self {
            leave_concurrency: env_usize("LEAVE_CONCURRENCY").unwrap_or(defaults.leave_concurrency),
            delete_history_concurrency: env_usize("DELETE_HISTORY_CONCURRENCY")
                .unwrap_or(defaults.delete_history_concurrency),
            delete_contacts_concurrency: env_usize("DELETE_CONTACTS_CONCURRENCY")
                .unwrap_or(defaults.delete_contacts_concurrency),
            action_spacing: env_secs("ACTION_SPACING_SECONDS").unwrap_or(defaults.action_spacing),
            action_jitter: defaults.action_jitter,
            min_peer_interval: env_secs("MIN_PEER_INTERVAL_SECONDS")
                .unwrap_or(defaults.min_peer_interval),
            revoke_by_default: env_bool("REVOKE_BY_DEFAULT").unwrap_or(defaults.revoke_by_default),
            dry_run: env_bool("DRY_RUN").unwrap_or(false),
            max_attempts: env_u32("MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            network_backoff: env_secs("NETWORK_BACKOFF_SECONDS")
                .unwrap_or(defaults.network_backoff),
            report_dir: env_path("REPORT_DIR").unwrap_or(defaults.report_dir),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.leave_concurrency == 0
            || self.delete_history_concurrency == 0
            || self.delete_contacts_concurrency == 0
        {
            return Err(Error::Config(
                "concurrency ceilings must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_str(key)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CleanupConfig::default();
        assert_eq!(cfg.leave_concurrency, 3);
        assert_eq!(cfg.delete_history_concurrency, 2);
        assert_eq!(cfg.delete_contacts_concurrency, 3);
        assert_eq!(cfg.action_spacing, Duration::from_millis(300));
        assert_eq!(cfg.min_peer_interval, Duration::from_millis(1500));
        assert!(cfg.revoke_by_default);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.max_attempts, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = CleanupConfig {
            delete_history_concurrency: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let cfg = CleanupConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
