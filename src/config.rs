// ⚙️ Tracker Configuration
//
// Resolution order (last wins): built-in defaults → environment (.env is loaded
// by the binaries) → CLI flags.
//
// | Variable                     | Default          |
// |------------------------------|------------------|
// | `STREAKS_DATA_DIR`           | `data`           |
// | `STREAKS_HANDS_THRESHOLD`    | `100`            |
// | `DEFAULT_HANDS_THRESHOLD`    | (legacy alias)   |
// | `STREAKS_REFERRAL_MILESTONE` | `250`            |
// | `STREAKS_BACKUP_RETENTION`   | `30`             |

use crate::error::{TrackerError, TrackerResult};
use crate::reconciler::{default_wheel_milestones, DEFAULT_HANDS_THRESHOLD};
use crate::referrals::DEFAULT_REFERRAL_MILESTONE;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_DATA_DIR: &str = "STREAKS_DATA_DIR";
pub const ENV_HANDS_THRESHOLD: &str = "STREAKS_HANDS_THRESHOLD";
pub const ENV_LEGACY_HANDS_THRESHOLD: &str = "DEFAULT_HANDS_THRESHOLD";
pub const ENV_REFERRAL_MILESTONE: &str = "STREAKS_REFERRAL_MILESTONE";
pub const ENV_BACKUP_RETENTION: &str = "STREAKS_BACKUP_RETENTION";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const MASTER_FILE_NAME: &str = "master_streak.csv";
pub const REFERRALS_FILE_NAME: &str = "referrals.csv";
pub const AUDIT_DB_NAME: &str = "audit.db";
pub const DEFAULT_BACKUP_RETENTION: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct TrackerConfig {
    /// Holds the lock file; default parent of every other path
    pub data_dir: PathBuf,
    pub master_file: PathBuf,
    pub referrals_file: PathBuf,
    pub backup_dir: PathBuf,
    pub audit_db: PathBuf,

    /// Hands needed for a day to count
    pub threshold: u64,

    /// Cumulative hands a referred player needs for the referrer's bonus
    pub milestone: u64,

    pub wheel_milestones: Vec<u32>,

    /// Backups kept per table after each save
    pub backup_retention: usize,
}

impl TrackerConfig {
    /// Default layout rooted at `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        TrackerConfig {
            master_file: data_dir.join(MASTER_FILE_NAME),
            referrals_file: data_dir.join(REFERRALS_FILE_NAME),
            backup_dir: data_dir.join("backups"),
            audit_db: data_dir.join(AUDIT_DB_NAME),
            data_dir,
            threshold: DEFAULT_HANDS_THRESHOLD,
            milestone: DEFAULT_REFERRAL_MILESTONE,
            wheel_milestones: default_wheel_milestones(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> TrackerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup` (tests pass a map instead of the env).
    pub fn from_lookup<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut config = Self::in_dir(data_dir.trim());

        if let Some(raw) = get(ENV_HANDS_THRESHOLD).or_else(|| get(ENV_LEGACY_HANDS_THRESHOLD)) {
            config.threshold = parse_var(ENV_HANDS_THRESHOLD, &raw)?;
        }
        if let Some(raw) = get(ENV_REFERRAL_MILESTONE) {
            config.milestone = parse_var(ENV_REFERRAL_MILESTONE, &raw)?;
        }
        if let Some(raw) = get(ENV_BACKUP_RETENTION) {
            config.backup_retention = parse_var(ENV_BACKUP_RETENTION, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_master_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.master_file = path.into();
        self
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if self.milestone == 0 {
            return Err(TrackerError::InvalidConfig(
                "referral milestone must be at least 1".to_string(),
            ));
        }
        if self.backup_retention == 0 {
            return Err(TrackerError::InvalidConfig(
                "backup retention must keep at least one backup".to_string(),
            ));
        }
        if self.master_file == self.referrals_file {
            return Err(TrackerError::InvalidConfig(format!(
                "master and referrals tables share a path: {}",
                self.master_file.display()
            )));
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::in_dir(DEFAULT_DATA_DIR)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> TrackerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| TrackerError::InvalidConfig(format!("{} must be a whole number, got '{}'", key, raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.threshold, 100);
        assert_eq!(config.milestone, 250);
        assert_eq!(config.backup_retention, 30);
        assert_eq!(config.master_file, PathBuf::from("data/master_streak.csv"));
        assert_eq!(config.backup_dir, PathBuf::from("data/backups"));
        assert_eq!(config.wheel_milestones.first(), Some(&7));
        assert_eq!(config.wheel_milestones.last(), Some(&70));
    }

    #[test]
    fn test_env_overrides() {
        let config = TrackerConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/srv/streaks"),
            (ENV_HANDS_THRESHOLD, "150"),
            (ENV_REFERRAL_MILESTONE, " 500 "),
        ]))
        .unwrap();

        assert_eq!(config.threshold, 150);
        assert_eq!(config.milestone, 500);
        assert_eq!(config.audit_db, PathBuf::from("/srv/streaks/audit.db"));
    }

    #[test]
    fn test_legacy_threshold_variable() {
        let config =
            TrackerConfig::from_lookup(lookup(&[(ENV_LEGACY_HANDS_THRESHOLD, "80")])).unwrap();
        assert_eq!(config.threshold, 80);

        // the namespaced variable wins
        let config = TrackerConfig::from_lookup(lookup(&[
            (ENV_LEGACY_HANDS_THRESHOLD, "80"),
            (ENV_HANDS_THRESHOLD, "120"),
        ]))
        .unwrap();
        assert_eq!(config.threshold, 120);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = TrackerConfig::from_lookup(lookup(&[(ENV_HANDS_THRESHOLD, "lots")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = TrackerConfig::from_lookup(lookup(&[(ENV_REFERRAL_MILESTONE, "0")])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));

        let err = TrackerConfig::from_lookup(lookup(&[(ENV_BACKUP_RETENTION, "-2")])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));
    }
}
