use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::rotation::RotationOptions;

/// How often the repository is re-read when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);
/// Delay between finding an empty repository and running the fallback action.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(3);

const DEFAULT_REPOSITORY_PATH: &str = "images.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// JSON file holding the image collection.
    pub repository_path: PathBuf,
    /// Cadence at which the playlist is rebuilt from the repository.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Floor applied to each image's on-screen time.
    #[serde(with = "humantime_serde")]
    pub min_duration: Duration,
    /// Capacity of the scheduler -> viewer command channel.
    pub sink_queue_depth: usize,
    /// What to do when the repository holds no records at all.
    pub no_data: NoDataConfig,
    /// Visual transition between successive images.
    pub transition: TransitionConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Reads `path` when given, otherwise falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Self::from_yaml_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => Self::default(),
        };
        cfg.validated().context("invalid configuration values")
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.repository_path.as_os_str().is_empty(),
            "repository-path must not be empty"
        );
        ensure!(
            !self.poll_interval.is_zero(),
            "poll-interval must be greater than zero"
        );
        ensure!(
            !self.min_duration.is_zero(),
            "min-duration must be greater than zero"
        );
        ensure!(
            self.sink_queue_depth > 0,
            "sink-queue-depth must be greater than zero"
        );
        self.no_data
            .validate()
            .context("invalid no-data configuration")?;
        Ok(self)
    }

    pub fn rotation_options(&self) -> RotationOptions {
        RotationOptions {
            min_duration: self.min_duration,
            fallback_delay: self.no_data.fallback_delay(),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            repository_path: PathBuf::from(DEFAULT_REPOSITORY_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_duration: signage_model::MIN_DURATION,
            sink_queue_depth: 16,
            no_data: NoDataConfig::default(),
            transition: TransitionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoDataBehavior {
    /// Keep showing the "no data" notice.
    Placeholder,
    /// Show the notice, then hand over to the administrative surface.
    Fallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct NoDataConfig {
    pub behavior: NoDataBehavior,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl NoDataConfig {
    pub fn fallback_delay(&self) -> Option<Duration> {
        match self.behavior {
            NoDataBehavior::Fallback => Some(self.delay),
            NoDataBehavior::Placeholder => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.behavior == NoDataBehavior::Fallback {
            ensure!(
                !self.delay.is_zero(),
                "no-data.delay must be greater than zero when behavior is fallback"
            );
        }
        Ok(())
    }
}

impl Default for NoDataConfig {
    fn default() -> Self {
        Self {
            behavior: NoDataBehavior::Fallback,
            delay: DEFAULT_FALLBACK_DELAY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TransitionConfig {
    /// Cross-fade length; purely cosmetic and never charged to an image's duration.
    #[serde(with = "humantime_serde")]
    pub fade: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fade: Duration::from_millis(500),
        }
    }
}
