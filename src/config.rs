use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::heuristics::SiteProfile;
use crate::retry::{RetryPolicy, millis};

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default settings directory, `~/.outreach-pilot`.
pub fn default_settings_dir() -> PathBuf {
    home_dir().join(".outreach-pilot")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// State directory holding the store and the default config file
    pub settings_dir: PathBuf,
    /// SQLite file (default: `<settings_dir>/state.db`)
    pub store_path: Option<PathBuf>,
    pub control_plane: ControlPlaneSettings,
    pub queue: QueueSettings,
    pub automation: AutomationSettings,
    pub site: SiteProfile,
    pub dashboard: DashboardSettings,
    pub browser: BrowserSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings_dir: default_settings_dir(),
            store_path: None,
            control_plane: ControlPlaneSettings::default(),
            queue: QueueSettings::default(),
            automation: AutomationSettings::default(),
            site: SiteProfile::default(),
            dashboard: DashboardSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneSettings {
    /// API root, e.g. `http://localhost:3001/api`
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Backoff for transient HTTP failures
    pub retry: RetryPolicy,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".into(),
            request_timeout_secs: 15,
            retry: RetryPolicy::default(),
        }
    }
}

impl ControlPlaneSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub poll_interval_secs: u64,
    /// Lower bound of the randomized pause between tasks
    pub pacing_min_secs: u64,
    /// Upper bound of the randomized pause between tasks
    pub pacing_max_secs: u64,
    /// Wait after a page load before dispatching the run
    #[serde(rename = "dispatch_settle_ms", with = "millis")]
    pub dispatch_settle: Duration,
    /// Wait before the single dispatch retry
    #[serde(rename = "send_retry_delay_ms", with = "millis")]
    pub send_retry_delay: Duration,
    /// How long a page context may take to acknowledge a dispatch
    #[serde(rename = "dispatch_ack_timeout_ms", with = "millis")]
    pub dispatch_ack_timeout: Duration,
    pub log_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            pacing_min_secs: 120,
            pacing_max_secs: 300,
            dispatch_settle: Duration::from_millis(2000),
            send_retry_delay: Duration::from_millis(3000),
            dispatch_ack_timeout: Duration::from_millis(5000),
            log_capacity: crate::store::DEFAULT_LOG_CAPACITY,
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn pacing_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.pacing_min_secs),
            Duration::from_secs(self.pacing_max_secs),
        )
    }
}

/// Step timings of one automation run. All values are milliseconds in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    #[serde(rename = "analysis_settle_ms", with = "millis")]
    pub analysis_settle: Duration,
    #[serde(rename = "scroll_settle_ms", with = "millis")]
    pub scroll_settle: Duration,
    pub locate_attempts: u32,
    #[serde(rename = "locate_interval_ms", with = "millis")]
    pub locate_interval: Duration,
    /// Pause with the control highlighted before activating it
    #[serde(rename = "highlight_delay_ms", with = "millis")]
    pub highlight_delay: Duration,
    #[serde(rename = "activation_settle_ms", with = "millis")]
    pub activation_settle: Duration,
    #[serde(rename = "dialog_timeout_ms", with = "millis")]
    pub dialog_timeout: Duration,
    #[serde(rename = "dialog_poll_ms", with = "millis")]
    pub dialog_poll: Duration,
    #[serde(rename = "dialog_settle_ms", with = "millis")]
    pub dialog_settle: Duration,
    #[serde(rename = "note_settle_ms", with = "millis")]
    pub note_settle: Duration,
    pub text_surface_attempts: u32,
    #[serde(rename = "text_surface_interval_ms", with = "millis")]
    pub text_surface_interval: Duration,
    #[serde(rename = "typing_min_ms", with = "millis")]
    pub typing_min: Duration,
    #[serde(rename = "typing_max_ms", with = "millis")]
    pub typing_max: Duration,
    #[serde(rename = "submit_delay_ms", with = "millis")]
    pub submit_delay: Duration,
    #[serde(rename = "menu_settle_ms", with = "millis")]
    pub menu_settle: Duration,
    #[serde(rename = "menu_close_ms", with = "millis")]
    pub menu_close: Duration,
    #[serde(rename = "verify_settle_ms", with = "millis")]
    pub verify_settle: Duration,
    #[serde(rename = "teardown_linger_ms", with = "millis")]
    pub teardown_linger: Duration,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        let ms = Duration::from_millis;
        Self {
            analysis_settle: ms(2000),
            scroll_settle: ms(500),
            locate_attempts: 5,
            locate_interval: ms(1500),
            highlight_delay: ms(1000),
            activation_settle: ms(2000),
            dialog_timeout: ms(10_000),
            dialog_poll: ms(300),
            dialog_settle: ms(1500),
            note_settle: ms(1500),
            text_surface_attempts: 5,
            text_surface_interval: ms(500),
            typing_min: ms(30),
            typing_max: ms(70),
            submit_delay: ms(800),
            menu_settle: ms(1000),
            menu_close: ms(300),
            verify_settle: ms(2500),
            teardown_linger: ms(2000),
        }
    }
}

impl AutomationSettings {
    /// Every wait zeroed, for tests that do not care about pacing.
    pub fn instant() -> Self {
        let zero = Duration::ZERO;
        Self {
            analysis_settle: zero,
            scroll_settle: zero,
            locate_interval: zero,
            highlight_delay: zero,
            activation_settle: zero,
            dialog_poll: Duration::from_millis(1),
            dialog_timeout: Duration::from_millis(1),
            dialog_settle: zero,
            note_settle: zero,
            text_surface_interval: zero,
            typing_min: zero,
            typing_max: zero,
            submit_delay: zero,
            menu_settle: zero,
            menu_close: zero,
            verify_settle: zero,
            teardown_linger: zero,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub enabled: bool,
    /// Loopback address the bridge listens on
    pub bind: SocketAddr,
    #[serde(rename = "ack_timeout_ms", with = "millis")]
    pub ack_timeout: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 3917)),
            ack_timeout: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome/Chromium binary (default: auto-detect)
    pub executable: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file, falling back to defaults when absent.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| default_settings_dir().join("config.toml"));

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let config_path = path.unwrap_or_else(|| self.settings_dir.join("config.toml"));

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.pacing_min_secs > self.queue.pacing_max_secs {
            return Err(Error::Config(format!(
                "queue.pacing_min_secs ({}) exceeds queue.pacing_max_secs ({})",
                self.queue.pacing_min_secs, self.queue.pacing_max_secs
            )));
        }
        if self.automation.typing_min > self.automation.typing_max {
            return Err(Error::Config(
                "automation.typing_min_ms exceeds automation.typing_max_ms".into(),
            ));
        }
        if !self.dashboard.bind.ip().is_loopback() {
            return Err(Error::Config(format!(
                "dashboard.bind must be a loopback address, got {}",
                self.dashboard.bind
            )));
        }
        url::Url::parse(&self.control_plane.base_url)
            .map_err(|e| Error::Config(format!("control_plane.base_url: {e}")))?;
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| self.settings_dir.join("state.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.queue.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.automation.dialog_timeout, Duration::from_secs(10));
        assert_eq!(config.site.header_cutoff, 600.0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[queue]
pacing_min_secs = 10
pacing_max_secs = 20

[automation]
typing_max_ms = 90

[site]
header_cutoff = 720.0
"#,
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(
            config.queue.pacing_window(),
            (Duration::from_secs(10), Duration::from_secs(20))
        );
        assert_eq!(config.automation.typing_max, Duration::from_millis(90));
        assert_eq!(config.automation.typing_min, Duration::from_millis(30));
        assert_eq!(config.site.header_cutoff, 720.0);
        assert_eq!(config.site.action_text, "connect");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            settings_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let path = config.save(None).unwrap();
        assert_eq!(Config::load(Some(path)).unwrap(), config);
    }

    #[test]
    fn inverted_pacing_window_is_rejected() {
        let mut config = Config::default();
        config.queue.pacing_min_secs = 400;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.dashboard.bind = "0.0.0.0:3917".parse().unwrap();
        assert!(config.validate().is_err());
    }
}
