use crate::config::Config;
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Global flags shared across every subcommand.
//
//   -c / --config      Path to a config.toml file
//   --settings-dir     State directory override
//   --no-color         Disable coloured terminal output
//   -v / --verbose     Debug-level diagnostics
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "OUTREACH_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Settings directory (default: ~/.outreach-pilot)
    #[arg(
        long,
        value_name = "DIR",
        env = "OUTREACH_SETTINGS_DIR",
        global = true
    )]
    pub settings_dir: Option<PathBuf>,

    /// Disable coloured terminal output
    #[arg(long = "no-color", action = ArgAction::SetTrue, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    /// Debug-level diagnostics
    #[arg(short, long, action = ArgAction::SetTrue, global = true)]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(config) = &self.config {
            return Some(config.clone());
        }
        self.settings_dir
            .as_ref()
            .map(|dir| dir.join("config.toml"))
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(settings_dir) = &self.settings_dir {
            config.settings_dir = settings_dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_wins_over_settings_dir() {
        let args = CommonArgs {
            config: Some(PathBuf::from("/tmp/a.toml")),
            settings_dir: Some(PathBuf::from("/srv/outreach")),
            ..Default::default()
        };
        assert_eq!(args.config_path(), Some(PathBuf::from("/tmp/a.toml")));

        let args = CommonArgs {
            settings_dir: Some(PathBuf::from("/srv/outreach")),
            ..Default::default()
        };
        assert_eq!(
            args.config_path(),
            Some(PathBuf::from("/srv/outreach/config.toml"))
        );

        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.settings_dir, PathBuf::from("/srv/outreach"));
        assert_eq!(
            config.store_path(),
            PathBuf::from("/srv/outreach/state.db")
        );
    }
}
