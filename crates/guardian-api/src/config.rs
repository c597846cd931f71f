//! Capture configuration: built-in defaults, then an optional TOML file, then
//! `CREATURE_CAPTURE_*` environment variables.

use std::path::Path;

use contracts::{CaptureConfig, MAX_GUARDIAN_SLOTS};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "CREATURE_CAPTURE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub fn load_config(path: Option<&Path>) -> Result<CaptureConfig, ConfigError> {
    layered(path, ENV_PREFIX)
}

fn layered(path: Option<&Path>, env_prefix: &str) -> Result<CaptureConfig, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(CaptureConfig::default()));
    if let Some(path) = path {
        debug!(path = %path.display(), "loading capture configuration file");
        figment = figment.merge(Toml::file(path));
    }
    let config: CaptureConfig = figment.merge(Env::prefixed(env_prefix)).extract()?;
    validate(&config)?;

    if usize::from(config.max_slots) > MAX_GUARDIAN_SLOTS || config.max_slots == 0 {
        warn!(
            max_slots = config.max_slots,
            effective = config.effective_max_slots(),
            "max_slots clamped"
        );
    }
    Ok(config)
}

fn validate(config: &CaptureConfig) -> Result<(), ConfigError> {
    if config.health_pct == 0 {
        return Err(ConfigError::Invalid {
            field: "health_pct",
            reason: "must be greater than zero".into(),
        });
    }
    if config.damage_pct == 0 {
        return Err(ConfigError::Invalid {
            field: "damage_pct",
            reason: "must be greater than zero".into(),
        });
    }
    if config.max_level_diff < 0 {
        return Err(ConfigError::Invalid {
            field: "max_level_diff",
            reason: format!("{} is negative", config.max_level_diff),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_apply_without_file_or_environment() {
        let config = layered(None, "GUARDIAN_API_TEST_NONE_").expect("defaults");
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.effective_max_slots(), 4);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "enabled = true\nallow_elite = true\nmax_level_diff = 2\nmax_slots = 2\nguardian_duration_secs = 600"
        )
        .expect("write");

        let config = layered(Some(file.path()), "GUARDIAN_API_TEST_TOML_").expect("load");
        assert!(config.allow_elite);
        assert_eq!(config.max_level_diff, 2);
        assert_eq!(config.effective_max_slots(), 2);
        assert_eq!(config.guardian_duration_ms(), 600_000);
        assert!(config.allow_rare);
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "health_pct = 120\ndamage_pct = 80").expect("write");
        std::env::set_var("GUARDIAN_API_TEST_ENV_HEALTH_PCT", "150");

        let config = layered(Some(file.path()), "GUARDIAN_API_TEST_ENV_").expect("load");
        assert_eq!(config.health_pct, 150);
        assert_eq!(config.damage_pct, 80);
    }

    #[test]
    fn zero_scaling_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "damage_pct = 0").expect("write");

        let err = layered(Some(file.path()), "GUARDIAN_API_TEST_ZERO_").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "damage_pct", .. }));
    }

    #[test]
    fn malformed_values_fail_to_extract() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "max_slots = \"many\"").expect("write");

        let err = layered(Some(file.path()), "GUARDIAN_API_TEST_BAD_").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
