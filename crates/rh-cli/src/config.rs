//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Backend used when no `base_url` is configured.
pub const DEFAULT_BASE_URL: &str = "https://sentry.io";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the monitoring backend.
    pub base_url: String,
    /// Organization slug the releases belong to.
    pub organization: Option<String>,
    /// API auth token.
    pub auth_token: Option<String>,
    /// Environments to restrict session queries to; empty means all.
    pub environments: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("environments", &self.environments)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            auth_token: None,
            environments: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // RH_BASE_URL, RH_ORGANIZATION, RH_AUTH_TOKEN, ...
        figment = figment.merge(Env::prefixed("RH_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for rh.
///
/// On Linux: `~/.config/rh`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rh"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_config_path_ends_with_rh() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "rh");
    }

    #[test]
    fn default_config_targets_hosted_backend() {
        let config = Config::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.organization.is_none());
        assert!(config.environments.is_empty());
    }

    #[test]
    fn debug_redacts_auth_token() {
        let config = Config {
            auth_token: Some("sntrys_secret".to_string()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sntrys_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn load_from_reads_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("rh.toml");
        std::fs::write(
            &path,
            "base_url = \"https://monitoring.example.com\"\n\
             organization = \"acme\"\n\
             environments = [\"production\", \"staging\"]\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.base_url, "https://monitoring.example.com");
        assert_eq!(config.organization.as_deref(), Some("acme"));
        assert_eq!(config.environments, ["production", "staging"]);
    }
}
