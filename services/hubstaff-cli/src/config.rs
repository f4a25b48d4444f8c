//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens never live in the TOML; they belong to the state file, which is the
//! only thing the token manager writes.

use hubstaff_auth::{DEFAULT_STATE_FILE, METADATA_CACHE_TTL};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "hubstaff.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub state: StateConfig,
    pub issuer: IssuerConfig,
    pub http: HttpConfig,
}

/// Where the token state file lives
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    pub path: PathBuf,
}

/// Issuer metadata caching
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssuerConfig {
    /// Root of the on-disk metadata cache. Absent means memory-only.
    pub cache_dir: Option<PathBuf>,
    pub metadata_ttl_secs: u64,
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from("cache")),
            metadata_ttl_secs: METADATA_CACHE_TTL.as_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// A config file location and whether the user asked for it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is only an error when the path was given explicitly;
    /// the default location falls back to built-in defaults.
    pub fn load(location: &ConfigPath) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(&location.path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.explicit => {
                Config::default()
            }
            Err(e) => {
                return Err(common::Error::Config(format!(
                    "failed to read {}: {e}",
                    location.path.display()
                )));
            }
        };

        if let Ok(path) = std::env::var("HUBSTAFF_STATE_PATH")
            && !path.is_empty()
        {
            config.state.path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.http.timeout_secs == 0 {
            return Err(common::Error::Config(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.issuer.metadata_ttl_secs == 0 {
            return Err(common::Error::Config(
                "issuer.metadata_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.state.path.as_os_str().is_empty() {
            return Err(common::Error::Config("state.path must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: p.to_path_buf(),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn explicit(path: &Path) -> ConfigPath {
        ConfigPath {
            path: path.to_path_buf(),
            explicit: true,
        }
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubstaff.toml");
        std::fs::write(
            &path,
            r#"
[state]
path = "/var/lib/hubstaff/state.json"

[issuer]
cache_dir = "/var/cache/hubstaff"
metadata_ttl_secs = 3600

[http]
timeout_secs = 10
"#,
        )
        .unwrap();

        let config = Config::load(&explicit(&path)).unwrap();
        assert_eq!(config.state.path, Path::new("/var/lib/hubstaff/state.json"));
        assert_eq!(
            config.issuer.cache_dir.as_deref(),
            Some(Path::new("/var/cache/hubstaff"))
        );
        assert_eq!(config.issuer.metadata_ttl_secs, 3600);
        assert_eq!(config.http.timeout_secs, 10);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubstaff.toml");
        std::fs::write(&path, "[http]\ntimeout_secs = 5\n").unwrap();

        let config = Config::load(&explicit(&path)).unwrap();
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.state.path, Path::new("configState.json"));
        assert_eq!(config.issuer.metadata_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.issuer.cache_dir.as_deref(), Some(Path::new("cache")));
    }

    #[test]
    fn test_missing_default_file_means_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };
        let location = ConfigPath {
            path: PathBuf::from("/nonexistent/hubstaff.toml"),
            explicit: false,
        };
        let config = Config::load(&location).unwrap();
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load(&explicit(Path::new("/nonexistent/hubstaff.toml")));
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        let result = Config::load(&explicit(&path));
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.toml");
        std::fs::write(&path, "[http]\ntimeout_sec = 5\n").unwrap();

        assert!(Config::load(&explicit(&path)).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[http]\ntimeout_secs = 0\n").unwrap();

        let err = Config::load(&explicit(&path)).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[issuer]\nmetadata_ttl_secs = 0\n").unwrap();

        let err = Config::load(&explicit(&path)).unwrap_err();
        assert!(err.to_string().contains("metadata_ttl_secs"), "got: {err}");
    }

    #[test]
    fn test_state_path_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubstaff.toml");
        std::fs::write(&path, "[state]\npath = \"from-file.json\"\n").unwrap();

        unsafe { set_env("HUBSTAFF_STATE_PATH", "/tmp/from-env.json") };
        let config = Config::load(&explicit(&path)).unwrap();
        unsafe { remove_env("HUBSTAFF_STATE_PATH") };

        assert_eq!(config.state.path, Path::new("/tmp/from-env.json"));
    }

    #[test]
    fn test_resolve_path_cli_takes_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let resolved = Config::resolve_path(Some(Path::new("/cli/path.toml")));
        unsafe { remove_env("CONFIG_PATH") };

        assert_eq!(resolved.path, Path::new("/cli/path.toml"));
        assert!(resolved.explicit);
    }

    #[test]
    fn test_resolve_path_env_fallback() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let resolved = Config::resolve_path(None);
        unsafe { remove_env("CONFIG_PATH") };

        assert_eq!(resolved.path, Path::new("/env/path.toml"));
        assert!(resolved.explicit);
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let resolved = Config::resolve_path(None);

        assert_eq!(resolved.path, Path::new(DEFAULT_CONFIG_FILE));
        assert!(!resolved.explicit);
    }
}
