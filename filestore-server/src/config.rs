//! Server configuration loaded from a TOML file
//!
//! ```toml
//! port = 1037
//! timeout = "30s"
//! storage_path = "binary_files"
//! create_limit = 10
//! get_limit = 10
//! list_limit = 100
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use filestore_common::{DEFAULT_CHUNK_SIZE, DEFAULT_STORAGE_PATH, MAX_CHUNK_SIZE};

use crate::admission::AdmissionLimits;

/// Suffix appended to the storage root to derive the default staging directory
const STAGING_SUFFIX: &str = ".staging";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Validated server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address to bind to
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Port to listen on
    pub port: u16,

    /// Upper bound on the duration of a single call
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// Storage root; empty means `binary_files`
    #[serde(default)]
    pub storage_path: PathBuf,

    /// Directory for in-progress uploads; defaults to `<storage_path>.staging`
    ///
    /// Must be on the same filesystem as `storage_path`, since uploads are
    /// published by hard link, and must not lie inside it.
    #[serde(default)]
    pub staging_path: Option<PathBuf>,

    /// Download chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum simultaneous uploads
    pub create_limit: usize,

    /// Maximum simultaneous downloads
    pub get_limit: usize,

    /// Maximum simultaneous listings
    pub list_limit: usize,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML, is missing a
    /// required key, or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce invariants and fill in derived defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "must be greater than 0"));
        }
        if self.create_limit == 0 {
            return Err(ConfigError::invalid("create_limit", "must be greater than 0"));
        }
        if self.get_limit == 0 {
            return Err(ConfigError::invalid("get_limit", "must be greater than 0"));
        }
        if self.list_limit == 0 {
            return Err(ConfigError::invalid("list_limit", "must be greater than 0"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::invalid(
                "chunk_size",
                format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            ));
        }

        if self.storage_path.as_os_str().is_empty() {
            self.storage_path = PathBuf::from(DEFAULT_STORAGE_PATH);
        }

        let staging = match self.staging_path.take() {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => default_staging_path(&self.storage_path)?,
        };
        if staging == self.storage_path {
            return Err(ConfigError::invalid(
                "staging_path",
                "must differ from storage_path",
            ));
        }
        if staging.starts_with(&self.storage_path) {
            return Err(ConfigError::invalid(
                "staging_path",
                "must not be inside storage_path",
            ));
        }
        self.staging_path = Some(staging);

        Ok(())
    }

    /// Socket address to listen on
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Staging directory (always set after validation)
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_path
            .clone()
            .unwrap_or_else(|| self.storage_path.with_extension("staging"))
    }

    /// Permit capacities for the admission controller
    #[must_use]
    pub fn admission_limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            create: self.create_limit,
            get: self.get_limit,
            list: self.list_limit,
        }
    }
}

/// Sibling of the storage root, so listings never see staging files
fn default_staging_path(storage_path: &Path) -> Result<PathBuf, ConfigError> {
    let Some(name) = storage_path.file_name() else {
        return Err(ConfigError::invalid(
            "staging_path",
            format!(
                "cannot derive a default from storage_path {}",
                storage_path.display()
            ),
        ));
    };
    let mut staging_name = name.to_os_string();
    staging_name.push(STAGING_SUFFIX);
    Ok(storage_path.with_file_name(staging_name))
}

/// Error returned for malformed duration strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {0:?} (expected e.g. \"500ms\", \"30s\", \"10m\", \"1h\")")]
pub struct InvalidDuration(String);

/// Parse a duration string
///
/// Format: `<number><unit>` where unit is `ms`, `s`, `m` or `h`.
///
/// # Errors
///
/// Returns `InvalidDuration` for a missing or unknown unit, a non-numeric
/// amount, or an overflowing value.
pub fn parse_duration(raw: &str) -> Result<Duration, InvalidDuration> {
    let trimmed = raw.trim();
    let invalid = || InvalidDuration(raw.to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (number_str, unit) = trimmed.split_at(split);
    if number_str.is_empty() {
        return Err(invalid());
    }
    let number: u64 = number_str.parse().map_err(|_| invalid())?;

    let millis = match unit {
        "ms" => Some(number),
        "s" => number.checked_mul(1_000),
        "m" => number.checked_mul(60_000),
        "h" => number.checked_mul(3_600_000),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
port = 1037
timeout = "30s"
create_limit = 10
get_limit = 10
list_limit = 100
"#;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("4h"), Ok(Duration::from_secs(4 * 3600)));
        assert_eq!(parse_duration(" 2s "), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.port, 1037);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.bind, default_bind());
        assert_eq!(config.storage_path, PathBuf::from("binary_files"));
        assert_eq!(config.staging_dir(), PathBuf::from("binary_files.staging"));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);

        let limits = config.admission_limits();
        assert_eq!((limits.create, limits.get, limits.list), (10, 10, 100));
    }

    #[test]
    fn test_empty_storage_path_uses_default() {
        let content = format!("{MINIMAL}storage_path = \"\"\n");
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
    }

    #[test]
    fn test_staging_is_sibling_of_storage_root() {
        let content = format!("{MINIMAL}storage_path = \"/srv/files/\"\n");
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.staging_dir(), PathBuf::from("/srv/files.staging"));
    }

    #[test]
    fn test_explicit_staging_path() {
        let content = format!(
            "{MINIMAL}storage_path = \"/srv/files\"\nstaging_path = \"/srv/tmp\"\n"
        );
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.staging_dir(), PathBuf::from("/srv/tmp"));
    }

    #[test]
    fn test_staging_equal_to_storage_rejected() {
        let content = format!(
            "{MINIMAL}storage_path = \"/srv/files\"\nstaging_path = \"/srv/files\"\n"
        );
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::Invalid {
                field: "staging_path",
                ..
            })
        ));
    }

    #[test]
    fn test_staging_inside_storage_rejected() {
        let content = format!(
            "{MINIMAL}storage_path = \"/srv/files\"\nstaging_path = \"/srv/files/tmp\"\n"
        );
        match Config::parse(&content) {
            Err(ConfigError::Invalid { field, reason }) => {
                assert_eq!(field, "staging_path");
                assert!(reason.contains("inside"), "{reason}");
            }
            other => panic!("expected invalid staging_path, got {other:?}"),
        }

        // A name that merely shares a prefix is a sibling
        let content = format!(
            "{MINIMAL}storage_path = \"/srv/files\"\nstaging_path = \"/srv/files-tmp\"\n"
        );
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.staging_dir(), PathBuf::from("/srv/files-tmp"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        for field in ["create_limit", "get_limit", "list_limit"] {
            let content = MINIMAL.replace(&format!("{field} = "), &format!("{field} = 0 #"));
            match Config::parse(&content) {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected invalid {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_zero_port_and_timeout_rejected() {
        let content = MINIMAL.replace("port = 1037", "port = 0");
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::Invalid { field: "port", .. })
        ));

        let content = MINIMAL.replace("\"30s\"", "\"0s\"");
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::Invalid {
                field: "timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_chunk_size_bounds() {
        let content = format!("{MINIMAL}chunk_size = 0\n");
        assert!(Config::parse(&content).is_err());

        let content = format!("{MINIMAL}chunk_size = {}\n", MAX_CHUNK_SIZE + 1);
        assert!(Config::parse(&content).is_err());

        let content = format!("{MINIMAL}chunk_size = {MAX_CHUNK_SIZE}\n");
        assert_eq!(Config::parse(&content).unwrap().chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_missing_required_key() {
        let content = MINIMAL.replace("get_limit = 10\n", "");
        assert!(matches!(Config::parse(&content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_timeout_is_parse_error() {
        let content = MINIMAL.replace("\"30s\"", "\"soon\"");
        assert!(matches!(Config::parse(&content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.list_limit, 100);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = Config::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
