//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. The path given on the command line
//! 2. `$IMAPSCRUB_CONFIG` (environment variable)
//! 3. `~/.config/imapscrub/config.toml` (Linux/macOS)
//!    `%APPDATA%\imapscrub\config.toml` (Windows)
//!
//! The file is validated once into an immutable [`Settings`] value.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;
use crate::model::rule::Rule;

/// Shown instead of the password when settings are printed.
const MASKED_PASSWORD: &str = "**********";

/// The configuration document as written by the user.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name of the account.
    pub name: String,
    pub host: String,
    /// Defaults to 993 with SSL, 143 without.
    pub port: Option<u16>,
    pub ssl: bool,
    pub user: String,
    #[serde(serialize_with = "serialize_masked")]
    pub pass: String,
    /// Root directory for saved attachments.
    pub save_path: Option<PathBuf>,
    /// Move retired messages to the `\Trash` mailbox when one exists.
    pub use_trash: bool,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Also write the log to this file.
    pub log_file: Option<PathBuf>,
    pub rules: Vec<RuleConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("user", &self.user)
            .field("pass", &MASKED_PASSWORD)
            .field("save_path", &self.save_path)
            .field("use_trash", &self.use_trash)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .field("rules", &self.rules)
            .finish()
    }
}

/// One `[[rules]]` entry before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub mailbox: String,
    /// Minimum size in kilobytes.
    pub min_size: u64,
    /// Minimum age in days.
    pub older_than: u32,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub text: String,
    /// Comma-separated: `delete`, `save_attachments`, `remove_attachments`.
    pub actions: String,
    pub include_unread: bool,
    pub include_starred: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: None,
            ssl: true,
            user: String::new(),
            pass: String::new(),
            save_path: None,
            use_trash: false,
            log_level: "info".to_string(),
            log_file: None,
            rules: Vec::new(),
        }
    }
}

// ── Validated settings ──────────────────────────────────────────

/// Connection details for the IMAP account.
#[derive(Clone, Serialize)]
pub struct Account {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub user: String,
    #[serde(serialize_with = "serialize_masked")]
    pub pass: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("user", &self.user)
            .field("pass", &MASKED_PASSWORD)
            .finish()
    }
}

fn serialize_masked<S: Serializer>(_: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(MASKED_PASSWORD)
}

/// Everything a run needs, validated and read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub account: Account,
    pub save_path: PathBuf,
    pub use_trash: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub rules: Vec<Rule>,
}

// ── Load / validate ─────────────────────────────────────────────

impl Config {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents, path)?;
        tracing::debug!(path = %path.display(), rules = config.rules.len(), "Loaded config");
        config.validate()
    }

    /// Parse TOML `contents`; `path` only labels errors.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check credentials and rules and fill in defaults.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        if self.host.trim().is_empty() || self.user.trim().is_empty() || self.pass.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, raw)| Rule::validate(i + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let port = self.port.unwrap_or(if self.ssl { 993 } else { 143 });
        let host = self.host.trim().to_string();
        let name = if self.name.trim().is_empty() {
            host.clone()
        } else {
            self.name
        };

        Ok(Settings {
            account: Account {
                name,
                host,
                port,
                ssl: self.ssl,
                user: self.user.trim().to_string(),
                pass: self.pass,
            },
            save_path: self.save_path.unwrap_or_else(default_save_path),
            use_trash: self.use_trash,
            log_level: self.log_level,
            log_file: self.log_file,
            rules,
        })
    }
}

/// Determine the config file path: explicit argument, env var, standard dir.
pub fn config_file_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Ok(env_path) = std::env::var("IMAPSCRUB_CONFIG") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("imapscrub").join("config.toml"))
        .ok_or(ConfigError::NotFound)
}

/// Default root for saved attachments.
pub fn default_save_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imapscrub")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        Config::parse(toml_str, Path::new("test.toml")).expect("parse")
    }

    const MINIMAL: &str = r#"
host = "imap.example.com"
user = "me@example.com"
pass = "secret"

[[rules]]
mailbox = "INBOX"
older_than = 30
min_size = 1024
actions = "remove_attachments, save_attachments"
"#;

    #[test]
    fn test_defaults_applied() {
        let settings = parse(MINIMAL).validate().unwrap();
        assert_eq!(settings.account.port, 993);
        assert!(settings.account.ssl);
        assert_eq!(settings.account.name, "imap.example.com");
        assert_eq!(settings.log_level, "info");
        assert!(!settings.use_trash);
        assert_eq!(settings.rules.len(), 1);
        assert_eq!(settings.rules[0].min_size, 1024 * 1024);
        assert!(settings.rules[0].is_save_attachments());
    }

    #[test]
    fn test_plain_port_default() {
        let mut config = parse(MINIMAL);
        config.ssl = false;
        assert_eq!(config.validate().unwrap().account.port, 143);
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = parse(MINIMAL);
        config.pass.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn test_invalid_rule_aborts_load() {
        let config = parse(
            r#"
host = "h"
user = "u"
pass = "p"

[[rules]]
mailbox = "INBOX"
actions = "delete"

[[rules]]
mailbox = "Archive"
actions = "delete,remove_attachments"
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingActions { rule: 2 })
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = Config::parse("host = [", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_password_masked() {
        let settings = parse(MINIMAL).validate().unwrap();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(MASKED_PASSWORD));
        assert!(!format!("{:?}", settings.account).contains("secret"));
    }

    #[test]
    fn test_password_masked_in_raw_config() {
        let config = parse(MINIMAL);
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains(MASKED_PASSWORD));
        assert!(!serde_json::to_string(&config).unwrap().contains("secret"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = config_file_path(Some(PathBuf::from("/tmp/x.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }
}
