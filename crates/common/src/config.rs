use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed line {line}: {text:?}")]
    Malformed { line: usize, text: String },

    #[error("Missing key {0}")]
    MissingKey(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Line-oriented `KEY=VALUE` configuration file.
///
/// Blank lines and `#` comments are skipped; whitespace around keys and
/// values is trimmed. Later occurrences of a key override earlier ones.
#[derive(Debug, Default)]
pub struct ConfigFile {
    entries: HashMap<String, String>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = HashMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Malformed {
                    line: idx + 1,
                    text: raw.to_string(),
                });
            };

            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::MissingKey(key))
    }

    /// Parse an optional key, failing only when the value is present but
    /// unparseable.
    pub fn get_parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                }),
        }
    }

    pub fn require_parse<T: FromStr>(&self, key: &'static str) -> Result<T, ConfigError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_keys_and_skips_comments() {
        let file = ConfigFile::parse(
            "# cam settings\n\
             SERVER_IP=10.0.0.7\n\
             \n\
             PORT = 9001\n",
        )
        .unwrap();

        assert_eq!(file.get("SERVER_IP"), Some("10.0.0.7"));
        assert_eq!(file.require_parse::<u16>("PORT").unwrap(), 9001);
        assert_eq!(file.get("MISSING"), None);
    }

    #[test]
    fn test_malformed_line_is_rejected_with_position() {
        let err = ConfigFile::parse("PORT=1\nnot a pair\n").unwrap_err();
        match err {
            ConfigError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("Expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let file = ConfigFile::parse("PORT=not_a_number\n").unwrap();

        assert!(matches!(
            file.require("SERVER_IP"),
            Err(ConfigError::MissingKey("SERVER_IP"))
        ));
        assert!(matches!(
            file.require_parse::<u16>("PORT"),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
        assert!(file.get_parse::<u16>("ABSENT").unwrap().is_none());
    }

    #[test]
    fn test_later_keys_override_earlier_ones() {
        let file = ConfigFile::parse("CORE=1\nCORE=2\n").unwrap();
        assert_eq!(file.require_parse::<usize>("CORE").unwrap(), 2);
    }
}
