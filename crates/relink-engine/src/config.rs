use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Records requested per child table read; raised to the selection size
    /// when the selection is larger
    pub page_size: usize,
    /// Re-read the anchor's forward cell after writing
    pub verify_after_write: bool,
    /// Serialize invocations that target the same anchor record.
    /// Off by default: concurrent invocations are not coordinated.
    pub serialize_per_anchor: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            page_size: 5000,
            verify_after_write: true,
            serialize_per_anchor: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl CopyConfig {
    /// Defaults overridden by `RELINK_PAGE_SIZE`, `RELINK_VERIFY` and
    /// `RELINK_SERIALIZE_PER_ANCHOR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("RELINK_PAGE_SIZE") {
            config.page_size = match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "RELINK_PAGE_SIZE",
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("RELINK_VERIFY") {
            config.verify_after_write = parse_flag("RELINK_VERIFY", value)?;
        }
        if let Some(value) = lookup("RELINK_SERIALIZE_PER_ANCHOR") {
            config.serialize_per_anchor = parse_flag("RELINK_SERIALIZE_PER_ANCHOR", value)?;
        }

        Ok(config)
    }

    /// Page size for a read that must cover `selected` records.
    pub fn page_size_for(&self, selected: usize) -> usize {
        self.page_size.max(selected)
    }
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
