//! Adapter configuration types

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result, Visibility};

/// Largest page a listing request may ask for
pub const MAX_LIST_PAGE_SIZE: u32 = 1000;

/// Immutable configuration of an adapter instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Bucket every operation is scoped to
    pub bucket: String,

    /// Root prefix prepended to every logical path (e.g., "tenant-a/")
    pub prefix: String,

    /// Visibility applied to directory markers
    pub directory_visibility: Visibility,

    /// Upload options applied when a call does not set them itself
    pub default_options: BTreeMap<String, Value>,

    /// Keys requested per listing page (service default when unset)
    pub list_page_size: Option<u32>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            directory_visibility: Visibility::Public,
            default_options: BTreeMap::new(),
            list_page_size: None,
        }
    }
}

impl AdapterConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_default_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_options.insert(name.into(), value.into());
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Loading adapter configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "bucket must not be empty".to_string(),
            });
        }

        if let Some(size) = self.list_page_size {
            if size == 0 || size > MAX_LIST_PAGE_SIZE {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "list_page_size must be between 1 and {}, got {}",
                        MAX_LIST_PAGE_SIZE, size
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Duration (de)serialization as integer milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert!(config.prefix.is_empty());
        assert_eq!(config.directory_visibility, Visibility::Public);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config = AdapterConfig::from_json_str(
            r#"{
                "bucket": "assets-1250000000",
                "prefix": "site/",
                "directory_visibility": "private",
                "default_options": {"StorageClass": "STANDARD_IA"},
                "list_page_size": 100
            }"#,
        )
        .unwrap();

        assert_eq!(config.bucket, "assets-1250000000");
        assert_eq!(config.prefix, "site/");
        assert_eq!(config.directory_visibility, Visibility::Private);
        assert_eq!(
            config.default_options.get("StorageClass"),
            Some(&Value::from("STANDARD_IA"))
        );
        assert_eq!(config.list_page_size, Some(100));
    }

    #[test]
    fn test_config_rejects_bad_page_size() {
        let result = AdapterConfig::from_json_str(r#"{"bucket": "b", "list_page_size": 5000}"#);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bucket": "from-file"}}"#).unwrap();

        let config = AdapterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bucket, "from-file");
    }

    #[test]
    fn test_config_serialization() {
        let config = AdapterConfig::new("b").with_default_option("CacheControl", "max-age=60");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AdapterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
