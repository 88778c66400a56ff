//! Filesystem-shaped types exchanged with adapter callers

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Logical, caller-facing path (never includes the root prefix)
pub type LogicalPath = String;

/// Key as sent to the storage service (root prefix included)
pub type StorageKey = String;

/// Opaque extra metadata passed through from the storage service
pub type ExtraMetadata = BTreeMap<String, Value>;

/// Two-valued access abstraction over the service's ACLs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(Error::InvalidVisibility {
                value: other.to_string(),
            }),
        }
    }
}

/// Attributes of a file (an object whose key does not end in `/`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileAttributes {
    pub path: LogicalPath,

    /// Size in bytes
    pub file_size: Option<u64>,

    pub visibility: Option<Visibility>,

    /// Last modification time in seconds since the Unix epoch
    pub last_modified: Option<i64>,

    pub mime_type: Option<String>,

    /// Whitelisted service fields (storage class, entity tag, ...)
    #[serde(default)]
    pub extra_metadata: ExtraMetadata,
}

impl FileAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_visibility(path: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            path: path.into(),
            visibility: Some(visibility),
            ..Default::default()
        }
    }
}

/// Attributes of an emulated directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryAttributes {
    /// Logical path without the trailing slash
    pub path: LogicalPath,
}

impl DirectoryAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A single entry produced by a listing or metadata lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageAttributes {
    File(FileAttributes),
    Directory(DirectoryAttributes),
}

impl StorageAttributes {
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(file) => &file.path,
            StorageAttributes::Directory(dir) => &dir.path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StorageAttributes::Directory(_))
    }

    pub fn into_file(self) -> Option<FileAttributes> {
        match self {
            StorageAttributes::File(file) => Some(file),
            StorageAttributes::Directory(_) => None,
        }
    }
}

impl From<FileAttributes> for StorageAttributes {
    fn from(file: FileAttributes) -> Self {
        StorageAttributes::File(file)
    }
}

impl From<DirectoryAttributes> for StorageAttributes {
    fn from(dir: DirectoryAttributes) -> Self {
        StorageAttributes::Directory(dir)
    }
}

/// Per-call configuration
///
/// A key that was never set reads back as `None`; a key set to an empty
/// string reads back as `Some("")`. The two are never conflated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CallConfig {
    values: BTreeMap<String, Value>,
}

impl CallConfig {
    /// Key selecting the visibility of the written object
    pub const VISIBILITY: &'static str = "visibility";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_visibility(self, visibility: Visibility) -> Self {
        self.with(Self::VISIBILITY, visibility.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The `visibility` key, if set to a recognized value
    pub fn visibility(&self) -> Option<Visibility> {
        self.get(Self::VISIBILITY)
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
    }

    /// Returns a config where keys already present win over `defaults`
    pub fn with_defaults<I, K>(&self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut merged = self.clone();
        for (key, value) in defaults {
            merged.values.entry(key.into()).or_insert(value);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for CallConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
