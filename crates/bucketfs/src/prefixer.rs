//! Logical path <-> storage key translation

/// Prepends an optional root prefix to logical paths and strips it back off
///
/// Pure string transform; never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPrefixer {
    /// Either empty or ending in exactly one `/`, never starting with one
    prefix: String,
}

impl PathPrefixer {
    pub fn new(prefix: &str) -> Self {
        let trimmed = normalize(prefix);
        let prefix = if trimmed.is_empty() {
            trimmed
        } else {
            format!("{}/", trimmed)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key for a file path
    pub fn prefix_path(&self, path: &str) -> String {
        format!("{}{}", self.prefix, normalize(path))
    }

    /// Storage key for a directory path, always ending in `/`
    ///
    /// The bucket root without a prefix stays the empty key.
    pub fn prefix_directory_path(&self, path: &str) -> String {
        let path = normalize(path);
        if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}{}/", self.prefix, path)
        }
    }

    /// Logical path for a storage key
    ///
    /// A trailing `/` on the key is kept, so callers can still tell
    /// directory markers apart from files.
    pub fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }
}

/// Canonical form of a logical path: no leading or trailing `/`
///
/// Interior segments are kept as is, so a key such as `logs//x.txt` maps
/// back to a path that reaches the same key.
pub fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}
