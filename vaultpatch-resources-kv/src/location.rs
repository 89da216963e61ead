use std::{fmt, str::FromStr};

/// A secret in Vault: the mount of a KV v2 engine and the path of the secret
/// within it. Each location holds exactly one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub mount: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationParseError {
    #[error("Location must be in the format 'mount/path' (e.g., 'app_envs/my-service/test'), got '{0}'")]
    MissingSeparator(String),
    #[error("Both mount and path must be non-empty. Format: 'mount/path', got '{0}'")]
    EmptyComponent(String),
}

impl Location {
    pub fn new(mount: impl Into<String>, path: impl Into<String>) -> Self {
        Location {
            mount: mount.into(),
            path: path.into(),
        }
    }

    /// The KV v2 data endpoint for this location.
    pub fn data_url(&self, address: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            address.trim_end_matches('/'),
            self.mount,
            self.path
        )
    }
}

/// The mount is everything before the first `/`; the path may contain more
/// slashes.
impl FromStr for Location {
    type Err = LocationParseError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let (mount, path) = id
            .split_once('/')
            .ok_or_else(|| LocationParseError::MissingSeparator(id.to_string()))?;
        if mount.is_empty() || path.is_empty() {
            return Err(LocationParseError::EmptyComponent(id.to_string()));
        }
        Ok(Location::new(mount, path))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mount, self.path)
    }
}
