use serde::{Deserialize, Serialize};
use std::fmt;

/// Информация о хосте
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostHint {
    pub platform: String,
    pub hostname: String,
}

impl HostHint {
    pub fn new(platform: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for HostHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.platform)
    }
}
