use serde::{Deserialize, Serialize};

/// Parsed user-agent attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub name: String,
    pub category: String,
    pub os: String,
    pub os_version: String,
    pub browser_type: String,
    pub version: String,
    pub vendor: String,
}
