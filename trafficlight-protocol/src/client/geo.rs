use serde::{Deserialize, Serialize};

/// Geolocation and autonomous-system details for a client address.
///
/// Field names follow the ipinfo `country_asn` database layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_domain: Option<String>,
}

impl GeoRecord {
    pub fn with_country(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            ..Self::default()
        }
    }

    pub fn with_as_domain(mut self, domain: impl Into<String>) -> Self {
        self.as_domain = Some(domain.into());
        self
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// True when the autonomous system belongs to `apple.com`.
    pub fn is_apple_network(&self) -> bool {
        self.as_domain
            .as_deref()
            .map(|domain| domain.eq_ignore_ascii_case("apple.com"))
            .unwrap_or(false)
    }
}
