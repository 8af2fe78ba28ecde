use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use maxminddb::{MaxMindDBError, Reader};
use tracing::{info, warn};
use trafficlight_protocol::client::{GeoRecord, UserAgentInfo};
use trafficlight_rules::{GeoError, GeoLocator, NullGeoLocator};

/// Geolocation backed by an ipinfo-style `country_asn.mmdb` file.
pub struct MaxMindGeoLocator {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoLocator {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path.as_ref())
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        Ok(Self { reader })
    }
}

impl GeoLocator for MaxMindGeoLocator {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoError> {
        match self.reader.lookup::<GeoRecord>(ip) {
            Ok(record) => Ok(Some(record)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(err) => Err(GeoError::Lookup(err.to_string())),
        }
    }

    fn describe(&self) -> &'static str {
        "maxmind"
    }
}

/// Opens the database when present, otherwise falls back to a locator with no records.
pub fn load_geo_locator(path: &Path) -> Arc<dyn GeoLocator> {
    if !path.exists() {
        warn!(path = %path.display(), "geolocation database not found, IP tools will find no records");
        return Arc::new(NullGeoLocator);
    }

    match MaxMindGeoLocator::open(path) {
        Ok(locator) => {
            info!(path = %path.display(), "geolocation database loaded");
            Arc::new(locator)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to open geolocation database");
            Arc::new(NullGeoLocator)
        }
    }
}

/// Turns a raw `user-agent` header into structured attributes.
pub trait UserAgentParser: Send + Sync {
    fn parse(&self, raw: &str) -> Option<UserAgentInfo>;
}

/// Parser backed by the `woothee` project rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct WootheeParser;

impl UserAgentParser for WootheeParser {
    fn parse(&self, raw: &str) -> Option<UserAgentInfo> {
        let parsed = woothee::parser::Parser::new().parse(raw)?;
        Some(UserAgentInfo {
            name: parsed.name.to_string(),
            category: parsed.category.to_string(),
            os: parsed.os.to_string(),
            os_version: parsed.os_version.to_string(),
            browser_type: parsed.browser_type.to_string(),
            version: parsed.version.to_string(),
            vendor: parsed.vendor.to_string(),
        })
    }
}
