use std::collections::HashMap;
use std::net::IpAddr;

use trafficlight_protocol::client::GeoRecord;

use crate::error::GeoError;

/// Resolves a client address to its geolocation record.
///
/// Implementations must answer from memory without blocking.
pub trait GeoLocator: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoError>;

    /// Short backend name for health reports.
    fn describe(&self) -> &'static str;
}

/// Locator that knows no addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeoLocator;

impl GeoLocator for NullGeoLocator {
    fn lookup(&self, _ip: IpAddr) -> Result<Option<GeoRecord>, GeoError> {
        Ok(None)
    }

    fn describe(&self) -> &'static str {
        "none"
    }
}

/// Fixed in-memory table, mostly for tests and embedding callers.
#[derive(Debug, Default, Clone)]
pub struct StaticGeoLocator {
    records: HashMap<IpAddr, GeoRecord>,
}

impl StaticGeoLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, ip: IpAddr, record: GeoRecord) -> Self {
        self.records.insert(ip, record);
        self
    }

    pub fn insert(&mut self, ip: IpAddr, record: GeoRecord) {
        self.records.insert(ip, record);
    }
}

impl GeoLocator for StaticGeoLocator {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoError> {
        Ok(self.records.get(&ip).cloned())
    }

    fn describe(&self) -> &'static str {
        "static"
    }
}
