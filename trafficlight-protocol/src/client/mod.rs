mod geo;
mod user_agent;

pub use geo::GeoRecord;
pub use user_agent::UserAgentInfo;
