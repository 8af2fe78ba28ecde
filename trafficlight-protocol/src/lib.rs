pub mod analytics;
pub mod client;
pub mod envelope;
pub mod request;

pub mod prelude {
    pub use crate::analytics::{AnalyticsRecord, HttpSnapshot, RouterMeta};
    pub use crate::client::{GeoRecord, UserAgentInfo};
    pub use crate::envelope::{ApiEnvelope, EnvelopeStatus};
    pub use crate::request::{client_identity, RequestContext, RequestContextBuilder};
}
