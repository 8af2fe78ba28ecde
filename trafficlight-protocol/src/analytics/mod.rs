mod record;

pub use record::{AnalyticsRecord, HttpSnapshot, RouterMeta};
