mod context;
mod identity;

pub use context::{RequestContext, RequestContextBuilder};
pub use identity::client_identity;
