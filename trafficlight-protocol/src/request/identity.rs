use sha2::{Digest, Sha256};

/// Stable identity for a client: lowercase hex SHA-256 of `ip + user_agent`.
///
/// Missing parts contribute the empty string, so two anonymous clients share
/// the same identity.
pub fn client_identity(client_ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_ip.unwrap_or_default().as_bytes());
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}
