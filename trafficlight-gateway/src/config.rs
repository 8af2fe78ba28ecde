use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use trafficlight_core::config::{parse_env, parse_flag, read_optional};
use trafficlight_core::errors::ConfigError;

use crate::proxy::DEFAULT_MAX_BODY_BYTES;

/// Gateway settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub router_dir: PathBuf,
    /// Target of `$PWD`, `$CWD` and `$ROOT` in output file paths.
    pub root_dir: PathBuf,
    pub geoip_db: PathBuf,
    pub ip_header: String,
    pub allow_insufficient_ip: bool,
    pub proxy_timeout: Duration,
    /// Largest upstream body PROXYPASS will relay.
    pub proxy_max_body: usize,
    pub action_timeout: Duration,
    pub analytics: AnalyticsConfig,
    pub tls: Option<TlsConfig>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_address =
            read_optional("TRAFFICLIGHT_BIND")?.unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let router_dir = read_optional("TRAFFICLIGHT_ROUTER_DIR")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./router"));
        let root_dir = match read_optional("TRAFFICLIGHT_ROOT_DIR")? {
            Some(dir) => PathBuf::from(dir),
            None => current_dir()?,
        };
        let geoip_db = read_optional("TRAFFICLIGHT_GEOIP_DB")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./country_asn.mmdb"));
        let ip_header = read_optional("TRAFFICLIGHT_IP_HEADER")?
            .map(|header| header.to_ascii_lowercase())
            .unwrap_or_else(|| "x-real-ip".to_string());
        let allow_insufficient_ip = parse_flag("TRAFFICLIGHT_ALLOW_INSUFFICIENT_IP", false)?;
        let proxy_timeout_ms = parse_env::<u64>("TRAFFICLIGHT_PROXY_TIMEOUT_MS", 10_000)?;
        let proxy_max_body =
            parse_env::<usize>("TRAFFICLIGHT_PROXY_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;
        let action_timeout_ms = parse_env::<u64>("TRAFFICLIGHT_ACTION_TIMEOUT_MS", 10_000)?;

        Ok(Self {
            bind_address,
            router_dir,
            root_dir,
            geoip_db,
            ip_header,
            allow_insufficient_ip,
            proxy_timeout: Duration::from_millis(proxy_timeout_ms.max(100)),
            proxy_max_body: proxy_max_body.max(1024),
            action_timeout: Duration::from_millis(action_timeout_ms.max(100)),
            analytics: AnalyticsConfig::from_env()?,
            tls: TlsConfig::maybe_from_env()?,
        })
    }

    /// Defaults rooted at `router_dir`, with analytics disabled. Used by tests
    /// and embedding callers.
    pub fn for_router_dir(router_dir: impl Into<PathBuf>) -> Self {
        let router_dir = router_dir.into();
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            root_dir: router_dir.clone(),
            router_dir,
            geoip_db: PathBuf::from("./country_asn.mmdb"),
            ip_header: "x-real-ip".to_string(),
            allow_insufficient_ip: false,
            proxy_timeout: Duration::from_secs(10),
            proxy_max_body: DEFAULT_MAX_BODY_BYTES,
            action_timeout: Duration::from_secs(10),
            analytics: AnalyticsConfig::default(),
            tls: None,
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn analytics(&self) -> &AnalyticsConfig {
        &self.analytics
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }
}

/// Traffic recording settings.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub register_traffic: bool,
    pub mobile_tracking: bool,
    pub noindex_purge_interval: Duration,
    pub memory_capacity: usize,
    /// Postgres sink when set; memory sink otherwise.
    pub database_url: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            register_traffic: false,
            mobile_tracking: false,
            noindex_purge_interval: Duration::from_secs(86_400),
            memory_capacity: 1_000,
            database_url: None,
        }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let register_traffic = parse_flag("TRAFFICLIGHT_REGISTER_TRAFFIC", false)?;
        let mobile_tracking = parse_flag("TRAFFICLIGHT_MOBILE_TRACKING", false)?;
        let purge_secs = parse_env::<u64>("TRAFFICLIGHT_NOINDEX_PURGE_SECS", 86_400)?;
        let memory_capacity = parse_env::<usize>("TRAFFICLIGHT_MEMORY_ANALYTICS_CAPACITY", 1_000)?;
        let database_url = read_optional("DATABASE_URL")?;

        Ok(Self {
            register_traffic,
            mobile_tracking,
            noindex_purge_interval: Duration::from_secs(purge_secs.max(60)),
            memory_capacity: memory_capacity.max(10),
            database_url,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub certificate_path: String,
    pub private_key_path: String,
}

impl TlsConfig {
    fn maybe_from_env() -> Result<Option<Self>, ConfigError> {
        let cert_path = read_optional("TRAFFICLIGHT_TLS_CERT")?;
        let key_path = read_optional("TRAFFICLIGHT_TLS_KEY")?;

        match (cert_path, key_path) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                certificate_path: cert,
                private_key_path: key,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::Internal(
                "both TRAFFICLIGHT_TLS_CERT and TRAFFICLIGHT_TLS_KEY are required".into(),
            )),
        }
    }

    pub async fn load(&self) -> Result<axum_server::tls_rustls::RustlsConfig, ConfigError> {
        let cert = Path::new(&self.certificate_path);
        let key = Path::new(&self.private_key_path);

        axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(|err| ConfigError::Internal(format!("failed to load TLS certificates: {err}")))
    }
}

fn current_dir() -> Result<PathBuf, ConfigError> {
    env::current_dir()
        .map_err(|err| ConfigError::Internal(format!("cannot resolve working directory: {err}")))
}
