use pkg_constants::{endpoints, env, network, paths, timing};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration file (YAML). Every field is optional; unset
/// fields fall through to environment variables, then built-in defaults.
///
/// Example `config.yaml`:
/// ```yaml
/// default-namespace: default
/// run-domain: run.local
/// mtls-config-path: /secrets/mtls.json
/// endpoint-refresh-secs: 10
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfigFile {
    #[serde(default, alias = "default-namespace")]
    pub default_namespace: Option<String>,
    #[serde(default, alias = "run-domain")]
    pub run_domain: Option<String>,
    #[serde(default, alias = "metadata-endpoint")]
    pub metadata_endpoint: Option<String>,
    #[serde(default, alias = "service-directory-endpoint")]
    pub service_directory_endpoint: Option<String>,
    #[serde(default, alias = "cloud-run-endpoint")]
    pub cloud_run_endpoint: Option<String>,
    #[serde(default, alias = "secret-manager-endpoint")]
    pub secret_manager_endpoint: Option<String>,
    #[serde(default, alias = "mtls-config-path")]
    pub mtls_config_path: Option<String>,
    #[serde(default, alias = "endpoint-refresh-secs")]
    pub endpoint_refresh_secs: Option<u64>,
    #[serde(default, alias = "service-url-ttl-secs")]
    pub service_url_ttl_secs: Option<u64>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "mtls-port")]
    pub mtls_port: Option<u16>,
}

/// Fully resolved configuration handed to every constructor in the
/// workspace. Nothing reads process-wide mutable defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_namespace: String,
    pub run_domain: String,
    pub metadata_endpoint: String,
    pub service_directory_endpoint: String,
    /// Fixed Cloud Run Admin base URL. `None` selects the regional endpoint.
    pub cloud_run_endpoint: Option<String>,
    pub secret_manager_endpoint: String,
    pub mtls_config_path: PathBuf,
    pub endpoint_refresh_interval: Duration,
    /// `None` keeps resolved service URLs for the process lifetime.
    pub service_url_ttl: Option<Duration>,
    pub port: u16,
    pub mtls_port: u16,
    pub service_name: Option<String>,
    pub revision: Option<String>,
    pub configuration: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_namespace: network::DEFAULT_NAMESPACE.to_string(),
            run_domain: network::DEFAULT_RUN_DOMAIN.to_string(),
            metadata_endpoint: endpoints::METADATA_ENDPOINT.to_string(),
            service_directory_endpoint: endpoints::SERVICE_DIRECTORY_ENDPOINT.to_string(),
            cloud_run_endpoint: None,
            secret_manager_endpoint: endpoints::SECRET_MANAGER_ENDPOINT.to_string(),
            mtls_config_path: PathBuf::from(paths::DEFAULT_MTLS_CONFIG),
            endpoint_refresh_interval: Duration::from_secs(timing::ENDPOINT_REFRESH_INTERVAL_SECS),
            service_url_ttl: None,
            port: network::DEFAULT_PORT,
            mtls_port: network::DEFAULT_MTLS_PORT,
            service_name: None,
            revision: None,
            configuration: None,
        }
    }
}

impl RuntimeConfig {
    /// Build from the process environment only.
    pub fn from_env() -> Self {
        Self::from_lookup(RuntimeConfigFile::default(), |key| std::env::var(key).ok())
    }

    /// Load the YAML file at `path` (missing file = defaults), then apply
    /// the process environment on top.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let file: RuntimeConfigFile = load_config_file(path)?;
        Ok(Self::from_lookup(file, |key| std::env::var(key).ok()))
    }

    /// Merge: environment > config file > defaults.
    ///
    /// Environment access goes through `lookup` so tests never have to
    /// mutate the real process environment.
    pub fn from_lookup<F>(file: RuntimeConfigFile, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let parsed = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());
        let port = |key: &str| var(key).and_then(|v| v.parse::<u16>().ok());

        Self {
            // An explicitly empty namespace is meaningful, so no filtering here.
            default_namespace: lookup(env::DEFAULT_NAMESPACE)
                .or(file.default_namespace)
                .unwrap_or(defaults.default_namespace),
            run_domain: var(env::RUN_DOMAIN)
                .or(file.run_domain)
                .unwrap_or(defaults.run_domain),
            metadata_endpoint: var(env::METADATA_ENDPOINT)
                .or(file.metadata_endpoint)
                .unwrap_or(defaults.metadata_endpoint),
            service_directory_endpoint: var(env::SERVICE_DIRECTORY_ENDPOINT)
                .or(file.service_directory_endpoint)
                .unwrap_or(defaults.service_directory_endpoint),
            cloud_run_endpoint: var(env::CLOUD_RUN_ENDPOINT).or(file.cloud_run_endpoint),
            secret_manager_endpoint: var(env::SECRET_MANAGER_ENDPOINT)
                .or(file.secret_manager_endpoint)
                .unwrap_or(defaults.secret_manager_endpoint),
            mtls_config_path: var(env::MTLS_CONFIGURATION_PATH)
                .or(file.mtls_config_path)
                .map(PathBuf::from)
                .unwrap_or(defaults.mtls_config_path),
            endpoint_refresh_interval: parsed(env::ENDPOINT_REFRESH_SECS)
                .or(file.endpoint_refresh_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.endpoint_refresh_interval),
            service_url_ttl: parsed(env::SERVICE_URL_TTL_SECS)
                .or(file.service_url_ttl_secs)
                .map(Duration::from_secs),
            port: port(env::PORT).or(file.port).unwrap_or(defaults.port),
            mtls_port: port(env::MTLS_PORT)
                .or(file.mtls_port)
                .unwrap_or(defaults.mtls_port),
            service_name: var(env::K_SERVICE),
            revision: var(env::K_REVISION),
            configuration: var(env::K_CONFIGURATION),
        }
    }
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
