use infrastructure::ElasticsearchConfig;
use reqwest::Url;
use std::env;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Configuration that can be loaded from environment variables.
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or_default(key, default)
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        })
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// The bind address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = parse_env("PORT", "3000")?;
        Ok(Self { host, port })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Elasticsearch,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "elasticsearch" => Ok(StoreBackend::Elasticsearch),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!(
                "unknown backend '{}', expected 'elasticsearch' or 'memory'",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub endpoint: Url,
    pub index_name: String,
    pub request_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_on_write: bool,
    pub ensure_index: bool,
}

impl StoreConfig {
    pub fn to_elasticsearch_config(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            endpoint: self.endpoint.to_string(),
            index_name: self.index_name.clone(),
            request_timeout: self.request_timeout,
            username: self.username.clone(),
            password: self.password.clone(),
            refresh_on_write: self.refresh_on_write,
        }
    }
}

impl FromEnv for StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = parse_env("STORE_BACKEND", "elasticsearch")?;
        let endpoint = parse_env("STORE_ENDPOINT", "http://localhost:9200")?;
        let index_name = env_or_default("STORE_INDEX_NAME", "products");
        if index_name.trim().is_empty() {
            return Err(ConfigError::ParseError {
                key: "STORE_INDEX_NAME".to_string(),
                details: "index name must not be empty".to_string(),
            });
        }
        let timeout_ms: u64 = parse_env("STORE_REQUEST_TIMEOUT_MS", "5000")?;
        let username = env_optional("STORE_USERNAME");
        let password = env_optional("STORE_PASSWORD");
        if username.is_some() && password.is_none() {
            return Err(ConfigError::MissingEnvVar("STORE_PASSWORD".to_string()));
        }

        Ok(Self {
            backend,
            endpoint,
            index_name,
            request_timeout: Duration::from_millis(timeout_ms),
            username,
            password,
            refresh_on_write: parse_env("STORE_REFRESH_ON_WRITE", "true")?,
            ensure_index: parse_env("STORE_ENSURE_INDEX", "true")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON lines, anything else the default formatter.
    pub fn from_env() -> Self {
        if env_or_default("LOG_FORMAT", "pretty").eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
}

impl FromEnv for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            store: StoreConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE_VARS: [&str; 8] = [
        "STORE_BACKEND",
        "STORE_ENDPOINT",
        "STORE_INDEX_NAME",
        "STORE_REQUEST_TIMEOUT_MS",
        "STORE_USERNAME",
        "STORE_PASSWORD",
        "STORE_REFRESH_ON_WRITE",
        "STORE_ENSURE_INDEX",
    ];

    fn unset_store_vars() -> Vec<(&'static str, Option<&'static str>)> {
        STORE_VARS.iter().map(|key| (*key, None)).collect()
    }

    fn with_store_vars(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        let mut vars = unset_store_vars();
        for (key, value) in overrides {
            if let Some(entry) = vars.iter_mut().find(|(k, _)| k == key) {
                entry.1 = Some(*value);
            }
        }
        vars
    }

    #[test]
    fn server_config_defaults() {
        temp_env::with_vars([("HOST", None::<&str>), ("PORT", None::<&str>)], || {
            let config = ServerConfig::from_env().unwrap();
            assert_eq!(config.address(), "0.0.0.0:3000");
        });
    }

    #[test]
    fn server_config_invalid_port() {
        temp_env::with_var("PORT", Some("99999"), || {
            let err = ServerConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("PORT"));
        });
    }

    #[test]
    fn store_config_defaults() {
        temp_env::with_vars(unset_store_vars(), || {
            let config = StoreConfig::from_env().unwrap();
            assert_eq!(config.backend, StoreBackend::Elasticsearch);
            assert_eq!(config.endpoint.as_str(), "http://localhost:9200/");
            assert_eq!(config.index_name, "products");
            assert_eq!(config.request_timeout, Duration::from_millis(5000));
            assert!(config.username.is_none());
            assert!(config.refresh_on_write);
            assert!(config.ensure_index);
        });
    }

    #[test]
    fn store_config_custom_values() {
        let vars = with_store_vars(&[
            ("STORE_BACKEND", "Memory"),
            ("STORE_ENDPOINT", "https://search.internal:9243/es"),
            ("STORE_INDEX_NAME", "catalog"),
            ("STORE_REQUEST_TIMEOUT_MS", "250"),
            ("STORE_USERNAME", "elastic"),
            ("STORE_PASSWORD", "secret"),
            ("STORE_REFRESH_ON_WRITE", "false"),
        ]);
        temp_env::with_vars(vars, || {
            let config = StoreConfig::from_env().unwrap();
            assert_eq!(config.backend, StoreBackend::Memory);
            assert_eq!(config.index_name, "catalog");
            assert_eq!(config.request_timeout, Duration::from_millis(250));
            assert!(!config.refresh_on_write);

            let es = config.to_elasticsearch_config();
            assert_eq!(es.endpoint, "https://search.internal:9243/es");
            assert_eq!(es.username.as_deref(), Some("elastic"));
            assert_eq!(es.password.as_deref(), Some("secret"));
        });
    }

    #[test]
    fn invalid_endpoint_names_the_variable() {
        temp_env::with_vars(with_store_vars(&[("STORE_ENDPOINT", "not a url")]), || {
            let err = StoreConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("STORE_ENDPOINT"));
        });
    }

    #[test]
    fn invalid_timeout_and_backend_are_rejected() {
        temp_env::with_vars(with_store_vars(&[("STORE_REQUEST_TIMEOUT_MS", "soon")]), || {
            let err = StoreConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("STORE_REQUEST_TIMEOUT_MS"));
        });
        temp_env::with_vars(with_store_vars(&[("STORE_BACKEND", "solr")]), || {
            let err = StoreConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("STORE_BACKEND"));
        });
    }

    #[test]
    fn username_requires_password() {
        temp_env::with_vars(with_store_vars(&[("STORE_USERNAME", "elastic")]), || {
            let err = StoreConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "STORE_PASSWORD"));
        });
    }

    #[test]
    fn log_format_selection() {
        temp_env::with_var("LOG_FORMAT", Some("JSON"), || {
            assert_eq!(LogFormat::from_env(), LogFormat::Json);
        });
        temp_env::with_var_unset("LOG_FORMAT", || {
            assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
        });
    }
}
