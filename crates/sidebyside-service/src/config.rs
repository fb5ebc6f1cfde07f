use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the server.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "sidebyside".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Which backend stores rendered snippets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Never cache anything, every lookup is a miss.
    None,
    /// An in-process cache, lost on restart and not shared between instances.
    Memory,
    /// A memcached server shared by all instances.
    Memcached,
}

/// Configuration of the snippet cache.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The cache backend to use.
    pub backend: CacheBackend,

    /// Address of the memcached server, either `host:port` or `tcp://host:port`.
    ///
    /// Defaults to the `MEMCACHEDCLOUD_SERVERS` environment variable. When that variable holds a
    /// comma separated list, only the first server is used.
    pub servers: Option<String>,

    /// Number of memcached connections shared by all request handlers.
    pub pool_size: usize,

    /// Maximum number of entries kept by the in-memory backend.
    pub memory_capacity: u64,

    /// Upper bound for a single cache read or write.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl CacheConfig {
    /// Returns the DSN of the first configured memcached server.
    pub fn memcached_dsn(&self) -> Option<String> {
        let server = self.servers.as_deref()?.split(',').next()?.trim();
        if server.is_empty() {
            return None;
        }
        if server.contains("://") {
            Some(server.to_owned())
        } else {
            Some(format!("tcp://{server}"))
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let servers = env::var("MEMCACHEDCLOUD_SERVERS").ok();
        CacheConfig {
            backend: match servers {
                Some(_) => CacheBackend::Memcached,
                None => CacheBackend::Memory,
            },
            servers,
            pool_size: 4,
            memory_capacity: 10_000,
            timeout: Duration::from_millis(500),
        }
    }
}

/// Configuration of the external content site.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the MediaWiki installation hosting the tasks.
    pub url: Url,

    /// The timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Global timeout for one lookup, including all of its requests.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// The `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: Url::parse("https://rosettacode.org/").expect("default source url is valid"),
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
            user_agent: concat!("sidebyside/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// The snippet cache.
    pub cache: CacheConfig,

    /// The content site that tasks and snippets are read from.
    pub source: SourceConfig,

    /// The maximum number of requests that are handled concurrently.
    ///
    /// A value of `None` indicates no limit.
    pub max_concurrent_requests: Option<usize>,
}

/// Checks if we are running in docker.
fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

/// Default value for the "bind" configuration.
///
/// The port is read from the `PORT` environment variable and falls back to `5000`.
fn default_bind() -> String {
    let port = env::var("PORT")
        .ok()
        .filter(|port| !port.is_empty())
        .unwrap_or_else(|| "5000".to_owned());
    if is_docker() {
        // Docker images rely on this service being exposed
        format!("0.0.0.0:{port}")
    } else {
        format!("127.0.0.1:{port}")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            cache: CacheConfig::default(),
            source: SourceConfig::default(),
            max_concurrent_requests: Some(200),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl<'de> de::Visitor<'de> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config() {
        let yaml = r#"
            cache:
              backend: memcached
              servers: cache.internal:11211
              timeout: 2s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::Memcached);
        assert_eq!(cfg.cache.timeout, Duration::from_secs(2));
        assert_eq!(
            cfg.cache.memcached_dsn().as_deref(),
            Some("tcp://cache.internal:11211")
        );
        // Unspecified values keep their defaults.
        assert_eq!(cfg.cache.pool_size, 4);
    }

    #[test]
    fn test_memcached_dsn() {
        let mut cache = CacheConfig {
            servers: Some("tcp://a:1, b:2".into()),
            ..Default::default()
        };
        assert_eq!(cache.memcached_dsn().as_deref(), Some("tcp://a:1"));

        cache.servers = Some(" ".into());
        assert_eq!(cache.memcached_dsn(), None);

        cache.servers = None;
        assert_eq!(cache.memcached_dsn(), None);
    }

    #[test]
    fn test_source_timeouts() {
        let yaml = r#"
            source:
              url: http://localhost:8080/
              timeout: 500ms
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.source.url.as_str(), "http://localhost:8080/");
        assert_eq!(cfg.source.timeout, Duration::from_millis(500));
        assert_eq!(
            cfg.source.connect_timeout,
            SourceConfig::default().connect_timeout
        );
    }

    #[test]
    fn test_log_level() {
        let yaml = r#"
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_unknown_fields() {
        // Unknown fields should not cause failure
        let yaml = r#"
            caches:
              not_a_cache:
                max_unused_for: 1h
        "#;
        let cfg = Config::from_reader(yaml.as_bytes());
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_empty_file() {
        // Empty files aren't supported
        let yaml = r#""#;
        let result = Config::from_reader(yaml.as_bytes());
        assert!(result.is_err());
    }
}
