use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{de, Deserialize, Deserializer};
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
    /// The log level for streampick.
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
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "streampick".into(),
            hostname_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Freshness windows of the resolution cache.
///
/// All ages are measured from the moment an entry was stored.
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries younger than this are served without recomputation.
    #[serde(with = "humantime_serde")]
    pub fresh_age: Duration,

    /// Replaces `fresh_age` for entries without any streams.
    #[serde(with = "humantime_serde")]
    pub empty_fresh_age: Duration,

    /// Entries younger than this are served immediately and refreshed in the background.
    #[serde(with = "humantime_serde")]
    pub stale_revalidate_age: Duration,

    /// Entries younger than this are served when a recomputation fails.
    ///
    /// Older entries are evicted.
    #[serde(with = "humantime_serde")]
    pub stale_error_age: Duration,

    /// Maximum number of concurrent background refreshes
    pub max_lazy_refreshes: isize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let fresh_age = env::var("CACHE_MAX_AGE")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        Self {
            fresh_age,
            empty_fresh_age: Duration::from_secs(60),
            stale_revalidate_age: Duration::from_secs(4 * 3600),
            stale_error_age: Duration::from_secs(7 * 24 * 3600),
            max_lazy_refreshes: 50,
        }
    }
}

impl CacheConfig {
    /// Checks that the windows are ordered, so every entry passes through them one by one.
    pub fn validate(&self) -> Result<()> {
        let fresh = self.fresh_age.max(self.empty_fresh_age);
        if fresh > self.stale_revalidate_age {
            anyhow::bail!(
                "cache fresh age ({fresh:?}) exceeds the stale-while-revalidate age ({:?})",
                self.stale_revalidate_age,
            );
        }
        if self.stale_revalidate_age > self.stale_error_age {
            anyhow::bail!(
                "cache stale-while-revalidate age ({:?}) exceeds the stale-if-error age ({:?})",
                self.stale_revalidate_age,
                self.stale_error_age,
            );
        }
        Ok(())
    }
}

/// Connection to the upstream torrent catalog.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog, lookups fail when this is not set.
    pub url: Option<Url>,

    /// The timeout for establishing a connection to the catalog.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The timeout for a whole catalog lookup, including reading the body.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct DebridConfig {
    /// Base URL of the service turning debrid resolver links into playable redirects.
    ///
    /// Without it, streams are returned as plain torrent references.
    pub resolver_url: Option<Url>,
}

/// Identity of the addon, served in the manifest.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AddonConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            id: "com.streampick.autopick".into(),
            name: "StreamPick".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Picks the single best torrent stream for a movie or episode".into(),
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

    /// Freshness windows of the resolution cache.
    pub caches: CacheConfig,

    /// The upstream torrent catalog.
    pub catalog: CatalogConfig,

    /// Debrid link generation.
    pub debrid: DebridConfig,

    /// Manifest identity.
    pub addon: AddonConfig,

    /// The maximum number of catalog lookups that run concurrently.
    pub max_concurrent_resolutions: usize,

    /// The maximum number of distinct media items that may be pending at once.
    ///
    /// A value of `None` indicates no limit.
    pub max_pending_keys: Option<usize>,
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
fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:7000".to_owned()
    } else {
        "127.0.0.1:7000".to_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            caches: CacheConfig::default(),
            catalog: CatalogConfig::default(),
            debrid: DebridConfig::default(),
            addon: AddonConfig::default(),
            max_concurrent_resolutions: 30,
            max_pending_keys: None,
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => {
                let config = Config::default();
                config.caches.validate().context("invalid cache windows")?;
                Ok(config)
            }
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        let config: Self = serde_yaml::from_str(&config).context("failed to parse config YAML")?;
        config.caches.validate().context("invalid cache windows")?;
        Ok(config)
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
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
