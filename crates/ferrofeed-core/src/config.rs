//! Environment-driven configuration.
//!
//! # Environment Variables
//!
//! | Setting | Variable | Default |
//! |---------|----------|---------|
//! | Cache host | `FERROFEED_CACHE_HOST` | `127.0.0.1` |
//! | Cache port | `FERROFEED_CACHE_PORT` | `6379` |
//! | Cache credentials | `FERROFEED_CACHE_USERNAME`, `FERROFEED_CACHE_PASSWORD` | none |
//! | Cache database | `FERROFEED_CACHE_DB` | `0` |
//! | Key namespace | `FERROFEED_CACHE_NAMESPACE` | `ferrofeed` |
//! | Fallback TTL | `FERROFEED_CACHE_DEFAULT_TTL_SECS` | `300` |
//! | Per-type TTL | `FERROFEED_CACHE_TTL_<TYPE>_SECS` | see [`EntityType::default_ttl`] |
//! | Source API key | `FERROFEED_<SOURCE>_API_KEY`, then `<SOURCE>_API_KEY` | none (source disabled) |
//! | Source endpoint | `FERROFEED_<SOURCE>_BASE_URL` | provider default |
//! | Source weight | `FERROFEED_<SOURCE>_WEIGHT` | provider default |
//! | Source switch | `FERROFEED_<SOURCE>_ENABLED` | `true` |
//! | Source rate | `FERROFEED_<SOURCE>_RPS`, `FERROFEED_<SOURCE>_BURST` | provider default |
//!
//! `<SOURCE>` is one of `NEWSAPI`, `FINNHUB`, `GNEWS`; `<TYPE>` is one of
//! `NEWS`, `SEARCH`, `TRENDING`, `PRODUCT`, `PRICE`.

use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheSettings, EntityType, RedisSettings};
use crate::rate_limit::RateLimit;
use crate::source::SourceDescriptor;
use crate::{SourceId, ValidationError};

const PREFIX: &str = "FERROFEED_";

/// Upstream providers with a bundled adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    NewsApi,
    Finnhub,
    GNews,
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::NewsApi, Self::Finnhub, Self::GNews];

    pub fn id(self) -> SourceId {
        match self {
            Self::NewsApi => SourceId::newsapi(),
            Self::Finnhub => SourceId::finnhub(),
            Self::GNews => SourceId::gnews(),
        }
    }

    pub const fn env_name(self) -> &'static str {
        match self {
            Self::NewsApi => "NEWSAPI",
            Self::Finnhub => "FINNHUB",
            Self::GNews => "GNEWS",
        }
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::NewsApi => "https://newsapi.org/v2",
            Self::Finnhub => "https://finnhub.io/api/v1",
            Self::GNews => "https://gnews.io/api/v4",
        }
    }

    pub const fn default_weight(self) -> f64 {
        match self {
            Self::NewsApi => 0.4,
            Self::Finnhub => 0.3,
            Self::GNews => 0.3,
        }
    }

    /// Conservative free-tier budgets.
    pub const fn default_rate_limit(self) -> RateLimit {
        match self {
            Self::NewsApi => RateLimit::per_second(1.0).with_burst(2),
            Self::Finnhub => RateLimit::per_second(1.0).with_burst(5),
            Self::GNews => RateLimit::per_second(1.0),
        }
    }
}

/// Settings for one upstream source.
#[derive(Clone, PartialEq)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub weight: f64,
    pub enabled: bool,
    pub rate_limit: RateLimit,
}

impl std::fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSettings")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("weight", &self.weight)
            .field("enabled", &self.enabled)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl SourceSettings {
    /// Provider defaults with no API key.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: kind.default_base_url().to_string(),
            weight: kind.default_weight(),
            enabled: true,
            rate_limit: kind.default_rate_limit(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// A source participates only when switched on and given a key.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    pub fn descriptor(&self) -> Result<SourceDescriptor, ValidationError> {
        let descriptor = SourceDescriptor::new(self.kind.id(), self.weight)?;
        Ok(if self.is_active() {
            descriptor
        } else {
            descriptor.disabled()
        })
    }
}

/// Complete runtime configuration for an aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub cache: CacheSettings,
    pub sources: Vec<SourceSettings>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            sources: SourceKind::ALL.into_iter().map(SourceSettings::new).collect(),
        }
    }
}

impl FeedConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset and empty
    /// variables fall back to defaults; malformed ones are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let defaults = RedisSettings::default();
        let connection = RedisSettings {
            host: env.string("CACHE_HOST").unwrap_or(defaults.host),
            port: env.parse("CACHE_PORT")?.unwrap_or(defaults.port),
            username: env.string("CACHE_USERNAME"),
            password: env.string("CACHE_PASSWORD"),
            database: env.parse("CACHE_DB")?.unwrap_or(defaults.database),
        };

        let mut cache = CacheConfig::default();
        if let Some(namespace) = env.string("CACHE_NAMESPACE") {
            cache.namespace = namespace;
        }
        if let Some(seconds) = env.parse::<u64>("CACHE_DEFAULT_TTL_SECS")? {
            cache.default_ttl = Duration::from_secs(seconds);
        }
        for entity in EntityType::ALL {
            let key = format!("CACHE_TTL_{}_SECS", entity.as_str().to_ascii_uppercase());
            if let Some(seconds) = env.parse::<u64>(&key)? {
                cache.type_ttls.insert(entity, Duration::from_secs(seconds));
            }
        }

        let sources = SourceKind::ALL
            .into_iter()
            .map(|kind| source_from_env(&env, kind))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cache: CacheSettings {
                connection,
                config: cache,
            },
            sources,
        })
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceSettings> {
        self.sources.iter().find(|settings| settings.kind == kind)
    }
}

fn source_from_env<F>(env: &Lookup<F>, kind: SourceKind) -> Result<SourceSettings, ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let name = kind.env_name();
    let mut settings = SourceSettings::new(kind);

    settings.api_key = env
        .string(&format!("{name}_API_KEY"))
        .or_else(|| env.raw(&format!("{name}_API_KEY")));

    if let Some(base_url) = env.string(&format!("{name}_BASE_URL")) {
        settings.base_url = base_url;
    }

    let weight_key = format!("{name}_WEIGHT");
    if let Some(weight) = env.parse::<f64>(&weight_key)? {
        if !(0.0..=1.0).contains(&weight) {
            return Err(env.invalid(&weight_key));
        }
        settings.weight = weight;
    }

    if let Some(enabled) = env.flag(&format!("{name}_ENABLED"))? {
        settings.enabled = enabled;
    }

    let rps_key = format!("{name}_RPS");
    if let Some(rps) = env.parse::<f64>(&rps_key)? {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(env.invalid(&rps_key));
        }
        settings.rate_limit.requests_per_second = rps;
    }

    let burst_key = format!("{name}_BURST");
    if let Some(burst) = env.parse::<u32>(&burst_key)? {
        if burst == 0 {
            return Err(env.invalid(&burst_key));
        }
        settings.rate_limit.burst = Some(burst);
    }

    Ok(settings)
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unprefixed variable, trimmed; empty counts as unset.
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.raw(&format!("{PREFIX}{key}"))
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ValidationError> {
        match self.string(key) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| self.invalid(key)),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ValidationError> {
        match self.string(key).map(|value| value.to_ascii_lowercase()) {
            None => Ok(None),
            Some(value) => match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(self.invalid(key)),
            },
        }
    }

    fn invalid(&self, key: &str) -> ValidationError {
        let full = format!("{PREFIX}{key}");
        ValidationError::InvalidConfig {
            value: (self.0)(&full).unwrap_or_default(),
            key: full,
        }
    }
}
