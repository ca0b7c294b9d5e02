//! Engine Configuration Settings
//!
//! Configuration types for the movers engine, loaded from environment
//! variables. Every knob has a default except the primary API key.
//! Validation collects every missing or invalid setting before failing.

use std::cell::RefCell;
use std::time::Duration;

use chrono_tz::Tz;

use crate::domain::indicators::SpikeConfig;
use crate::domain::ranking::AoFilter;
use crate::domain::scoring::ScoringConfig;

/// Upstream API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key. Returns `None` for an empty or blank key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    /// Raw key value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Primary market-data provider (REST + streaming).
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// REST base URL.
    pub rest_url: String,
    /// Streaming socket URL.
    pub stream_url: String,
    /// API key.
    pub api_key: ApiKey,
}

/// Secondary provider for float and daily open / previous close.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSettings {
    /// Whether enrichment calls are made at all.
    pub enabled: bool,
    /// REST base URL.
    pub rest_url: String,
    /// API key, if configured.
    pub api_key: Option<ApiKey>,
}

impl EnrichmentSettings {
    /// Settings the enrichment endpoints need but lack.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("ENRICHMENT_API_KEY".to_string());
        }
        if self.rest_url.trim().is_empty() {
            missing.push("ENRICHMENT_REST_URL".to_string());
        }
        missing
    }
}

/// Remote-call and batch sizing.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Bounded fetch pool concurrency.
    pub concurrency: usize,
    /// Per-request timeout.
    pub http_timeout: Duration,
    /// Rows enriched per request.
    pub enrich_cap: usize,
    /// Aggregate-fallback universe size.
    pub fallback_top_n: usize,
    /// Include OTC symbols in list endpoints.
    pub include_otc: bool,
    /// Poll the full-market snapshot endpoint.
    pub full_market_enabled: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            http_timeout: Duration::from_millis(8_000),
            enrich_cap: 40,
            fallback_top_n: 60,
            include_otc: false,
            full_market_enabled: false,
        }
    }
}

/// TTL for each cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    /// Minute bars.
    pub bars: Duration,
    /// Float shares.
    pub floats: Duration,
    /// Daily open / previous close.
    pub daily: Duration,
    /// Mini-chart payloads.
    pub charts: Duration,
    /// Enriched snapshot rows used by the aggregate fallback.
    pub enriched_rows: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            bars: Duration::from_secs(15),
            floats: Duration::from_secs(86_400),
            daily: Duration::from_secs(21_600),
            charts: Duration::from_secs(15),
            enriched_rows: Duration::from_secs(15),
        }
    }
}

/// Socket ingester settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Minute-aggregate table capacity.
    pub aggregate_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(3_000),
            aggregate_capacity: 5_000,
        }
    }
}

/// Server and loop settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
    /// Movers refresh interval of the binary's loop.
    pub refresh_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8083,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Primary provider.
    pub provider: ProviderSettings,
    /// Secondary enrichment provider.
    pub enrichment: EnrichmentSettings,
    /// Fetch sizing and feature flags.
    pub fetch: FetchSettings,
    /// Cache TTLs.
    pub cache: CacheTtls,
    /// Volume-spike detection.
    pub spike: SpikeConfig,
    /// Oscillator filter applied to ranked views.
    pub ao_filter: AoFilter,
    /// Scoring thresholds and bucket boundaries.
    pub scoring: ScoringConfig,
    /// Socket ingesters.
    pub stream: StreamSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// Exchange timezone.
    pub timezone: Tz,
}

/// Default primary REST URL.
pub const DEFAULT_REST_URL: &str = "https://api.polygon.io";
/// Default primary streaming URL.
pub const DEFAULT_STREAM_URL: &str = "wss://socket.polygon.io/stocks";
/// Default enrichment REST URL.
pub const DEFAULT_ENRICHMENT_URL: &str = "https://financialmodelingprep.com";

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns every missing or invalid setting at once.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns every missing or invalid setting at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env::new(&lookup);
        let mut missing = Vec::new();

        let api_key = env.get("MOVERS_API_KEY").and_then(ApiKey::new);
        if api_key.is_none() {
            missing.push("MOVERS_API_KEY".to_string());
        }

        let timezone = match env.get("MARKET_TIMEZONE") {
            None => chrono_tz::America::New_York,
            Some(raw) => match raw.trim().parse::<Tz>() {
                Ok(tz) => tz,
                Err(_) => {
                    env.reject("MARKET_TIMEZONE", raw);
                    chrono_tz::America::New_York
                }
            },
        };

        let ao_filter = match env.get("AO_FILTER") {
            None => AoFilter::Off,
            Some(raw) => match AoFilter::from_str_case_insensitive(&raw) {
                Some(filter) => filter,
                None => {
                    env.reject("AO_FILTER", raw);
                    AoFilter::Off
                }
            },
        };

        // A configured secondary key turns enrichment on unless disabled.
        let enrichment_key = env.get("ENRICHMENT_API_KEY").and_then(ApiKey::new);
        let enrichment = EnrichmentSettings {
            enabled: env.bool("ENRICHMENT_ENABLED", enrichment_key.is_some()),
            rest_url: env.string("ENRICHMENT_REST_URL", DEFAULT_ENRICHMENT_URL),
            api_key: enrichment_key,
        };

        let fetch_defaults = FetchSettings::default();
        let fetch = FetchSettings {
            concurrency: env.parse("FETCH_CONCURRENCY", fetch_defaults.concurrency).max(1),
            http_timeout: env.millis("HTTP_TIMEOUT_MS", fetch_defaults.http_timeout),
            enrich_cap: env.parse("ENRICH_CAP", fetch_defaults.enrich_cap),
            fallback_top_n: env.parse("FALLBACK_TOP_N", fetch_defaults.fallback_top_n),
            include_otc: env.bool("INCLUDE_OTC", fetch_defaults.include_otc),
            full_market_enabled: env.bool("FULL_MARKET_ENABLED", fetch_defaults.full_market_enabled),
        };

        let ttl = CacheTtls::default();
        let cache = CacheTtls {
            bars: env.secs("BARS_CACHE_TTL_SECS", ttl.bars),
            floats: env.secs("FLOAT_CACHE_TTL_SECS", ttl.floats),
            daily: env.secs("DAILY_CACHE_TTL_SECS", ttl.daily),
            charts: env.secs("CHART_CACHE_TTL_SECS", ttl.charts),
            enriched_rows: env.secs("ENRICHED_ROW_TTL_SECS", ttl.enriched_rows),
        };

        let spike_defaults = SpikeConfig::default();
        let spike = SpikeConfig {
            window: env.parse("VOLUME_SPIKE_WINDOW", spike_defaults.window),
            multiplier: env.float("VOLUME_SPIKE_MULTIPLIER", spike_defaults.multiplier),
        };

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            reconnect_delay: env.millis("STREAM_RECONNECT_DELAY_MS", stream_defaults.reconnect_delay),
            aggregate_capacity: env
                .parse("AGGREGATE_CAPACITY", stream_defaults.aggregate_capacity)
                .max(1),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            health_port: env.parse("HEALTH_PORT", server_defaults.health_port),
            refresh_interval: env.secs("REFRESH_INTERVAL_SECS", server_defaults.refresh_interval),
        };

        let rest_url = env.string("MOVERS_REST_URL", DEFAULT_REST_URL);
        let stream_url = env.string("MOVERS_STREAM_URL", DEFAULT_STREAM_URL);

        let invalid = env.into_rejected();
        let api_key = match (api_key, missing.is_empty(), invalid.is_empty()) {
            (Some(key), true, true) => key,
            (_, false, true) => return Err(ConfigError::Missing(missing)),
            (_, true, false) => return Err(ConfigError::Invalid(invalid)),
            _ => return Err(ConfigError::Incomplete { missing, invalid }),
        };

        Ok(Self {
            provider: ProviderSettings {
                rest_url,
                stream_url,
                api_key,
            },
            enrichment,
            fetch,
            cache,
            spike,
            ao_filter,
            scoring: ScoringConfig::default(),
            stream,
            server,
            timezone,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required settings are missing or empty.
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
    /// Settings present but unparseable.
    #[error("invalid environment variables: {}", format_invalid(.0))]
    Invalid(Vec<(String, String)>),
    /// Both missing and invalid settings.
    #[error(
        "missing required environment variables: {}; invalid environment variables: {}",
        .missing.join(", "),
        format_invalid(.invalid)
    )]
    Incomplete {
        /// Missing keys.
        missing: Vec<String>,
        /// Invalid `(key, raw value)` pairs.
        invalid: Vec<(String, String)>,
    },
}

impl ConfigError {
    /// Names of every offending setting.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::Missing(keys) => keys.clone(),
            Self::Invalid(pairs) => pairs.iter().map(|(k, _)| k.clone()).collect(),
            Self::Incomplete { missing, invalid } => missing
                .iter()
                .cloned()
                .chain(invalid.iter().map(|(k, _)| k.clone()))
                .collect(),
        }
    }
}

fn format_invalid(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Env<'a, F> {
    lookup: &'a F,
    rejected: RefCell<Vec<(String, String)>>,
}

impl<'a, F> Env<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    const fn new(lookup: &'a F) -> Self {
        Self {
            lookup,
            rejected: RefCell::new(Vec::new()),
        }
    }

    fn reject(&self, key: &str, raw: String) {
        self.rejected.borrow_mut().push((key.to_string(), raw));
    }

    fn into_rejected(self) -> Vec<(String, String)> {
        self.rejected.into_inner()
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map_or_else(|| default.to_string(), |v| v.trim().trim_end_matches('/').to_string())
    }

    /// Parse a present value, recording it as invalid when it does not parse.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                self.reject(key, raw);
                default
            }
        }
    }

    /// Finite, non-negative float.
    fn float(&self, key: &str, default: f64) -> f64 {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => value,
            _ => {
                self.reject(key, raw);
                default
            }
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.reject(key, raw);
                default
            }
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        Duration::from_secs(self.parse(key, default.as_secs()))
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.parse(key, default_ms))
    }
}
