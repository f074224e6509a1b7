//! Configuration for the dashboard performance helpers.
//!
//! Every setting has a default matching the dashboard's tuned values and can
//! be overridden through `HLSMON_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::errors::ConfigError;

/// Default delay between consecutive request dispatches.
pub const DEFAULT_PACING_INTERVAL: Duration = Duration::from_millis(100);

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Default number of latency samples kept.
pub const DEFAULT_LATENCY_WINDOW: usize = 50;

/// Default cache entry time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default partition size above which an insert triggers a sweep.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;

/// Default interval of the background cache sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Default batching frame (roughly one 60 Hz paint).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Default number of points kept per chart.
pub const DEFAULT_CHART_MAX_POINTS: usize = 20;

/// Request dispatcher settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherConfig {
    /// Delay inserted between consecutive dispatches of one drain.
    pub pacing_interval: Duration,
    /// Upper bound for a single attempt.
    pub request_timeout: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Capacity of the latency sample window.
    pub latency_window: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pacing_interval: DEFAULT_PACING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            latency_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

/// Expiring cache settings.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// TTL applied by `set` when none is given.
    pub default_ttl: Duration,
    /// Partition size above which an insert sweeps expired entries.
    pub max_entries: usize,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Chart batcher settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartConfig {
    /// Delay between the first pending update and its flush.
    pub frame_interval: Duration,
    /// Buffer capacity per chart.
    pub max_points: usize,
    /// Redraw with animation instead of immediately.
    pub animate: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            max_points: DEFAULT_CHART_MAX_POINTS,
            animate: false,
        }
    }
}

/// DOM batcher settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DomConfig {
    /// Delay between the first pending update and its flush.
    pub frame_interval: Duration,
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// Settings for every component owned by [`PerfServices`](crate::PerfServices).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerfConfig {
    pub dispatcher: DispatcherConfig,
    pub cache: CacheConfig,
    pub chart: ChartConfig,
    pub dom: DomConfig,
}

impl PerfConfig {
    /// Read overrides from the process environment, falling back to the
    /// defaults when a value is malformed.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            warn!("{}, using default configuration", e);
            Self::default()
        })
    }

    /// Read overrides from the process environment.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let d = &mut config.dispatcher;
        if let Some(ms) = parse::<u64, _>(&lookup, "HLSMON_PACING_MS")? {
            d.pacing_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "HLSMON_REQUEST_TIMEOUT_MS")? {
            d.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse::<u32, _>(&lookup, "HLSMON_MAX_ATTEMPTS")? {
            d.max_attempts = n.max(1);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "HLSMON_BACKOFF_BASE_MS")? {
            d.backoff_base = Duration::from_millis(ms);
        }

        let c = &mut config.cache;
        if let Some(secs) = parse::<u64, _>(&lookup, "HLSMON_CACHE_TTL_SECS")? {
            c.default_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "HLSMON_CACHE_MAX_ENTRIES")? {
            c.max_entries = n;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "HLSMON_CACHE_SWEEP_SECS")? {
            c.sweep_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(ms) = parse::<u64, _>(&lookup, "HLSMON_FRAME_MS")? {
            config.chart.frame_interval = Duration::from_millis(ms);
            config.dom.frame_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "HLSMON_CHART_MAX_POINTS")? {
            config.chart.max_points = n.max(1);
        }
        if let Some(animate) = parse::<bool, _>(&lookup, "HLSMON_CHART_ANIMATE")? {
            config.chart.animate = animate;
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PerfConfig::default();
        assert_eq!(config.dispatcher.pacing_interval, Duration::from_millis(100));
        assert_eq!(config.dispatcher.request_timeout, Duration::from_secs(15));
        assert_eq!(config.dispatcher.max_attempts, 3);
        assert_eq!(config.dispatcher.latency_window, 50);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.chart.max_points, 20);
        assert!(!config.chart.animate);
    }

    #[test]
    fn test_empty_lookup_yields_defaults() {
        let config = PerfConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PerfConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = PerfConfig::from_lookup(lookup_from(&[
            ("HLSMON_PACING_MS", "250"),
            ("HLSMON_MAX_ATTEMPTS", "5"),
            ("HLSMON_CACHE_TTL_SECS", "60"),
            ("HLSMON_FRAME_MS", "33"),
            ("HLSMON_CHART_ANIMATE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.dispatcher.pacing_interval, Duration::from_millis(250));
        assert_eq!(config.dispatcher.max_attempts, 5);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(60));
        assert_eq!(config.chart.frame_interval, Duration::from_millis(33));
        assert_eq!(config.dom.frame_interval, Duration::from_millis(33));
        assert!(config.chart.animate);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let config =
            PerfConfig::from_lookup(lookup_from(&[("HLSMON_MAX_ATTEMPTS", "0")])).unwrap();
        assert_eq!(config.dispatcher.max_attempts, 1);
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = PerfConfig::from_lookup(lookup_from(&[("HLSMON_PACING_MS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "HLSMON_PACING_MS".to_string(),
                value: "soon".to_string(),
            }
        );
    }
}
