//! Tool Provider Configuration
//!
//! Credentials and limits for the external scraping tool server, loaded
//! once at process start. Malformed values are rejected here, before the
//! first call, not lazily.

use std::collections::HashMap;
use std::time::Duration;

use crew_core::{CrewError, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Parsed request-rate ceiling: `count` requests per `window`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub window: Duration,
}

impl RateLimit {
    /// Parse a `<count>/<duration><unit>` spec, unit in {s, m, h}.
    ///
    /// Examples: `100/1h`, `50/30m`, `10/5s`.
    pub fn parse(spec: &str) -> Result<Self> {
        let bad = || CrewError::Config(format!(
            "invalid rate limit '{}': expected <count>/<duration><unit> with unit s, m or h",
            spec
        ));

        let (count_str, window_str) = spec.split_once('/').ok_or_else(bad)?;
        let count: u32 = count_str.trim().parse().map_err(|_| bad())?;
        if count == 0 {
            return Err(bad());
        }

        let window_str = window_str.trim();
        if window_str.len() < 2 {
            return Err(bad());
        }
        let (value_str, unit) = window_str.split_at(window_str.len() - 1);
        let value: u64 = value_str.parse().map_err(|_| bad())?;
        if value == 0 {
            return Err(bad());
        }

        let seconds = match unit {
            "s" => value,
            "m" => value * 60,
            "h" => value * 3600,
            _ => return Err(bad()),
        };

        Ok(Self {
            count,
            window: Duration::from_secs(seconds),
        })
    }

    /// Canonical spec string (seconds-based), accepted by [`RateLimit::parse`]
    pub fn to_spec(self) -> String {
        format!("{}/{}s", self.count, self.window.as_secs())
    }
}

/// Sliding-window request limiter, shared across sessions.
///
/// `acquire` returns once a request slot is available, sleeping until the
/// oldest in-window request ages out when saturated. Internally
/// synchronized, so one limiter can sit in front of a shared connection.
pub struct RateLimiter {
    limit: RateLimit,
    stamps: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            stamps: Mutex::new(Vec::new()),
        }
    }

    /// Wait for a request slot
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                stamps.retain(|t| now.duration_since(*t) < self.limit.window);

                if (stamps.len() as u32) < self.limit.count {
                    stamps.push(now);
                    return;
                }

                match stamps.iter().min() {
                    Some(oldest) => self.limit.window - now.duration_since(*oldest),
                    None => return,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Configuration for the external scraping tool server process
#[derive(Clone, Debug)]
pub struct ScraperConfig {
    /// Provider API token (required)
    pub api_token: String,

    /// Optional local request-rate ceiling
    pub rate_limit: Option<RateLimit>,

    /// Web unlocker zone name
    pub unlocker_zone: String,

    /// Browser zone name
    pub browser_zone: String,

    /// Expose the full tool set (browser + structured web data tools)
    pub pro_mode: bool,

    /// Server launch command
    pub command: String,

    /// Server launch arguments
    pub args: Vec<String>,
}

impl ScraperConfig {
    /// Minimal configuration with defaults for everything but the token
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            rate_limit: None,
            unlocker_zone: "mcp_unlocker".into(),
            browser_zone: "mcp_browser".into(),
            pro_mode: false,
            command: "npx".into(),
            args: vec!["@brightdata/mcp".into()],
        }
    }

    /// Load from environment variables.
    ///
    /// `API_TOKEN` is required; a missing token is a startup failure, not a
    /// deferred one. `RATE_LIMIT` is validated here if present.
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("API_TOKEN")
            .map_err(|_| CrewError::Config("API_TOKEN is not set".into()))?;

        let rate_limit = match std::env::var("RATE_LIMIT") {
            Ok(spec) => Some(RateLimit::parse(&spec)?),
            Err(_) => None,
        };

        let mut config = Self::new(api_token);
        config.rate_limit = rate_limit;

        if let Ok(zone) = std::env::var("WEB_UNLOCKER_ZONE") {
            config.unlocker_zone = zone;
        }
        if let Ok(zone) = std::env::var("BROWSER_ZONE") {
            config.browser_zone = zone;
        }
        if let Ok(flag) = std::env::var("PRO_MODE") {
            config.pro_mode = matches!(flag.trim(), "true" | "1" | "yes");
        }
        if let Ok(command) = std::env::var("SCRAPER_COMMAND") {
            config.command = command;
        }
        if let Ok(args) = std::env::var("SCRAPER_ARGS") {
            config.args = args.split_whitespace().map(str::to_string).collect();
        }

        Ok(config)
    }

    /// Environment passed to the spawned tool server process
    pub fn env_map(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("API_TOKEN".into(), self.api_token.clone());
        if let Some(limit) = self.rate_limit {
            env.insert("RATE_LIMIT".into(), limit.to_spec());
        }
        env.insert("WEB_UNLOCKER_ZONE".into(), self.unlocker_zone.clone());
        env.insert("BROWSER_ZONE".into(), self.browser_zone.clone());
        env.insert("PRO_MODE".into(), self.pro_mode.to_string());
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hours() {
        let limit = RateLimit::parse("100/1h").unwrap();
        assert_eq!(limit.count, 100);
        assert_eq!(limit.window, Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_minutes() {
        let limit = RateLimit::parse("50/30m").unwrap();
        assert_eq!(limit.count, 50);
        assert_eq!(limit.window, Duration::from_secs(1800));
    }

    #[test]
    fn test_parse_seconds() {
        let limit = RateLimit::parse("10/5s").unwrap();
        assert_eq!(limit.count, 10);
        assert_eq!(limit.window, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for spec in ["abc", "10/", "/5s", "10/5x", "0/5s", "10/0s", "ten/5s", "10-5s", ""] {
            assert!(
                matches!(RateLimit::parse(spec), Err(CrewError::Config(_))),
                "'{spec}' should be rejected"
            );
        }
    }

    #[test]
    fn test_spec_round_trip() {
        let limit = RateLimit::parse("50/30m").unwrap();
        let again = RateLimit::parse(&limit.to_spec()).unwrap();
        assert_eq!(limit, again);
    }

    #[test]
    fn test_env_map_carries_token_and_zones() {
        let mut config = ScraperConfig::new("secret-token");
        config.rate_limit = Some(RateLimit::parse("10/5s").unwrap());
        let env = config.env_map();

        assert_eq!(env.get("API_TOKEN").map(String::as_str), Some("secret-token"));
        assert_eq!(env.get("RATE_LIMIT").map(String::as_str), Some("10/5s"));
        assert_eq!(env.get("WEB_UNLOCKER_ZONE").map(String::as_str), Some("mcp_unlocker"));
        assert_eq!(env.get("PRO_MODE").map(String::as_str), Some("false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_delays_when_saturated() {
        let limiter = RateLimiter::new(RateLimit {
            count: 2,
            window: Duration::from_secs(1),
        });

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        // Third acquisition must wait for the window to roll
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
