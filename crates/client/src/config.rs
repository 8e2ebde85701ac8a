use std::time::Duration;

/// Default backend HTTP base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default interval between status queries while polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default delay before a polling session retries the push connection.
pub const DEFAULT_RECONNECT_AFTER: Duration = Duration::from_secs(5);

/// Default silence on an open stream before the status is cross-checked.
pub const DEFAULT_STREAM_IDLE_CHECK: Duration = Duration::from_secs(10);

/// Default HTTP request and WebSocket handshake timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timers that drive one tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiming {
    /// Fixed interval between status queries while polling.
    pub poll_interval: Duration,
    /// Delay after entering Polling before the single push re-attempt.
    /// `None` disables re-attempts.
    pub reconnect_after: Option<Duration>,
    /// Stream silence after which the status endpoint is cross-checked.
    /// `None` disables the check.
    pub stream_idle_check: Option<Duration>,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_after: Some(DEFAULT_RECONNECT_AFTER),
            stream_idle_check: Some(DEFAULT_STREAM_IDLE_CHECK),
        }
    }
}

/// Observer configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend on localhost.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// HTTP base URL of the backend.
    pub api_url: String,
    /// WebSocket base URL of the backend.
    pub ws_url: String,
    pub timing: ChannelTiming,
    /// HTTP request and WebSocket handshake timeout.
    pub request_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: ws_url_for(DEFAULT_API_URL),
            timing: ChannelTiming::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                      |
    /// |-------------------------------|------------------------------|
    /// | `SHORTS_API_URL`              | `http://localhost:8000`      |
    /// | `SHORTS_WS_URL`               | API URL with `ws`/`wss` scheme |
    /// | `SHORTS_POLL_INTERVAL_MS`     | `2000`                       |
    /// | `SHORTS_RECONNECT_AFTER_MS`   | `5000` (`0` disables)        |
    /// | `SHORTS_STREAM_IDLE_CHECK_MS` | `10000` (`0` disables)       |
    /// | `SHORTS_REQUEST_TIMEOUT_SECS` | `30`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("SHORTS_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "SHORTS_API_URL",
                expected: "an http:// or https:// URL",
                value: api_url,
            });
        }

        let ws_url = lookup("SHORTS_WS_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| ws_url_for(&api_url));

        let poll_interval = read_millis(&lookup, "SHORTS_POLL_INTERVAL_MS")?
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SHORTS_POLL_INTERVAL_MS",
                expected: "a positive number of milliseconds",
                value: "0".into(),
            });
        }

        let reconnect_after = read_millis(&lookup, "SHORTS_RECONNECT_AFTER_MS")?
            .map_or(Some(DEFAULT_RECONNECT_AFTER), non_zero);
        let stream_idle_check = read_millis(&lookup, "SHORTS_STREAM_IDLE_CHECK_MS")?
            .map_or(Some(DEFAULT_STREAM_IDLE_CHECK), non_zero);

        let request_timeout = match lookup("SHORTS_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_u64("SHORTS_REQUEST_TIMEOUT_SECS", &v)?),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            api_url,
            ws_url,
            timing: ChannelTiming {
                poll_interval,
                reconnect_after,
                stream_idle_check,
            },
            request_timeout,
        })
    }

    /// Point the configuration at another backend, deriving its
    /// WebSocket URL from the HTTP one.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self.ws_url = ws_url_for(&self.api_url);
        self
    }
}

/// Derive the WebSocket base URL from an HTTP base URL.
///
/// `https` maps to `wss`, anything else to `ws`.
pub fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{api_url}")
    }
}

fn read_millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| parse_u64(var, &v).map(Duration::from_millis))
        .transpose()
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected: "a non-negative integer",
        value: value.to_string(),
    })
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

/// Errors raised while loading [`MonitorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.timing.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn ws_url_follows_api_scheme() {
        assert_eq!(ws_url_for("https://shorts.example.com"), "wss://shorts.example.com");
        assert_eq!(ws_url_for("http://10.0.0.2:8000"), "ws://10.0.0.2:8000");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = load(&[
            ("SHORTS_API_URL", "https://api.example.com/"),
            ("SHORTS_WS_URL", "wss://push.example.com"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.ws_url, "wss://push.example.com");
    }

    #[test]
    fn zero_disables_optional_timers() {
        let config = load(&[
            ("SHORTS_RECONNECT_AFTER_MS", "0"),
            ("SHORTS_STREAM_IDLE_CHECK_MS", "0"),
        ])
        .unwrap();
        assert!(config.timing.reconnect_after.is_none());
        assert!(config.timing.stream_idle_check.is_none());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert_matches!(
            load(&[("SHORTS_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid { var: "SHORTS_POLL_INTERVAL_MS", .. })
        );
    }

    #[test]
    fn garbage_number_is_rejected() {
        assert_matches!(
            load(&[("SHORTS_REQUEST_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::Invalid { var: "SHORTS_REQUEST_TIMEOUT_SECS", value, .. }) if value == "soon"
        );
    }

    #[test]
    fn non_http_api_url_is_rejected() {
        assert_matches!(
            load(&[("SHORTS_API_URL", "ftp://host")]),
            Err(ConfigError::Invalid { var: "SHORTS_API_URL", .. })
        );
    }

    #[test]
    fn with_api_url_rederives_ws_url() {
        let config = MonitorConfig::default().with_api_url("https://remote:9000/");
        assert_eq!(config.api_url, "https://remote:9000");
        assert_eq!(config.ws_url, "wss://remote:9000");
    }
}
