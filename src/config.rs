//! Client configuration and endpoint construction
//!
//! [`SyncConfig`] is built explicitly by library users. The `tally` binary
//! loads it from the environment (and an optional `.env`) with
//! [`SyncConfig::from_env`].

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::counters::CounterName;
use crate::error::{Result, SyncError};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000";

/// Push transports, tried in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Persistent WebSocket stream of broadcast events
    WebSocket,
    /// Periodic `GET /all`
    Polling,
}

impl FromStr for Transport {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Transport::WebSocket),
            "polling" | "poll" => Ok(Transport::Polling),
            other => Err(SyncError::Config(format!("unknown transport {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the counter service (http or https)
    pub base_url: Url,

    /// Timeout applied to every request/response call
    pub request_timeout: Duration,

    /// Push transports in preference order
    pub transports: Vec<Transport>,

    /// Interval of the polling transport
    pub poll_interval: Duration,

    /// Pause before a dropped push stream is re-established
    pub reconnect_delay: Duration,

    /// Path of the push endpoint, relative to the base URL
    pub push_path: String,
}

impl SyncConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "unsupported scheme {:?}, expected http or https",
                base_url.scheme()
            )));
        }
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("{base_url} cannot be used as a base url")));
        }

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(10),
            transports: vec![Transport::WebSocket, Transport::Polling],
            poll_interval: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(1),
            push_path: "ws".to_string(),
        })
    }

    /// Load configuration from `TALLY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base = std::env::var("TALLY_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let mut config = Self::new(&base)?;

        if let Some(ms) = env_millis("TALLY_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = ms;
        }
        if let Some(ms) = env_millis("TALLY_POLL_INTERVAL_MS")? {
            config.poll_interval = ms;
        }
        if let Some(ms) = env_millis("TALLY_RECONNECT_DELAY_MS")? {
            config.reconnect_delay = ms;
        }
        if let Ok(list) = std::env::var("TALLY_TRANSPORTS") {
            let transports = list
                .split(',')
                .filter(|t| !t.trim().is_empty())
                .map(Transport::from_str)
                .collect::<Result<Vec<_>>>()?;
            config = config.with_transports(transports)?;
        }

        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_transports(mut self, transports: Vec<Transport>) -> Result<Self> {
        if transports.is_empty() {
            return Err(SyncError::Config("at least one push transport is required".into()));
        }
        self.transports = transports;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_push_path(mut self, path: impl Into<String>) -> Self {
        self.push_path = path.into();
        self
    }

    /// `GET` endpoint returning the full counter map.
    pub fn all_url(&self) -> Url {
        self.endpoint(&["all"])
    }

    /// `POST` endpoint incrementing `name`; the name is encoded as one
    /// path segment.
    ///
    /// `.` and `..` are dot-segments that URL normalization removes, so
    /// they cannot be addressed and fail with [`SyncError::InvalidName`].
    pub fn increment_url(&self, name: &CounterName) -> Result<Url> {
        if matches!(name.as_str(), "." | "..") {
            return Err(SyncError::InvalidName(name.to_string()));
        }
        Ok(self.endpoint(&["increment", name.as_str()]))
    }

    pub fn add_url(&self) -> Url {
        self.endpoint(&["add"])
    }

    /// Push endpoint with the scheme switched to `ws`/`wss`.
    pub fn push_url(&self) -> Result<Url> {
        let segments: Vec<&str> = self.push_path.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.endpoint(&segments);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::Config(format!("cannot derive push url from {url}")))?;
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        // http(s) bases are checked in `new`, so segments are always available
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| SyncError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoints_under_base_path() {
        let config = SyncConfig::new("http://localhost:3000/api/").unwrap();
        assert_eq!(config.all_url().as_str(), "http://localhost:3000/api/all");
        assert_eq!(config.add_url().as_str(), "http://localhost:3000/api/add");

        let config = SyncConfig::new("http://localhost:3000").unwrap();
        assert_eq!(config.all_url().as_str(), "http://localhost:3000/all");
    }

    #[test]
    fn encodes_counter_names_as_one_segment() {
        let config = SyncConfig::new("http://localhost:3000").unwrap();
        let name = CounterName::new("a b/c?d#e").unwrap();
        assert_eq!(
            config.increment_url(&name).unwrap().as_str(),
            "http://localhost:3000/increment/a%20b%2Fc%3Fd%23e"
        );
    }

    #[test]
    fn dot_segment_names_cannot_be_incremented() {
        let config = SyncConfig::new("http://localhost:3000").unwrap();
        for dots in [".", ".."] {
            let name = CounterName::new(dots).unwrap();
            assert!(matches!(config.increment_url(&name), Err(SyncError::InvalidName(n)) if n == dots));
        }

        let name = CounterName::new("...").unwrap();
        assert_eq!(
            config.increment_url(&name).unwrap().as_str(),
            "http://localhost:3000/increment/..."
        );
    }

    #[test]
    fn push_url_switches_scheme() {
        let config = SyncConfig::new("http://localhost:3000").unwrap();
        assert_eq!(config.push_url().unwrap().as_str(), "ws://localhost:3000/ws");

        let config = SyncConfig::new("https://counters.example/base")
            .unwrap()
            .with_push_path("/socket/updates");
        assert_eq!(
            config.push_url().unwrap().as_str(),
            "wss://counters.example/base/socket/updates"
        );
    }

    #[test]
    fn rejects_non_http_bases_and_empty_transports() {
        assert!(matches!(SyncConfig::new("ftp://x"), Err(SyncError::Config(_))));
        assert!(matches!(SyncConfig::new("not a url"), Err(SyncError::InvalidUrl(_))));

        let config = SyncConfig::new(DEFAULT_API_BASE).unwrap();
        assert!(config.with_transports(Vec::new()).is_err());
    }

    // Env is process-wide: this is the only test touching TALLY_* variables.
    #[test]
    fn from_env_reads_tally_variables() {
        const KEYS: [&str; 5] = [
            "TALLY_API_BASE",
            "TALLY_REQUEST_TIMEOUT_MS",
            "TALLY_POLL_INTERVAL_MS",
            "TALLY_RECONNECT_DELAY_MS",
            "TALLY_TRANSPORTS",
        ];
        let clear = || KEYS.iter().for_each(|key| std::env::remove_var(key));
        clear();

        std::env::set_var("TALLY_API_BASE", "https://counters.example/api/");
        std::env::set_var("TALLY_REQUEST_TIMEOUT_MS", " 2500 ");
        std::env::set_var("TALLY_POLL_INTERVAL_MS", "100");
        std::env::set_var("TALLY_RECONNECT_DELAY_MS", "0");
        std::env::set_var("TALLY_TRANSPORTS", "polling, websocket,");

        let config = SyncConfig::from_env().unwrap();
        assert_eq!(config.base_url.as_str(), "https://counters.example/api/");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.reconnect_delay, Duration::ZERO);
        assert_eq!(config.transports, vec![Transport::Polling, Transport::WebSocket]);

        std::env::set_var("TALLY_POLL_INTERVAL_MS", "soon");
        match SyncConfig::from_env() {
            Err(SyncError::Config(msg)) => assert!(msg.contains("TALLY_POLL_INTERVAL_MS"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
        std::env::set_var("TALLY_POLL_INTERVAL_MS", "100");

        std::env::set_var("TALLY_TRANSPORTS", "websocket,carrier-pigeon");
        assert!(matches!(SyncConfig::from_env(), Err(SyncError::Config(_))));

        std::env::set_var("TALLY_TRANSPORTS", " , ");
        assert!(matches!(SyncConfig::from_env(), Err(SyncError::Config(_))));

        clear();
        let config = SyncConfig::from_env().unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:3000/");
        assert_eq!(config.transports, vec![Transport::WebSocket, Transport::Polling]);
    }

    #[test]
    fn parses_transport_names() {
        assert_eq!("WebSocket".parse::<Transport>().unwrap(), Transport::WebSocket);
        assert_eq!(" polling ".parse::<Transport>().unwrap(), Transport::Polling);
        assert!("carrier-pigeon".parse::<Transport>().is_err());
    }
}
