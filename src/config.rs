//! Client configuration.
//!
//! [`ClientOptions`] carries every tunable of the session: timeouts, the
//! reconnection backoff, debounce window, subscription batching and the
//! attribute rounding policy. Options are validated once, when the client is
//! built.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use intellicenter_client::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_keepalive_interval(Duration::from_secs(60))
//!     .with_idle_timeout(Duration::from_secs(240))
//!     .with_debounce_window(Duration::from_secs(20));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::AttributePolicy;

// ============================================================================
// Constants
// ============================================================================

/// TCP port the controller listens on.
pub const DEFAULT_PORT: u16 = 6681;

/// Upper bound accepted for every duration option.
pub const MAX_DURATION: Duration = Duration::from_secs(86_400);

/// Keys requested for every object during discovery.
pub const DEFAULT_DISCOVERY_KEYS: &[&str] = &["OBJTYP", "SUBTYP", "SNAME", "PARENT", "STATUS"];

// ============================================================================
// ClientOptions
// ============================================================================

/// Session tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Port used when the address passed to `connect` has none.
    pub default_port: u16,

    /// Bound on a single TCP connect attempt.
    pub connect_timeout: Duration,

    /// Deadlock ceiling for the in-flight request slot.
    pub request_timeout: Duration,

    /// Quiet period after which a keep-alive query is issued.
    pub keepalive_interval: Duration,

    /// Silence after which the connection is declared dead.
    pub idle_timeout: Duration,

    /// First reconnection delay.
    pub backoff_base: Duration,

    /// Growth factor applied to each successive reconnection delay.
    pub backoff_multiplier: f64,

    /// Upper bound for the reconnection delay.
    pub backoff_max: Duration,

    /// Random spread applied on top of each delay, as a fraction of it.
    pub backoff_jitter: f64,

    /// How long a lost connection may stay lost before observers hear of it.
    pub debounce_window: Duration,

    /// Maximum (object, attribute) pairs per subscription request.
    pub subscription_batch_size: usize,

    /// Largest partial frame the codec will buffer.
    pub max_frame_len: usize,

    /// Attributes fetched for every object on (re)connect.
    pub discovery_keys: Vec<String>,

    /// Normalization applied to attribute values before diffing.
    pub attribute_policy: AttributePolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(45),
            keepalive_interval: Duration::from_secs(90),
            idle_timeout: Duration::from_secs(300),
            backoff_base: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            backoff_max: Duration::from_secs(600),
            backoff_jitter: 0.1,
            debounce_window: Duration::from_secs(60),
            subscription_batch_size: 50,
            max_frame_len: 1024 * 1024,
            discovery_keys: DEFAULT_DISCOVERY_KEYS
                .iter()
                .map(|key| (*key).to_string())
                .collect(),
            attribute_policy: AttributePolicy::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port used when an address has none.
    #[inline]
    #[must_use]
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the in-flight request ceiling.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval.
    #[inline]
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the idle timeout.
    #[inline]
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the reconnection backoff sequence.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_multiplier = multiplier;
        self.backoff_max = max;
        self
    }

    /// Sets the jitter fraction applied to reconnection delays.
    #[inline]
    #[must_use]
    pub fn with_backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = jitter;
        self
    }

    /// Sets the availability debounce window.
    #[inline]
    #[must_use]
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Sets the number of pairs per subscription request.
    #[inline]
    #[must_use]
    pub fn with_subscription_batch_size(mut self, size: usize) -> Self {
        self.subscription_batch_size = size;
        self
    }

    /// Sets the largest buffered partial frame.
    #[inline]
    #[must_use]
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Replaces the discovery keys.
    #[must_use]
    pub fn with_discovery_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discovery_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the attribute policy.
    #[inline]
    #[must_use]
    pub fn with_attribute_policy(mut self, policy: AttributePolicy) -> Self {
        self.attribute_policy = policy;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks the options for inconsistent combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
            ("keepalive_interval", self.keepalive_interval),
            ("idle_timeout", self.idle_timeout),
            ("backoff_base", self.backoff_base),
            ("backoff_max", self.backoff_max),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        let debounce = ("debounce_window", self.debounce_window);
        if let Some((name, d)) = durations
            .iter()
            .chain(std::iter::once(&debounce))
            .find(|(_, d)| *d > MAX_DURATION)
        {
            return Err(Error::config(format!(
                "{name} ({d:?}) must not exceed {MAX_DURATION:?}"
            )));
        }

        if self.idle_timeout <= self.keepalive_interval {
            return Err(Error::config(format!(
                "idle_timeout ({:?}) must exceed keepalive_interval ({:?})",
                self.idle_timeout, self.keepalive_interval
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.backoff_base > self.backoff_max {
            return Err(Error::config("backoff_base must not exceed backoff_max"));
        }

        if !(0.0..1.0).contains(&self.backoff_jitter) {
            return Err(Error::config(format!(
                "backoff_jitter must be in [0, 1), got {}",
                self.backoff_jitter
            )));
        }

        if self.subscription_batch_size == 0 {
            return Err(Error::config("subscription_batch_size must be at least 1"));
        }

        if self.max_frame_len == 0 {
            return Err(Error::config("max_frame_len must be at least 1"));
        }

        Ok(())
    }
}

// ============================================================================
// DeviceAddress
// ============================================================================

/// Host and port of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl DeviceAddress {
    /// Parses `host`, `host:port`, `ip`, `ip:port` or `[ipv6]:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty host or a bad port.
    pub fn parse(address: &str, default_port: u16) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::invalid_argument("device address is empty"));
        }

        if let Ok(socket) = address.parse::<SocketAddr>() {
            return Ok(Self {
                host: socket.ip().to_string(),
                port: socket.port(),
            });
        }

        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(Self {
                host: ip.to_string(),
                port: default_port,
            });
        }

        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::invalid_argument(format!("invalid port in address '{address}'"))
                })?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            Some(_) => Err(Error::invalid_argument(format!(
                "missing host in address '{address}'"
            ))),
            None => Ok(Self {
                host: address.to_string(),
                port: default_port,
            }),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
