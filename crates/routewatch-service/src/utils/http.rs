use std::time::Duration;

use reqwest::redirect;

use crate::config::OracleConfig;

/// The `User-Agent` sent with every request to the routing oracle.
///
/// The public OSRM demo server asks clients to identify themselves.
pub const USER_AGENT: &str = concat!("routewatch/", env!("CARGO_PKG_VERSION"));

/// Connection and request timeouts for the routing oracle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OracleTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Hard limit for one request, from dispatch until the body has been read.
    pub request: Duration,
}

impl OracleTimeouts {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            request: config.timeout,
        }
    }
}

impl Default for OracleTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(2),
            request: Duration::from_secs(10),
        }
    }
}

/// Creates a [`reqwest::Client`] for talking to the routing oracle.
///
/// The client carries the request timeout itself, on top of the timeout the resolver races each
/// call against, so a stalled connection is torn down even if the caller stops polling. Redirects
/// are limited to a handful of hops, since an oracle behind a load balancer redirects at most once
/// or twice.
pub fn create_client(timeouts: &OracleTimeouts) -> reqwest::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .user_agent(USER_AGENT)
        .gzip(true)
        .hickory_dns(true)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(redirect::Policy::limited(3))
        .build()
}
