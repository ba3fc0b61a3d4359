//! Support to fetch routes from an OSRM HTTP server.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, header};
use url::Url;

use crate::config::OracleConfig;
use crate::types::Coordinate;
use crate::utils::http::{OracleTimeouts, create_client};

use super::{OsrmResponse, RouteError, RoutingOracle};

/// Routing oracle backed by the OSRM `route` service.
///
/// Requests look like
/// `{base}/route/v1/{profile}/{origin lon},{origin lat};{dest lon},{dest lat}?overview=full&geometries=geojson`.
/// OSRM expects longitude first, the reverse of how coordinates are handled everywhere else.
#[derive(Debug, Clone)]
pub struct OsrmOracle {
    client: Client,
    base_url: Url,
    profile: String,
    timeout: Duration,
}

impl OsrmOracle {
    pub fn new(client: Client, mut base_url: Url, profile: impl Into<String>, timeout: Duration) -> Self {
        // Make `join` append to the configured path instead of replacing its last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            client,
            base_url,
            profile: profile.into(),
            timeout,
        }
    }

    /// Creates an oracle with its own HTTP client, configured from `config`.
    pub fn from_config(config: &OracleConfig) -> reqwest::Result<Self> {
        let client = create_client(&OracleTimeouts::from_config(config))?;
        Ok(Self::new(
            client,
            config.url.clone(),
            config.profile.clone(),
            config.timeout,
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The request URL for a route from `origin` to `destination`.
    pub fn route_url(&self, origin: Coordinate, destination: Coordinate) -> Result<Url, RouteError> {
        let path = format!(
            "route/v1/{}/{},{};{},{}",
            self.profile, origin.lon, origin.lat, destination.lon, destination.lat
        );
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| RouteError::Malformed(format!("invalid routing url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "geojson");
        Ok(url)
    }

    async fn fetch(&self, origin: Coordinate, destination: Coordinate) -> Result<OsrmResponse, RouteError> {
        let url = self.route_url(origin, destination)?;
        tracing::debug!("Fetching route from `{}`", url);

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, "Routing oracle responded with an error status");
            return Err(RouteError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn map_error(&self, error: reqwest::Error) -> RouteError {
        if error.is_timeout() {
            RouteError::Timeout(self.timeout)
        } else {
            error.into()
        }
    }
}

impl RoutingOracle for OsrmOracle {
    fn fetch_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> BoxFuture<'_, Result<OsrmResponse, RouteError>> {
        Box::pin(self.fetch(origin, destination))
    }
}
