//! Turns route requests into drawable geometry.
//!
//! A request goes through these steps, the first three synchronously:
//!
//! 1. A request whose nodes already describe a detailed path is passed through untouched.
//! 2. A fresh cache entry for the (origin, destination) pair is returned as-is.
//! 3. If the ambulance/hospital pair already has a resolution scheduled or in flight, the
//!    straight line between origin and destination is returned.
//! 4. Otherwise the pair is marked pending and the oracle call is handed to the [`Debouncer`].
//!    The caller immediately gets the straight-line fallback plus a [`PendingRoute`] that
//!    resolves to the final geometry.
//!
//! The oracle call is raced against a hard timeout. A usable answer is cached and delivered as
//! detailed geometry. Anything else is logged and delivered as the fallback. Either way the pair
//! leaves the pending set before the outcome is delivered.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::caching::{PendingSet, RouteCache, RoutePairKey};
use crate::config::Config;
use crate::dispatch::Debouncer;
use crate::oracle::{OsrmResponse, RouteError, RoutingOracle};
use crate::types::{Coordinate, PairId, ResolvedRoute, RouteSource};

/// A request to resolve the route of one ambulance/hospital pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub pair: PairId,
    /// The path as the server sent it. The first node is the origin, the last the destination.
    pub nodes: Vec<Coordinate>,
}

impl RouteRequest {
    pub fn new(pair: PairId, nodes: Vec<Coordinate>) -> Self {
        Self { pair, nodes }
    }
}

/// A request that cannot be resolved at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("route for `{0}` has {1} nodes, at least 2 are required")]
    TooFewNodes(PairId, usize),
    #[error("route for `{0}` has a non-finite coordinate")]
    NonFinite(PairId),
}

/// The result of [`RouteResolver::resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// The final geometry is known right away.
    Ready(ResolvedRoute),
    /// A detailed route has been scheduled. Draw the fallback until it arrives.
    Scheduled(PendingRoute),
}

impl Resolution {
    /// The geometry to draw right now.
    pub fn current(&self) -> &ResolvedRoute {
        match self {
            Self::Ready(route) => route,
            Self::Scheduled(pending) => pending.fallback(),
        }
    }

    /// Waits for the final geometry.
    pub async fn into_final(self) -> ResolvedRoute {
        match self {
            Self::Ready(route) => route,
            Self::Scheduled(pending) => pending.outcome().await,
        }
    }
}

/// A detailed route that has been scheduled but not yet delivered.
#[derive(Debug)]
pub struct PendingRoute {
    fallback: ResolvedRoute,
    outcome: oneshot::Receiver<ResolvedRoute>,
}

impl PendingRoute {
    pub fn pair(&self) -> &PairId {
        &self.fallback.pair
    }

    /// The straight line to draw in the meantime.
    pub fn fallback(&self) -> &ResolvedRoute {
        &self.fallback
    }

    /// Waits for the outcome.
    ///
    /// Resolves to the fallback if the resolution was superseded by a later request or
    /// cancelled by a shutdown.
    pub async fn outcome(self) -> ResolvedRoute {
        self.outcome.await.unwrap_or(self.fallback)
    }
}

/// Tuning knobs of a [`RouteResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub debounce: Duration,
    /// Hard deadline for a single oracle call.
    pub timeout: Duration,
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_capacity: config.cache.capacity,
            cache_ttl: config.cache.ttl,
            debounce: config.debounce,
            timeout: config.oracle.timeout,
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug)]
struct ResolverInner {
    cache: Mutex<RouteCache>,
    pending: PendingSet,
    debouncer: Debouncer,
    oracle: Arc<dyn RoutingOracle>,
    timeout: Duration,
    shutdown: CancellationToken,
}

/// Resolves route requests into detailed geometry, with caching, in-flight deduplication and
/// debouncing.
///
/// Each resolver owns its own cache, pending set and debounce slot. Clones share them.
///
/// The debounce slot is global: in a burst of requests for different pairs, only the last one
/// reaches the oracle promptly. The others are drawn as straight lines for now and pick up their
/// detailed route on a later push.
#[derive(Debug, Clone)]
pub struct RouteResolver {
    inner: Arc<ResolverInner>,
}

impl RouteResolver {
    pub fn new(oracle: Arc<dyn RoutingOracle>, options: ResolverOptions) -> Self {
        let shutdown = CancellationToken::new();
        let inner = ResolverInner {
            cache: Mutex::new(RouteCache::new(options.cache_capacity, options.cache_ttl)),
            pending: PendingSet::new(),
            debouncer: Debouncer::with_shutdown(options.debounce, shutdown.clone()),
            oracle,
            timeout: options.timeout,
            shutdown,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Resolves one request. Must be called from within a tokio runtime.
    pub fn resolve(&self, request: RouteRequest) -> Result<Resolution, InvalidRequest> {
        let RouteRequest { pair, nodes } = request;

        let (origin, destination) = match nodes.as_slice() {
            [origin, .., destination] => (*origin, *destination),
            _ => return Err(InvalidRequest::TooFewNodes(pair, nodes.len())),
        };
        if !nodes.iter().all(Coordinate::is_finite) {
            return Err(InvalidRequest::NonFinite(pair));
        }

        if nodes.len() > 2 {
            let route = record_outcome(ResolvedRoute::supplied(pair, nodes));
            return Ok(Resolution::Ready(route));
        }

        let key = RoutePairKey::encode(origin, destination);
        if let Some(entry) = self.inner.lock_cache().get(&key) {
            metric!(counter("routes.cache.hit") += 1);
            let route = ResolvedRoute::from_summary(pair, &entry.route, RouteSource::Cached);
            return Ok(Resolution::Ready(record_outcome(route)));
        }
        metric!(counter("routes.cache.miss") += 1);

        let fallback = ResolvedRoute::fallback(pair.clone(), origin, destination);
        let Some(guard) = self.inner.pending.try_insert(&pair) else {
            tracing::trace!(%pair, "Route already pending, drawing a straight line");
            metric!(counter("routes.dedup.skipped") += 1);
            return Ok(Resolution::Ready(record_outcome(fallback)));
        };

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let work_fallback = fallback.clone();
        self.inner.debouncer.schedule(async move {
            let route = inner.fetch_detailed(work_fallback, key, origin, destination).await;
            // The pair must leave the pending set before anyone learns about the outcome.
            drop(guard);
            // The receiver may be gone already, nobody is interested in the route then.
            let _ = tx.send(route);
        });

        Ok(Resolution::Scheduled(PendingRoute {
            fallback,
            outcome: rx,
        }))
    }

    /// Resolves a batch of requests, in order.
    ///
    /// All cache and pending-set decisions for the batch are taken before any oracle call can
    /// start.
    pub fn resolve_batch<I>(&self, requests: I) -> Vec<Result<Resolution, InvalidRequest>>
    where
        I: IntoIterator<Item = RouteRequest>,
    {
        requests
            .into_iter()
            .map(|request| self.resolve(request))
            .collect()
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock_cache().len()
    }

    /// The number of pairs currently scheduled or in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    /// Drops scheduled work and aborts in-flight oracle calls.
    ///
    /// Their outcomes resolve to the straight-line fallback.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl ResolverInner {
    fn lock_cache(&self) -> MutexGuard<'_, RouteCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_detailed(
        &self,
        fallback: ResolvedRoute,
        key: RoutePairKey,
        origin: Coordinate,
        destination: Coordinate,
    ) -> ResolvedRoute {
        let pair = &fallback.pair;
        tracing::debug!(%pair, %key, "Resolving detailed route");

        let start = Instant::now();
        let result = tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(RouteError::Cancelled),
            result = tokio::time::timeout(
                self.timeout,
                self.oracle.fetch_route(origin, destination),
            ) => result.unwrap_or(Err(RouteError::Timeout(self.timeout))),
        };
        let result = result.and_then(OsrmResponse::into_summary);

        let status = match &result {
            Ok(_) => "ok",
            Err(err) => err.metric_tag(),
        };
        metric!(timer("routes.oracle.request") = start.elapsed(), "status" => status);

        match result {
            Ok(summary) => {
                let route = ResolvedRoute::from_summary(pair.clone(), &summary, RouteSource::Detailed);
                self.lock_cache().put(key, summary);
                record_outcome(route)
            }
            Err(err) => {
                tracing::warn!(%pair, error = %err, "Could not resolve detailed route, drawing a straight line");
                record_outcome(fallback)
            }
        }
    }
}

fn record_outcome(route: ResolvedRoute) -> ResolvedRoute {
    metric!(counter("routes.outcome") += 1, "source" => route.source.as_str());
    route
}
