use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use routewatch_service::config::Config;
use routewatch_service::oracle::OsrmOracle;
use routewatch_service::resolver::{ResolverOptions, RouteResolver};
use routewatch_test as test;

pub use test::{OracleServer, fixture, read_fixture};

/// Setup tests and create a resolver that talks to the oracle at `base_url`.
///
/// The debounce delay is shortened so tests do not spend most of their time waiting. The
/// `update_config` closure can modify any configuration before the resolver is created.
pub fn setup_resolver(base_url: Url, update_config: impl FnOnce(&mut Config)) -> RouteResolver {
    test::setup();

    let mut config = Config::default();
    config.oracle.url = base_url;
    config.debounce = Duration::from_millis(20);
    update_config(&mut config);

    let oracle = OsrmOracle::from_config(&config.oracle).unwrap();
    RouteResolver::new(Arc::new(oracle), ResolverOptions::from_config(&config))
}
