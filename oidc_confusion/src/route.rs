//! Mapping of inbound actor requests to the registered instance.

use http::header::HOST;
use thiserror::Error;
use url::Url;

use crate::actor::{ActorRequest, ActorResponse, Endpoint};
use crate::config::HostConfig;
use crate::harness::Harness;
use crate::registry::RegistryError;
use crate::types::{ENFORCE_REGISTRATION_PREFIX, RoleSlot, TestId};

const FRAGMENT_SUFFIX_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unknown actor host: {0}")]
    UnknownHost(String),

    #[error("No actor resource at {0}")]
    NotFound(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Target of one actor request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRoute {
    pub slot: RoleSlot,
    pub test_id: TestId,
    pub endpoint: Endpoint,
    /// `<host>[/<enforce-fragment>]/<test-id>`
    pub base_url: String,
    /// Resource path below the base URL.
    pub resource: String,
}

impl ActorRoute {
    /// Resolve `authority` (the Host header) and the request path.
    pub fn resolve(hosts: &HostConfig, authority: &str, path: &str) -> Result<Self, RouteError> {
        let (slot, host_url) = slot_for_authority(hosts, authority)
            .ok_or_else(|| RouteError::UnknownHost(authority.to_string()))?;
        let not_found = || RouteError::NotFound(path.to_string());

        let mut rest = path.strip_prefix('/').ok_or_else(not_found)?;
        let mut base_url = host_url.to_string();
        if let Some((first, tail)) = rest.split_once('/') {
            if is_registration_fragment(first) {
                base_url.push('/');
                base_url.push_str(first);
                rest = tail;
            }
        }

        let (test_id, resource) = rest.split_once('/').ok_or_else(not_found)?;
        if test_id.is_empty() {
            return Err(not_found());
        }
        let resource = format!("/{resource}");
        let endpoint = Endpoint::from_path(&resource, slot.is_op()).ok_or_else(not_found)?;

        base_url.push('/');
        base_url.push_str(test_id);
        Ok(Self {
            slot,
            test_id: TestId::new(test_id),
            endpoint,
            base_url,
            resource,
        })
    }
}

fn is_registration_fragment(segment: &str) -> bool {
    segment
        .strip_prefix(ENFORCE_REGISTRATION_PREFIX)
        .is_some_and(|suffix| {
            suffix.len() == FRAGMENT_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

fn slot_for_authority<'a>(hosts: &'a HostConfig, authority: &str) -> Option<(RoleSlot, &'a str)> {
    let authority = authority.trim().to_ascii_lowercase();
    [
        (RoleSlot::Op1, hosts.honest_op_url.as_str()),
        (RoleSlot::Op2, hosts.evil_op_url.as_str()),
        (RoleSlot::Rp1, hosts.honest_rp_url.as_str()),
        (RoleSlot::Rp2, hosts.evil_rp_url.as_str()),
    ]
    .into_iter()
    .find(|(_, url)| url_authority(url).is_some_and(|a| a == authority))
}

/// `host[:port]` of a configured URL, the port only when not the default.
fn url_authority(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

impl Harness {
    /// Hand an inbound request to the actor instance it addresses. The
    /// authority is taken from the request URI, else from the Host header.
    pub async fn dispatch(&self, request: http::Request<Vec<u8>>) -> Result<ActorResponse, RouteError> {
        let (parts, body) = request.into_parts();
        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let route = ActorRoute::resolve(&self.config().hosts, &authority, parts.uri.path())?;
        let instance = self.instances().lookup(&route.test_id, route.slot)?;
        let request = ActorRequest::from_parts(
            parts.method,
            &route.resource,
            parts.uri.query(),
            parts.headers,
            body,
            &route.base_url,
        );
        Ok(instance.handle(route.endpoint, request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> HostConfig {
        HostConfig::new(
            "http://controller.test/",
            "http://honest-op.test",
            "http://evil-op.test:8443/",
            "https://honest-rp.test",
            "http://evil-rp.test",
        )
    }

    #[test]
    fn test_resolve_op_endpoints() {
        let route = ActorRoute::resolve(&hosts(), "honest-op.test", "/abc123/token-req").unwrap();
        assert_eq!(route.slot, RoleSlot::Op1);
        assert_eq!(route.test_id, TestId::new("abc123"));
        assert_eq!(route.endpoint, Endpoint::Token);
        assert_eq!(route.base_url, "http://honest-op.test/abc123");

        let route = ActorRoute::resolve(
            &hosts(),
            "EVIL-OP.test:8443",
            "/abc123/.well-known/openid-configuration",
        )
        .unwrap();
        assert_eq!(route.slot, RoleSlot::Op2);
        assert_eq!(route.endpoint, Endpoint::Discovery);
    }

    #[test]
    fn test_resolve_registration_fragment() {
        let route = ActorRoute::resolve(
            &hosts(),
            "honest-op.test",
            "/enforce-rp-reg-Ab3dEf9h/abc123/.well-known/webfinger",
        )
        .unwrap();
        assert_eq!(route.endpoint, Endpoint::Webfinger);
        assert_eq!(route.test_id.as_str(), "abc123");
        assert_eq!(
            route.base_url,
            "http://honest-op.test/enforce-rp-reg-Ab3dEf9h/abc123"
        );

        // A malformed fragment is taken for the test id
        let err = ActorRoute::resolve(&hosts(), "honest-op.test", "/enforce-rp-reg-x/abc123/jwks");
        assert!(matches!(err, Err(RouteError::NotFound(_))));
    }

    #[test]
    fn test_rp_side_serves_callback_only() {
        let route = ActorRoute::resolve(&hosts(), "honest-rp.test", "/t1/callback").unwrap();
        assert_eq!(route.slot, RoleSlot::Rp1);
        assert_eq!(route.base_url, "https://honest-rp.test/t1");

        assert!(ActorRoute::resolve(&hosts(), "evil-rp.test", "/t1/jwks").is_ok());
        assert!(matches!(
            ActorRoute::resolve(&hosts(), "evil-rp.test", "/t1/token-req"),
            Err(RouteError::NotFound(_))
        ));
        assert!(matches!(
            ActorRoute::resolve(&hosts(), "honest-op.test", "/t1/callback"),
            Err(RouteError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_host_and_short_paths() {
        assert!(matches!(
            ActorRoute::resolve(&hosts(), "elsewhere.test", "/t1/jwks"),
            Err(RouteError::UnknownHost(_))
        ));
        // Port must match as configured
        assert!(ActorRoute::resolve(&hosts(), "evil-op.test", "/t1/jwks").is_err());
        assert!(ActorRoute::resolve(&hosts(), "honest-op.test", "/t1").is_err());
        assert!(ActorRoute::resolve(&hosts(), "honest-op.test", "//jwks").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_registered_instance() {
        use crate::actor::{ActorInstance, BehaviorCatalog, NoBrowser};
        use crate::harness::HarnessOptions;
        use crate::logger::StepLogger;
        use crate::runner::test_support::runner_config;
        use std::sync::Arc;
        use std::time::Duration;

        // Given a default OP registered for test t1
        let harness = Harness::new(HarnessOptions {
            runner: runner_config(),
            catalog: BehaviorCatalog::builtin(),
            drivers: Arc::new(NoBrowser),
            object_lifetime: Duration::from_secs(60),
            test_id_length: 10,
        })
        .unwrap();
        let logger = StepLogger::new("t1", "dispatch");
        let env = crate::actor::test_support::rp_env(&[]);
        let behavior = BehaviorCatalog::builtin()
            .server("default-op", env, RoleSlot::Op2)
            .unwrap();
        harness.instances().register(
            &TestId::new("t1"),
            ActorInstance::new(RoleSlot::Op2, "default-op", behavior, logger.clone()),
        );

        // When a JWKS request arrives on the evil OP host
        let request = http::Request::builder()
            .uri("/t1/jwks")
            .header(HOST, "evil-op.test")
            .body(Vec::new())
            .unwrap();
        let response = harness.dispatch(request).await.unwrap();

        // Then the instance answered and logged the exchange
        assert_eq!(response.status, http::StatusCode::OK);
        assert!(response.body_text().contains("keys"));
        assert_eq!(logger.len(), 3);

        // And an unregistered slot is a missing instance
        let request = http::Request::builder()
            .uri("http://honest-op.test/t1/jwks")
            .body(Vec::new())
            .unwrap();
        assert!(matches!(
            harness.dispatch(request).await,
            Err(RouteError::Registry(RegistryError::MissingInstance { .. }))
        ));
    }
}
