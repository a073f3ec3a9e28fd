use std::collections::HashMap;
use std::sync::Arc;

use super::behavior::{BrowserBehavior, ServerBehavior};
use super::browser::{
    DefaultRpBrowser, DriverFactory, IdpConfusionRpBrowser, InformationLeakRpBrowser,
    InvalidStateRpBrowser, KeyConfusionRpBrowser, OpCodeReuseBrowser, OpLearningBrowser,
    OpRumBrowser, RpLearningBrowser, SessionKeyConfusionRpBrowser, SessionOverwritingRpBrowser,
    SubClaimSpoofingOpBrowser, TokenSubstitutionRpBrowser,
};
use super::env::ActorEnv;
use super::errors::ActorError;
use super::op::{
    DefaultOp, IdpConfusionOp, InvalidStateOp, KeyConfusionOp, MaliciousEndpointOp, OpScenario,
    OpServer, ReplayOp, SessionKeyConfusionOp, SessionOverwritingOp, TokenRecipientConfusionOp,
    UserInfoIdSpoofingOp,
};
use super::rp::{
    CodeReuseRp, DefaultRp, PkceRp, RedirectUriManipulationRp, RpScenario, RpServer,
    SubClaimSpoofingRp,
};
use crate::types::RoleSlot;

pub type ServerFactory =
    Arc<dyn Fn(ActorEnv, RoleSlot) -> Box<dyn ServerBehavior> + Send + Sync + 'static>;

pub type BrowserFactory = Arc<
    dyn Fn(ActorEnv, Arc<dyn DriverFactory>) -> Box<dyn BrowserBehavior> + Send + Sync + 'static,
>;

/// Behavior identifiers used by test plans, mapped to their constructors.
#[derive(Clone, Default)]
pub struct BehaviorCatalog {
    servers: HashMap<String, ServerFactory>,
    browsers: HashMap<String, BrowserFactory>,
}

fn op(scenario: fn() -> Box<dyn OpScenario>) -> ServerFactory {
    Arc::new(
        move |env: ActorEnv, slot: RoleSlot| -> Box<dyn ServerBehavior> {
            Box::new(OpServer::new(env, slot, scenario()))
        },
    )
}

fn rp(scenario: fn() -> Arc<dyn RpScenario>) -> ServerFactory {
    Arc::new(
        move |env: ActorEnv, slot: RoleSlot| -> Box<dyn ServerBehavior> {
            Box::new(RpServer::new(env, slot, scenario()))
        },
    )
}

fn browser<B, F>(build: F) -> BrowserFactory
where
    B: BrowserBehavior,
    F: Fn(ActorEnv, Arc<dyn DriverFactory>) -> B + Send + Sync + 'static,
{
    Arc::new(
        move |env: ActorEnv, drivers: Arc<dyn DriverFactory>| -> Box<dyn BrowserBehavior> {
            Box::new(build(env, drivers))
        },
    )
}

impl BehaviorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every behavior shipped with the crate.
    pub fn builtin() -> Self {
        Self::new()
            .with_server("default-op", op(|| Box::new(DefaultOp)))
            .with_server("replay-op", op(|| Box::new(ReplayOp)))
            .with_server("malicious-endpoint-op", op(|| Box::new(MaliciousEndpointOp)))
            .with_server("idp-confusion-op", op(|| Box::new(IdpConfusionOp::new())))
            .with_server("session-overwriting-op", op(|| Box::new(SessionOverwritingOp)))
            .with_server("key-confusion-op", op(|| Box::new(KeyConfusionOp::new())))
            .with_server("session-key-confusion-op", op(|| Box::new(SessionKeyConfusionOp)))
            .with_server("invalid-state-op", op(|| Box::new(InvalidStateOp::new())))
            .with_server(
                "token-recipient-confusion-op",
                op(|| Box::new(TokenRecipientConfusionOp)),
            )
            .with_server("userinfo-id-spoofing-op", op(|| Box::new(UserInfoIdSpoofingOp)))
            .with_server("default-rp", rp(|| Arc::new(DefaultRp)))
            .with_server("code-reuse-rp", rp(|| Arc::new(CodeReuseRp)))
            .with_server("pkce-rp", rp(|| Arc::new(PkceRp)))
            .with_server(
                "redirect-uri-manipulation-rp",
                rp(|| Arc::new(RedirectUriManipulationRp)),
            )
            .with_server("sub-claim-spoofing-rp", rp(|| Arc::new(SubClaimSpoofingRp)))
            .with_browser("rp-learning-browser", browser(RpLearningBrowser::new))
            .with_browser("default-rp-browser", browser(DefaultRpBrowser::new))
            .with_browser(
                "information-leak-rp-browser",
                browser(InformationLeakRpBrowser::new),
            )
            .with_browser("idp-confusion-rp-browser", browser(IdpConfusionRpBrowser::new))
            .with_browser(
                "session-overwriting-rp-browser",
                browser(SessionOverwritingRpBrowser::new),
            )
            .with_browser("key-confusion-rp-browser", browser(KeyConfusionRpBrowser::new))
            .with_browser(
                "session-key-confusion-rp-browser",
                browser(SessionKeyConfusionRpBrowser::new),
            )
            .with_browser("invalid-state-rp-browser", browser(InvalidStateRpBrowser::new))
            .with_browser(
                "token-substitution-rp-browser",
                browser(TokenSubstitutionRpBrowser::new),
            )
            .with_browser("op-learning-browser", browser(OpLearningBrowser::new))
            .with_browser("op-code-reuse-browser", browser(OpCodeReuseBrowser::new))
            .with_browser("op-rum-browser", browser(OpRumBrowser::new))
            .with_browser(
                "sub-claim-spoofing-op-browser",
                browser(SubClaimSpoofingOpBrowser::new),
            )
    }

    pub fn with_server(mut self, id: &str, factory: ServerFactory) -> Self {
        self.servers.insert(id.to_string(), factory);
        self
    }

    pub fn with_browser(mut self, id: &str, factory: BrowserFactory) -> Self {
        self.browsers.insert(id.to_string(), factory);
        self
    }

    pub fn has_server(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    pub fn has_browser(&self, id: &str) -> bool {
        self.browsers.contains_key(id)
    }

    pub fn server(
        &self,
        id: &str,
        env: ActorEnv,
        slot: RoleSlot,
    ) -> Result<Box<dyn ServerBehavior>, ActorError> {
        let factory = self.servers.get(id).ok_or_else(|| {
            ActorError::ImplementationLoad(format!("Unknown server behavior '{id}'"))
        })?;
        tracing::debug!("Creating server behavior {} for {}", id, slot);
        Ok(factory(env, slot))
    }

    pub fn browser(
        &self,
        id: &str,
        env: ActorEnv,
        drivers: Arc<dyn DriverFactory>,
    ) -> Result<Box<dyn BrowserBehavior>, ActorError> {
        let factory = self.browsers.get(id).ok_or_else(|| {
            ActorError::ImplementationLoad(format!("Unknown browser behavior '{id}'"))
        })?;
        tracing::debug!("Creating browser behavior {}", id);
        Ok(factory(env, drivers))
    }
}
