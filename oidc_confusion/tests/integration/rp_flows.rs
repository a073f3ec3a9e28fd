//! RP-testing steps against the mock relying party.

use std::sync::Arc;

use oidc_confusion::{
    ActorEnv, BehaviorCatalog, Harness, KEY_CONFUSION_ITERATIONS, KeyConfusionOp, OpServer,
    RoleSlot, ServerBehavior, TestObject, Verdict,
};

use crate::common::{MockRp, MockRpOptions, init_tracing, rp_config, test_harness_with};

async fn rp_object(
    options: MockRpOptions,
    catalog: BehaviorCatalog,
) -> (Harness, MockRp, Arc<TestObject>) {
    init_tracing();
    let harness = test_harness_with(catalog);
    let rp = MockRp::start(harness.clone(), options).await;
    let object = harness.objects().create_rp_test_object().unwrap();
    object.update_rp_config(rp_config(&rp.base)).unwrap();
    (harness, rp, object)
}

/// Builtin catalog whose key confusion OPs all share `scenario`.
fn sharing_key_confusion(scenario: Arc<KeyConfusionOp>) -> BehaviorCatalog {
    BehaviorCatalog::builtin().with_server(
        "key-confusion-op",
        Arc::new(
            move |env: ActorEnv, slot: RoleSlot| -> Box<dyn ServerBehavior> {
                Box::new(OpServer::new(env, slot, Box::new(scenario.clone())))
            },
        ),
    )
}

#[tokio::test]
async fn test_key_confusion_rejected_in_every_iteration() {
    // Given an RP taking keys only from the provider's jwks_uri
    let scenario = Arc::new(KeyConfusionOp::new());
    let (harness, rp, object) =
        rp_object(MockRpOptions::default(), sharing_key_confusion(scenario.clone())).await;

    // When running the key confusion step
    let verdict = object
        .run_step(harness.executor(), "Key-Confusion")
        .await
        .unwrap();

    // Then all three tokens were issued and rejected
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(scenario.issued(), 3);
    assert_eq!(scenario.issued(), KEY_CONFUSION_ITERATIONS);
    let key_requests = rp.key_requests.lock().unwrap().clone();
    assert_eq!(key_requests.len(), 3);
    assert!(key_requests.iter().all(|url| url.ends_with("/jwks")));
    let failures = rp.failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|reason| reason.starts_with("Unknown key")));

    // And the step left nothing behind
    assert!(harness.instances().is_empty());
}

#[tokio::test]
async fn test_key_confusion_via_jku_fails() {
    // Given an RP following the jku header of the ID token
    let scenario = Arc::new(KeyConfusionOp::new());
    let options = MockRpOptions {
        honor_jku: true,
        ..Default::default()
    };
    let (harness, rp, object) = rp_object(options, sharing_key_confusion(scenario.clone())).await;

    // When running the key confusion step
    let verdict = object
        .run_step(harness.executor(), "Key-Confusion")
        .await
        .unwrap();

    // Then the first token was accepted with the untrusted key
    assert_eq!(verdict, Verdict::Fail);
    assert_eq!(scenario.issued(), 1);
    let key_requests = rp.key_requests.lock().unwrap().clone();
    assert_eq!(key_requests.len(), 1);
    assert!(key_requests[0].ends_with("/untrusted-key"));
}

#[tokio::test]
async fn test_idp_confusion_honest_code_forwarded_fails() {
    // Given an RP redeeming codes with the provider of the latest login
    let options = MockRpOptions {
        follow_latest_login: true,
        ..Default::default()
    };
    let (harness, rp, object) = rp_object(options, BehaviorCatalog::builtin()).await;

    // When running the IdP confusion step
    let verdict = object
        .run_step(harness.executor(), "IdP-Confusion")
        .await
        .unwrap();

    // Then the honest code reached the evil token endpoint
    assert_eq!(verdict, Verdict::Fail);
    let token_requests = rp.token_requests.lock().unwrap().clone();
    assert_eq!(token_requests.len(), 1);
    assert!(token_requests[0].starts_with("http://evil-op.test/"));
    assert!(harness.instances().is_empty());
}

#[tokio::test]
async fn test_idp_confusion_code_kept_with_honest_op_passes() {
    // Given an RP redeeming codes with the provider its first login started at
    let (harness, rp, object) =
        rp_object(MockRpOptions::default(), BehaviorCatalog::builtin()).await;

    // When running the IdP confusion step
    let verdict = object
        .run_step(harness.executor(), "IdP-Confusion")
        .await
        .unwrap();

    // Then the code went back to the honest OP
    assert_eq!(verdict, Verdict::Pass);
    let token_requests = rp.token_requests.lock().unwrap().clone();
    assert_eq!(token_requests.len(), 1);
    assert!(token_requests[0].starts_with("http://honest-op.test/"));
}
