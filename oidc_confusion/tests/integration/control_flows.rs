//! Test object lifecycle through the harness.

use oidc_confusion::{PlanKind, RouteError, TestObjectError, Verdict};

use crate::common::{init_tracing, test_harness, test_hosts};

#[tokio::test]
async fn test_object_lifecycle() {
    init_tracing();
    let harness = test_harness();

    // Given one object of each kind
    let rp = harness.objects().create_rp_test_object().unwrap();
    let op = harness.objects().create_op_test_object().unwrap();
    assert_eq!(harness.objects().len(), 2);
    assert_eq!(rp.kind(), PlanKind::Rp);

    // Then each exposes the actors of the opposite role
    let exposed = rp.expose(&test_hosts());
    assert!(
        exposed
            .honest
            .discovery_url
            .unwrap()
            .starts_with("http://honest-op.test/")
    );
    let exposed = op.expose(&test_hosts());
    assert_eq!(
        exposed.evil.redirect_uri.unwrap(),
        format!("http://evil-rp.test/{}/callback", op.test_id())
    );

    // When deleting the RP object
    assert!(harness.objects().delete(rp.test_id().as_str()));

    // Then only the OP object remains
    assert!(matches!(
        harness.objects().get(rp.test_id().as_str()),
        Err(TestObjectError::NotFound(_))
    ));
    assert!(harness.objects().get(op.test_id().as_str()).is_ok());
}

#[tokio::test]
async fn test_rp_step_without_target_is_undetermined() {
    // An RP object with no target URL fails its grant check
    let harness = test_harness();
    let object = harness.objects().create_rp_test_object().unwrap();

    let verdict = object.run_learning_step(harness.executor()).await;

    assert_eq!(verdict, Verdict::Undetermined);
    let learning = object.report().learning;
    assert_eq!(learning.result, Verdict::Undetermined);
    assert!(!learning.log.is_empty());
    assert!(harness.instances().is_empty());
}

#[tokio::test]
async fn test_dispatch_without_running_step() {
    let harness = test_harness();
    let object = harness.objects().create_rp_test_object().unwrap();

    // Actor URLs of an idle object have no instance behind them
    let url = format!(
        "http://honest-op.test/{}/.well-known/openid-configuration",
        object.test_id()
    );
    let request = http::Request::builder().uri(url).body(Vec::new()).unwrap();
    assert!(matches!(
        harness.dispatch(request).await,
        Err(RouteError::Registry(_))
    ));

    let request = http::Request::builder()
        .uri("http://unknown.test/abc/jwks")
        .body(Vec::new())
        .unwrap();
    assert!(matches!(
        harness.dispatch(request).await,
        Err(RouteError::UnknownHost(_))
    ));
}
