//! OP-testing steps against the mock OpenID provider.

use oidc_confusion::{TestObject, Verdict};
use std::sync::Arc;

use crate::common::{MockOp, MockOpOptions, init_tracing, op_config, test_harness};

async fn op_object(op: &MockOp) -> (oidc_confusion::Harness, Arc<TestObject>) {
    init_tracing();
    let harness = test_harness();
    let object = harness.objects().create_op_test_object().unwrap();
    object.update_op_config(op_config(&op.base)).unwrap();
    (harness, object)
}

#[tokio::test]
async fn test_learning_step_logs_first_user_in() {
    // Given a well-behaved OP granting the test
    let op = MockOp::start(MockOpOptions::granted()).await;
    let (harness, object) = op_object(&op).await;

    // When running the learning step
    let verdict = object.run_learning_step(harness.executor()).await;

    // Then the honest RP redeemed alice's code
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(op.registrations.lock().unwrap().len(), 2);
    let requests = op.token_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("code-alice-"));

    // And the step left nothing behind
    assert!(harness.instances().is_empty());
    let report = object.report();
    assert_eq!(report.learning.result, Verdict::Pass);
    assert!(!report.learning.log.is_empty());
}

#[tokio::test]
async fn test_registration_is_reused_after_completed_step() {
    let op = MockOp::start(MockOpOptions::granted()).await;
    let (harness, object) = op_object(&op).await;

    assert_eq!(object.run_learning_step(harness.executor()).await, Verdict::Pass);
    let verdict = object
        .run_step(harness.executor(), "Code-Reuse-Single-Client")
        .await
        .unwrap();

    assert_eq!(verdict, Verdict::Pass);
    // Clients registered by the learning step served the test step too
    assert_eq!(op.registrations.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_code_reuse_single_client_rejected() {
    // Given an OP accepting every code once
    let op = MockOp::start(MockOpOptions::granted()).await;
    let (harness, object) = op_object(&op).await;

    // When the same client reuses alice's code during bob's login
    let verdict = object
        .run_step(harness.executor(), "Code-Reuse-Single-Client")
        .await
        .unwrap();

    // Then the reuse was attempted and rejected
    assert_eq!(verdict, Verdict::Pass);
    let requests = op.token_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test]
async fn test_code_reuse_single_client_accepted_fails() {
    let op = MockOp::start(MockOpOptions {
        allow_code_reuse: true,
        ..MockOpOptions::granted()
    })
    .await;
    let (harness, object) = op_object(&op).await;

    let verdict = object
        .run_step(harness.executor(), "Code-Reuse-Single-Client")
        .await
        .unwrap();

    assert_eq!(verdict, Verdict::Fail);
    assert_eq!(
        object.report().step("Code-Reuse-Single-Client").unwrap().result,
        Verdict::Fail
    );
}

#[tokio::test]
async fn test_code_reuse_other_client() {
    // A code bound to its client cannot be redeemed by the evil RP
    let op = MockOp::start(MockOpOptions {
        allow_code_reuse: true,
        ..MockOpOptions::granted()
    })
    .await;
    let (harness, object) = op_object(&op).await;
    let verdict = object
        .run_step(harness.executor(), "Code-Reuse-Other-Client")
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Pass);

    // Without the binding the evil RP obtains alice's identity
    let op = MockOp::start(MockOpOptions {
        allow_code_reuse: true,
        ignore_code_binding: true,
        ..MockOpOptions::granted()
    })
    .await;
    let (harness, object) = op_object(&op).await;
    let verdict = object
        .run_step(harness.executor(), "Code-Reuse-Other-Client")
        .await
        .unwrap();
    assert_eq!(verdict, Verdict::Fail);
}

#[tokio::test]
async fn test_error_response_fails() {
    let op = MockOp::start(MockOpOptions {
        deny_logins: true,
        ..MockOpOptions::granted()
    })
    .await;
    let (harness, object) = op_object(&op).await;

    let verdict = object
        .run_step(harness.executor(), "Error-Response")
        .await
        .unwrap();

    assert_eq!(verdict, Verdict::Fail);
    assert!(op.token_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_grant_skips_the_step() {
    // Given an OP without grant resource
    let op = MockOp::start(MockOpOptions::default()).await;
    let (harness, object) = op_object(&op).await;

    // When running the learning step
    let verdict = object.run_learning_step(harness.executor()).await;

    // Then nothing was sent to the target
    assert_eq!(verdict, Verdict::Undetermined);
    assert!(op.registrations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_grant_is_rejected() {
    let op = MockOp::start(MockOpOptions {
        grant: Some("http://other-controller.test/".to_string()),
        ..Default::default()
    })
    .await;
    let (harness, object) = op_object(&op).await;

    assert_eq!(
        object.run_learning_step(harness.executor()).await,
        Verdict::Undetermined
    );
    assert!(op.registrations.lock().unwrap().is_empty());
}
