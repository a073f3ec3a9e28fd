//! Control API: create, configure, run and inspect test objects.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Serialize;

use oidc_confusion::{
    ExposedEndpoints, Harness, StepResult, TestConfig, TestId, TestObjectExport, TestReport,
};

use super::error::IntoResponseError;

pub(super) fn router(harness: Harness) -> Router {
    Router::new()
        .route("/rp", post(create_rp_test_object))
        .route("/op", post(create_op_test_object))
        .route("/{test_id}", get(export).delete(delete_test_object))
        .route("/{test_id}/config", get(get_config).put(update_config))
        .route("/{test_id}/report", get(report))
        .route("/{test_id}/expose", get(expose))
        .route("/{test_id}/learn", post(run_learning_step))
        .route("/{test_id}/steps/{step}", put(run_step).post(run_step))
        .with_state(harness)
}

#[derive(Debug, Serialize)]
struct Created {
    test_id: TestId,
    exposed: ExposedEndpoints,
}

async fn create_rp_test_object(
    State(harness): State<Harness>,
) -> Result<(StatusCode, Json<Created>), (StatusCode, String)> {
    let object = harness.objects().create_rp_test_object().into_response_error()?;
    Ok((
        StatusCode::CREATED,
        Json(Created {
            test_id: object.test_id().clone(),
            exposed: object.expose(&harness.config().hosts),
        }),
    ))
}

async fn create_op_test_object(
    State(harness): State<Harness>,
) -> Result<(StatusCode, Json<Created>), (StatusCode, String)> {
    let object = harness.objects().create_op_test_object().into_response_error()?;
    Ok((
        StatusCode::CREATED,
        Json(Created {
            test_id: object.test_id().clone(),
            exposed: object.expose(&harness.config().hosts),
        }),
    ))
}

async fn export(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<Json<TestObjectExport>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    Ok(Json(object.export()))
}

async fn delete_test_object(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if harness.objects().delete(&test_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("Test object not found: {test_id}"),
        ))
    }
}

async fn get_config(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<Json<TestConfig>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    Ok(Json(object.config()))
}

async fn update_config(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
    Json(config): Json<TestConfig>,
) -> Result<Json<TestConfig>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    match config {
        TestConfig::Rp(config) => object.update_rp_config(config),
        TestConfig::Op(config) => object.update_op_config(config),
    }
    .into_response_error()?;
    Ok(Json(object.config()))
}

async fn report(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<Json<TestReport>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    Ok(Json(object.report()))
}

async fn expose(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<Json<ExposedEndpoints>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    Ok(Json(object.expose(&harness.config().hosts)))
}

async fn run_learning_step(
    State(harness): State<Harness>,
    Path(test_id): Path<String>,
) -> Result<Json<StepResult>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    object.run_learning_step(harness.executor()).await;
    Ok(Json(object.report().learning))
}

async fn run_step(
    State(harness): State<Harness>,
    Path((test_id, step)): Path<(String, String)>,
) -> Result<Json<StepResult>, (StatusCode, String)> {
    let object = harness.objects().get(&test_id).into_response_error()?;
    object
        .run_step(harness.executor(), &step)
        .await
        .into_response_error()?;
    let result = object.report().step(&step).cloned().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("No result recorded for step {step}"),
        )
    })?;
    Ok(Json(result))
}
