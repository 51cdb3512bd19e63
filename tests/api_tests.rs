// tests/api_tests.rs
mod common;

use actix_web::{test, web, App};
use common::*;
use essay_grader::api::handlers::WsBroker;
use essay_grader::api::{configure_routes, AppState};
use essay_grader::models::{BatchResult, Grade, GradingRubric};
use serde_json::{json, Value};

const D1: &str = "https://files.example.com/u1/d1.pdf";
const D2: &str = "https://files.example.com/u1/d2.pdf";

async fn state(scripts: Vec<(&str, Script)>) -> (AppState, GradingRubric) {
    let h = harness(scripts, fast_settings()).await;
    (AppState::from_parts(h.coordinator, "scripted"), h.rubric)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .app_data(web::Data::new(WsBroker::new()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health_reports_backend() {
    let (state, _) = state(vec![]).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "scripted");
}

#[actix_web::test]
async fn test_create_and_fetch_rubric() {
    let (state, _) = state(vec![]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/rubrics")
        .set_json(json!({
            "userId": "teacher-2",
            "title": "Lab report",
            "criteria": [
                {"name": "Method", "description": "Reproducible", "pointValue": 5},
                {"name": "Analysis", "pointValue": 15}
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);
    let created: GradingRubric = test::read_body_json(resp).await;
    assert_eq!(created.total_points, 20.0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/rubrics/{}", created.id))
        .to_request();
    let fetched: GradingRubric = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, created);

    let req = test::TestRequest::get().uri("/api/v1/rubrics/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_invalid_rubric_is_bad_request() {
    let (state, _) = state(vec![]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/rubrics")
        .set_json(json!({"userId": "t", "title": "Empty", "criteria": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_partial_batch_returns_ok_with_failures() {
    let (state, rubric) = state(vec![
        (D1, Script::ok(VALID_OUTPUT)),
        (D2, Script::ok(MISSING_SCORE_OUTPUT)),
    ])
    .await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/batches")
        .set_json(json!({
            "batchName": "Period 1",
            "rubricId": rubric.id,
            "selectedFiles": [D1, D2],
            "userId": "teacher-1"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let result: BatchResult = test::read_body_json(resp).await;
    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(result.failed.len(), 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/batches/{}", result.batch_id))
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["batch"]["status"], "PartiallyCompleted");
    assert_eq!(detail["grades"].as_array().unwrap().len(), 1);
    assert_eq!(detail["grades"][0]["fileName"], "d1.pdf");
}

#[actix_web::test]
async fn test_batch_failure_reasons_are_serialized() {
    let (state, rubric) = state(vec![(D2, Script::ok(MISSING_SCORE_OUTPUT))]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/batches")
        .set_json(json!({
            "batchName": "Period 4",
            "rubricId": rubric.id,
            "selectedFiles": [D2],
            "userId": "teacher-1"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["failed"][0]["documentUrl"], D2);
    assert_eq!(body["failed"][0]["reason"], "MalformedResultError");
}

#[actix_web::test]
async fn test_batch_with_unknown_rubric_is_not_found() {
    let (state, _) = state(vec![(D1, Script::ok(VALID_OUTPUT))]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/batches")
        .set_json(json!({
            "batchName": "Period 1",
            "rubricId": "missing",
            "selectedFiles": [D1],
            "userId": "teacher-1"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_batch_without_files_is_bad_request() {
    let (state, rubric) = state(vec![]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/batches")
        .set_json(json!({
            "batchName": "Empty",
            "rubricId": rubric.id,
            "selectedFiles": [],
            "userId": "teacher-1"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_grade_single_essay() {
    let (state, rubric) = state(vec![(D1, Script::ok(VALID_OUTPUT))]).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/grades/essay")
        .set_json(json!({"rubricId": rubric.id, "fileUrl": D1, "userId": "teacher-1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);
    let grade: Grade = test::read_body_json(resp).await;
    assert_eq!(grade.score, "8/10");
    assert!(grade.batch_id.is_none());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/grades/{}", grade.id))
        .to_request();
    let fetched: Grade = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, grade);
}
