// src/api/handlers/grades.rs
use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;
use crate::api::AppState;
use crate::api::handlers::error_response;
use crate::api::handlers::ws::{GradeUpdate, WsBroker};
use crate::errors::GradingError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEssayRequest {
    pub rubric_id: String,
    pub file_url: String,
    pub user_id: String,
}

/// POST /api/v1/grades/essay - grade one document without a batch.
pub async fn grade_essay(
    state: web::Data<AppState>,
    broker: web::Data<WsBroker>,
    req: web::Json<GradeEssayRequest>,
) -> Result<HttpResponse> {
    match state
        .coordinator
        .grade_essay(&req.rubric_id, &req.file_url, &req.user_id)
        .await
    {
        Ok(grade) => {
            broker.broadcast(GradeUpdate::graded(&grade)).await;
            Ok(HttpResponse::Created().json(grade))
        }
        Err(e) => {
            log::warn!("⚠️  Grading {} failed: {}", req.file_url, e);
            Ok(error_response(&e))
        }
    }
}

/// GET /api/v1/grades/{id}
pub async fn get_grade(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match state.coordinator.store().get_grade(&id).await {
        Ok(Some(grade)) => Ok(HttpResponse::Ok().json(grade)),
        Ok(None) => Ok(error_response(&GradingError::GradeNotFound(id))),
        Err(e) => Ok(error_response(&e)),
    }
}
