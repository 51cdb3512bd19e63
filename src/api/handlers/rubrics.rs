// src/api/handlers/rubrics.rs
use actix_web::{web, HttpResponse, Result};
use crate::api::AppState;
use crate::api::handlers::error_response;
use crate::errors::GradingError;
use crate::models::NewRubric;

/// POST /api/v1/rubrics
pub async fn create_rubric(
    state: web::Data<AppState>,
    req: web::Json<NewRubric>,
) -> Result<HttpResponse> {
    match state.coordinator.store().create_rubric(req.into_inner()).await {
        Ok(rubric) => {
            log::info!("✅ Created rubric {} ({} points)", rubric.id, rubric.total_points);
            Ok(HttpResponse::Created().json(rubric))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/v1/rubrics/{id}
pub async fn get_rubric(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match state.coordinator.store().get_rubric(&id).await {
        Ok(Some(rubric)) => Ok(HttpResponse::Ok().json(rubric)),
        Ok(None) => Ok(error_response(&GradingError::RubricNotFound(id))),
        Err(e) => Ok(error_response(&e)),
    }
}
