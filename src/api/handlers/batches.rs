// src/api/handlers/batches.rs
use actix_web::{web, HttpResponse, Result};
use serde::Serialize;
use crate::api::AppState;
use crate::api::handlers::error_response;
use crate::api::handlers::ws::WsBroker;
use crate::errors::GradingError;
use crate::models::{Batch, Grade};
use crate::runner::StartBatchRequest;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetailResponse {
    pub batch: Batch,
    pub grades: Vec<Grade>,
}

/// POST /api/v1/batches - grade every selected file against one rubric.
///
/// Partial success is still a 200; the body lists which documents failed.
/// Connected dashboards hear about each document as soon as it finishes.
pub async fn start_batch(
    state: web::Data<AppState>,
    broker: web::Data<WsBroker>,
    req: web::Json<StartBatchRequest>,
) -> Result<HttpResponse> {
    let request = req.into_inner();
    log::info!(
        "🎯 Starting batch '{}' with {} file(s)",
        request.batch_name,
        request.selected_files.len()
    );

    match state
        .coordinator
        .start_batch_with_progress(request, broker.get_ref())
        .await
    {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/v1/batches/{id}
pub async fn get_batch(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let store = state.coordinator.store();

    let batch = match store.get_batch(&id).await {
        Ok(Some(batch)) => batch,
        Ok(None) => return Ok(error_response(&GradingError::BatchNotFound(id))),
        Err(e) => return Ok(error_response(&e)),
    };

    match store.list_batch_grades(&id).await {
        Ok(grades) => Ok(HttpResponse::Ok().json(BatchDetailResponse { batch, grades })),
        Err(e) => Ok(error_response(&e)),
    }
}
