// src/api/handlers/mod.rs
mod health;
mod rubrics;
mod batches;
mod grades;
pub mod ws;

use actix_web::HttpResponse;
use serde_json::json;
use crate::errors::GradingError;

pub use health::health_check;
pub use rubrics::{create_rubric, get_rubric};
pub use batches::{start_batch, get_batch};
pub use grades::{grade_essay, get_grade};
pub use ws::{ws_handler, WsBroker, GradeUpdate};

/// Maps a grading error onto the HTTP status the UI expects.
pub(crate) fn error_response(e: &GradingError) -> HttpResponse {
    let body = json!({ "error": e.to_string() });
    if e.is_not_found() {
        HttpResponse::NotFound().json(body)
    } else if e.is_bad_request() {
        HttpResponse::BadRequest().json(body)
    } else {
        log::error!("Request failed: {}", e);
        HttpResponse::InternalServerError().json(body)
    }
}
